//! I-EPOS Performance Benchmarks
//!
//! Critical paths of one iteration:
//! - Combinatorial space construction at an inner node
//! - Variance selection over all combinations
//! - A full phase on a balanced tree

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use iepos_agent::combinatorial::{ChildMenu, CombinatorialSpace};
use iepos_agent::fitness::{IterativeFitnessFunction, SelectionContext, VarianceFitness};
use iepos_agent::telemetry::RecordingSink;
use iepos_agent::{AgentConfig, LocalNetwork, StaticPlans, Topology};
use iepos_common::{NodeId, Plan};

const NUM_STATES: usize = 24;

fn menu(seed: usize, size: usize) -> Vec<Plan> {
    (0..size)
        .map(|k| {
            let values = (0..NUM_STATES)
                .map(|s| (((seed * 31 + k * 17 + s * 7) % 13) as f64) / 4.0)
                .collect();
            Plan::from_values(values)
        })
        .collect()
}

// ============ COMBINATORIAL BENCHMARKS ============

fn bench_space_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("combinatorial");
    group.measurement_time(Duration::from_secs(5));

    for children in [1usize, 2, 3].iter() {
        let menus: Vec<Vec<Plan>> = (0..*children).map(|j| menu(j, 10)).collect();
        let combinations = 10u64.pow(*children as u32);
        group.throughput(Throughput::Elements(combinations));

        group.bench_with_input(BenchmarkId::new("build", children), &menus, |b, menus| {
            let child_menus: Vec<ChildMenu<'_>> = menus
                .iter()
                .enumerate()
                .map(|(j, plans)| ChildMenu {
                    child: NodeId(j as u32),
                    plans,
                })
                .collect();
            b.iter(|| CombinatorialSpace::build(NUM_STATES, black_box(&child_menus)));
        });
    }

    group.finish();
}

fn bench_variance_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("selection");

    let menus: Vec<Vec<Plan>> = (0..3).map(|j| menu(j, 10)).collect();
    let child_menus: Vec<ChildMenu<'_>> = menus
        .iter()
        .enumerate()
        .map(|(j, plans)| ChildMenu {
            child: NodeId(j as u32),
            plans,
        })
        .collect();
    let space = match CombinatorialSpace::build(NUM_STATES, &child_menus) {
        Ok(space) => space,
        Err(e) => panic!("bench setup failed: {e}"),
    };
    let signal = Plan::zeros(NUM_STATES);
    let aggregate = menu(99, 1).remove(0);
    let fitness = VarianceFitness::default();

    group.throughput(Throughput::Elements(space.len() as u64));
    group.bench_function("variance_1000", |b| {
        let ctx = SelectionContext {
            node: NodeId(0),
            cost_signal: &signal,
            previous: None,
            num_nodes: None,
            num_nodes_subtree: 4,
            layer: 0,
            avg_num_children: 3.0,
            iteration: 0,
        };
        b.iter(|| fitness.select(black_box(&ctx), black_box(&aggregate), space.plans()))
    });

    group.finish();
}

// ============ PROTOCOL BENCHMARKS ============

fn bench_phase(c: &mut Criterion) {
    let mut group = c.benchmark_group("phase");
    group.sample_size(20);

    for num_nodes in [15usize, 63].iter() {
        let mut source = StaticPlans::new(NUM_STATES);
        for i in 0..*num_nodes {
            source.set_menu(NodeId(i as u32), menu(i, 8));
        }
        let config = AgentConfig {
            num_iterations: 5,
            ..AgentConfig::default()
        };

        group.bench_with_input(BenchmarkId::new("balanced_binary", num_nodes), num_nodes, |b, &n| {
            b.iter(|| {
                let topology = match Topology::balanced(n, 2) {
                    Ok(topology) => topology,
                    Err(e) => panic!("bench setup failed: {e}"),
                };
                let mut network = match LocalNetwork::iepos(
                    topology,
                    &config,
                    &Plan::zeros(NUM_STATES),
                    &VarianceFitness::default(),
                    None,
                    Arc::new(RecordingSink::new()),
                ) {
                    Ok(network) => network,
                    Err(e) => panic!("bench setup failed: {e}"),
                };
                black_box(network.run_phase(Utc::now(), None, &source))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_space_build, bench_variance_select, bench_phase);
criterion_main!(benches);
