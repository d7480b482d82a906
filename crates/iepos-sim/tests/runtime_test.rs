//! The task runtime against the in-process network

use std::fs;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use iepos_agent::telemetry::RecordingSink;
use iepos_agent::{
    exhaustive_nodes, iepos_nodes, AgentConfig, GreedyBranchSearch, LocalNetwork, LocalSearch, Topology,
    VarianceFitness,
};
use iepos_common::{Phase, Plan};
use iepos_sim::config::{DatasetSettings, DatasetSource, ProtocolKind, RuntimeMode};
use iepos_sim::{Experiment, NoiseDataset, SimConfig, TreeRuntime};

const PLAN_SIZE: usize = 6;

fn phase(day: i64) -> Phase {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::days(day)
}

fn dataset(num_nodes: usize) -> NoiseDataset {
    NoiseDataset::new(
        num_nodes,
        &DatasetSettings {
            num_plans: 4,
            plan_size: PLAN_SIZE,
            seed: 42,
            ..DatasetSettings::default()
        },
    )
    .unwrap()
}

#[tokio::test]
async fn test_tasks_match_local_network_over_phases() {
    let topology = Topology::balanced(15, 2).unwrap();
    let config = AgentConfig {
        num_iterations: 4,
        history_size: 2,
        ramp_up_rate: Some(0.5),
    };
    let signal = Plan::zeros(PLAN_SIZE);
    let greedy: &dyn LocalSearch = &GreedyBranchSearch::default();
    let source = dataset(topology.len());

    let build = || {
        iepos_nodes(
            &topology,
            &config,
            &signal,
            &VarianceFitness::default(),
            Some(greedy),
            Arc::new(RecordingSink::new()),
        )
        .unwrap()
    };
    let mut local = LocalNetwork::new(topology.clone(), build()).unwrap();
    let mut tasks = TreeRuntime::spawn(&topology, build()).unwrap();

    let mut previous = None;
    for day in 0..3 {
        let expected = local.run_phase(phase(day), previous, &source).unwrap();
        let actual = tasks.run_phase(phase(day), previous, &source).await.unwrap();
        assert_eq!(actual, expected, "phase {}", day);
        previous = Some(phase(day));
    }

    tasks.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_exhaustive_over_tasks() {
    let topology = Topology::balanced(4, 3).unwrap();
    let signal = Plan::zeros(PLAN_SIZE);
    let source = dataset(topology.len());
    let sink = Arc::new(RecordingSink::new());

    let mut local = LocalNetwork::new(
        topology.clone(),
        exhaustive_nodes(&topology, &signal, &VarianceFitness::default(), Arc::new(RecordingSink::new())),
    )
    .unwrap();
    let mut tasks = TreeRuntime::spawn(
        &topology,
        exhaustive_nodes(&topology, &signal, &VarianceFitness::default(), sink.clone()),
    )
    .unwrap();

    let expected = local.run_phase(phase(0), None, &source).unwrap();
    let actual = tasks.run_phase(phase(0), None, &source).await.unwrap();
    assert_eq!(actual, expected);
    assert_eq!(actual.iterations, 1);
    assert_eq!(sink.global().len(), 1);
    assert_eq!(sink.local().len(), 4);

    tasks.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_experiment_from_plan_files() {
    let dir = std::env::temp_dir().join(format!("iepos-sim-files-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("0.plans"), "0:0,0\n").unwrap();
    fs::write(dir.join("1.plans"), "0:1,0\n0.5:0,1\n").unwrap();
    fs::write(dir.join("2.plans"), "0:0,2\n0.25:0,1\n").unwrap();

    let mut config = SimConfig::default();
    config.topology.num_nodes = 3;
    config.algorithm.num_iterations = 1;
    config.dataset = DatasetSettings {
        source: DatasetSource::Files,
        plan_size: 2,
        directory: Some(dir.clone()),
        ..DatasetSettings::default()
    };

    let summaries = Experiment::new(config).unwrap().run().await.unwrap();
    assert_eq!(summaries.len(), 1);

    // [1,0] from node 1 and [0,1] from node 2 is the only flat combination
    let summary = &summaries[0];
    assert_eq!(summary.global_plan.as_ref().unwrap().values(), &[1.0, 1.0]);
    assert_eq!(summary.measure("std"), Some(0.0));
    assert_eq!(summary.local_discomfort, 0.25);

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_exhaustive_experiment_never_worse_than_iepos() {
    let mut config = SimConfig::default();
    config.topology.num_nodes = 5;
    config.topology.branching = 2;
    config.dataset.num_plans = 3;
    config.dataset.plan_size = PLAN_SIZE;
    config.dataset.seed = 9;
    config.runtime.mode = RuntimeMode::Local;

    let iepos = Experiment::new(config.clone()).unwrap().run().await.unwrap();
    config.algorithm.protocol = ProtocolKind::Exhaustive;
    let exhaustive = Experiment::new(config).unwrap().run().await.unwrap();

    let variance = |plan: &Option<Plan>| plan.as_ref().unwrap().variance();
    assert!(variance(&exhaustive[0].global_plan) <= variance(&iepos[0].global_plan) + 1e-12);
    assert_eq!(exhaustive[0].iterations, 1);
}
