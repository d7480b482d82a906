//! In-process delivery
//!
//! Runs a whole tree inside one thread. Emitted messages go to a FIFO
//! queue that is pumped until it is empty. With a shuffle seed, the next
//! message is drawn at random from everything pending instead, which
//! exercises arrival-order independence reproducibly.

use std::collections::VecDeque;
use std::sync::Arc;

use iepos_common::{IeposError, Phase, Plan, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, instrument};

use super::exhaustive::ExhaustiveNode;
use super::iepos::IeposAgent;
use super::template::IterativeNode;
use super::topology::Topology;
use super::{NodeOutput, NodeSnapshot, Outgoing, PhaseStart, ProtocolNode};
use crate::dataset::PlanSource;
use crate::fitness::IterativeFitnessFunction;
use crate::local_search::LocalSearch;
use crate::telemetry::MeasurementSink;
use crate::AgentConfig;

/// Outcome of one phase
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseReport {
    pub phase: Phase,
    pub iterations: usize,
    /// Root's global plan after the last iteration
    pub global_plan: Option<Plan>,
    /// Per-node state, indexed by node id
    pub nodes: Vec<NodeSnapshot>,
}

impl PhaseReport {
    /// Worst-path computations over all nodes
    pub fn max_computations(&self) -> u64 {
        self.nodes.iter().map(|n| n.cum_computations).max().unwrap_or(0)
    }

    pub fn max_transmitted(&self) -> u64 {
        self.nodes.iter().map(|n| n.cum_transmitted).max().unwrap_or(0)
    }
}

/// One I-EPOS node per tree node, in id order, each with its own copy of
/// the policies
pub fn iepos_nodes(
    topology: &Topology,
    config: &AgentConfig,
    cost_signal: &Plan,
    fitness: &dyn IterativeFitnessFunction,
    local_search: Option<&dyn LocalSearch>,
    sink: Arc<dyn MeasurementSink>,
) -> Result<Vec<Box<dyn ProtocolNode>>> {
    let mut nodes: Vec<Box<dyn ProtocolNode>> = Vec::with_capacity(topology.len());
    for node in topology.nodes() {
        let mut agent = IeposAgent::new(node.id, config, cost_signal.clone(), fitness.box_clone(), sink.clone())?;
        if let Some(local_search) = local_search {
            agent = agent.with_local_search(local_search.box_clone());
        }
        nodes.push(Box::new(IterativeNode::new(
            node.clone(),
            agent,
            config.num_iterations,
            sink.clone(),
        )));
    }
    Ok(nodes)
}

/// One exhaustive node per tree node, in id order
pub fn exhaustive_nodes(
    topology: &Topology,
    cost_signal: &Plan,
    fitness: &dyn IterativeFitnessFunction,
    sink: Arc<dyn MeasurementSink>,
) -> Vec<Box<dyn ProtocolNode>> {
    topology
        .nodes()
        .iter()
        .map(|node| {
            Box::new(ExhaustiveNode::new(
                node.clone(),
                cost_signal.clone(),
                fitness.box_clone(),
                sink.clone(),
            )) as Box<dyn ProtocolNode>
        })
        .collect()
}

pub struct LocalNetwork {
    topology: Topology,
    nodes: Vec<Box<dyn ProtocolNode>>,
    queue: VecDeque<Outgoing>,
    shuffle: Option<StdRng>,
}

impl LocalNetwork {
    /// Wrap prebuilt nodes; `nodes[i]` must be node `i` of `topology`
    pub fn new(topology: Topology, nodes: Vec<Box<dyn ProtocolNode>>) -> Result<Self> {
        if nodes.len() != topology.len() {
            return Err(IeposError::Internal(format!(
                "{} nodes for a topology of {}",
                nodes.len(),
                topology.len()
            )));
        }
        if let Some((i, node)) = nodes.iter().enumerate().find(|(i, n)| n.id().index() != *i) {
            return Err(IeposError::Internal(format!("{} placed at index {}", node.id(), i)));
        }
        Ok(Self {
            topology,
            nodes,
            queue: VecDeque::new(),
            shuffle: None,
        })
    }

    /// In-process I-EPOS tree, see [`iepos_nodes`]
    pub fn iepos(
        topology: Topology,
        config: &AgentConfig,
        cost_signal: &Plan,
        fitness: &dyn IterativeFitnessFunction,
        local_search: Option<&dyn LocalSearch>,
        sink: Arc<dyn MeasurementSink>,
    ) -> Result<Self> {
        let nodes = iepos_nodes(&topology, config, cost_signal, fitness, local_search, sink)?;
        Self::new(topology, nodes)
    }

    /// In-process exhaustive tree, see [`exhaustive_nodes`]
    pub fn exhaustive(
        topology: Topology,
        cost_signal: &Plan,
        fitness: &dyn IterativeFitnessFunction,
        sink: Arc<dyn MeasurementSink>,
    ) -> Result<Self> {
        let nodes = exhaustive_nodes(&topology, cost_signal, fitness, sink);
        Self::new(topology, nodes)
    }

    /// Deliver pending messages in a seeded random order
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle = Some(StdRng::seed_from_u64(seed));
        self
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn snapshots(&self) -> Vec<NodeSnapshot> {
        self.nodes.iter().map(|n| n.snapshot()).collect()
    }

    /// Run every iteration of `phase` to completion
    #[instrument(skip(self, source), fields(nodes = self.nodes.len()))]
    pub fn run_phase(&mut self, phase: Phase, previous_phase: Option<Phase>, source: &dyn PlanSource) -> Result<PhaseReport> {
        let root = self.topology.root().index();
        let iterations = self.nodes[root].iterations_per_phase();
        let mut completed: Vec<Option<usize>> = vec![None; self.nodes.len()];

        for i in 0..self.nodes.len() {
            let plans = source.plans(self.nodes[i].id(), phase)?;
            let output = self.nodes[i].start_phase(PhaseStart {
                phase,
                previous_phase,
                plans,
            })?;
            self.absorb(i, output, &mut completed);
        }
        self.pump(&mut completed)?;
        self.check_complete(0, &completed)?;

        for iteration in 1..iterations {
            for i in 0..self.nodes.len() {
                let output = self.nodes[i].next_iteration()?;
                self.absorb(i, output, &mut completed);
            }
            self.pump(&mut completed)?;
            self.check_complete(iteration, &completed)?;
        }

        let nodes = self.snapshots();
        debug!(%phase, iterations, "Phase complete");
        Ok(PhaseReport {
            phase,
            iterations,
            global_plan: nodes[root].global_plan.clone(),
            nodes,
        })
    }

    fn absorb(&mut self, index: usize, output: NodeOutput, completed: &mut [Option<usize>]) {
        self.queue.extend(output.messages);
        if let Some(iteration) = output.iteration_complete {
            completed[index] = Some(iteration);
        }
    }

    fn next_message(&mut self) -> Option<Outgoing> {
        match self.shuffle.as_mut() {
            Some(rng) if !self.queue.is_empty() => {
                let i = rng.gen_range(0..self.queue.len());
                self.queue.swap_remove_back(i)
            }
            _ => self.queue.pop_front(),
        }
    }

    fn pump(&mut self, completed: &mut [Option<usize>]) -> Result<()> {
        while let Some(outgoing) = self.next_message() {
            let index = outgoing.to.index();
            let node = self
                .nodes
                .get_mut(index)
                .ok_or_else(|| IeposError::Transport(format!("no route to {}", outgoing.to)))?;
            let output = node.handle(outgoing.message)?;
            self.absorb(index, output, completed);
        }
        Ok(())
    }

    fn check_complete(&self, iteration: usize, completed: &[Option<usize>]) -> Result<()> {
        match completed.iter().position(|c| *c != Some(iteration)) {
            Some(stalled) => Err(IeposError::Transport(format!(
                "{} stalled in iteration {}",
                self.nodes[stalled].id(),
                iteration
            ))),
            None => Ok(()),
        }
    }
}
