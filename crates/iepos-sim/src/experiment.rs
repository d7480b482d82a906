//! Phase driver
//!
//! Builds the tree, the plan source and the nodes from a [`SimConfig`] and
//! runs the configured phases back to back, each phase seeing the one
//! before it as its `previous_phase`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use iepos_agent::cost::{default_measures, CostFunction};
use iepos_agent::{
    exhaustive_nodes, iepos_nodes, FanoutSink, LocalNetwork, MeasurementSink, PhaseReport, PlanSource,
    ProtocolNode, RecordingSink, Topology, TracingSink,
};
use iepos_common::{Phase, Plan, Result};
use tracing::{info, warn};

use crate::config::{DatasetSource, ProtocolKind, RuntimeMode, SimConfig};
use crate::dataset::{FileDataset, NoiseDataset};
use crate::report::PhaseSummary;
use crate::runtime::TreeRuntime;

/// Something that can run whole phases over a tree of nodes
#[async_trait]
pub trait PhaseRunner: Send {
    async fn run_phase(
        &mut self,
        phase: Phase,
        previous_phase: Option<Phase>,
        source: &dyn PlanSource,
    ) -> Result<PhaseReport>;

    /// Release whatever the runner holds
    async fn shutdown(self: Box<Self>) -> Result<()>;
}

#[async_trait]
impl PhaseRunner for TreeRuntime {
    async fn run_phase(
        &mut self,
        phase: Phase,
        previous_phase: Option<Phase>,
        source: &dyn PlanSource,
    ) -> Result<PhaseReport> {
        TreeRuntime::run_phase(self, phase, previous_phase, source).await
    }

    async fn shutdown(self: Box<Self>) -> Result<()> {
        TreeRuntime::shutdown(*self).await
    }
}

#[async_trait]
impl PhaseRunner for LocalNetwork {
    async fn run_phase(
        &mut self,
        phase: Phase,
        previous_phase: Option<Phase>,
        source: &dyn PlanSource,
    ) -> Result<PhaseReport> {
        LocalNetwork::run_phase(self, phase, previous_phase, source)
    }

    async fn shutdown(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

pub struct Experiment {
    config: SimConfig,
    topology: Topology,
    cost_signal: Plan,
    source: Box<dyn PlanSource>,
    measures: Vec<Box<dyn CostFunction>>,
    recorder: Arc<RecordingSink>,
}

impl Experiment {
    /// Build the topology and plan source described by `config`
    pub fn new(config: SimConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let topology = Topology::balanced(config.topology.num_nodes, config.topology.branching)?;
        let source: Box<dyn PlanSource> = match (config.dataset.source, &config.dataset.directory) {
            (DatasetSource::Files, Some(directory)) => {
                Box::new(FileDataset::new(directory, config.dataset.plan_size))
            }
            _ => Box::new(NoiseDataset::new(topology.len(), &config.dataset)?),
        };

        Ok(Self {
            cost_signal: config.cost_signal(),
            config,
            topology,
            source,
            measures: default_measures(),
            recorder: Arc::new(RecordingSink::new()),
        })
    }

    /// Replace the configured plan source
    pub fn with_source(mut self, source: Box<dyn PlanSource>) -> Self {
        self.source = source;
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Every measurement recorded so far
    pub fn recorder(&self) -> &RecordingSink {
        &self.recorder
    }

    /// Fresh nodes for the configured protocol, in id order
    pub fn build_nodes(&self) -> Result<Vec<Box<dyn ProtocolNode>>> {
        let sink: Arc<dyn MeasurementSink> = Arc::new(
            FanoutSink::default()
                .with(Arc::new(TracingSink))
                .with(self.recorder.clone()),
        );
        let algorithm = &self.config.algorithm;
        let fitness = algorithm.fitness.build();

        match algorithm.protocol {
            ProtocolKind::Iepos => {
                let local_search = algorithm.local_search.build();
                iepos_nodes(
                    &self.topology,
                    &algorithm.agent_config(),
                    &self.cost_signal,
                    &*fitness,
                    local_search.as_deref(),
                    sink,
                )
            }
            ProtocolKind::Exhaustive => {
                if algorithm.local_search.build().is_some() {
                    warn!("Local search is ignored by the exhaustive protocol");
                }
                Ok(exhaustive_nodes(&self.topology, &self.cost_signal, &*fitness, sink))
            }
        }
    }

    /// Runner for the configured runtime mode
    ///
    /// Task mode must be called from within a tokio runtime.
    pub fn build_runner(&self) -> Result<Box<dyn PhaseRunner>> {
        let nodes = self.build_nodes()?;
        let runtime = &self.config.runtime;

        match runtime.mode {
            RuntimeMode::Tasks => {
                let mut tree = TreeRuntime::spawn(&self.topology, nodes)?;
                if let Some(ms) = runtime.stall_timeout_ms {
                    tree = tree.with_stall_timeout(Duration::from_millis(ms));
                }
                Ok(Box::new(tree))
            }
            RuntimeMode::Local => {
                let mut network = LocalNetwork::new(self.topology.clone(), nodes)?;
                if let Some(seed) = runtime.shuffle_seed {
                    network = network.with_shuffle(seed);
                }
                Ok(Box::new(network))
            }
        }
    }

    /// Run every configured phase in order
    pub async fn run(&self) -> Result<Vec<PhaseSummary>> {
        let mut runner = self.build_runner()?;
        let result = self.run_phases(runner.as_mut()).await;
        runner.shutdown().await?;
        result
    }

    /// Run every configured phase on an existing runner
    pub async fn run_phases(&self, runner: &mut dyn PhaseRunner) -> Result<Vec<PhaseSummary>> {
        let mut summaries = Vec::new();
        let mut previous: Option<Phase> = None;

        for phase in self.config.phases.phases() {
            let report = runner.run_phase(phase, previous, &*self.source).await?;
            let summary = PhaseSummary::new(&report, &self.cost_signal, &self.measures, &self.recorder.work());

            info!(
                %phase,
                iterations = summary.iterations,
                std = ?summary.measure("std"),
                cost = ?summary.measure("cost"),
                rmse = ?summary.measure("rmse"),
                local_discomfort = summary.local_discomfort,
                max_computations = summary.max_computations,
                max_transmitted = summary.max_transmitted,
                "Phase finished"
            );

            summaries.push(summary);
            previous = Some(phase);
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SimConfig {
        let mut config = SimConfig::default();
        config.topology.num_nodes = 7;
        config.algorithm.num_iterations = 3;
        config.dataset.num_plans = 3;
        config.dataset.plan_size = 4;
        config.dataset.seed = 5;
        config.phases.count = 2;
        config
    }

    #[tokio::test]
    async fn test_runs_every_phase() {
        let experiment = Experiment::new(small_config()).unwrap();
        let summaries = experiment.run().await.unwrap();

        assert_eq!(summaries.len(), 2);
        for summary in &summaries {
            assert_eq!(summary.iterations, 3);
            assert!(summary.global_plan.is_some());
            assert_eq!(summary.work.len(), 3);
            assert_eq!(summary.measures.len(), 3);
        }
        // One global record per iteration and phase
        assert_eq!(experiment.recorder().global().len(), 6);
    }

    #[tokio::test]
    async fn test_local_and_task_modes_agree() {
        let mut local = small_config();
        local.runtime.mode = RuntimeMode::Local;
        let tasks = small_config();

        let local = Experiment::new(local).unwrap().run().await.unwrap();
        let tasks = Experiment::new(tasks).unwrap().run().await.unwrap();
        assert_eq!(local, tasks);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = small_config();
        config.topology.num_nodes = 0;
        assert!(Experiment::new(config).is_err());

        let mut config = small_config();
        config.dataset.std = -1.0;
        let err = Experiment::new(config).err().unwrap();
        assert!(err.to_string().contains("negative standard deviation"), "{}", err);
    }
}
