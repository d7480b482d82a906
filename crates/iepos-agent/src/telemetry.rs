//! Measurement sink
//!
//! The protocol only writes measurements; it never reads them back.
//! Nodes report their selected plan after every Descend, the root reports
//! the global plan at Decide, and every node reports its cumulative work
//! counters once its iteration is complete.

use std::sync::Arc;

use iepos_common::{NodeId, Phase, Plan};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

/// A node's own decision in one iteration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalMeasurement {
    pub node: NodeId,
    pub phase: Phase,
    pub iteration: usize,
    /// Index into the node's menu
    pub selected_index: usize,
    pub menu_size: usize,
    pub discomfort: f64,
    pub selected_plan: Plan,
}

/// The root's decision in one iteration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalMeasurement {
    pub phase: Phase,
    pub iteration: usize,
    pub global_plan: Plan,
    pub num_states: usize,
    pub num_nodes: usize,
    /// Diagnostic score from the fitness function
    pub robustness: f64,
}

/// Worst-path cumulative work seen by a node
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WorkMeasurement {
    pub node: NodeId,
    pub phase: Phase,
    pub iteration: usize,
    pub cum_computations: u64,
    pub cum_transmitted: u64,
}

/// Receiver of protocol measurements
pub trait MeasurementSink: Send + Sync {
    fn record_local(&self, measurement: LocalMeasurement);

    fn record_global(&self, measurement: GlobalMeasurement);

    fn record_work(&self, measurement: WorkMeasurement);
}

/// Emits measurements as tracing events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl MeasurementSink for TracingSink {
    fn record_local(&self, m: LocalMeasurement) {
        debug!(
            node = %m.node,
            iteration = m.iteration,
            selected = m.selected_index,
            menu_size = m.menu_size,
            discomfort = m.discomfort,
            "Local plan selected"
        );
    }

    fn record_global(&self, m: GlobalMeasurement) {
        info!(
            phase = %m.phase,
            iteration = m.iteration,
            num_nodes = m.num_nodes,
            variance = m.global_plan.variance(),
            robustness = m.robustness,
            "Global plan selected"
        );
    }

    fn record_work(&self, m: WorkMeasurement) {
        debug!(
            node = %m.node,
            iteration = m.iteration,
            cum_computations = m.cum_computations,
            cum_transmitted = m.cum_transmitted,
            "Work counters"
        );
    }
}

/// Keeps every measurement in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    local: Mutex<Vec<LocalMeasurement>>,
    global: Mutex<Vec<GlobalMeasurement>>,
    work: Mutex<Vec<WorkMeasurement>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local(&self) -> Vec<LocalMeasurement> {
        self.local.lock().clone()
    }

    pub fn global(&self) -> Vec<GlobalMeasurement> {
        self.global.lock().clone()
    }

    pub fn work(&self) -> Vec<WorkMeasurement> {
        self.work.lock().clone()
    }

    /// Most recent global measurement
    pub fn latest_global(&self) -> Option<GlobalMeasurement> {
        self.global.lock().last().cloned()
    }

    /// Maximum cumulative computations reported for `iteration`
    pub fn max_computations(&self, iteration: usize) -> Option<u64> {
        self.work
            .lock()
            .iter()
            .filter(|w| w.iteration == iteration)
            .map(|w| w.cum_computations)
            .max()
    }

    pub fn clear(&self) {
        self.local.lock().clear();
        self.global.lock().clear();
        self.work.lock().clear();
    }
}

impl MeasurementSink for RecordingSink {
    fn record_local(&self, measurement: LocalMeasurement) {
        self.local.lock().push(measurement);
    }

    fn record_global(&self, measurement: GlobalMeasurement) {
        self.global.lock().push(measurement);
    }

    fn record_work(&self, measurement: WorkMeasurement) {
        self.work.lock().push(measurement);
    }
}

/// Forwards every measurement to each inner sink in order
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn MeasurementSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn MeasurementSink>>) -> Self {
        Self { sinks }
    }

    pub fn with(mut self, sink: Arc<dyn MeasurementSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl MeasurementSink for FanoutSink {
    fn record_local(&self, measurement: LocalMeasurement) {
        for sink in &self.sinks {
            sink.record_local(measurement.clone());
        }
    }

    fn record_global(&self, measurement: GlobalMeasurement) {
        for sink in &self.sinks {
            sink.record_global(measurement.clone());
        }
    }

    fn record_work(&self, measurement: WorkMeasurement) {
        for sink in &self.sinks {
            sink.record_work(measurement);
        }
    }
}
