//! Per-phase summaries
//!
//! Folds a [`PhaseReport`] and the recorded work counters into what the
//! simulator prints: cost measures of the global plan, the summed
//! discomfort of the local choices and the per-iteration work profile.

use std::collections::BTreeMap;

use iepos_agent::cost::{CostFunction, DiscomfortCost};
use iepos_agent::telemetry::WorkMeasurement;
use iepos_agent::PhaseReport;
use iepos_common::{Phase, Plan};
use serde::Serialize;

/// One cost measure of the global plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measure {
    pub metric: &'static str,
    pub value: f64,
}

/// Work spread over the nodes in one iteration
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IterationWork {
    pub iteration: usize,
    pub avg_computations: f64,
    pub max_computations: u64,
    pub avg_transmitted: f64,
    pub max_transmitted: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseSummary {
    pub phase: Phase,
    pub iterations: usize,
    pub global_plan: Option<Plan>,
    pub measures: Vec<Measure>,
    /// Sum of the discomfort of every node's selected plan
    pub local_discomfort: f64,
    pub max_computations: u64,
    pub max_transmitted: u64,
    pub work: Vec<IterationWork>,
}

impl PhaseSummary {
    pub fn new(
        report: &PhaseReport,
        cost_signal: &Plan,
        measures: &[Box<dyn CostFunction>],
        work: &[WorkMeasurement],
    ) -> Self {
        let measures = match &report.global_plan {
            Some(global) => measures
                .iter()
                .map(|m| Measure {
                    metric: m.metric(),
                    value: m.calc_cost(global, cost_signal),
                })
                .collect(),
            None => Vec::new(),
        };

        let local_discomfort = report
            .nodes
            .iter()
            .filter_map(|n| n.selected_plan.as_ref())
            .map(|plan| DiscomfortCost.calc_cost(plan, cost_signal))
            .sum();

        Self {
            phase: report.phase,
            iterations: report.iterations,
            global_plan: report.global_plan.clone(),
            measures,
            local_discomfort,
            max_computations: report.max_computations(),
            max_transmitted: report.max_transmitted(),
            work: iteration_work(work, report.phase),
        }
    }

    pub fn measure(&self, metric: &str) -> Option<f64> {
        self.measures.iter().find(|m| m.metric == metric).map(|m| m.value)
    }
}

/// Average and maximum cumulative work per iteration of `phase`
pub fn iteration_work(measurements: &[WorkMeasurement], phase: Phase) -> Vec<IterationWork> {
    let mut by_iteration: BTreeMap<usize, Vec<&WorkMeasurement>> = BTreeMap::new();
    for m in measurements.iter().filter(|m| m.phase == phase) {
        by_iteration.entry(m.iteration).or_default().push(m);
    }

    by_iteration
        .into_iter()
        .map(|(iteration, ms)| {
            let n = ms.len() as f64;
            IterationWork {
                iteration,
                avg_computations: ms.iter().map(|m| m.cum_computations as f64).sum::<f64>() / n,
                max_computations: ms.iter().map(|m| m.cum_computations).max().unwrap_or(0),
                avg_transmitted: ms.iter().map(|m| m.cum_transmitted as f64).sum::<f64>() / n,
                max_transmitted: ms.iter().map(|m| m.cum_transmitted).max().unwrap_or(0),
            }
        })
        .collect()
}
