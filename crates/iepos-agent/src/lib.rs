//! # IEPOS Agent
//!
//! Iterative tree aggregation and plan selection for the I-EPOS family.
//!
//! ## Iteration
//!
//! ```text
//! leaves -> Up(aggregate, menu, subtree size) -> ... -> root
//! root:   Decide(own menu against aggregate) -> global plan
//! root -> Down(global plan, selected index, discard) -> ... -> leaves
//! ```
//!
//! Every node picks the best combination of its children's own menus
//! against the children's aggregate; the parent's choice is what each node
//! adopts on the way down.
//!
//! ## Policies
//!
//! Fitness functions and local search are trait objects chosen at
//! construction and cloned per node (and per phase for fitness).

pub mod combinatorial;
pub mod cost;
pub mod dataset;
pub mod fitness;
pub mod history;
pub mod local_search;
pub mod protocol;
pub mod telemetry;

use iepos_common::{ConfigError, Result, DEFAULT_HISTORY_SIZE, DEFAULT_NUM_ITERATIONS};
use serde::{Deserialize, Serialize};

pub use combinatorial::{CombinatorialSpace, RampUp};
pub use dataset::{PlanSource, StaticPlans};
pub use fitness::{FitnessKind, IterativeFitnessFunction, PatternMatchFitness, VarianceFitness};
pub use history::HistoryStore;
pub use local_search::{GreedyBranchSearch, LocalSearch, LocalSearchKind};
pub use protocol::{
    exhaustive_nodes, iepos_nodes, ExhaustiveNode, IeposAgent, IterativeNode, LocalNetwork, PhaseReport,
    ProtocolNode, Topology,
};
pub use telemetry::{FanoutSink, MeasurementSink, RecordingSink, TracingSink};

/// Agent configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Iterations per phase
    pub num_iterations: usize,
    /// Archived phases kept per node
    pub history_size: usize,
    /// Ramp-up growth rate; `None` exposes every combination
    pub ramp_up_rate: Option<f64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            num_iterations: DEFAULT_NUM_ITERATIONS,
            history_size: DEFAULT_HISTORY_SIZE,
            ramp_up_rate: None,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_iterations == 0 {
            return Err(ConfigError::ZeroIterations.into());
        }
        if self.history_size == 0 {
            return Err(ConfigError::InvalidHistorySize.into());
        }
        self.ramp_up()?;
        Ok(())
    }

    pub fn ramp_up(&self) -> Result<Option<RampUp>> {
        self.ramp_up_rate.map(RampUp::new).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iepos_common::IeposError;

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert_eq!(config.num_iterations, 20);
        assert_eq!(config.history_size, 5);
        assert!(config.ramp_up().unwrap().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let zero = AgentConfig {
            num_iterations: 0,
            ..AgentConfig::default()
        };
        assert!(matches!(
            zero.validate(),
            Err(IeposError::Config(ConfigError::ZeroIterations))
        ));

        let negative_rate = AgentConfig {
            ramp_up_rate: Some(-1.0),
            ..AgentConfig::default()
        };
        assert!(negative_rate.validate().is_err());
    }

    #[test]
    fn test_config_from_json() {
        let config: AgentConfig = serde_json::from_str(r#"{"num_iterations": 3, "ramp_up_rate": 0.5}"#).unwrap();
        assert_eq!(config.num_iterations, 3);
        assert_eq!(config.history_size, 5);
        assert_eq!(config.ramp_up_rate, Some(0.5));
    }
}
