//! Fitness functions: pluggable selection among candidate combinations
//!
//! A fitness function is cloned fresh from a prototype at the start of
//! every phase. It scores candidates during Ascend/Decide and folds each
//! finalized snapshot into iteration-carried state during Descend. The
//! protocol never special-cases a concrete policy.

pub mod combinator;
pub mod pattern;
pub mod variance;

use std::fmt;

use iepos_common::{AgentPlans, NodeId, Plan};
use serde::{Deserialize, Serialize};

pub use self::combinator::{
    AverageCombinator, MostRecentCombinator, NoOpCombinator, PlanCombinator, SnapshotCombinators,
    SumCombinator,
};
pub use self::pattern::PatternMatchFitness;
pub use self::variance::VarianceFitness;

/// Everything a node knows when it asks for a selection
#[derive(Debug, Clone, Copy)]
pub struct SelectionContext<'a> {
    /// Node performing the selection
    pub node: NodeId,
    /// Cost or pattern signal of the experiment
    pub cost_signal: &'a Plan,
    /// Iteration-carried record; `None` for the root's own decision
    pub previous: Option<&'a AgentPlans>,
    /// Total tree size, once learned from a down message
    pub num_nodes: Option<usize>,
    /// Nodes in this node's subtree counted so far
    pub num_nodes_subtree: usize,
    /// Depth of the node (root = 0)
    pub layer: usize,
    /// Average branching factor estimate
    pub avg_num_children: f64,
    /// Zero-based iteration within the phase
    pub iteration: usize,
}

/// Selection policy contract
pub trait IterativeFitnessFunction: Send + Sync + fmt::Debug {
    /// Index of the preferred candidate, `None` when `candidates` is empty
    fn select(&self, ctx: &SelectionContext<'_>, aggregate: &Plan, candidates: &[Plan]) -> Option<usize>;

    /// Fold the finalized `current` snapshot into iteration-carried state
    fn update_previous(
        &mut self,
        previous: Option<&mut AgentPlans>,
        current: &AgentPlans,
        cost_signal: &Plan,
        iteration: usize,
    );

    /// Diagnostic score of a finalized plan; never used for control flow
    fn robustness(&self, plan: &Plan, cost_signal: &Plan, historic: Option<&AgentPlans>) -> f64;

    fn box_clone(&self) -> Box<dyn IterativeFitnessFunction>;

    fn name(&self) -> &'static str;
}

impl Clone for Box<dyn IterativeFitnessFunction> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Candidate-independent part of the tree-wide aggregate a selection is
/// scored against.
///
/// Once a previous global plan exists the rest of the tree is known at its
/// last state: `previous.global - previous.aggregate` is everything outside
/// the subtree, to which the fresh child aggregate is added.
pub fn background_aggregate(previous: Option<&AgentPlans>, aggregate: &Plan) -> Plan {
    match previous {
        Some(AgentPlans {
            global_plan: Some(global),
            aggregate_plan: Some(prev_aggregate),
            ..
        }) => {
            let mut background = global.clone();
            background.subtract(prev_aggregate);
            background.add(aggregate);
            background
        }
        _ => aggregate.clone(),
    }
}

/// Configurable choice of built-in fitness functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitnessKind {
    /// Minimize variance of the global plan
    #[default]
    Variance,
    /// Match the (inverted, rescaled) cost signal
    Pattern,
}

impl FitnessKind {
    pub fn build(&self) -> Box<dyn IterativeFitnessFunction> {
        match self {
            FitnessKind::Variance => Box::new(VarianceFitness::default()),
            FitnessKind::Pattern => Box::new(PatternMatchFitness::default()),
        }
    }
}
