//! Local search: optional refinement of the children's aggregate
//!
//! Without a local search the child aggregate is the plain sum of the
//! children's aggregates and no child is ever told to discard. With one,
//! the search produces the refined aggregate and a keep/discard mask over
//! the children (in canonical child order). A `false` entry makes the
//! parent send `discard = true` to that child, which then reuses its
//! previous iteration's decision for its whole subtree.

pub mod greedy;

use std::fmt;

use iepos_common::{NodeId, Plan, Result};
use serde::{Deserialize, Serialize};

pub use self::greedy::GreedyBranchSearch;

/// Local search contract
pub trait LocalSearch: Send + Sync + fmt::Debug {
    /// Refined aggregate of the children; updates the mask returned by
    /// [`LocalSearch::selected`]
    fn calc_aggregate(
        &mut self,
        node: NodeId,
        child_aggregates: &[Plan],
        previous_global: Option<&Plan>,
    ) -> Result<Plan>;

    /// Keep (`true`) or discard (`false`) per child, sized to the children
    fn selected(&self) -> &[bool];

    fn box_clone(&self) -> Box<dyn LocalSearch>;
}

impl Clone for Box<dyn LocalSearch> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Sum of child aggregates, validating shapes
pub fn sum_aggregates(child_aggregates: &[Plan], num_states: usize) -> Result<Plan> {
    let mut sum = Plan::zeros(num_states);
    for aggregate in child_aggregates {
        sum.check_same_shape(aggregate)?;
        sum.add(aggregate);
    }
    Ok(sum)
}

/// Configurable choice of built-in local searches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalSearchKind {
    #[default]
    None,
    Greedy,
}

impl LocalSearchKind {
    pub fn build(&self) -> Option<Box<dyn LocalSearch>> {
        match self {
            LocalSearchKind::None => None,
            LocalSearchKind::Greedy => Some(Box::new(GreedyBranchSearch::default())),
        }
    }
}
