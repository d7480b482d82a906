//! AgentPlans - per-iteration snapshot of a node's plans

use serde::{Deserialize, Serialize};

use super::plan::Plan;

/// Snapshot bundle owned by one node for one iteration.
///
/// Every field is optional: a freshly reset record (start of a phase) holds
/// nothing, while the `current` snapshot of an iteration is allocated with
/// zeroed plans by [`AgentPlans::zeroed`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentPlans {
    /// Tree-wide aggregate chosen by the root
    pub global_plan: Option<Plan>,
    /// Sum of selected plans across this node's subtree (excluding its own plan)
    pub aggregate_plan: Option<Plan>,
    /// This node's own selected menu entry
    pub selected_plan: Option<Plan>,
    /// Combination of children's plans chosen during Ascend
    pub selected_combinational_plan: Option<Plan>,
}

impl AgentPlans {
    /// Snapshot with all four plans allocated as zeros
    pub fn zeroed(num_states: usize) -> Self {
        Self {
            global_plan: Some(Plan::zeros(num_states)),
            aggregate_plan: Some(Plan::zeros(num_states)),
            selected_plan: Some(Plan::zeros(num_states)),
            selected_combinational_plan: Some(Plan::zeros(num_states)),
        }
    }

    /// Drop every plan
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.global_plan.is_none()
            && self.aggregate_plan.is_none()
            && self.selected_plan.is_none()
            && self.selected_combinational_plan.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_and_reset() {
        let mut plans = AgentPlans::zeroed(4);
        assert!(!plans.is_empty());
        assert_eq!(plans.global_plan.as_ref().map(Plan::num_states), Some(4));

        plans.reset();
        assert!(plans.is_empty());
    }

    #[test]
    fn test_clone_does_not_alias() {
        let current = AgentPlans::zeroed(2);
        let mut previous = current.clone();
        if let Some(plan) = previous.aggregate_plan.as_mut() {
            plan.add_scalar(1.0);
        }
        assert_eq!(current.aggregate_plan, Some(Plan::zeros(2)));
    }
}
