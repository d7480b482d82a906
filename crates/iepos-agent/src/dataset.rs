//! Plan menu sources
//!
//! A source supplies each node's ordered menu once per phase, before the
//! first Ascend. The menu is immutable for the rest of the phase.

use std::collections::HashMap;

use iepos_common::{IeposError, NodeId, Phase, Plan, Result};

pub trait PlanSource: Send + Sync {
    /// Ordered candidate plans of `node` for `phase`
    fn plans(&self, node: NodeId, phase: Phase) -> Result<Vec<Plan>>;

    /// Number of states of every plan this source produces
    fn plan_size(&self) -> usize;
}

/// Check that every plan of a menu has `plan_size` states
pub fn validate_menu(plans: &[Plan], plan_size: usize) -> Result<()> {
    let reference = Plan::zeros(plan_size);
    for plan in plans {
        reference.check_same_shape(plan)?;
    }
    Ok(())
}

/// Fixed, phase-independent menus held in memory
#[derive(Debug, Clone, Default)]
pub struct StaticPlans {
    plan_size: usize,
    menus: HashMap<NodeId, Vec<Plan>>,
}

impl StaticPlans {
    pub fn new(plan_size: usize) -> Self {
        Self {
            plan_size,
            menus: HashMap::new(),
        }
    }

    /// Set the menu of `node` (builder style)
    pub fn with_menu(mut self, node: NodeId, plans: Vec<Plan>) -> Self {
        self.menus.insert(node, plans);
        self
    }

    pub fn set_menu(&mut self, node: NodeId, plans: Vec<Plan>) {
        self.menus.insert(node, plans);
    }
}

impl PlanSource for StaticPlans {
    fn plans(&self, node: NodeId, _phase: Phase) -> Result<Vec<Plan>> {
        let plans = self
            .menus
            .get(&node)
            .cloned()
            .ok_or_else(|| IeposError::Dataset(format!("no menu for {}", node)))?;
        validate_menu(&plans, self.plan_size)?;
        Ok(plans)
    }

    fn plan_size(&self) -> usize {
        self.plan_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_static_plans() {
        let source = StaticPlans::new(2).with_menu(NodeId(0), vec![Plan::zeros(2), Plan::zeros(2)]);
        assert_eq!(source.plans(NodeId(0), Utc::now()).unwrap().len(), 2);
        assert!(matches!(
            source.plans(NodeId(1), Utc::now()),
            Err(IeposError::Dataset(_))
        ));
    }

    #[test]
    fn test_rejects_wrong_plan_size() {
        let source = StaticPlans::new(2).with_menu(NodeId(0), vec![Plan::zeros(3)]);
        assert!(matches!(source.plans(NodeId(0), Utc::now()), Err(IeposError::Config(_))));
    }
}
