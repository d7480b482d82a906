//! Plan combinators
//!
//! Fold a freshly finalized plan into an iteration-carried one. Fitness
//! functions keep one combinator per [`AgentPlans`] field and use them in
//! `update_previous`.

use std::fmt;

use iepos_common::{AgentPlans, Plan};

/// Strategy for merging `other` into the carried `target`
pub trait PlanCombinator: Send + Sync + fmt::Debug {
    fn combine(&self, target: Option<Plan>, other: &Plan, iteration: usize) -> Option<Plan>;

    fn box_clone(&self) -> Box<dyn PlanCombinator>;
}

impl Clone for Box<dyn PlanCombinator> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Keep only the latest plan
#[derive(Debug, Clone, Copy, Default)]
pub struct MostRecentCombinator;

impl PlanCombinator for MostRecentCombinator {
    fn combine(&self, _target: Option<Plan>, other: &Plan, _iteration: usize) -> Option<Plan> {
        Some(other.clone())
    }

    fn box_clone(&self) -> Box<dyn PlanCombinator> {
        Box::new(*self)
    }
}

/// Running elementwise sum
#[derive(Debug, Clone, Copy, Default)]
pub struct SumCombinator;

impl PlanCombinator for SumCombinator {
    fn combine(&self, target: Option<Plan>, other: &Plan, _iteration: usize) -> Option<Plan> {
        match target {
            None => Some(other.clone()),
            Some(mut target) => {
                target.add(other);
                Some(target)
            }
        }
    }

    fn box_clone(&self) -> Box<dyn PlanCombinator> {
        Box::new(*self)
    }
}

/// Running mean over iterations (`iteration` is zero-based)
#[derive(Debug, Clone, Copy, Default)]
pub struct AverageCombinator;

impl PlanCombinator for AverageCombinator {
    fn combine(&self, target: Option<Plan>, other: &Plan, iteration: usize) -> Option<Plan> {
        match target {
            None => Some(other.clone()),
            Some(mut target) => {
                let n = iteration as f64;
                target.multiply(n / (n + 1.0));
                let mut weighted = other.clone();
                weighted.multiply(1.0 / (n + 1.0));
                target.add(&weighted);
                Some(target)
            }
        }
    }

    fn box_clone(&self) -> Box<dyn PlanCombinator> {
        Box::new(*self)
    }
}

/// Leave the carried plan untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCombinator;

impl PlanCombinator for NoOpCombinator {
    fn combine(&self, target: Option<Plan>, _other: &Plan, _iteration: usize) -> Option<Plan> {
        target
    }

    fn box_clone(&self) -> Box<dyn PlanCombinator> {
        Box::new(*self)
    }
}

/// One combinator per [`AgentPlans`] field
#[derive(Debug, Clone)]
pub struct SnapshotCombinators {
    pub global: Box<dyn PlanCombinator>,
    pub aggregate: Box<dyn PlanCombinator>,
    pub selected: Box<dyn PlanCombinator>,
    pub selected_combinational: Box<dyn PlanCombinator>,
}

impl SnapshotCombinators {
    pub fn new(
        global: Box<dyn PlanCombinator>,
        aggregate: Box<dyn PlanCombinator>,
        selected: Box<dyn PlanCombinator>,
        selected_combinational: Box<dyn PlanCombinator>,
    ) -> Self {
        Self {
            global,
            aggregate,
            selected,
            selected_combinational,
        }
    }

    pub fn most_recent() -> Self {
        Self::new(
            Box::new(MostRecentCombinator),
            Box::new(MostRecentCombinator),
            Box::new(MostRecentCombinator),
            Box::new(MostRecentCombinator),
        )
    }

    /// Fold every populated field of `current` into `target`
    pub fn fold(&self, target: &mut AgentPlans, current: &AgentPlans, iteration: usize) {
        fold_field(&*self.global, &mut target.global_plan, current.global_plan.as_ref(), iteration);
        fold_field(&*self.aggregate, &mut target.aggregate_plan, current.aggregate_plan.as_ref(), iteration);
        fold_field(&*self.selected, &mut target.selected_plan, current.selected_plan.as_ref(), iteration);
        fold_field(
            &*self.selected_combinational,
            &mut target.selected_combinational_plan,
            current.selected_combinational_plan.as_ref(),
            iteration,
        );
    }
}

impl Default for SnapshotCombinators {
    fn default() -> Self {
        Self::most_recent()
    }
}

fn fold_field(combinator: &dyn PlanCombinator, target: &mut Option<Plan>, other: Option<&Plan>, iteration: usize) {
    if let Some(other) = other {
        *target = combinator.combine(target.take(), other, iteration);
    }
}
