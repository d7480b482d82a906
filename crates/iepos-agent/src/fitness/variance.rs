//! Variance minimization
//!
//! Variance rather than standard deviation keeps the objective convex in
//! the aggregate, which the greedy per-node choice relies on.

use iepos_common::{AgentPlans, Plan};
use ordered_float::OrderedFloat;

use super::{background_aggregate, IterativeFitnessFunction, SelectionContext, SnapshotCombinators};

/// Picks the candidate whose resulting total has minimal population variance.
///
/// Ties resolve to the first minimal index.
#[derive(Debug, Clone, Default)]
pub struct VarianceFitness {
    combinators: SnapshotCombinators,
}

impl VarianceFitness {
    pub fn with_combinators(combinators: SnapshotCombinators) -> Self {
        Self { combinators }
    }
}

impl IterativeFitnessFunction for VarianceFitness {
    fn select(&self, ctx: &SelectionContext<'_>, aggregate: &Plan, candidates: &[Plan]) -> Option<usize> {
        let background = background_aggregate(ctx.previous, aggregate);

        candidates
            .iter()
            .enumerate()
            .min_by_key(|(_, candidate)| {
                let mut total = background.clone();
                total.add(candidate);
                OrderedFloat(total.variance())
            })
            .map(|(i, _)| i)
    }

    fn update_previous(
        &mut self,
        previous: Option<&mut AgentPlans>,
        current: &AgentPlans,
        _cost_signal: &Plan,
        iteration: usize,
    ) {
        if let Some(previous) = previous {
            self.combinators.fold(previous, current, iteration);
        }
    }

    fn robustness(&self, plan: &Plan, _cost_signal: &Plan, _historic: Option<&AgentPlans>) -> f64 {
        plan.std_deviation()
    }

    fn box_clone(&self) -> Box<dyn IterativeFitnessFunction> {
        Box::new(self.clone())
    }

    fn name(&self) -> &'static str {
        "variance"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iepos_common::NodeId;

    fn ctx(signal: &Plan) -> SelectionContext<'_> {
        SelectionContext {
            node: NodeId(0),
            cost_signal: signal,
            previous: None,
            num_nodes: None,
            num_nodes_subtree: 1,
            layer: 0,
            avg_num_children: 0.0,
            iteration: 0,
        }
    }

    #[test]
    fn test_selects_minimal_variance() {
        let signal = Plan::zeros(3);
        let aggregate = Plan::from_values(vec![5.0, 0.0, 5.0]);
        let candidates = vec![
            Plan::from_values(vec![5.0, 0.0, 5.0]),
            Plan::from_values(vec![0.0, 5.0, 0.0]),
            Plan::from_values(vec![0.0, 3.0, 0.0]),
        ];

        let selected = VarianceFitness::default().select(&ctx(&signal), &aggregate, &candidates);
        assert_eq!(selected, Some(1));
    }

    #[test]
    fn test_tie_resolves_to_first() {
        let signal = Plan::zeros(2);
        let aggregate = Plan::zeros(2);
        let candidates = vec![
            Plan::from_values(vec![3.0, 1.0]),
            Plan::from_values(vec![1.0, 1.0]),
            Plan::from_values(vec![2.0, 2.0]),
        ];

        let selected = VarianceFitness::default().select(&ctx(&signal), &aggregate, &candidates);
        assert_eq!(selected, Some(1));
    }

    #[test]
    fn test_empty_candidates() {
        let signal = Plan::zeros(2);
        let selected = VarianceFitness::default().select(&ctx(&signal), &Plan::zeros(2), &[]);
        assert_eq!(selected, None);
    }

    #[test]
    fn test_update_previous_keeps_latest() {
        let mut fitness = VarianceFitness::default();
        let mut previous = AgentPlans::default();
        let mut current = AgentPlans::zeroed(2);
        current.global_plan = Some(Plan::from_values(vec![1.0, 3.0]));

        fitness.update_previous(Some(&mut previous), &current, &Plan::zeros(2), 0);
        assert_eq!(previous.global_plan, current.global_plan);

        let robustness = fitness.robustness(&Plan::from_values(vec![1.0, 3.0]), &Plan::zeros(2), None);
        assert!((robustness - 1.0).abs() < 1e-12);
    }
}
