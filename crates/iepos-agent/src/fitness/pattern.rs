//! Pattern matching against the cost signal
//!
//! The pattern is inverted, mean-centered and rescaled to the standard
//! deviation and mean of each candidate total before the RMS error is
//! taken, so only the shape of the signal matters, not its magnitude or
//! sign.

use iepos_common::{AgentPlans, Plan};
use ordered_float::OrderedFloat;

use super::{background_aggregate, IterativeFitnessFunction, SelectionContext, SnapshotCombinators};

#[derive(Debug, Clone, Default)]
pub struct PatternMatchFitness {
    combinators: SnapshotCombinators,
}

impl PatternMatchFitness {
    pub fn with_combinators(combinators: SnapshotCombinators) -> Self {
        Self { combinators }
    }

    /// Pattern normalized to the moments of `total`.
    ///
    /// A flat pattern has no shape to rescale and collapses to the mean of
    /// `total`.
    pub fn normalized_pattern(pattern: &Plan, total: &Plan) -> Plan {
        let mut normalized = pattern.clone();
        normalized.reverse();
        normalized.subtract_scalar(normalized.avg());

        let pattern_std = normalized.std_deviation();
        let scale = if pattern_std > 0.0 {
            total.std_deviation() / pattern_std
        } else {
            0.0
        };
        normalized.multiply(scale);
        normalized.add_scalar(total.avg());
        normalized
    }

    fn score(pattern: &Plan, total: &Plan) -> f64 {
        Self::normalized_pattern(pattern, total).root_mean_square_error(total)
    }
}

impl IterativeFitnessFunction for PatternMatchFitness {
    fn select(&self, ctx: &SelectionContext<'_>, aggregate: &Plan, candidates: &[Plan]) -> Option<usize> {
        let background = background_aggregate(ctx.previous, aggregate);

        candidates
            .iter()
            .enumerate()
            .min_by_key(|(_, candidate)| {
                let mut total = background.clone();
                total.add(candidate);
                OrderedFloat(Self::score(ctx.cost_signal, &total))
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

    fn robustness(&self, plan: &Plan, cost_signal: &Plan, _historic: Option<&AgentPlans>) -> f64 {
        plan.root_mean_square_error(cost_signal)
    }

    fn box_clone(&self) -> Box<dyn IterativeFitnessFunction> {
        Box::new(self.clone())
    }

    fn name(&self) -> &'static str {
        "pattern"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iepos_common::NodeId;

    #[test]
    fn test_normalized_pattern_moments() {
        let pattern = Plan::from_values(vec![1.0, 2.0, 3.0, 4.0]);
        let total = Plan::from_values(vec![10.0, 30.0, 10.0, 30.0]);
        let normalized = PatternMatchFitness::normalized_pattern(&pattern, &total);

        assert!((normalized.avg() - total.avg()).abs() < 1e-9);
        assert!((normalized.std_deviation() - total.std_deviation()).abs() < 1e-9);
        // inverted: the largest pattern value becomes the smallest
        assert!(normalized.value(3) < normalized.value(0));
    }

    #[test]
    fn test_flat_pattern_collapses_to_mean() {
        let pattern = Plan::from_values(vec![2.0, 2.0, 2.0]);
        let total = Plan::from_values(vec![1.0, 2.0, 6.0]);
        let normalized = PatternMatchFitness::normalized_pattern(&pattern, &total);
        assert!(normalized.values().iter().all(|v| (v - 3.0).abs() < 1e-12));
    }

    #[test]
    fn test_selects_inverse_shape() {
        // high cost early, low cost late: consumption should shift late
        let signal = Plan::from_values(vec![4.0, 3.0, 2.0, 1.0]);
        let aggregate = Plan::zeros(4);
        let candidates = vec![
            Plan::from_values(vec![4.0, 3.0, 2.0, 1.0]),
            Plan::from_values(vec![1.0, 2.0, 3.0, 4.0]),
        ];
        let ctx = SelectionContext {
            node: NodeId(1),
            cost_signal: &signal,
            previous: None,
            num_nodes: Some(2),
            num_nodes_subtree: 1,
            layer: 1,
            avg_num_children: 1.0,
            iteration: 0,
        };

        let selected = PatternMatchFitness::default().select(&ctx, &aggregate, &candidates);
        assert_eq!(selected, Some(1));
    }
}
