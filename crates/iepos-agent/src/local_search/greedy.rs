//! Greedy per-branch keep/discard search

use iepos_common::{NodeId, Plan, Result};
use tracing::debug;

use super::{sum_aggregates, LocalSearch};

/// Accepts a child's fresh aggregate only if it does not raise the variance
/// of the estimated global plan.
///
/// The search remembers the last accepted aggregate of every child. The
/// estimate starts at the previous global plan (every child at its accepted
/// state) and children are visited in canonical order, swapping in the
/// fresh aggregate whenever that keeps or lowers the variance. On the first
/// iteration of a phase there is no previous global plan and every child is
/// kept.
#[derive(Debug, Clone, Default)]
pub struct GreedyBranchSearch {
    accepted: Vec<Option<Plan>>,
    selected: Vec<bool>,
}

impl LocalSearch for GreedyBranchSearch {
    fn calc_aggregate(
        &mut self,
        node: NodeId,
        child_aggregates: &[Plan],
        previous_global: Option<&Plan>,
    ) -> Result<Plan> {
        let num_states = child_aggregates.first().map(Plan::num_states).unwrap_or(0);
        let fresh_sum = sum_aggregates(child_aggregates, num_states)?;

        if self.accepted.len() != child_aggregates.len() {
            self.accepted = vec![None; child_aggregates.len()];
        }

        let history_complete = self.accepted.iter().all(Option::is_some);
        let global = match previous_global {
            Some(global) if history_complete => global,
            _ => {
                self.selected = vec![true; child_aggregates.len()];
                self.accepted = child_aggregates.iter().cloned().map(Some).collect();
                return Ok(fresh_sum);
            }
        };
        global.check_same_shape(&fresh_sum)?;

        let mut estimate = global.clone();
        let mut selected = Vec::with_capacity(child_aggregates.len());
        for (accepted, fresh) in self.accepted.iter_mut().zip(child_aggregates) {
            let Some(previous) = accepted.as_ref() else {
                continue;
            };
            let mut candidate = estimate.clone();
            candidate.subtract(previous);
            candidate.add(fresh);

            let keep = candidate.variance() <= estimate.variance();
            if keep {
                estimate = candidate;
                *accepted = Some(fresh.clone());
            }
            selected.push(keep);
        }
        self.selected = selected;

        let discarded = self.selected.iter().filter(|keep| !**keep).count();
        debug!(node = %node, discarded, "Local search refined child aggregate");

        let accepted: Vec<Plan> = self.accepted.iter().flatten().cloned().collect();
        sum_aggregates(&accepted, num_states)
    }

    fn selected(&self) -> &[bool] {
        &self.selected
    }

    fn box_clone(&self) -> Box<dyn LocalSearch> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_iteration_keeps_all() {
        let mut search = GreedyBranchSearch::default();
        let aggregates = vec![Plan::from_values(vec![1.0, 0.0]), Plan::from_values(vec![0.0, 1.0])];

        let sum = search.calc_aggregate(NodeId(0), &aggregates, None).unwrap();
        assert_eq!(sum.values(), &[1.0, 1.0]);
        assert_eq!(search.selected(), &[true, true]);
    }

    #[test]
    fn test_discards_worsening_branch() {
        let mut search = GreedyBranchSearch::default();
        let first = vec![Plan::from_values(vec![1.0, 0.0]), Plan::from_values(vec![0.0, 1.0])];
        search.calc_aggregate(NodeId(0), &first, None).unwrap();

        // previous global is flat; child 0 now proposes a spike, child 1 stays flat-preserving
        let global = Plan::from_values(vec![2.0, 2.0]);
        let second = vec![Plan::from_values(vec![3.0, 0.0]), Plan::from_values(vec![0.0, 1.0])];
        let sum = search.calc_aggregate(NodeId(0), &second, Some(&global)).unwrap();

        assert_eq!(search.selected(), &[false, true]);
        assert_eq!(sum.values(), &[1.0, 1.0]);
    }

    #[test]
    fn test_keeps_improving_branch() {
        let mut search = GreedyBranchSearch::default();
        let first = vec![Plan::from_values(vec![3.0, 0.0])];
        search.calc_aggregate(NodeId(0), &first, None).unwrap();

        let global = Plan::from_values(vec![4.0, 1.0]);
        let second = vec![Plan::from_values(vec![1.0, 2.0])];
        let sum = search.calc_aggregate(NodeId(0), &second, Some(&global)).unwrap();

        assert_eq!(search.selected(), &[true]);
        assert_eq!(sum.values(), &[1.0, 2.0]);
    }
}
