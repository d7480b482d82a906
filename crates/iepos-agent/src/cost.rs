//! Cost functions for reporting
//!
//! Measures applied to finalized plans (global or local). They never take
//! part in selection.

use std::fmt;

use iepos_common::Plan;

pub trait CostFunction: Send + Sync + fmt::Debug {
    fn calc_cost(&self, plan: &Plan, cost_signal: &Plan) -> f64;

    /// Short metric name used in reports
    fn metric(&self) -> &'static str;
}

/// Dot product with the cost signal, optionally plus an iteration cost
#[derive(Debug, Clone, Default)]
pub struct DirectionCost {
    pub iteration_cost: Option<Plan>,
}

impl CostFunction for DirectionCost {
    fn calc_cost(&self, plan: &Plan, cost_signal: &Plan) -> f64 {
        let base = cost_signal.dot(plan);
        match &self.iteration_cost {
            Some(iteration_cost) => base + iteration_cost.dot(plan),
            None => base,
        }
    }

    fn metric(&self) -> &'static str {
        "cost"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StdDeviationCost;

impl CostFunction for StdDeviationCost {
    fn calc_cost(&self, plan: &Plan, _cost_signal: &Plan) -> f64 {
        plan.std_deviation()
    }

    fn metric(&self) -> &'static str {
        "std"
    }
}

/// RMS error against the cost signal
#[derive(Debug, Clone, Copy, Default)]
pub struct RmseCost;

impl CostFunction for RmseCost {
    fn calc_cost(&self, plan: &Plan, cost_signal: &Plan) -> f64 {
        plan.root_mean_square_error(cost_signal)
    }

    fn metric(&self) -> &'static str {
        "rmse"
    }
}

/// The plan's own discomfort; NaN counts as zero
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscomfortCost;

impl CostFunction for DiscomfortCost {
    fn calc_cost(&self, plan: &Plan, _cost_signal: &Plan) -> f64 {
        if plan.discomfort().is_nan() {
            0.0
        } else {
            plan.discomfort()
        }
    }

    fn metric(&self) -> &'static str {
        "discomfort"
    }
}

/// Default set of global measures
pub fn default_measures() -> Vec<Box<dyn CostFunction>> {
    vec![
        Box::new(StdDeviationCost),
        Box::new(DirectionCost::default()),
        Box::new(RmseCost),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_cost() {
        let plan = Plan::from_values(vec![1.0, 2.0]);
        let signal = Plan::from_values(vec![3.0, 4.0]);
        assert_eq!(DirectionCost::default().calc_cost(&plan, &signal), 11.0);

        let with_iteration = DirectionCost {
            iteration_cost: Some(Plan::from_values(vec![1.0, 1.0])),
        };
        assert_eq!(with_iteration.calc_cost(&plan, &signal), 14.0);
    }

    #[test]
    fn test_discomfort_nan_is_zero() {
        let signal = Plan::zeros(1);
        let plan = Plan::zeros(1).with_discomfort(f64::NAN);
        assert_eq!(DiscomfortCost.calc_cost(&plan, &signal), 0.0);
        let plan = Plan::zeros(1).with_discomfort(0.25);
        assert_eq!(DiscomfortCost.calc_cost(&plan, &signal), 0.25);
    }

    #[test]
    fn test_default_measure_names() {
        let names: Vec<_> = default_measures().iter().map(|m| m.metric()).collect();
        assert_eq!(names, vec!["std", "cost", "rmse"]);
    }
}
