//! Plan - fixed-length numeric vector with an attached discomfort
//!
//! Plans are the common currency of the protocol. A node's menu holds
//! possible plans, subtrees sum their selections into aggregate plans,
//! candidate combinations are combinational plans and the root publishes
//! the global plan. All of them share this one structure; only their role
//! differs.
//!
//! Arithmetic between plans of different lengths is a programming error and
//! panics. Code that assembles plans from external input validates shapes
//! up front with [`Plan::check_same_shape`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Numeric vector over `num_states` states plus a scalar discomfort
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Plan {
    /// Value per state (e.g. energy use per time slot)
    values: Vec<f64>,
    /// Cost attached to choosing this plan
    discomfort: f64,
}

impl Plan {
    /// All-zero plan with `num_states` states
    pub fn zeros(num_states: usize) -> Self {
        Self {
            values: vec![0.0; num_states],
            discomfort: 0.0,
        }
    }

    /// Plan over the given values with zero discomfort
    pub fn from_values(values: Vec<f64>) -> Self {
        Self {
            values,
            discomfort: 0.0,
        }
    }

    /// Set discomfort (builder style)
    pub fn with_discomfort(mut self, discomfort: f64) -> Self {
        self.discomfort = discomfort;
        self
    }

    #[inline]
    pub fn num_states(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    pub fn value(&self, state: usize) -> f64 {
        self.values[state]
    }

    pub fn set_value(&mut self, state: usize, value: f64) {
        self.values[state] = value;
    }

    #[inline]
    pub fn discomfort(&self) -> f64 {
        self.discomfort
    }

    pub fn set_discomfort(&mut self, discomfort: f64) {
        self.discomfort = discomfort;
    }

    /// Verify `other` has the same number of states
    pub fn check_same_shape(&self, other: &Plan) -> Result<(), ConfigError> {
        if self.values.len() != other.values.len() {
            return Err(ConfigError::PlanLengthMismatch {
                expected: self.values.len(),
                actual: other.values.len(),
            });
        }
        Ok(())
    }

    #[inline]
    fn assert_same_shape(&self, other: &Plan) {
        assert_eq!(
            self.values.len(),
            other.values.len(),
            "plan length mismatch: {} vs {} states",
            self.values.len(),
            other.values.len()
        );
    }

    /// Elementwise `self += other`. Discomfort is left untouched.
    ///
    /// # Panics
    ///
    /// Panics if the plans differ in length.
    pub fn add(&mut self, other: &Plan) {
        self.assert_same_shape(other);
        for (v, o) in self.values.iter_mut().zip(&other.values) {
            *v += o;
        }
    }

    /// Elementwise `self -= other`. Discomfort is left untouched.
    ///
    /// # Panics
    ///
    /// Panics if the plans differ in length.
    pub fn subtract(&mut self, other: &Plan) {
        self.assert_same_shape(other);
        for (v, o) in self.values.iter_mut().zip(&other.values) {
            *v -= o;
        }
    }

    pub fn add_scalar(&mut self, value: f64) {
        for v in &mut self.values {
            *v += value;
        }
    }

    pub fn subtract_scalar(&mut self, value: f64) {
        self.add_scalar(-value);
    }

    pub fn multiply(&mut self, factor: f64) {
        for v in &mut self.values {
            *v *= factor;
        }
    }

    /// Copy values and discomfort of `other` into `self`.
    ///
    /// # Panics
    ///
    /// Panics if the plans differ in length.
    pub fn set(&mut self, other: &Plan) {
        self.assert_same_shape(other);
        self.values.copy_from_slice(&other.values);
        self.discomfort = other.discomfort;
    }

    /// Negate every state
    pub fn reverse(&mut self) {
        for v in &mut self.values {
            *v = -*v;
        }
    }

    /// # Panics
    ///
    /// Panics if the plans differ in length.
    pub fn dot(&self, other: &Plan) -> f64 {
        self.assert_same_shape(other);
        self.values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| a * b)
            .sum()
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Mean over all states; 0 for an empty plan
    pub fn avg(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.sum() / self.values.len() as f64
    }

    /// Population variance over all states
    pub fn variance(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let avg = self.avg();
        self.values.iter().map(|v| (v - avg) * (v - avg)).sum::<f64>() / self.values.len() as f64
    }

    /// Population standard deviation over all states
    pub fn std_deviation(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Root mean square error between two plans of equal length
    ///
    /// # Panics
    ///
    /// Panics if the plans differ in length.
    pub fn root_mean_square_error(&self, other: &Plan) -> f64 {
        self.assert_same_shape(other);
        if self.values.is_empty() {
            return 0.0;
        }
        let squared: f64 = self
            .values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        (squared / self.values.len() as f64).sqrt()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_population_statistics() {
        let plan = Plan::from_values(vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!(approx(plan.avg(), 5.0));
        assert!(approx(plan.variance(), 4.0));
        assert!(approx(plan.std_deviation(), 2.0));
    }

    #[test]
    fn test_zero_variance() {
        let plan = Plan::from_values(vec![3.0, 3.0, 3.0]);
        assert_eq!(plan.variance(), 0.0);
        assert_eq!(Plan::zeros(0).variance(), 0.0);
    }

    #[test]
    fn test_rmse() {
        let a = Plan::from_values(vec![1.0, 2.0, 3.0, 4.0]);
        let b = Plan::from_values(vec![2.0, 3.0, 4.0, 5.0]);
        assert!(approx(a.root_mean_square_error(&b), 1.0));
        assert_eq!(a.root_mean_square_error(&a), 0.0);
    }

    #[test]
    fn test_dot_and_reverse() {
        let mut a = Plan::from_values(vec![1.0, -2.0, 3.0]);
        let b = Plan::from_values(vec![4.0, 5.0, 6.0]);
        assert!(approx(a.dot(&b), 12.0));
        a.reverse();
        assert_eq!(a.values(), &[-1.0, 2.0, -3.0]);
    }

    #[test]
    fn test_set_copies_discomfort() {
        let source = Plan::from_values(vec![1.0, 2.0]).with_discomfort(0.5);
        let mut target = Plan::zeros(2);
        target.set(&source);
        assert_eq!(target, source);
    }

    #[test]
    fn test_scalar_ops() {
        let mut plan = Plan::from_values(vec![1.0, 2.0]);
        plan.multiply(3.0);
        plan.subtract_scalar(1.0);
        assert_eq!(plan.values(), &[2.0, 5.0]);
    }

    #[test]
    #[should_panic(expected = "plan length mismatch")]
    fn test_mismatched_add_panics() {
        let mut a = Plan::zeros(3);
        a.add(&Plan::zeros(2));
    }

    #[test]
    fn test_check_same_shape() {
        let err = Plan::zeros(3).check_same_shape(&Plan::zeros(4)).unwrap_err();
        assert_eq!(
            err,
            ConfigError::PlanLengthMismatch {
                expected: 3,
                actual: 4
            }
        );
    }

    #[test]
    fn test_display() {
        let plan = Plan::from_values(vec![1.0, 2.5]);
        assert_eq!(plan.to_string(), "[1,2.5]");
    }

    fn plan_pair() -> impl Strategy<Value = (Vec<f64>, Vec<f64>)> {
        (1usize..16).prop_flat_map(|n| {
            (
                prop::collection::vec(-1e6f64..1e6, n),
                prop::collection::vec(-1e6f64..1e6, n),
            )
        })
    }

    proptest! {
        #[test]
        fn prop_add_then_subtract_is_identity((a, b) in plan_pair()) {
            let original = Plan::from_values(a);
            let operand = Plan::from_values(b);
            let mut plan = original.clone();
            plan.add(&operand);
            plan.subtract(&operand);
            for (x, y) in plan.values().iter().zip(original.values()) {
                prop_assert!((x - y).abs() <= 1e-6 * (1.0 + y.abs()));
            }
        }

        #[test]
        fn prop_clone_is_independent((a, b) in plan_pair()) {
            let original = Plan::from_values(a);
            let snapshot = original.values().to_vec();
            let mut copy = original.clone();
            copy.add(&Plan::from_values(b));
            copy.multiply(2.0);
            copy.set_discomfort(9.0);
            prop_assert_eq!(original.values(), snapshot.as_slice());
            prop_assert_eq!(original.discomfort(), 0.0);
        }
    }
}
