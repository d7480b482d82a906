//! Ramp-up sampling
//!
//! Bounds per-node combinatorial work by exposing only a prefix of the
//! enumerated combinations to the fitness function:
//!
//! ```text
//! count = floor(iteration * rate + 2 + U),  U in [-1, 1)
//! ```
//!
//! `U` comes from a generator seeded with the node's index at every call,
//! so a node draws the same `U` in every iteration and the exposed count
//! grows linearly with the iteration number.

use iepos_common::{ConfigError, NodeId, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampUp {
    rate: f64,
}

impl RampUp {
    /// Rates must be finite and non-negative
    pub fn new(rate: f64) -> Result<Self> {
        if !rate.is_finite() || rate < 0.0 {
            return Err(ConfigError::InvalidRampUpRate(rate).into());
        }
        Ok(Self { rate })
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Candidate count for `node` at `iteration`, clamped to `limit`
    pub fn candidate_count(&self, node: NodeId, iteration: usize, limit: usize) -> Result<usize> {
        let mut rng = StdRng::seed_from_u64(node.0 as u64);
        self.candidate_count_with(&mut rng, iteration, limit)
    }

    /// Same as [`RampUp::candidate_count`] with an injected random source
    pub fn candidate_count_with<R: Rng + ?Sized>(&self, rng: &mut R, iteration: usize, limit: usize) -> Result<usize> {
        let jitter = rng.gen::<f64>() * 2.0 - 1.0;
        let count = (iteration as f64 * self.rate + 2.0 + jitter).floor() as i64;
        if count <= 0 {
            return Err(ConfigError::NonPositiveCandidateCount { count }.into());
        }
        Ok((count as usize).min(limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn test_rejects_invalid_rates() {
        assert!(RampUp::new(-0.5).is_err());
        assert!(RampUp::new(f64::NAN).is_err());
        assert!(RampUp::new(0.0).is_ok());
    }

    #[test]
    fn test_never_exceeds_limit() {
        let ramp = RampUp::new(10.0).unwrap();
        for node in 0..20 {
            for iteration in 0..50 {
                let count = ramp.candidate_count(NodeId(node), iteration, 7).unwrap();
                assert!(count >= 1 && count <= 7);
            }
        }
    }

    #[test]
    fn test_monotonic_in_iteration() {
        let ramp = RampUp::new(0.7).unwrap();
        for node in 0..20 {
            let counts: Vec<usize> = (0..40)
                .map(|it| ramp.candidate_count(NodeId(node), it, usize::MAX).unwrap())
                .collect();
            assert!(counts.windows(2).all(|w| w[0] <= w[1]), "node {node}: {counts:?}");
        }
    }

    #[test]
    fn test_deterministic_per_node() {
        let ramp = RampUp::new(1.5).unwrap();
        let first = ramp.candidate_count(NodeId(3), 4, 100).unwrap();
        let second = ramp.candidate_count(NodeId(3), 4, 100).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_injected_source() {
        // StepRng(0, 0) always yields 0.0, so U = -1
        let ramp = RampUp::new(2.0).unwrap();
        let mut rng = StepRng::new(0, 0);
        assert_eq!(ramp.candidate_count_with(&mut rng, 0, 10).unwrap(), 1);
        assert_eq!(ramp.candidate_count_with(&mut rng, 3, 10).unwrap(), 7);
    }

    #[test]
    fn test_zero_limit_clamps() {
        let ramp = RampUp::new(1.0).unwrap();
        assert_eq!(ramp.candidate_count(NodeId(0), 5, 0).unwrap(), 0);
    }
}
