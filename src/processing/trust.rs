//! Outlier gating and graduated trust for absolute fixes

use nalgebra::Vector2;

use crate::core::constants::TRUST_BANDS;
use crate::processing::estimator::{EstimatorState, Observation};
use crate::utils::config::{GatingConfig, TrustStrategy};

/// Covariance multiplier for a squared Mahalanobis distance
pub fn trust_scale(mahalanobis_squared: f64) -> f64 {
    TRUST_BANDS
        .iter()
        .find(|(threshold, _)| mahalanobis_squared > *threshold)
        .map(|(_, scale)| *scale)
        .unwrap_or(1.0)
}

/// Inflate an observation's covariance according to how far it sits from the estimate
pub fn scale_for_trust(state: &EstimatorState, observation: &Observation) -> (Observation, f64) {
    let scale = state
        .mahalanobis_squared(observation)
        .map(trust_scale)
        .unwrap_or(1.0);
    (observation.scaled(scale), scale)
}

#[derive(Debug, Clone)]
pub struct OutlierGate {
    threshold_m: f64,
    strategy: TrustStrategy,
}

impl OutlierGate {
    pub fn new(config: &GatingConfig) -> Self {
        Self {
            threshold_m: config.outlier_distance_m,
            strategy: config.trust_strategy,
        }
    }

    pub fn threshold_m(&self) -> f64 {
        self.threshold_m
    }

    pub fn strategy(&self) -> TrustStrategy {
        self.strategy
    }

    /// True when the fix is farther from the fused position than the threshold
    pub fn is_outlier(&self, fused: &Vector2<f64>, fix: &Vector2<f64>) -> bool {
        (fix - fused).norm() > self.threshold_m
    }

    /// Observation to fuse for a fix that passed the gate, with the scale applied
    pub fn weigh(&self, state: &EstimatorState, observation: &Observation) -> (Observation, f64) {
        match self.strategy {
            TrustStrategy::HardGate => (*observation, 1.0),
            TrustStrategy::Graduated => scale_for_trust(state, observation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Matrix2;

    fn state() -> EstimatorState {
        EstimatorState {
            position: Vector2::zeros(),
            covariance: Matrix2::identity(),
        }
    }

    #[test]
    fn test_trust_bands() {
        assert_eq!(trust_scale(0.0), 1.0);
        assert_eq!(trust_scale(5.0), 1.0);
        assert_eq!(trust_scale(5.1), 2.0);
        assert_eq!(trust_scale(9.3), 5.0);
        assert_eq!(trust_scale(12.5), 10.0);
    }

    #[test]
    fn test_gate_distance() {
        let gate = OutlierGate::new(&GatingConfig::default());
        let fused = Vector2::new(2.0, 0.0);
        assert!(!gate.is_outlier(&fused, &Vector2::new(3.0, 0.0)));
        assert!(!gate.is_outlier(&fused, &Vector2::new(17.0, 0.0)));
        assert!(gate.is_outlier(&fused, &Vector2::new(52.0, 0.0)));
    }

    #[test]
    fn test_graduated_scaling() {
        let gate = OutlierGate::new(&GatingConfig::default());
        // S = 2I, y = (4, 0): d² = 8 -> x2
        let obs = Observation::new(Vector2::new(4.0, 0.0), Matrix2::identity());
        let (weighted, scale) = gate.weigh(&state(), &obs);
        assert_eq!(scale, 2.0);
        assert_eq!(weighted.covariance, Matrix2::identity() * 2.0);
        assert_eq!(weighted.position, obs.position);
    }

    #[test]
    fn test_hard_gate_does_not_scale() {
        let gate = OutlierGate::new(&GatingConfig {
            trust_strategy: TrustStrategy::HardGate,
            ..GatingConfig::default()
        });
        let obs = Observation::new(Vector2::new(6.0, 0.0), Matrix2::identity());
        let (weighted, scale) = gate.weigh(&state(), &obs);
        assert_eq!(scale, 1.0);
        assert_eq!(weighted, obs);
    }
}
