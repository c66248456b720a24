//! Common interface for planar position estimators
//!
//! The session drives every estimator through [`PositionEstimator`]; the
//! concrete filter is chosen from configuration at session start.

use nalgebra::{Matrix2, Vector2};

use crate::processing::batch::BatchWindowEstimator;
use crate::processing::kalman::PositionKalmanFilter;
use crate::processing::particle::ParticleEstimator;
use crate::utils::config::{EstimatorConfig, EstimatorKind};
use crate::validation::error::FusionResult;

/// Planar position observation with its noise covariance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub position: Vector2<f64>,
    pub covariance: Matrix2<f64>,
}

impl Observation {
    pub fn new(position: Vector2<f64>, covariance: Matrix2<f64>) -> Self {
        Self { position, covariance }
    }

    /// Same observation with its covariance multiplied by `factor`
    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(self.position, self.covariance * factor)
    }
}

/// Estimated position and covariance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorState {
    pub position: Vector2<f64>,
    pub covariance: Matrix2<f64>,
}

impl EstimatorState {
    /// Distance RMS: sqrt(P00 + P11)
    pub fn accuracy(&self) -> f64 {
        (self.covariance[(0, 0)] + self.covariance[(1, 1)]).max(0.0).sqrt()
    }

    /// Squared Mahalanobis distance of an observation's innovation; None when S is singular
    pub fn mahalanobis_squared(&self, observation: &Observation) -> Option<f64> {
        let innovation = observation.position - self.position;
        let s = self.covariance + observation.covariance;
        let s_inv = s.try_inverse()?;
        Some((innovation.transpose() * s_inv * innovation)[(0, 0)])
    }
}

/// Recursive planar position estimator
pub trait PositionEstimator: Send {
    fn kind(&self) -> EstimatorKind;

    /// Propagate by a dead-reckoning displacement (meters)
    fn predict(&mut self, displacement: &Vector2<f64>);

    /// Correct with one absolute observation. On error the prior state is kept.
    fn update(&mut self, observation: &Observation) -> FusionResult<()>;

    /// Correct with two simultaneous observations in one step
    fn update_joint(&mut self, first: &Observation, second: &Observation) -> FusionResult<()>;

    fn state(&self) -> EstimatorState;

    /// Discard history and restart at `position` with `covariance`
    fn reset(&mut self, position: &Vector2<f64>, covariance: &Matrix2<f64>);
}

/// Build the configured estimator starting at `position`
pub fn build_estimator(config: &EstimatorConfig, position: &Vector2<f64>) -> Box<dyn PositionEstimator> {
    let initial = Matrix2::from_diagonal_element(config.initial_variance);
    let process = Matrix2::from_diagonal_element(config.process_variance);
    match config.kind {
        EstimatorKind::Kalman => Box::new(
            PositionKalmanFilter::new(position, &initial, &process)
                .with_symmetrization(config.symmetrize_covariance),
        ),
        EstimatorKind::BatchWindow => Box::new(BatchWindowEstimator::new(
            position,
            &initial,
            &process,
            config.batch_window,
        )),
        EstimatorKind::Particle => Box::new(ParticleEstimator::new(
            position,
            &initial,
            config.process_variance,
            config.particle_count,
            config.particle_seed,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accuracy_is_drms() {
        let state = EstimatorState {
            position: Vector2::zeros(),
            covariance: Matrix2::new(3.0, 0.5, 0.5, 1.0),
        };
        assert!((state.accuracy() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_mahalanobis() {
        let state = EstimatorState {
            position: Vector2::zeros(),
            covariance: Matrix2::identity(),
        };
        let obs = Observation::new(Vector2::new(2.0, 0.0), Matrix2::identity());
        // S = 2I, y = (2, 0): y'S⁻¹y = 2
        assert!((state.mahalanobis_squared(&obs).unwrap() - 2.0).abs() < 1e-12);

        let degenerate = EstimatorState {
            position: Vector2::zeros(),
            covariance: Matrix2::zeros(),
        };
        let exact = Observation::new(Vector2::new(1.0, 0.0), Matrix2::zeros());
        assert!(degenerate.mahalanobis_squared(&exact).is_none());
    }

    #[test]
    fn test_build_each_kind() {
        let start = Vector2::new(1.0, 2.0);
        for kind in [EstimatorKind::Kalman, EstimatorKind::BatchWindow, EstimatorKind::Particle] {
            let config = EstimatorConfig {
                kind,
                particle_seed: Some(11),
                ..EstimatorConfig::default()
            };
            let estimator = build_estimator(&config, &start);
            assert_eq!(estimator.kind(), kind);
            let state = estimator.state();
            let tolerance = if kind == EstimatorKind::Particle { 0.5 } else { 1e-12 };
            assert!((state.position - start).norm() < tolerance);
        }
    }
}
