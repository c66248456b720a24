//! Windowed batch estimator
//!
//! Treats dead-reckoning drift as a constant planar offset `b` over the
//! last W fixes and solves the weighted least-squares problem
//!
//! `(P0⁻¹ + Σ Rᵢ⁻¹) b = Σ Rᵢ⁻¹ (zᵢ − origin − odoᵢ)`
//!
//! where `odoᵢ` is the accumulated displacement when fix i arrived. The
//! position is `origin + odometry + b`.

use std::collections::VecDeque;

use nalgebra::{Matrix2, Vector2};
use tracing::warn;

use crate::processing::estimator::{EstimatorState, Observation, PositionEstimator};
use crate::utils::config::EstimatorKind;
use crate::validation::error::{FusionError, FusionResult};

#[derive(Debug, Clone)]
struct WindowedFix {
    /// Fix position minus the odometry at its arrival
    residual: Vector2<f64>,
    information: Matrix2<f64>,
}

#[derive(Debug, Clone)]
pub struct BatchWindowEstimator {
    origin: Vector2<f64>,
    prior_covariance: Matrix2<f64>,
    process_noise: Matrix2<f64>,
    odometry: Vector2<f64>,
    window: VecDeque<WindowedFix>,
    capacity: usize,
    offset: Vector2<f64>,
    offset_covariance: Matrix2<f64>,
    /// Steps since the last solved fix
    steps_since_fix: u32,
}

impl BatchWindowEstimator {
    pub fn new(
        position: &Vector2<f64>,
        covariance: &Matrix2<f64>,
        process_noise: &Matrix2<f64>,
        capacity: usize,
    ) -> Self {
        Self {
            origin: *position,
            prior_covariance: *covariance,
            process_noise: *process_noise,
            odometry: Vector2::zeros(),
            window: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            offset: Vector2::zeros(),
            offset_covariance: *covariance,
            steps_since_fix: 0,
        }
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    fn windowed(&self, observation: &Observation) -> FusionResult<WindowedFix> {
        let information = observation.covariance.try_inverse().ok_or_else(|| {
            FusionError::SingularMatrix { context: "batch fix covariance".to_string() }
        })?;
        Ok(WindowedFix {
            residual: observation.position - self.origin - self.odometry,
            information,
        })
    }

    /// Push fixes and re-solve; the window is restored if solving fails
    fn add_and_solve(&mut self, fixes: Vec<WindowedFix>) -> FusionResult<()> {
        let saved = self.window.clone();
        for fix in fixes {
            if self.window.len() == self.capacity {
                self.window.pop_front();
            }
            self.window.push_back(fix);
        }

        match self.solve() {
            Ok((offset, covariance)) => {
                self.offset = offset;
                self.offset_covariance = covariance;
                self.steps_since_fix = 0;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Batch solve failed, keeping previous window");
                self.window = saved;
                Err(e)
            }
        }
    }

    fn solve(&self) -> FusionResult<(Vector2<f64>, Matrix2<f64>)> {
        let prior_information = self.prior_covariance.try_inverse().ok_or_else(|| {
            FusionError::SingularMatrix { context: "batch prior covariance".to_string() }
        })?;

        let mut information = prior_information;
        let mut weighted = Vector2::zeros();
        for fix in &self.window {
            information += fix.information;
            weighted += fix.information * fix.residual;
        }

        let covariance = information.try_inverse().ok_or_else(|| {
            FusionError::SingularMatrix { context: "batch normal equations".to_string() }
        })?;
        let offset = covariance * weighted;

        if offset.iter().chain(covariance.iter()).any(|v| !v.is_finite()) {
            return Err(FusionError::NonFiniteState { context: "batch solve".to_string() });
        }
        Ok((offset, covariance))
    }
}

impl PositionEstimator for BatchWindowEstimator {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::BatchWindow
    }

    fn predict(&mut self, displacement: &Vector2<f64>) {
        if displacement.iter().any(|v| !v.is_finite()) {
            warn!(dx = displacement.x, dy = displacement.y, "Non-finite displacement, skipping prediction");
            return;
        }
        self.odometry += displacement;
        self.steps_since_fix = self.steps_since_fix.saturating_add(1);
    }

    fn update(&mut self, observation: &Observation) -> FusionResult<()> {
        let fix = self.windowed(observation)?;
        self.add_and_solve(vec![fix])
    }

    fn update_joint(&mut self, first: &Observation, second: &Observation) -> FusionResult<()> {
        let fixes = vec![self.windowed(first)?, self.windowed(second)?];
        self.add_and_solve(fixes)
    }

    fn state(&self) -> EstimatorState {
        EstimatorState {
            position: self.origin + self.odometry + self.offset,
            covariance: self.offset_covariance + self.process_noise * self.steps_since_fix as f64,
        }
    }

    fn reset(&mut self, position: &Vector2<f64>, covariance: &Matrix2<f64>) {
        self.origin = *position;
        self.prior_covariance = *covariance;
        self.odometry = Vector2::zeros();
        self.window.clear();
        self.offset = Vector2::zeros();
        self.offset_covariance = *covariance;
        self.steps_since_fix = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator(capacity: usize) -> BatchWindowEstimator {
        BatchWindowEstimator::new(
            &Vector2::zeros(),
            &Matrix2::from_diagonal_element(2.0),
            &Matrix2::from_diagonal_element(0.5),
            capacity,
        )
    }

    #[test]
    fn test_prediction_accumulates() {
        let mut batch = estimator(5);
        batch.predict(&Vector2::new(0.7, 0.0));
        batch.predict(&Vector2::new(0.7, 0.0));
        let state = batch.state();
        assert!((state.position.x - 1.4).abs() < 1e-12);
        assert!((state.covariance[(0, 0)] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_prediction_keeps_prior() {
        let mut batch = estimator(5);
        batch.predict(&Vector2::new(0.7, 0.0));
        let before = batch.state();
        batch.predict(&Vector2::new(f64::NAN, 0.0));
        batch.predict(&Vector2::new(f64::INFINITY, 1.0));
        assert_eq!(batch.state(), before);
    }

    #[test]
    fn test_single_fix_matches_kalman() {
        let mut batch = estimator(5);
        let obs = Observation::new(Vector2::new(4.0, 0.0), Matrix2::from_diagonal_element(2.0));
        batch.update(&obs).unwrap();
        let state = batch.state();
        assert!((state.position.x - 2.0).abs() < 1e-12);
        assert!((state.covariance[(0, 0)] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_recovers_constant_drift() {
        let mut batch = estimator(20);
        // Odometry under-reports by 0.1 m per step east
        for step in 1..=20 {
            batch.predict(&Vector2::new(0.6, 0.0));
            let truth = Vector2::new(0.7 * step as f64, 0.0);
            if step % 2 == 0 {
                let obs = Observation::new(truth, Matrix2::from_diagonal_element(1.0));
                batch.update(&obs).unwrap();
            }
        }
        let state = batch.state();
        assert!((state.position.x - 14.0).abs() < 2.5);
    }

    #[test]
    fn test_window_capacity() {
        let mut batch = estimator(3);
        for i in 0..6 {
            let obs = Observation::new(Vector2::new(i as f64, 0.0), Matrix2::identity());
            batch.update(&obs).unwrap();
        }
        assert_eq!(batch.window_len(), 3);
    }

    #[test]
    fn test_singular_fix_rejected() {
        let mut batch = estimator(3);
        let obs = Observation::new(Vector2::new(1.0, 1.0), Matrix2::zeros());
        assert!(matches!(batch.update(&obs), Err(FusionError::SingularMatrix { .. })));
        assert_eq!(batch.window_len(), 0);
        assert_eq!(batch.state().position, Vector2::zeros());
    }

    #[test]
    fn test_reset_clears_window() {
        let mut batch = estimator(3);
        batch.update(&Observation::new(Vector2::new(1.0, 0.0), Matrix2::identity())).unwrap();
        batch.reset(&Vector2::new(5.0, 5.0), &Matrix2::from_diagonal_element(2.0));
        assert_eq!(batch.window_len(), 0);
        assert_eq!(batch.state().position, Vector2::new(5.0, 5.0));
    }
}
