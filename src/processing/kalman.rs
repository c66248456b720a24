use nalgebra::{Matrix2, Matrix2x4, Matrix4, Matrix4x2, Vector2, Vector4};
use tracing::warn;

use crate::processing::estimator::{EstimatorState, Observation, PositionEstimator};
use crate::utils::config::EstimatorKind;
use crate::validation::error::{FusionError, FusionResult};

/// Kalman filter over planar position
/// State vector: [x, y] (meters east/north of the session reference)
#[derive(Clone)]
pub struct PositionKalmanFilter {
    /// Current state estimate
    pub state: Vector2<f64>,
    /// State covariance matrix
    pub covariance: Matrix2<f64>,
    /// Process noise added per dead-reckoning step
    pub process_noise: Matrix2<f64>,
    /// Force the covariance symmetric after each update
    symmetrize: bool,
}

impl PositionKalmanFilter {
    /// Create filter at `position` with initial and per-step process covariance
    pub fn new(position: &Vector2<f64>, covariance: &Matrix2<f64>, process_noise: &Matrix2<f64>) -> Self {
        Self {
            state: *position,
            covariance: *covariance,
            process_noise: *process_noise,
            symmetrize: true,
        }
    }

    pub fn with_symmetrization(mut self, enabled: bool) -> Self {
        self.symmetrize = enabled;
        self
    }

    /// Get position uncertainty (standard deviations)
    pub fn get_position_uncertainty(&self) -> Vector2<f64> {
        Vector2::new(
            self.covariance[(0, 0)].max(0.0).sqrt(),
            self.covariance[(1, 1)].max(0.0).sqrt(),
        )
    }

    fn commit(&mut self, state: Vector2<f64>, mut covariance: Matrix2<f64>, context: &str) -> FusionResult<()> {
        if self.symmetrize {
            covariance = (covariance + covariance.transpose()) * 0.5;
        }

        if state.iter().chain(covariance.iter()).any(|v| !v.is_finite()) {
            warn!(context, "Kalman update produced non-finite state, keeping prior");
            return Err(FusionError::NonFiniteState { context: context.to_string() });
        }

        self.state = state;
        self.covariance = covariance;
        Ok(())
    }
}

impl PositionEstimator for PositionKalmanFilter {
    fn kind(&self) -> EstimatorKind {
        EstimatorKind::Kalman
    }

    fn predict(&mut self, displacement: &Vector2<f64>) {
        if displacement.iter().any(|v| !v.is_finite()) {
            warn!(dx = displacement.x, dy = displacement.y, "Non-finite displacement, skipping prediction");
            return;
        }
        // Identity transition: x_k = x_{k-1} + d, P_k = P_{k-1} + Q
        self.state += displacement;
        self.covariance += self.process_noise;
    }

    fn update(&mut self, observation: &Observation) -> FusionResult<()> {
        // Position observed directly, H = I
        let innovation = observation.position - self.state;
        let s = self.covariance + observation.covariance;

        let s_inv = s.try_inverse().ok_or_else(|| {
            warn!("Singular innovation covariance, skipping update");
            FusionError::SingularMatrix { context: "kalman update".to_string() }
        })?;

        let k = self.covariance * s_inv;
        let state = self.state + k * innovation;
        let covariance = (Matrix2::identity() - k) * self.covariance;

        self.commit(state, covariance, "kalman update")
    }

    fn update_joint(&mut self, first: &Observation, second: &Observation) -> FusionResult<()> {
        // Both fixes observe position: H = [I; I]
        let h = Matrix4x2::new(
            1.0, 0.0,
            0.0, 1.0,
            1.0, 0.0,
            0.0, 1.0,
        );
        let z = Vector4::new(
            first.position.x,
            first.position.y,
            second.position.x,
            second.position.y,
        );

        let mut r = Matrix4::zeros();
        r.fixed_view_mut::<2, 2>(0, 0).copy_from(&first.covariance);
        r.fixed_view_mut::<2, 2>(2, 2).copy_from(&second.covariance);

        let innovation = z - h * self.state;
        let s = h * self.covariance * h.transpose() + r;

        let s_inv = s.try_inverse().ok_or_else(|| {
            warn!("Singular joint innovation covariance, skipping update");
            FusionError::SingularMatrix { context: "kalman joint update".to_string() }
        })?;

        let k: Matrix2x4<f64> = self.covariance * h.transpose() * s_inv;
        let state = self.state + k * innovation;
        let covariance = (Matrix2::identity() - k * h) * self.covariance;

        self.commit(state, covariance, "kalman joint update")
    }

    fn state(&self) -> EstimatorState {
        EstimatorState {
            position: self.state,
            covariance: self.covariance,
        }
    }

    fn reset(&mut self, position: &Vector2<f64>, covariance: &Matrix2<f64>) {
        self.state = *position;
        self.covariance = *covariance;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_at_origin() -> PositionKalmanFilter {
        PositionKalmanFilter::new(
            &Vector2::zeros(),
            &Matrix2::from_diagonal_element(2.0),
            &Matrix2::from_diagonal_element(0.5),
        )
    }

    #[test]
    fn test_kalman_filter_prediction() {
        let mut filter = filter_at_origin();
        filter.predict(&Vector2::new(0.7, 0.0));
        filter.predict(&Vector2::new(0.7, 0.0));

        assert!((filter.state.x - 1.4).abs() < 1e-12);
        assert!(filter.state.y.abs() < 1e-12);
        assert!((filter.covariance[(0, 0)] - 3.0).abs() < 1e-12);
        assert!((filter.covariance[(1, 1)] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_prediction_keeps_prior() {
        let mut filter = filter_at_origin();
        filter.predict(&Vector2::new(0.7, 0.0));
        filter.predict(&Vector2::new(f64::NAN, 0.0));
        filter.predict(&Vector2::new(0.0, f64::INFINITY));

        assert!((filter.state.x - 0.7).abs() < 1e-12);
        assert!((filter.covariance[(0, 0)] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_kalman_filter_update() {
        let mut filter = filter_at_origin();
        let obs = Observation::new(Vector2::new(4.0, 0.0), Matrix2::from_diagonal_element(2.0));
        filter.update(&obs).unwrap();

        // Equal prior and measurement variance: halfway, variance halved
        assert!((filter.state.x - 2.0).abs() < 1e-12);
        assert!((filter.covariance[(0, 0)] - 1.0).abs() < 1e-12);
        assert!(filter.get_position_uncertainty().x < 2.0_f64.sqrt());
    }

    #[test]
    fn test_converges_with_shrinking_noise() {
        let mut filter = filter_at_origin();
        let target = Vector2::new(10.0, -5.0);
        let mut last_error = (filter.state - target).norm();
        let mut last_trace = filter.covariance.trace();

        for variance in [8.0, 4.0, 2.0, 1.0, 0.5, 0.25] {
            let obs = Observation::new(target, Matrix2::from_diagonal_element(variance));
            filter.update(&obs).unwrap();
            let error = (filter.state - target).norm();
            assert!(error < last_error);
            assert!(filter.covariance.trace() < last_trace);
            last_error = error;
            last_trace = filter.covariance.trace();
        }
    }

    #[test]
    fn test_singular_update_keeps_prior() {
        let mut filter = PositionKalmanFilter::new(&Vector2::new(1.0, 1.0), &Matrix2::zeros(), &Matrix2::zeros());
        let obs = Observation::new(Vector2::new(5.0, 5.0), Matrix2::zeros());

        let result = filter.update(&obs);
        assert!(matches!(result, Err(FusionError::SingularMatrix { .. })));
        assert_eq!(filter.state, Vector2::new(1.0, 1.0));
    }

    #[test]
    fn test_non_finite_update_keeps_prior() {
        let mut filter = filter_at_origin();
        let obs = Observation::new(Vector2::new(f64::NAN, 0.0), Matrix2::identity());

        let result = filter.update(&obs);
        assert!(matches!(result, Err(FusionError::NonFiniteState { .. })));
        assert_eq!(filter.state, Vector2::zeros());
        assert_eq!(filter.covariance, Matrix2::from_diagonal_element(2.0));
    }

    #[test]
    fn test_joint_update_matches_sequential() {
        let a = Observation::new(Vector2::new(3.0, 1.0), Matrix2::new(4.0, 0.5, 0.5, 3.0));
        let b = Observation::new(Vector2::new(2.0, -1.0), Matrix2::from_diagonal_element(2.0));

        let mut joint = filter_at_origin();
        joint.update_joint(&a, &b).unwrap();

        let mut sequential = filter_at_origin();
        sequential.update(&a).unwrap();
        sequential.update(&b).unwrap();

        assert!((joint.state - sequential.state).norm() < 1e-9);
        assert!((joint.covariance - sequential.covariance).norm() < 1e-9);
    }

    #[test]
    fn test_reset() {
        let mut filter = filter_at_origin();
        filter.predict(&Vector2::new(3.0, 3.0));
        filter.reset(&Vector2::new(-1.0, 2.0), &Matrix2::from_diagonal_element(2.0));
        let state = filter.state();
        assert_eq!(state.position, Vector2::new(-1.0, 2.0));
        assert!((state.accuracy() - 2.0).abs() < 1e-12);
    }
}
