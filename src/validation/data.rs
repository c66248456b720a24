//! Sensor input validation
//!
//! Fixes, covariances, headings and raw sensor vectors are checked here
//! before they reach the PDR pipeline or an estimator.

use nalgebra::{Matrix2, Vector3};

use crate::core::constants::MAX_ABS_ELEVATION_M;
use crate::core::{AbsoluteFix, GeoPoint};
use crate::validation::error::{FusionError, FusionResult};

/// Limits applied to incoming sensor data
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Absolute elevation readings beyond this magnitude are invalid (meters)
    pub max_abs_elevation_m: f32,
    /// Largest fix variance accepted on either axis (m²)
    pub max_fix_variance_m2: f64,
    /// Allowed asymmetry between off-diagonal covariance terms
    pub symmetry_tolerance: f64,
    /// Acceleration components beyond this are treated as corrupt (m/s²)
    pub max_acceleration_ms2: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_abs_elevation_m: MAX_ABS_ELEVATION_M,
            max_fix_variance_m2: 1.0e8,   // 10 km one-sigma
            symmetry_tolerance: 1.0e-9,
            max_acceleration_ms2: 160.0,  // ~16 g
        }
    }
}

/// Gatekeeper for caller-supplied geometry and sensor readings
#[derive(Debug, Clone, Default)]
pub struct InputValidator {
    config: ValidationConfig,
}

impl InputValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Check a fix's position and covariance
    pub fn validate_fix(&self, fix: &AbsoluteFix) -> FusionResult<()> {
        self.validate_position(&fix.position)?;
        self.validate_covariance(&fix.covariance)
    }

    pub fn validate_position(&self, position: &GeoPoint) -> FusionResult<()> {
        position.validate()
    }

    /// Covariance must be finite, symmetric and positive semi-definite
    pub fn validate_covariance(&self, covariance: &Matrix2<f64>) -> FusionResult<()> {
        if covariance.iter().any(|v| !v.is_finite()) {
            return Err(FusionError::invalid_argument("covariance", "contains non-finite entries"));
        }

        let (a, b, c, d) = (
            covariance[(0, 0)],
            covariance[(0, 1)],
            covariance[(1, 0)],
            covariance[(1, 1)],
        );
        let tolerance = self.config.symmetry_tolerance * (1.0 + a.abs().max(d.abs()));
        if (b - c).abs() > tolerance {
            return Err(FusionError::invalid_argument(
                "covariance",
                format!("not symmetric ({} vs {})", b, c),
            ));
        }
        if a < 0.0 || d < 0.0 {
            return Err(FusionError::invalid_argument("covariance", "negative variance"));
        }
        // 2x2 symmetric PSD: non-negative diagonal and determinant
        if a * d - b * c < -tolerance {
            return Err(FusionError::invalid_argument("covariance", "not positive semi-definite"));
        }
        if a > self.config.max_fix_variance_m2 || d > self.config.max_fix_variance_m2 {
            return Err(FusionError::invalid_argument(
                "covariance",
                format!("variance exceeds {} m²", self.config.max_fix_variance_m2),
            ));
        }
        Ok(())
    }

    /// Scalar accuracy must be finite and positive
    pub fn validate_accuracy(&self, accuracy_m: f64) -> FusionResult<()> {
        if !accuracy_m.is_finite() || accuracy_m <= 0.0 {
            return Err(FusionError::invalid_argument(
                "accuracy",
                format!("{} is not a positive finite accuracy", accuracy_m),
            ));
        }
        Ok(())
    }

    pub fn is_valid_elevation(&self, elevation_m: f32) -> bool {
        elevation_m.is_finite() && elevation_m.abs() <= self.config.max_abs_elevation_m
    }

    /// Parse a sensor 3-vector, rejecting undersized or corrupt input
    pub fn parse_vector3(&self, name: &str, values: &[f64]) -> FusionResult<Vector3<f32>> {
        if values.len() < 3 {
            return Err(FusionError::invalid_argument(
                name,
                format!("expected 3 components, got {}", values.len()),
            ));
        }
        let limit = self.config.max_acceleration_ms2;
        if values[..3].iter().any(|v| !v.is_finite() || v.abs() > limit) {
            return Err(FusionError::invalid_argument(name, "component non-finite or out of range"));
        }
        Ok(Vector3::new(values[0] as f32, values[1] as f32, values[2] as f32))
    }

    /// Step heading must be a finite angle
    pub fn validate_heading(&self, heading_rad: f32) -> FusionResult<()> {
        if !heading_rad.is_finite() {
            return Err(FusionError::invalid_argument(
                "heading_rad",
                format!("{} is not a finite heading", heading_rad),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FixSource;

    fn fix_with(covariance: Matrix2<f64>) -> AbsoluteFix {
        let position = GeoPoint::new(55.9229, -3.1745).unwrap();
        AbsoluteFix::new(position, covariance, FixSource::Wireless)
    }

    #[test]
    fn test_valid_fix() {
        let validator = InputValidator::new();
        let fix = fix_with(Matrix2::new(4.0, 1.0, 1.0, 3.0));
        assert!(validator.validate_fix(&fix).is_ok());
    }

    #[test]
    fn test_covariance_rejections() {
        let validator = InputValidator::new();
        let cases = [
            Matrix2::new(4.0, 1.0, 0.5, 3.0),       // asymmetric
            Matrix2::new(-1.0, 0.0, 0.0, 3.0),      // negative variance
            Matrix2::new(1.0, 2.0, 2.0, 1.0),       // indefinite
            Matrix2::new(f64::NAN, 0.0, 0.0, 1.0),  // NaN
            Matrix2::new(1.0e9, 0.0, 0.0, 1.0),     // absurd
        ];
        for covariance in cases {
            let result = validator.validate_fix(&fix_with(covariance));
            assert!(
                matches!(result, Err(FusionError::InvalidArgument { .. })),
                "accepted {:?}",
                covariance
            );
        }
    }

    #[test]
    fn test_zero_covariance_is_psd() {
        let validator = InputValidator::new();
        assert!(validator.validate_covariance(&Matrix2::zeros()).is_ok());
    }

    #[test]
    fn test_elevation_limits() {
        let validator = InputValidator::new();
        assert!(validator.is_valid_elevation(85.0));
        assert!(validator.is_valid_elevation(-400.0));
        assert!(!validator.is_valid_elevation(f32::NAN));
        assert!(!validator.is_valid_elevation(10_500.0));
    }

    #[test]
    fn test_parse_vector3() {
        let validator = InputValidator::new();
        let v = validator.parse_vector3("gravity", &[0.0, 0.0, 9.81]).unwrap();
        assert!((v.z - 9.81).abs() < 1e-6);

        assert!(validator.parse_vector3("gravity", &[0.0, 9.81]).is_err());
        assert!(validator.parse_vector3("gravity", &[0.0, f64::INFINITY, 1.0]).is_err());
    }

    #[test]
    fn test_heading() {
        let validator = InputValidator::new();
        assert!(validator.validate_heading(-3.0).is_ok());
        assert!(matches!(
            validator.validate_heading(f32::NAN),
            Err(FusionError::InvalidArgument { .. })
        ));
        assert!(validator.validate_heading(f32::NEG_INFINITY).is_err());
    }

    #[test]
    fn test_accuracy() {
        let validator = InputValidator::new();
        assert!(validator.validate_accuracy(3.0).is_ok());
        assert!(validator.validate_accuracy(0.0).is_err());
        assert!(validator.validate_accuracy(f64::NAN).is_err());
    }
}
