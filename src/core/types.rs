//! Core data types for the fusion engine

use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

use crate::validation::error::{FusionError, FusionResult};

/// Geographic position in WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a point, rejecting out-of-range or non-finite coordinates
    pub fn new(latitude: f64, longitude: f64) -> FusionResult<Self> {
        let point = Self { latitude, longitude };
        point.validate()?;
        Ok(point)
    }

    /// Build from a `[latitude, longitude]` slice
    pub fn from_slice(coords: &[f64]) -> FusionResult<Self> {
        if coords.len() < 2 {
            return Err(FusionError::invalid_argument(
                "coords",
                format!("expected [latitude, longitude], got {} values", coords.len()),
            ));
        }
        Self::new(coords[0], coords[1])
    }

    pub fn validate(&self) -> FusionResult<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(FusionError::invalid_argument(
                "latitude",
                format!("{} is outside [-90, 90]", self.latitude),
            ));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(FusionError::invalid_argument(
                "longitude",
                format!("{} is outside [-180, 180]", self.longitude),
            ));
        }
        Ok(())
    }
}

/// Local planar position in meters (x = easting, y = northing)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlanarPoint {
    pub x: f64,
    pub y: f64,
}

impl PlanarPoint {
    pub const ORIGIN: PlanarPoint = PlanarPoint { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Build from an `[x, y]` slice
    pub fn from_slice(coords: &[f64]) -> FusionResult<Self> {
        if coords.len() < 2 {
            return Err(FusionError::invalid_argument(
                "coords",
                format!("expected [x, y], got {} values", coords.len()),
            ));
        }
        if !coords[0].is_finite() || !coords[1].is_finite() {
            return Err(FusionError::invalid_argument("coords", "non-finite planar coordinate"));
        }
        Ok(Self::new(coords[0], coords[1]))
    }

    pub fn to_vector(self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    pub fn from_vector(v: &Vector2<f64>) -> Self {
        Self::new(v.x, v.y)
    }

    pub fn distance_to(&self, other: &PlanarPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Origin of an absolute fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixSource {
    Wireless,
    Satellite,
}

/// Absolute position observation with its noise covariance (m²)
#[derive(Debug, Clone, PartialEq)]
pub struct AbsoluteFix {
    pub position: GeoPoint,
    pub covariance: Matrix2<f64>,
    pub source: FixSource,
}

impl AbsoluteFix {
    pub fn new(position: GeoPoint, covariance: Matrix2<f64>, source: FixSource) -> Self {
        Self { position, covariance, source }
    }

    /// Fix with a circular 1-sigma accuracy in meters
    pub fn from_accuracy(position: GeoPoint, accuracy_m: f64, source: FixSource) -> Self {
        let variance = accuracy_m * accuracy_m;
        Self::new(position, Matrix2::from_diagonal_element(variance), source)
    }
}

/// Acceleration magnitudes collected between two detected steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    /// Step end, milliseconds since session start
    pub timestamp_ms: u64,
    pub accel_magnitudes: Vec<f64>,
    /// Heading in radians; interpretation set by `HeadingConvention`
    pub heading_rad: f32,
}

impl MotionSample {
    pub fn new(timestamp_ms: u64, accel_magnitudes: Vec<f64>, heading_rad: f32) -> Self {
        Self { timestamp_ms, accel_magnitudes, heading_rad }
    }
}

/// Planar displacement produced by one step
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StepDisplacement {
    pub dx: f32,
    pub dy: f32,
}

impl StepDisplacement {
    pub fn new(dx: f32, dy: f32) -> Self {
        Self { dx, dy }
    }

    pub fn length(&self) -> f32 {
        self.dx.hypot(self.dy)
    }

    pub fn to_vector(self) -> Vector2<f64> {
        Vector2::new(self.dx as f64, self.dy as f64)
    }
}
