//! Pedestrian Sensor Fusion
//!
//! Indoor/outdoor pedestrian positioning that fuses step-based dead
//! reckoning with intermittent wireless and satellite fixes, tracks floor
//! changes from barometric elevation, and suspends fusion while riding an
//! elevator.

pub mod core;
pub mod algorithms;
pub mod processing;
pub mod validation;
pub mod utils;
pub mod api;

// Re-export commonly used types
pub use crate::core::{AbsoluteFix, FixSource, GeoPoint, MotionSample, PlanarPoint, StepDisplacement};
pub use algorithms::coordinates::CoordinateTransform;
pub use algorithms::pdr::PdrPipeline;
pub use processing::estimator::{build_estimator, PositionEstimator};
pub use processing::kalman::PositionKalmanFilter;
pub use validation::{FusionError, FusionResult};
pub use utils::config::{ConfigurationManager, EstimatorKind, FusionConfig, HeadingConvention, TrustStrategy};
pub use api::{
    ConveyanceState, EventOutcome, FixDisposition, FixSpec, FusedPosition, FusionEvent, FusionSession,
    SessionEvent, SharedSession,
};
