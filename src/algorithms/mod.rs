//! Dead reckoning and coordinate algorithms

pub mod coordinates;
pub mod elevation;
pub mod elevator;
pub mod pdr;
pub mod stride;

pub use coordinates::CoordinateTransform;
pub use elevation::{ElevationTracker, ElevationUpdate};
pub use elevator::ElevatorDetector;
pub use pdr::{PdrPhase, PdrPipeline};
pub use stride::StrideEstimator;
