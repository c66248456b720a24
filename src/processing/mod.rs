//! Sample buffering, position estimation and fix gating

pub mod batch;
pub mod buffer;
pub mod estimator;
pub mod kalman;
pub mod particle;
pub mod trust;

pub use batch::BatchWindowEstimator;
pub use buffer::CircularSampleBuffer;
pub use estimator::{build_estimator, EstimatorState, Observation, PositionEstimator};
pub use kalman::PositionKalmanFilter;
pub use particle::ParticleEstimator;
pub use trust::OutlierGate;
