//! Pedestrian dead reckoning pipeline
//!
//! Turns per-step acceleration windows and headings into planar
//! displacements, and barometric readings into relative elevation and
//! floor index. Also carries the raw elevator signal derived from gravity
//! and linear acceleration.

use std::f32::consts::FRAC_PI_2;

use nalgebra::Vector3;
use tracing::{debug, trace, warn};

use crate::algorithms::elevation::{ElevationTracker, ElevationUpdate};
use crate::algorithms::elevator::ElevatorDetector;
use crate::algorithms::stride::StrideEstimator;
use crate::core::{MotionSample, StepDisplacement};
use crate::utils::config::{FusionConfig, HeadingConvention};

/// Lifecycle of the elevation side of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdrPhase {
    /// No elevation reading seen yet
    Uninitialized,
    /// Collecting readings for the start baseline
    CalibratingElevation,
    Tracking,
}

/// Heading in radians, 0 = east and counter-clockwise positive
pub fn east_ccw_heading(heading_rad: f32, convention: HeadingConvention) -> f32 {
    match convention {
        HeadingConvention::EastCounterClockwise => heading_rad,
        HeadingConvention::Azimuth => FRAC_PI_2 - heading_rad,
    }
}

/// Displacement of one stride along a heading
pub fn step_displacement(stride_m: f32, heading_rad: f32, convention: HeadingConvention) -> StepDisplacement {
    let angle = east_ccw_heading(heading_rad, convention);
    StepDisplacement::new(stride_m * angle.cos(), stride_m * angle.sin())
}

#[derive(Debug, Clone)]
pub struct PdrPipeline {
    stride: StrideEstimator,
    manual_stride: Option<f32>,
    heading_convention: HeadingConvention,
    position: (f32, f32),
    step_count: u64,
    /// Stride sum and count since the last average was taken
    stride_sum: f32,
    stride_samples: u32,
    last_stride: f32,
    elevation: ElevationTracker,
    elevator: ElevatorDetector,
    in_elevator: bool,
}

impl PdrPipeline {
    pub fn new(config: &FusionConfig) -> Self {
        let pdr = &config.pdr;
        Self {
            stride: StrideEstimator::new(pdr.stride_coefficient).with_bounds(pdr.stride_bounds),
            manual_stride: pdr.manual_stride_m,
            heading_convention: pdr.heading_convention,
            position: (0.0, 0.0),
            step_count: 0,
            stride_sum: 0.0,
            stride_samples: 0,
            last_stride: 0.0,
            elevation: ElevationTracker::new(pdr),
            elevator: ElevatorDetector::new(&config.elevator),
            in_elevator: false,
        }
    }

    pub fn phase(&self) -> PdrPhase {
        if self.elevation.is_calibrated() {
            PdrPhase::Tracking
        } else if self.elevation.calibration_progress() > 0 {
            PdrPhase::CalibratingElevation
        } else {
            PdrPhase::Uninitialized
        }
    }

    /// Process one detected step and return its displacement
    pub fn on_step(&mut self, sample: &MotionSample) -> StepDisplacement {
        let stride = match self.manual_stride {
            Some(stride) => stride,
            None => self.stride.estimate(&sample.accel_magnitudes),
        };
        let displacement = step_displacement(stride, sample.heading_rad, self.heading_convention);
        if !(displacement.dx.is_finite() && displacement.dy.is_finite()) {
            warn!(
                timestamp_ms = sample.timestamp_ms,
                stride,
                heading = sample.heading_rad,
                "Non-finite step displacement, treating step as stationary"
            );
            return StepDisplacement::default();
        }

        self.position.0 += displacement.dx;
        self.position.1 += displacement.dy;
        self.step_count += 1;
        self.stride_sum += stride;
        self.stride_samples += 1;
        self.last_stride = stride;

        trace!(
            timestamp_ms = sample.timestamp_ms,
            stride,
            dx = displacement.dx,
            dy = displacement.dy,
            "Step processed"
        );
        displacement
    }

    /// Process one barometric elevation reading (meters)
    pub fn on_elevation(&mut self, absolute_elevation: f32) -> ElevationUpdate {
        self.elevation.update(absolute_elevation)
    }

    /// Process one gravity/linear-acceleration tick; returns the raw elevator flag
    pub fn on_acceleration(&mut self, gravity: &Vector3<f32>, acceleration: &Vector3<f32>) -> bool {
        self.in_elevator = self.elevator.update(gravity, acceleration);
        self.in_elevator
    }

    /// Cumulative PDR position (x east, y north) relative to the start
    pub fn position(&self) -> (f32, f32) {
        self.position
    }

    pub fn elevation(&self) -> f32 {
        self.elevation.relative_elevation()
    }

    /// Absolute baseline elevation once calibration completes
    pub fn start_elevation(&self) -> Option<f32> {
        self.elevation.start_elevation()
    }

    pub fn floor(&self) -> i32 {
        self.elevation.current_floor()
    }

    pub fn in_elevator(&self) -> bool {
        self.in_elevator
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn last_stride(&self) -> f32 {
        self.last_stride
    }

    /// Mean stride since the previous call; resets the aggregate. 0 without steps.
    pub fn take_average_step_length(&mut self) -> f32 {
        let average = if self.stride_samples == 0 {
            0.0
        } else {
            self.stride_sum / self.stride_samples as f32
        };
        self.stride_sum = 0.0;
        self.stride_samples = 0;
        average
    }

    /// Zero position and elevation and empty all buffers
    pub fn reset(&mut self) {
        self.position = (0.0, 0.0);
        self.step_count = 0;
        self.stride_sum = 0.0;
        self.stride_samples = 0;
        self.last_stride = 0.0;
        self.elevation.reset();
        self.elevator.reset();
        self.in_elevator = false;
        debug!("PDR pipeline reset");
    }
}
