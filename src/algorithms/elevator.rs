//! Raw vertical-conveyance detection from gravity and linear acceleration
//!
//! Linear acceleration is split into components along and across the
//! gravity direction. A ride shows sustained vertical acceleration with
//! almost no horizontal movement. Debouncing is left to the caller.

use nalgebra::Vector3;

use crate::core::constants::STANDARD_GRAVITY;
use crate::processing::buffer::CircularSampleBuffer;
use crate::utils::config::ElevatorConfig;

/// Vertical and horizontal magnitudes of `acceleration` relative to `gravity`
pub fn split_acceleration(gravity: &Vector3<f32>, acceleration: &Vector3<f32>) -> (f32, f32) {
    let ratio = gravity / STANDARD_GRAVITY;
    let vertical = acceleration.component_mul(&ratio).norm();
    let horizontal = acceleration
        .component_mul(&ratio.map(|r| 1.0 - r))
        .norm();
    (vertical, horizontal)
}

#[derive(Debug, Clone)]
pub struct ElevatorDetector {
    vertical: CircularSampleBuffer,
    horizontal: CircularSampleBuffer,
    movement_threshold: f32,
    horizontal_epsilon: f32,
}

impl ElevatorDetector {
    pub fn new(config: &ElevatorConfig) -> Self {
        Self {
            vertical: CircularSampleBuffer::with_capacity(config.accel_samples),
            horizontal: CircularSampleBuffer::with_capacity(config.accel_samples),
            movement_threshold: config.movement_threshold,
            horizontal_epsilon: config.horizontal_epsilon,
        }
    }

    /// Add one sensor tick; true when the full window looks like an elevator ride
    pub fn update(&mut self, gravity: &Vector3<f32>, acceleration: &Vector3<f32>) -> bool {
        let (vertical, horizontal) = split_acceleration(gravity, acceleration);
        self.vertical.push(vertical);
        self.horizontal.push(horizontal);

        if !(self.vertical.is_full() && self.horizontal.is_full()) {
            return false;
        }
        let (vertical_mean, horizontal_mean) = self.window_means();
        horizontal_mean < self.horizontal_epsilon && vertical_mean > self.movement_threshold
    }

    /// Current window means (vertical, horizontal)
    pub fn window_means(&self) -> (f32, f32) {
        (self.vertical.average(), self.horizontal.average())
    }

    pub fn reset(&mut self) {
        self.vertical.clear();
        self.horizontal.clear();
    }
}
