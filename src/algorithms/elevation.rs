//! Barometric elevation and floor tracking

use tracing::{debug, info};

use crate::processing::buffer::CircularSampleBuffer;
use crate::utils::config::PdrConfig;
use crate::validation::data::InputValidator;

/// Result of feeding one elevation reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElevationUpdate {
    /// Elevation relative to the session start (meters)
    pub relative_elevation: f32,
    /// Whole floors moved by this reading, if any
    pub floor_change: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct ElevationTracker {
    calibration_samples: usize,
    calibration: Vec<f32>,
    /// Median of the calibration readings
    start_elevation: Option<f32>,
    /// Reference the smoothed elevation is compared against for floor changes
    floor_baseline: f32,
    window: CircularSampleBuffer,
    floor_height: f32,
    floor_margin: f32,
    current_floor: i32,
    relative_elevation: f32,
    last_valid: Option<f32>,
    validator: InputValidator,
}

impl ElevationTracker {
    pub fn new(config: &PdrConfig) -> Self {
        Self {
            calibration_samples: config.calibration_samples.max(1),
            calibration: Vec::with_capacity(config.calibration_samples),
            start_elevation: None,
            floor_baseline: 0.0,
            window: CircularSampleBuffer::with_capacity(config.elevation_memory),
            floor_height: config.floor_height_m,
            floor_margin: config.floor_margin_m,
            current_floor: 0,
            relative_elevation: 0.0,
            last_valid: None,
            validator: InputValidator::new(),
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.start_elevation.is_some()
    }

    /// Readings collected toward the start baseline
    pub fn calibration_progress(&self) -> usize {
        self.calibration.len()
    }

    pub fn start_elevation(&self) -> Option<f32> {
        self.start_elevation
    }

    pub fn relative_elevation(&self) -> f32 {
        self.relative_elevation
    }

    pub fn current_floor(&self) -> i32 {
        self.current_floor
    }

    /// Feed one absolute elevation reading (meters).
    ///
    /// Invalid readings are replaced by the last valid one; with no valid
    /// reading yet they are ignored.
    pub fn update(&mut self, absolute_elevation: f32) -> ElevationUpdate {
        let reading = if self.validator.is_valid_elevation(absolute_elevation) {
            self.last_valid = Some(absolute_elevation);
            absolute_elevation
        } else {
            match self.last_valid {
                Some(held) => {
                    debug!(rejected = absolute_elevation, held, "Holding last valid elevation");
                    held
                }
                None => {
                    debug!(rejected = absolute_elevation, "Ignoring invalid elevation before first valid reading");
                    return self.unchanged();
                }
            }
        };

        let start = match self.start_elevation {
            Some(start) => start,
            None => {
                self.calibrate(reading);
                return self.unchanged();
            }
        };

        self.relative_elevation = reading - start;
        self.window.push(reading);

        let mut floor_change = None;
        if self.window.is_full() {
            let average = self.window.average_signed();
            let deviation = average - self.floor_baseline;
            if deviation.abs() > self.floor_height + self.floor_margin {
                let floors = (deviation / self.floor_height).round() as i32;
                if floors != 0 {
                    self.current_floor += floors;
                    self.floor_baseline = average;
                    floor_change = Some(floors);
                    info!(floors, floor = self.current_floor, "Floor change detected");
                }
            }
        }

        ElevationUpdate {
            relative_elevation: self.relative_elevation,
            floor_change,
        }
    }

    fn calibrate(&mut self, reading: f32) {
        self.calibration.push(reading);
        if self.calibration.len() < self.calibration_samples {
            return;
        }

        let mut sorted = self.calibration.clone();
        sorted.sort_by(f32::total_cmp);
        let median = sorted[sorted.len() / 2];
        self.start_elevation = Some(median);
        self.floor_baseline = median;
        info!(baseline = median, samples = sorted.len(), "Elevation calibration complete");
    }

    fn unchanged(&self) -> ElevationUpdate {
        ElevationUpdate {
            relative_elevation: self.relative_elevation,
            floor_change: None,
        }
    }

    pub fn reset(&mut self) {
        self.calibration.clear();
        self.start_elevation = None;
        self.floor_baseline = 0.0;
        self.window.clear();
        self.current_floor = 0;
        self.relative_elevation = 0.0;
        self.last_valid = None;
    }
}
