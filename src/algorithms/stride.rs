//! Weinberg stride length estimation
//!
//! Stride is derived from the vertical bounce observed in the acceleration
//! magnitude between two steps: `(max - min)^0.25 · K · 2`. The window is
//! median-filtered and its extreme tails trimmed before the bounce is taken.

use tracing::{trace, warn};

use crate::core::constants::{DEFAULT_STRIDE_COEFFICIENT, MIN_STRIDE_SAMPLES, STRIDE_TRIM_FRACTION};
use crate::utils::config::StrideBounds;

/// Three-point median filter; the first and last samples are kept as-is
pub fn median_filter3(samples: &[f64]) -> Vec<f64> {
    if samples.len() < 3 {
        return samples.to_vec();
    }

    let mut filtered = Vec::with_capacity(samples.len());
    filtered.push(samples[0]);
    for window in samples.windows(3) {
        let mut sorted = [window[0], window[1], window[2]];
        sorted.sort_by(f64::total_cmp);
        filtered.push(sorted[1]);
    }
    filtered.push(samples[samples.len() - 1]);
    filtered
}

#[derive(Debug, Clone)]
pub struct StrideEstimator {
    coefficient: f32,
    bounds: Option<StrideBounds>,
}

impl Default for StrideEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_STRIDE_COEFFICIENT)
    }
}

impl StrideEstimator {
    pub fn new(coefficient: f32) -> Self {
        Self { coefficient, bounds: None }
    }

    pub fn with_bounds(mut self, bounds: Option<StrideBounds>) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn coefficient(&self) -> f32 {
        self.coefficient
    }

    /// Stride length in meters for one step's acceleration magnitudes.
    /// Returns 0 when fewer than five finite samples are available or the
    /// bounce is too large to represent.
    pub fn estimate(&self, accel_magnitudes: &[f64]) -> f32 {
        let valid: Vec<f64> = accel_magnitudes.iter().copied().filter(|v| v.is_finite()).collect();
        if valid.len() < MIN_STRIDE_SAMPLES {
            trace!(samples = valid.len(), "Too few acceleration samples for stride");
            return 0.0;
        }

        let mut filtered = median_filter3(&valid);
        filtered.sort_by(f64::total_cmp);

        let trim = (filtered.len() as f64 * STRIDE_TRIM_FRACTION).floor() as usize;
        let trimmed = &filtered[trim..filtered.len() - trim];
        let (min, max) = match (trimmed.first(), trimmed.last()) {
            (Some(min), Some(max)) => (*min, *max),
            _ => return 0.0,
        };

        let bounce = (max - min).powf(0.25) as f32;
        let stride = bounce * self.coefficient * 2.0;
        if !stride.is_finite() {
            warn!(min, max, "Acceleration bounce overflows stride, using 0");
            return 0.0;
        }

        match self.bounds {
            Some(bounds) => stride.clamp(bounds.min_m, bounds.max_m),
            None => stride,
        }
    }
}
