//! Session configuration
//!
//! `FusionConfig` is loaded from JSON, validated once, and handed to each
//! component at session start. `ConfigurationManager` applies validated
//! overrides with optional rollback.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::core::constants::*;

/// Interpretation of the heading carried by each step event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HeadingConvention {
    /// 0 = east, counter-clockwise positive; used as-is
    #[default]
    EastCounterClockwise,
    /// Compass azimuth, 0 = north, clockwise positive; converted with π/2 − h
    Azimuth,
}

/// Which estimator implementation backs a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    #[default]
    Kalman,
    BatchWindow,
    Particle,
}

/// How gated-in fixes are weighted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrustStrategy {
    /// Distance gate only; fixes are fused with their stated covariance
    HardGate,
    /// Distance gate, then covariance inflated by Mahalanobis band
    #[default]
    Graduated,
}

/// Lower and upper bound applied to estimated strides
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrideBounds {
    pub min_m: f32,
    pub max_m: f32,
}

/// Pedestrian dead reckoning parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdrConfig {
    /// Weinberg coefficient K
    pub stride_coefficient: f32,
    /// Fixed stride length; bypasses the bounce estimator when set (meters)
    pub manual_stride_m: Option<f32>,
    /// Optional clamp on estimated stride
    pub stride_bounds: Option<StrideBounds>,
    pub heading_convention: HeadingConvention,
    /// Elevation readings median-filtered into the start baseline
    pub calibration_samples: usize,
    /// Sliding window of relative elevation readings
    pub elevation_memory: usize,
    /// Building floor height (meters)
    pub floor_height_m: f32,
    /// Deviation beyond one floor height before a floor change fires (meters)
    pub floor_margin_m: f32,
}

/// Vertical conveyance detection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevatorConfig {
    /// Acceleration window length (samples)
    pub accel_samples: usize,
    /// Mean vertical acceleration required (m/s²)
    pub movement_threshold: f32,
    /// Mean horizontal acceleration ceiling (m/s²)
    pub horizontal_epsilon: f32,
    /// Consecutive positive detections before confirmation
    pub debounce_count: u32,
}

/// Position estimator parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub kind: EstimatorKind,
    /// Variance on each axis at start and after a reset (m²)
    pub initial_variance: f64,
    /// Variance added on each axis per step (m²)
    pub process_variance: f64,
    /// Default wireless fix variance (m²)
    pub wireless_variance: f64,
    /// Default satellite fix variance (m²)
    pub satellite_variance: f64,
    /// Force P symmetric after each update
    pub symmetrize_covariance: bool,
    /// Fixes retained by the batch window estimator
    pub batch_window: usize,
    pub particle_count: usize,
    /// Seed for the particle estimator; entropy-seeded when absent
    pub particle_seed: Option<u64>,
}

/// Outlier gating and trust parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatingConfig {
    /// Fixes farther than this from the fused position are outliers (meters)
    pub outlier_distance_m: f64,
    pub trust_strategy: TrustStrategy,
}

/// Complete session configuration, resolved once at session start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub pdr: PdrConfig,
    pub elevator: ElevatorConfig,
    pub estimator: EstimatorConfig,
    pub gating: GatingConfig,
    /// Fused positions retained in the trajectory history
    pub trajectory_capacity: usize,
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Invalid parameter value
    InvalidParameter { parameter: String, value: String, reason: String },
    /// Configuration file I/O error
    IoError { message: String },
    /// JSON serialization/deserialization error
    SerializationError { message: String },
}

/// Outcome of validating a configuration
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<ConfigError>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

impl Default for PdrConfig {
    fn default() -> Self {
        Self {
            stride_coefficient: DEFAULT_STRIDE_COEFFICIENT,
            manual_stride_m: None,
            stride_bounds: None,
            heading_convention: HeadingConvention::default(),
            calibration_samples: DEFAULT_CALIBRATION_SAMPLES,
            elevation_memory: DEFAULT_ELEVATION_MEMORY,
            floor_height_m: DEFAULT_FLOOR_HEIGHT_M,
            floor_margin_m: DEFAULT_FLOOR_MARGIN_M,
        }
    }
}

impl Default for ElevatorConfig {
    fn default() -> Self {
        Self {
            accel_samples: DEFAULT_ACCEL_SAMPLES,
            movement_threshold: DEFAULT_MOVEMENT_THRESHOLD,
            horizontal_epsilon: DEFAULT_HORIZONTAL_EPSILON,
            debounce_count: DEFAULT_ELEVATOR_DEBOUNCE,
        }
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            kind: EstimatorKind::default(),
            initial_variance: DEFAULT_INITIAL_VARIANCE,
            process_variance: DEFAULT_PROCESS_VARIANCE,
            wireless_variance: DEFAULT_WIRELESS_VARIANCE,
            satellite_variance: DEFAULT_SATELLITE_VARIANCE,
            symmetrize_covariance: true,
            batch_window: 10,
            particle_count: 200,
            particle_seed: None,
        }
    }
}

impl Default for GatingConfig {
    fn default() -> Self {
        Self {
            outlier_distance_m: DEFAULT_OUTLIER_DISTANCE_M,
            trust_strategy: TrustStrategy::default(),
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            pdr: PdrConfig::default(),
            elevator: ElevatorConfig::default(),
            estimator: EstimatorConfig::default(),
            gating: GatingConfig::default(),
            trajectory_capacity: 1000,
        }
    }
}

fn invalid(parameter: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidParameter {
        parameter: parameter.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn positive_f32(parameter: &str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(parameter, value, "Must be a positive finite number"));
    }
    Ok(())
}

fn positive_f64(parameter: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(parameter, value, "Must be a positive finite number"));
    }
    Ok(())
}

fn buffer_capacity(parameter: &str, value: usize) -> Result<(), ConfigError> {
    if value == 0 || value > 10_000 {
        return Err(invalid(parameter, value, "Buffer capacity must be between 1 and 10000"));
    }
    Ok(())
}

fn check_stride_coefficient(value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 || value > 2.0 {
        return Err(invalid("stride_coefficient", value, "Stride coefficient must be in (0, 2]"));
    }
    Ok(())
}

fn check_manual_stride(value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 || value > 2.5 {
        return Err(invalid("manual_stride_m", value, "Manual stride must be in (0, 2.5] meters"));
    }
    Ok(())
}

impl FusionConfig {
    /// Load and validate a configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
            message: format!("Failed to read config file '{}': {}", path_str, e),
        })?;

        let config: FusionConfig = serde_json::from_str(&content).map_err(|e| {
            ConfigError::SerializationError {
                message: format!("Failed to parse config file '{}': {}", path_str, e),
            }
        })?;

        let report = config.validate();
        if let Some(error) = report.errors.into_iter().next() {
            return Err(error);
        }
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let content = serde_json::to_string_pretty(self).map_err(|e| {
            ConfigError::SerializationError {
                message: format!("Failed to serialize config: {}", e),
            }
        })?;

        fs::write(&path, content).map_err(|e| ConfigError::IoError {
            message: format!("Failed to write config file '{}': {}", path_str, e),
        })
    }

    /// Default variance (m²) for fixes of the given source
    pub fn default_fix_variance(&self, source: crate::core::FixSource) -> f64 {
        match source {
            crate::core::FixSource::Wireless => self.estimator.wireless_variance,
            crate::core::FixSource::Satellite => self.estimator.satellite_variance,
        }
    }

    /// Validate all parameters
    pub fn validate(&self) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut suggestions = Vec::new();

        let pdr = &self.pdr;
        if let Err(e) = check_stride_coefficient(pdr.stride_coefficient) {
            errors.push(e);
        } else if !(0.3..=0.6).contains(&pdr.stride_coefficient) {
            warnings.push(format!(
                "Stride coefficient {} is outside the typical 0.3-0.6 range",
                pdr.stride_coefficient
            ));
            suggestions.push("Calibrate K against a walked distance of known length".to_string());
        }
        if let Some(stride) = pdr.manual_stride_m {
            if let Err(e) = check_manual_stride(stride) {
                errors.push(e);
            }
        }
        if let Some(bounds) = pdr.stride_bounds {
            if !bounds.min_m.is_finite() || !bounds.max_m.is_finite() || bounds.min_m < 0.0 || bounds.min_m >= bounds.max_m {
                errors.push(invalid(
                    "stride_bounds",
                    format!("[{}, {}]", bounds.min_m, bounds.max_m),
                    "Stride bounds must satisfy 0 <= min < max",
                ));
            }
        }
        if pdr.calibration_samples == 0 || pdr.calibration_samples > 100 {
            errors.push(invalid(
                "calibration_samples",
                pdr.calibration_samples,
                "Calibration needs between 1 and 100 readings",
            ));
        }
        if let Err(e) = buffer_capacity("elevation_memory", pdr.elevation_memory) {
            errors.push(e);
        }
        if let Err(e) = positive_f32("floor_height_m", pdr.floor_height_m) {
            errors.push(e);
        } else if pdr.floor_height_m < 2.0 || pdr.floor_height_m > 10.0 {
            warnings.push(format!("Floor height {} m is unusual for a building", pdr.floor_height_m));
        }
        if !pdr.floor_margin_m.is_finite() || pdr.floor_margin_m < 0.0 {
            errors.push(invalid("floor_margin_m", pdr.floor_margin_m, "Margin must be non-negative"));
        }

        let elevator = &self.elevator;
        if let Err(e) = buffer_capacity("accel_samples", elevator.accel_samples) {
            errors.push(e);
        }
        if let Err(e) = positive_f32("movement_threshold", elevator.movement_threshold) {
            errors.push(e);
        }
        if let Err(e) = positive_f32("horizontal_epsilon", elevator.horizontal_epsilon) {
            errors.push(e);
        }
        if elevator.debounce_count == 0 {
            errors.push(invalid("debounce_count", 0, "At least one detection is required"));
        } else if elevator.debounce_count == 1 {
            warnings.push("Elevator debounce of 1 confirms on a single noisy window".to_string());
        }

        let estimator = &self.estimator;
        for (name, value) in [
            ("initial_variance", estimator.initial_variance),
            ("process_variance", estimator.process_variance),
            ("wireless_variance", estimator.wireless_variance),
            ("satellite_variance", estimator.satellite_variance),
        ] {
            if let Err(e) = positive_f64(name, value) {
                errors.push(e);
            }
        }
        if estimator.batch_window == 0 {
            errors.push(invalid("batch_window", 0, "Window must hold at least one fix"));
        }
        if estimator.particle_count < 10 {
            errors.push(invalid(
                "particle_count",
                estimator.particle_count,
                "Particle filter needs at least 10 particles",
            ));
        }

        if let Err(e) = positive_f64("outlier_distance_m", self.gating.outlier_distance_m) {
            errors.push(e);
        } else if self.gating.outlier_distance_m < 5.0 {
            warnings.push(format!(
                "Outlier distance {} m will reject most wireless fixes",
                self.gating.outlier_distance_m
            ));
            suggestions.push("Use at least 10 m for indoor wireless positioning".to_string());
        }

        if self.trajectory_capacity == 0 {
            errors.push(invalid("trajectory_capacity", 0, "History must hold at least one point"));
        }

        ValidationReport {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            suggestions,
        }
    }
}

/// Holds the active configuration and applies validated runtime overrides
pub struct ConfigurationManager {
    config: FusionConfig,
    config_file_path: Option<String>,
    is_modified: bool,
}

impl Default for ConfigurationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationManager {
    pub fn new() -> Self {
        Self {
            config: FusionConfig::default(),
            config_file_path: None,
            is_modified: false,
        }
    }

    pub fn with_config(config: FusionConfig) -> Result<Self, ConfigError> {
        let report = config.validate();
        if let Some(error) = report.errors.into_iter().next() {
            return Err(error);
        }
        Ok(Self {
            config,
            config_file_path: None,
            is_modified: false,
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut manager = Self::new();
        manager.load_from_file(path)?;
        Ok(manager)
    }

    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        self.config = FusionConfig::from_file(&path)?;
        self.config_file_path = Some(path_str);
        self.is_modified = false;
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError> {
        self.config.save_to_file(&path)?;
        self.config_file_path = Some(path.as_ref().to_string_lossy().to_string());
        self.is_modified = false;
        Ok(())
    }

    /// Save to the currently loaded file path
    pub fn save(&mut self) -> Result<(), ConfigError> {
        if let Some(path) = self.config_file_path.clone() {
            self.save_to_file(path)
        } else {
            Err(ConfigError::IoError {
                message: "No file path set for saving configuration".to_string(),
            })
        }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn is_modified(&self) -> bool {
        self.is_modified
    }

    /// Update the stride coefficient; returns the previous value
    pub fn set_stride_coefficient(&mut self, value: f32) -> Result<f32, ConfigError> {
        check_stride_coefficient(value)?;
        let old = std::mem::replace(&mut self.config.pdr.stride_coefficient, value);
        self.is_modified = true;
        Ok(old)
    }

    pub fn set_manual_stride(&mut self, value: Option<f32>) -> Result<Option<f32>, ConfigError> {
        if let Some(stride) = value {
            check_manual_stride(stride)?;
        }
        let old = std::mem::replace(&mut self.config.pdr.manual_stride_m, value);
        self.is_modified = true;
        Ok(old)
    }

    pub fn set_elevation_memory(&mut self, value: usize) -> Result<usize, ConfigError> {
        buffer_capacity("elevation_memory", value)?;
        let old = std::mem::replace(&mut self.config.pdr.elevation_memory, value);
        self.is_modified = true;
        Ok(old)
    }

    pub fn set_floor_height(&mut self, value: f32) -> Result<f32, ConfigError> {
        positive_f32("floor_height_m", value)?;
        let old = std::mem::replace(&mut self.config.pdr.floor_height_m, value);
        self.is_modified = true;
        Ok(old)
    }

    pub fn set_accel_samples(&mut self, value: usize) -> Result<usize, ConfigError> {
        buffer_capacity("accel_samples", value)?;
        let old = std::mem::replace(&mut self.config.elevator.accel_samples, value);
        self.is_modified = true;
        Ok(old)
    }

    pub fn set_movement_threshold(&mut self, value: f32) -> Result<f32, ConfigError> {
        positive_f32("movement_threshold", value)?;
        let old = std::mem::replace(&mut self.config.elevator.movement_threshold, value);
        self.is_modified = true;
        Ok(old)
    }

    pub fn set_horizontal_epsilon(&mut self, value: f32) -> Result<f32, ConfigError> {
        positive_f32("horizontal_epsilon", value)?;
        let old = std::mem::replace(&mut self.config.elevator.horizontal_epsilon, value);
        self.is_modified = true;
        Ok(old)
    }

    pub fn set_elevator_debounce(&mut self, value: u32) -> Result<u32, ConfigError> {
        if value == 0 {
            return Err(invalid("debounce_count", value, "At least one detection is required"));
        }
        let old = std::mem::replace(&mut self.config.elevator.debounce_count, value);
        self.is_modified = true;
        Ok(old)
    }

    pub fn set_outlier_distance(&mut self, value: f64) -> Result<f64, ConfigError> {
        positive_f64("outlier_distance_m", value)?;
        let old = std::mem::replace(&mut self.config.gating.outlier_distance_m, value);
        self.is_modified = true;
        Ok(old)
    }

    /// Apply several overrides at once, optionally rolling back on any failure
    pub fn update_parameters(&mut self, updates: ParameterUpdates) -> Result<ParameterUpdateResult, ConfigError> {
        let original_config = self.config.clone();
        let original_modified = self.is_modified;

        let mut applied_updates = Vec::new();
        let mut failed_updates = Vec::new();

        macro_rules! apply {
            ($field:expr, $setter:ident, $label:literal) => {
                if let Some(value) = $field {
                    match self.$setter(value) {
                        Ok(old) => applied_updates.push(format!("{}: {:?} -> {:?}", $label, old, value)),
                        Err(e) => failed_updates.push(format!("{}: {}", $label, e)),
                    }
                }
            };
        }

        apply!(updates.stride_coefficient, set_stride_coefficient, "stride_coefficient");
        if let Some(stride) = updates.manual_stride_m {
            match self.set_manual_stride(stride) {
                Ok(old) => applied_updates.push(format!("manual_stride: {:?} -> {:?}", old, stride)),
                Err(e) => failed_updates.push(format!("manual_stride: {}", e)),
            }
        }
        apply!(updates.elevation_memory, set_elevation_memory, "elevation_memory");
        apply!(updates.floor_height_m, set_floor_height, "floor_height");
        apply!(updates.accel_samples, set_accel_samples, "accel_samples");
        apply!(updates.movement_threshold, set_movement_threshold, "movement_threshold");
        apply!(updates.horizontal_epsilon, set_horizontal_epsilon, "horizontal_epsilon");
        apply!(updates.elevator_debounce, set_elevator_debounce, "elevator_debounce");
        apply!(updates.outlier_distance_m, set_outlier_distance, "outlier_distance");

        if !failed_updates.is_empty() && updates.rollback_on_failure {
            self.config = original_config;
            self.is_modified = original_modified;

            return Err(ConfigError::InvalidParameter {
                parameter: "batch_update".to_string(),
                value: "multiple".to_string(),
                reason: format!(
                    "Batch update failed with {} errors, rolled back all changes: {}",
                    failed_updates.len(),
                    failed_updates.join("; ")
                ),
            });
        }

        Ok(ParameterUpdateResult {
            total_updates: updates.count_updates(),
            applied_updates,
            failed_updates,
        })
    }
}

/// Batch parameter updates
#[derive(Debug, Default)]
pub struct ParameterUpdates {
    pub stride_coefficient: Option<f32>,
    /// `Some(None)` clears a manual stride
    pub manual_stride_m: Option<Option<f32>>,
    pub elevation_memory: Option<usize>,
    pub floor_height_m: Option<f32>,
    pub accel_samples: Option<usize>,
    pub movement_threshold: Option<f32>,
    pub horizontal_epsilon: Option<f32>,
    pub elevator_debounce: Option<u32>,
    pub outlier_distance_m: Option<f64>,
    /// Whether to rollback all changes if any update fails
    pub rollback_on_failure: bool,
}

/// Result of a batch parameter update
#[derive(Debug)]
pub struct ParameterUpdateResult {
    pub applied_updates: Vec<String>,
    pub failed_updates: Vec<String>,
    pub total_updates: usize,
}

impl ParameterUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stride_coefficient(mut self, value: f32) -> Self {
        self.stride_coefficient = Some(value);
        self
    }

    pub fn with_manual_stride(mut self, value: Option<f32>) -> Self {
        self.manual_stride_m = Some(value);
        self
    }

    pub fn with_elevation_memory(mut self, value: usize) -> Self {
        self.elevation_memory = Some(value);
        self
    }

    pub fn with_floor_height(mut self, value: f32) -> Self {
        self.floor_height_m = Some(value);
        self
    }

    pub fn with_accel_samples(mut self, value: usize) -> Self {
        self.accel_samples = Some(value);
        self
    }

    pub fn with_movement_threshold(mut self, value: f32) -> Self {
        self.movement_threshold = Some(value);
        self
    }

    pub fn with_horizontal_epsilon(mut self, value: f32) -> Self {
        self.horizontal_epsilon = Some(value);
        self
    }

    pub fn with_elevator_debounce(mut self, value: u32) -> Self {
        self.elevator_debounce = Some(value);
        self
    }

    pub fn with_outlier_distance(mut self, value: f64) -> Self {
        self.outlier_distance_m = Some(value);
        self
    }

    /// Enable rollback on failure
    pub fn with_rollback_on_failure(mut self) -> Self {
        self.rollback_on_failure = true;
        self
    }

    pub fn count_updates(&self) -> usize {
        [
            self.stride_coefficient.is_some(),
            self.manual_stride_m.is_some(),
            self.elevation_memory.is_some(),
            self.floor_height_m.is_some(),
            self.accel_samples.is_some(),
            self.movement_threshold.is_some(),
            self.horizontal_epsilon.is_some(),
            self.elevator_debounce.is_some(),
            self.outlier_distance_m.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidParameter { parameter, value, reason } => {
                write!(f, "Invalid parameter '{}' = '{}': {}", parameter, value, reason)
            }
            ConfigError::IoError { message } => write!(f, "I/O error: {}", message),
            ConfigError::SerializationError { message } => {
                write!(f, "Serialization error: {}", message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
