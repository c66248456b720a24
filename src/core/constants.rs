//! Physical constants and default tuning parameters

/// Meters per degree of latitude used by the local planar approximation
pub const DEGREE_IN_METERS: f64 = 111_111.0;

/// Mean Earth radius (meters) for great-circle distance
pub const EARTH_MEAN_RADIUS_M: f64 = 6_371_008.8;

/// Standard gravity (m/s²)
pub const STANDARD_GRAVITY: f32 = 9.806_65;

/// Weinberg stride coefficient
pub const DEFAULT_STRIDE_COEFFICIENT: f32 = 0.4;

/// Minimum number of acceleration samples for a stride estimate
pub const MIN_STRIDE_SAMPLES: usize = 5;

/// Fraction trimmed from each tail of the acceleration window
pub const STRIDE_TRIM_FRACTION: f64 = 0.05;

/// Elevation readings used to compute the start baseline
pub const DEFAULT_CALIBRATION_SAMPLES: usize = 5;

/// Barometric elevation window (samples at ~1 Hz)
pub const DEFAULT_ELEVATION_MEMORY: usize = 4;

/// Absolute elevation readings beyond this magnitude are rejected
pub const MAX_ABS_ELEVATION_M: f32 = 10_000.0;

/// Building floor height (meters)
pub const DEFAULT_FLOOR_HEIGHT_M: f32 = 4.0;

/// Extra deviation beyond one floor height before a floor change fires
pub const DEFAULT_FLOOR_MARGIN_M: f32 = 0.05;

/// Acceleration window for elevator detection (samples at ~100 Hz)
pub const DEFAULT_ACCEL_SAMPLES: usize = 100;

/// Mean vertical acceleration above which movement is significant
pub const DEFAULT_MOVEMENT_THRESHOLD: f32 = 0.28;

/// Mean horizontal acceleration below which movement is considered absent
pub const DEFAULT_HORIZONTAL_EPSILON: f32 = 0.17;

/// Consecutive positive detections before the elevator state is confirmed
pub const DEFAULT_ELEVATOR_DEBOUNCE: u32 = 4;

/// Fixes farther than this from the fused estimate are outliers (meters)
pub const DEFAULT_OUTLIER_DISTANCE_M: f64 = 15.0;

/// Graduated trust bands: (Mahalanobis distance², covariance scale)
pub const TRUST_BANDS: [(f64, f64); 3] = [(12.0, 10.0), (9.21, 5.0), (5.0, 2.0)];

/// Initial position variance (m²) on each axis
pub const DEFAULT_INITIAL_VARIANCE: f64 = 2.0;

/// Per-step process noise variance (m²) on each axis
pub const DEFAULT_PROCESS_VARIANCE: f64 = 0.5;

/// Wireless positioning variance (m²) on each axis
pub const DEFAULT_WIRELESS_VARIANCE: f64 = 2.0;

/// Satellite positioning variance (m²) on each axis
pub const DEFAULT_SATELLITE_VARIANCE: f64 = 5.0;
