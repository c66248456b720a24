//! Output types exposed by the fusion session

use serde::{Deserialize, Serialize};

use crate::core::{FixSource, GeoPoint, PlanarPoint};

/// Fused position in both frames with its DRMS accuracy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusedPosition {
    pub position: GeoPoint,
    pub planar: PlanarPoint,
    /// sqrt(P00 + P11) in meters
    pub accuracy_m: f64,
}

/// What happened to an absolute fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixDisposition {
    /// Fused into the estimate
    Applied,
    /// Beyond the outlier distance; not fused
    Outlier,
    /// Ignored while riding a vertical conveyance
    Suspended,
    /// Used to hard-reset the estimate after a conveyance ride
    Recovered,
    /// Arrived while the session was not recording
    Dropped,
    /// Skipped because the update hit a numeric fault
    Rejected,
}

impl FixDisposition {
    /// Whether the fix changed the estimate
    pub fn was_fused(&self) -> bool {
        matches!(self, FixDisposition::Applied | FixDisposition::Recovered)
    }
}

/// Outcome of a combined satellite + wireless update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JointFixOutcome {
    pub satellite: FixDisposition,
    pub wireless: FixDisposition,
}

/// Most recent outlier decision per fix source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutlierFlags {
    pub wireless: bool,
    pub satellite: bool,
}

impl OutlierFlags {
    pub fn set(&mut self, source: FixSource, is_outlier: bool) {
        match source {
            FixSource::Wireless => self.wireless = is_outlier,
            FixSource::Satellite => self.satellite = is_outlier,
        }
    }

    pub fn get(&self, source: FixSource) -> bool {
        match source {
            FixSource::Wireless => self.wireless,
            FixSource::Satellite => self.satellite,
        }
    }

    pub fn any(&self) -> bool {
        self.wireless || self.satellite
    }
}

/// One entry of the fused trajectory history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub timestamp_ms: u64,
    pub position: GeoPoint,
    pub accuracy_m: f64,
    pub floor: i32,
}

/// User-marked point on the trajectory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub timestamp_ms: u64,
    pub position: GeoPoint,
    /// Elevation relative to the session start (meters)
    pub elevation_m: f32,
    pub floor: i32,
    pub label: Option<String>,
}

/// Running counters for a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub steps: u64,
    pub fixes_applied: u32,
    pub fixes_recovered: u32,
    pub outliers: u32,
    pub suspended: u32,
    pub dropped: u32,
    pub rejected: u32,
}

impl SessionStats {
    pub fn record(&mut self, disposition: FixDisposition) {
        let counter = match disposition {
            FixDisposition::Applied => &mut self.fixes_applied,
            FixDisposition::Outlier => &mut self.outliers,
            FixDisposition::Suspended => &mut self.suspended,
            FixDisposition::Recovered => &mut self.fixes_recovered,
            FixDisposition::Dropped => &mut self.dropped,
            FixDisposition::Rejected => &mut self.rejected,
        };
        *counter += 1;
    }
}
