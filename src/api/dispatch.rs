//! Serialized sensor events and the thread-safe session handle
//!
//! Sensor callbacks arrive on several threads. Each one is expressed as a
//! [`FusionEvent`] and applied to the session under a single lock, so a
//! step and a fix never interleave inside the estimator.

use std::sync::Arc;

use nalgebra::Matrix2;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::algorithms::elevation::ElevationUpdate;
use crate::api::conveyance::ConveyanceState;
use crate::api::session::FusionSession;
use crate::api::types::{FixDisposition, JointFixOutcome, Tag};
use crate::core::{AbsoluteFix, FixSource, GeoPoint, MotionSample, StepDisplacement};
use crate::utils::config::FusionConfig;
use crate::validation::error::FusionResult;

/// Absolute fix as it appears on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixSpec {
    pub latitude: f64,
    pub longitude: f64,
    pub source: FixSource,
    /// One-sigma horizontal accuracy (meters)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_m: Option<f64>,
    /// Row-major 2x2 covariance (m²); wins over `accuracy_m`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub covariance: Option<[f64; 4]>,
}

impl FixSpec {
    pub fn new(latitude: f64, longitude: f64, source: FixSource) -> Self {
        Self {
            latitude,
            longitude,
            source,
            accuracy_m: None,
            covariance: None,
        }
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }

    fn resolve(&self, session: &FusionSession) -> FusionResult<AbsoluteFix> {
        let position = GeoPoint::new(self.latitude, self.longitude)?;
        match (self.covariance, self.accuracy_m) {
            (Some(c), _) => Ok(AbsoluteFix::new(
                position,
                Matrix2::new(c[0], c[1], c[2], c[3]),
                self.source,
            )),
            (None, Some(accuracy_m)) => session.fix_with_accuracy(position, accuracy_m, self.source),
            (None, None) => Ok(session.default_fix(position, self.source)),
        }
    }
}

/// One sensor or control event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FusionEvent {
    Start { latitude: f64, longitude: f64 },
    Stop,
    Step {
        timestamp_ms: u64,
        #[serde(default)]
        accel_magnitudes: Vec<f64>,
        heading_rad: f32,
    },
    Elevation { elevation_m: f32 },
    Acceleration { gravity: Vec<f64>, linear: Vec<f64> },
    Fix(FixSpec),
    JointFix { satellite: FixSpec, wireless: FixSpec },
    Tag {
        #[serde(default)]
        label: Option<String>,
    },
}

/// Result of applying one [`FusionEvent`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EventOutcome {
    Started,
    Stopped,
    Step { dx: f32, dy: f32 },
    Elevation { relative_elevation_m: f32, floor_change: Option<i32> },
    Conveyance { state: ConveyanceState },
    Fix { disposition: FixDisposition },
    JointFix { satellite: FixDisposition, wireless: FixDisposition },
    Tagged { tag: Tag },
}

impl From<StepDisplacement> for EventOutcome {
    fn from(d: StepDisplacement) -> Self {
        EventOutcome::Step { dx: d.dx, dy: d.dy }
    }
}

impl From<ElevationUpdate> for EventOutcome {
    fn from(update: ElevationUpdate) -> Self {
        EventOutcome::Elevation {
            relative_elevation_m: update.relative_elevation,
            floor_change: update.floor_change,
        }
    }
}

impl From<JointFixOutcome> for EventOutcome {
    fn from(outcome: JointFixOutcome) -> Self {
        EventOutcome::JointFix {
            satellite: outcome.satellite,
            wireless: outcome.wireless,
        }
    }
}

impl FusionSession {
    /// Apply one event
    pub fn dispatch(&mut self, event: FusionEvent) -> FusionResult<EventOutcome> {
        match event {
            FusionEvent::Start { latitude, longitude } => {
                self.start(GeoPoint::new(latitude, longitude)?)?;
                Ok(EventOutcome::Started)
            }
            FusionEvent::Stop => {
                self.stop();
                Ok(EventOutcome::Stopped)
            }
            FusionEvent::Step {
                timestamp_ms,
                accel_magnitudes,
                heading_rad,
            } => {
                let sample = MotionSample::new(timestamp_ms, accel_magnitudes, heading_rad);
                self.on_step(&sample).map(EventOutcome::from)
            }
            FusionEvent::Elevation { elevation_m } => self.on_elevation(elevation_m).map(EventOutcome::from),
            FusionEvent::Acceleration { gravity, linear } => {
                let state = self.on_acceleration(&gravity, &linear)?;
                Ok(EventOutcome::Conveyance { state })
            }
            FusionEvent::Fix(spec) => {
                let fix = spec.resolve(self)?;
                let disposition = self.on_absolute_fix(&fix)?;
                Ok(EventOutcome::Fix { disposition })
            }
            FusionEvent::JointFix { satellite, wireless } => {
                let satellite = satellite.resolve(self)?;
                let wireless = wireless.resolve(self)?;
                self.on_joint_fix(&satellite, &wireless).map(EventOutcome::from)
            }
            FusionEvent::Tag { label } => {
                let tag = self.add_tag(label)?;
                Ok(EventOutcome::Tagged { tag })
            }
        }
    }
}

/// Cloneable handle that serializes access to one session
#[derive(Clone, Debug)]
pub struct SharedSession {
    inner: Arc<Mutex<FusionSession>>,
}

impl SharedSession {
    pub fn new(config: FusionConfig) -> FusionResult<Self> {
        Ok(Self::from_session(FusionSession::new(config)?))
    }

    pub fn from_session(session: FusionSession) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    pub fn dispatch(&self, event: FusionEvent) -> FusionResult<EventOutcome> {
        self.inner.lock().dispatch(event)
    }

    /// Lock for direct queries; hold the guard briefly
    pub fn lock(&self) -> MutexGuard<'_, FusionSession> {
        self.inner.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_event_json_shape() {
        let json = r#"[
            {"type": "start", "latitude": 55.9229, "longitude": -3.1745},
            {"type": "step", "timestamp_ms": 500, "heading_rad": 0.0},
            {"type": "fix", "latitude": 55.9229, "longitude": -3.1744, "source": "wireless", "accuracy_m": 3.0},
            {"type": "tag"},
            {"type": "stop"}
        ]"#;
        let events: Vec<FusionEvent> = serde_json::from_str(json).unwrap();
        assert_eq!(events.len(), 5);
        assert_eq!(
            events[2],
            FusionEvent::Fix(FixSpec::new(55.9229, -3.1744, FixSource::Wireless).with_accuracy(3.0))
        );
        assert_eq!(events[3], FusionEvent::Tag { label: None });
    }

    #[test]
    fn test_dispatch_sequence() {
        let mut config = FusionConfig::default();
        config.pdr.manual_stride_m = Some(0.7);
        let mut session = FusionSession::new(config).unwrap();

        assert_eq!(
            session
                .dispatch(FusionEvent::Start { latitude: 55.9229, longitude: -3.1745 })
                .unwrap(),
            EventOutcome::Started
        );
        let outcome = session
            .dispatch(FusionEvent::Step {
                timestamp_ms: 500,
                accel_magnitudes: vec![],
                heading_rad: 0.0,
            })
            .unwrap();
        assert!(matches!(outcome, EventOutcome::Step { dx, .. } if (dx - 0.7).abs() < 1e-6));

        let fix = FusionEvent::Fix(FixSpec::new(55.9229, -3.1745, FixSource::Satellite));
        assert_eq!(
            session.dispatch(fix).unwrap(),
            EventOutcome::Fix { disposition: FixDisposition::Applied }
        );
        assert!(matches!(
            session.dispatch(FusionEvent::Tag { label: Some("door".into()) }).unwrap(),
            EventOutcome::Tagged { .. }
        ));
    }

    #[test]
    fn test_explicit_covariance_wins() {
        let mut session = FusionSession::new(FusionConfig::default()).unwrap();
        session
            .dispatch(FusionEvent::Start { latitude: 10.0, longitude: 10.0 })
            .unwrap();
        let mut spec = FixSpec::new(10.0, 10.0, FixSource::Wireless).with_accuracy(1.0);
        spec.covariance = Some([1.0, 5.0, 5.0, 1.0]);
        assert!(session.dispatch(FusionEvent::Fix(spec)).is_err());
    }

    #[test]
    fn test_shared_session_across_threads() {
        let mut config = FusionConfig::default();
        config.pdr.manual_stride_m = Some(0.5);
        let shared = SharedSession::new(config).unwrap();
        shared
            .dispatch(FusionEvent::Start { latitude: 48.0, longitude: 11.0 })
            .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let shared = shared.clone();
                thread::spawn(move || {
                    for i in 0..25 {
                        shared
                            .dispatch(FusionEvent::Step {
                                timestamp_ms: t * 1000 + i,
                                accel_magnitudes: vec![],
                                heading_rad: 0.0,
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let session = shared.lock();
        assert_eq!(session.stats().steps, 100);
        assert!((session.pdr_position().x - 50.0).abs() < 1e-3);
    }
}
