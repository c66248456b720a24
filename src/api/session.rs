//! Fusion session orchestrator
//!
//! A session owns one PDR pipeline, one estimator and one coordinate
//! transform. Step displacements drive `predict`; absolute fixes are
//! converted to the local frame, gated, and fused. While a vertical
//! conveyance ride is confirmed fixes are suspended, and the first good
//! fix after the ride hard-resets the estimate.

use std::collections::VecDeque;

use nalgebra::Matrix2;
use tracing::{debug, info, warn};

use crate::algorithms::coordinates::CoordinateTransform;
use crate::algorithms::elevation::ElevationUpdate;
use crate::algorithms::pdr::{PdrPhase, PdrPipeline};
use crate::api::callback::{CallbackHandle, CallbackRegistry, EventCallback, SessionEvent};
use crate::api::conveyance::{ConveyanceState, ConveyanceTracker, ConveyanceTransition};
use crate::api::types::{
    FixDisposition, FusedPosition, JointFixOutcome, OutlierFlags, SessionStats, Tag, TrajectoryPoint,
};
use crate::core::{AbsoluteFix, FixSource, GeoPoint, MotionSample, PlanarPoint, StepDisplacement};
use crate::processing::estimator::{build_estimator, EstimatorState, Observation, PositionEstimator};
use crate::processing::trust::{scale_for_trust, OutlierGate};
use crate::utils::config::FusionConfig;
use crate::validation::data::InputValidator;
use crate::validation::error::{FusionError, FusionResult};

pub struct FusionSession {
    config: FusionConfig,
    validator: InputValidator,
    transform: CoordinateTransform,
    pdr: PdrPipeline,
    estimator: Option<Box<dyn PositionEstimator>>,
    gate: OutlierGate,
    conveyance: ConveyanceTracker,
    /// Set when a conveyance ride ends; cleared by the next good fix
    recovery_pending: bool,
    recording: bool,
    outlier_flags: OutlierFlags,
    trajectory: VecDeque<TrajectoryPoint>,
    tags: Vec<Tag>,
    last_timestamp_ms: u64,
    stats: SessionStats,
    callbacks: CallbackRegistry,
}

impl FusionSession {
    /// Create an idle session; the configuration is validated once here
    pub fn new(config: FusionConfig) -> FusionResult<Self> {
        let report = config.validate();
        if let Some(error) = report.errors.into_iter().next() {
            return Err(error.into());
        }
        for warning in &report.warnings {
            warn!(%warning, "Configuration warning");
        }

        Ok(Self {
            validator: InputValidator::new(),
            transform: CoordinateTransform::new(),
            pdr: PdrPipeline::new(&config),
            estimator: None,
            gate: OutlierGate::new(&config.gating),
            conveyance: ConveyanceTracker::new(config.elevator.debounce_count),
            recovery_pending: false,
            recording: false,
            outlier_flags: OutlierFlags::default(),
            trajectory: VecDeque::with_capacity(config.trajectory_capacity.min(4096)),
            tags: Vec::new(),
            last_timestamp_ms: 0,
            stats: SessionStats::default(),
            callbacks: CallbackRegistry::new(),
            config,
        })
    }

    /// Begin recording from a confirmed start location.
    ///
    /// The start location becomes the frozen planar reference and the
    /// estimator starts there with the initial covariance.
    pub fn start(&mut self, start: GeoPoint) -> FusionResult<()> {
        self.validator.validate_position(&start)?;

        let mut transform = CoordinateTransform::with_reference(start)?;
        let origin = transform.to_planar(&start)?;
        self.transform = transform;

        self.pdr.reset();
        self.estimator = Some(build_estimator(&self.config.estimator, &origin.to_vector()));
        self.conveyance.reset();
        self.recovery_pending = false;
        self.outlier_flags = OutlierFlags::default();
        self.trajectory.clear();
        self.tags.clear();
        self.last_timestamp_ms = 0;
        self.stats = SessionStats::default();
        self.recording = true;

        info!(
            latitude = start.latitude,
            longitude = start.longitude,
            estimator = ?self.config.estimator.kind,
            "Fusion session started"
        );
        self.record_trajectory()?;
        self.callbacks.trigger(SessionEvent::Started {
            latitude: start.latitude,
            longitude: start.longitude,
        });
        Ok(())
    }

    /// Stop recording; later fixes are dropped
    pub fn stop(&mut self) {
        if self.recording {
            self.recording = false;
            info!(steps = self.stats.steps, "Fusion session stopped");
            self.callbacks.trigger(SessionEvent::Stopped);
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Process one detected step
    pub fn on_step(&mut self, sample: &MotionSample) -> FusionResult<StepDisplacement> {
        if !self.recording {
            return Err(FusionError::SessionInactive);
        }
        self.validator.validate_heading(sample.heading_rad)?;

        let displacement = self.pdr.on_step(sample);
        self.estimator_mut()?.predict(&displacement.to_vector());

        self.last_timestamp_ms = self.last_timestamp_ms.max(sample.timestamp_ms);
        self.stats.steps += 1;
        self.record_trajectory()?;
        Ok(displacement)
    }

    /// Process one barometric elevation reading (meters)
    pub fn on_elevation(&mut self, elevation_m: f32) -> FusionResult<ElevationUpdate> {
        if !self.recording {
            return Err(FusionError::SessionInactive);
        }
        let was_calibrating = self.pdr.phase() != PdrPhase::Tracking;
        let update = self.pdr.on_elevation(elevation_m);

        if was_calibrating {
            if let Some(baseline_m) = self.pdr.start_elevation() {
                self.callbacks.trigger(SessionEvent::ElevationCalibrated { baseline_m });
            }
        }
        if let Some(change) = update.floor_change {
            self.callbacks.trigger(SessionEvent::FloorChanged {
                floor: self.pdr.floor(),
                change,
            });
        }
        Ok(update)
    }

    /// Process one gravity and linear acceleration tick (3-vectors, m/s²)
    pub fn on_acceleration(&mut self, gravity: &[f64], linear: &[f64]) -> FusionResult<ConveyanceState> {
        if !self.recording {
            return Err(FusionError::SessionInactive);
        }
        let gravity = self.validator.parse_vector3("gravity", gravity)?;
        let linear = self.validator.parse_vector3("linear_acceleration", linear)?;

        let detected = self.pdr.on_acceleration(&gravity, &linear);
        match self.conveyance.observe(detected) {
            ConveyanceTransition::Entered => {
                info!("Vertical conveyance confirmed, suspending absolute fixes");
                self.callbacks.trigger(SessionEvent::ConveyanceEntered);
            }
            ConveyanceTransition::Exited => {
                info!("Vertical conveyance ended, awaiting recovery fix");
                self.recovery_pending = true;
                self.callbacks.trigger(SessionEvent::ConveyanceExited);
            }
            ConveyanceTransition::Unchanged => {}
        }
        Ok(self.conveyance.state())
    }

    /// Fix carrying the configured default covariance for its source
    pub fn default_fix(&self, position: GeoPoint, source: FixSource) -> AbsoluteFix {
        let variance = self.config.default_fix_variance(source);
        AbsoluteFix::new(position, Matrix2::from_diagonal_element(variance), source)
    }

    /// Fix from a scalar one-sigma accuracy (meters)
    pub fn fix_with_accuracy(&self, position: GeoPoint, accuracy_m: f64, source: FixSource) -> FusionResult<AbsoluteFix> {
        self.validator.validate_accuracy(accuracy_m)?;
        Ok(AbsoluteFix::from_accuracy(position, accuracy_m, source))
    }

    /// Gate and fuse one absolute fix
    pub fn on_absolute_fix(&mut self, fix: &AbsoluteFix) -> FusionResult<FixDisposition> {
        if !self.recording {
            debug!(source = ?fix.source, "Dropping fix, session not recording");
            self.stats.record(FixDisposition::Dropped);
            return Ok(FixDisposition::Dropped);
        }
        self.validator.validate_fix(fix)?;
        let observation = self.observation(fix)?;

        let disposition = match self.screen(fix.source, &observation)? {
            Some(early) => early,
            None if self.recovery_pending => self.recover(&observation)?,
            None => {
                let state = self.estimator_state()?;
                let (weighted, scale) = self.gate.weigh(&state, &observation);
                if scale > 1.0 {
                    debug!(source = ?fix.source, scale, "Inflating fix covariance");
                }
                let result = self.estimator_mut()?.update(&weighted);
                self.settle(result, "absolute fix update")?
            }
        };

        self.finish_fix(fix.source, disposition)?;
        Ok(disposition)
    }

    /// Fuse a satellite and a wireless fix taken at the same time.
    ///
    /// Each fix is gated on its own. When both pass they are fused in one
    /// stacked update with graduated trust scaling; otherwise the survivor
    /// is fused alone.
    pub fn on_joint_fix(&mut self, satellite: &AbsoluteFix, wireless: &AbsoluteFix) -> FusionResult<JointFixOutcome> {
        if !self.recording {
            self.stats.record(FixDisposition::Dropped);
            self.stats.record(FixDisposition::Dropped);
            return Ok(JointFixOutcome {
                satellite: FixDisposition::Dropped,
                wireless: FixDisposition::Dropped,
            });
        }
        self.validator.validate_fix(satellite)?;
        self.validator.validate_fix(wireless)?;
        let sat_obs = self.observation(satellite)?;
        let wifi_obs = self.observation(wireless)?;

        let sat_early = self.screen(FixSource::Satellite, &sat_obs)?;
        let wifi_early = self.screen(FixSource::Wireless, &wifi_obs)?;

        let outcome = match (sat_early, wifi_early) {
            (Some(satellite), Some(wireless)) => JointFixOutcome { satellite, wireless },
            (None, Some(wireless)) => JointFixOutcome {
                satellite: self.fuse_single(&sat_obs)?,
                wireless,
            },
            (Some(satellite), None) => JointFixOutcome {
                satellite,
                wireless: self.fuse_single(&wifi_obs)?,
            },
            (None, None) if self.recovery_pending => {
                // Restart at the tighter of the two fixes
                let best = if sat_obs.covariance.trace() <= wifi_obs.covariance.trace() {
                    &sat_obs
                } else {
                    &wifi_obs
                };
                let disposition = self.recover(best)?;
                JointFixOutcome { satellite: disposition, wireless: disposition }
            }
            (None, None) => {
                let state = self.estimator_state()?;
                let (sat_weighted, _) = scale_for_trust(&state, &sat_obs);
                let (wifi_weighted, _) = scale_for_trust(&state, &wifi_obs);
                let result = self.estimator_mut()?.update_joint(&sat_weighted, &wifi_weighted);
                let disposition = self.settle(result, "joint fix update")?;
                JointFixOutcome { satellite: disposition, wireless: disposition }
            }
        };

        self.finish_fix(FixSource::Satellite, outcome.satellite)?;
        self.finish_fix(FixSource::Wireless, outcome.wireless)?;
        Ok(outcome)
    }

    /// Mark the current fused position
    pub fn add_tag(&mut self, label: Option<String>) -> FusionResult<Tag> {
        let fused = self.fused_position()?;
        let tag = Tag {
            timestamp_ms: self.last_timestamp_ms,
            position: fused.position,
            elevation_m: self.pdr.elevation(),
            floor: self.pdr.floor(),
            label,
        };
        info!(label = ?tag.label, latitude = tag.position.latitude, longitude = tag.position.longitude, "Tag added");
        self.tags.push(tag.clone());
        Ok(tag)
    }

    /// Fused position and its accuracy
    pub fn fused_position(&self) -> FusionResult<FusedPosition> {
        let state = self.estimator_state()?;
        let planar = PlanarPoint::from_vector(&state.position);
        Ok(FusedPosition {
            position: self.transform.to_geographic(&planar)?,
            planar,
            accuracy_m: state.accuracy(),
        })
    }

    /// DRMS accuracy of the fused position (meters)
    pub fn position_accuracy(&self) -> FusionResult<f64> {
        Ok(self.estimator_state()?.accuracy())
    }

    /// Dead-reckoning-only position relative to the start (meters)
    pub fn pdr_position(&self) -> PlanarPoint {
        let (x, y) = self.pdr.position();
        PlanarPoint::new(x as f64, y as f64)
    }

    /// Dead-reckoning-only position in geographic coordinates
    pub fn pdr_geographic(&self) -> FusionResult<GeoPoint> {
        self.transform.to_geographic(&self.pdr_position())
    }

    pub fn elevation(&self) -> f32 {
        self.pdr.elevation()
    }

    pub fn floor(&self) -> i32 {
        self.pdr.floor()
    }

    /// Raw, undebounced elevator flag from the last acceleration tick
    pub fn in_elevator(&self) -> bool {
        self.pdr.in_elevator()
    }

    pub fn conveyance_state(&self) -> ConveyanceState {
        self.conveyance.state()
    }

    /// True while fixes are suspended for a conveyance ride
    pub fn is_fusion_suspended(&self) -> bool {
        self.conveyance.is_confirmed()
    }

    pub fn outlier_flags(&self) -> OutlierFlags {
        self.outlier_flags
    }

    /// Whether the most recent fix of any source was an outlier
    pub fn is_outlier(&self) -> bool {
        self.outlier_flags.any()
    }

    pub fn trajectory(&self) -> impl Iterator<Item = &TrajectoryPoint> {
        self.trajectory.iter()
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn reference(&self) -> Option<&GeoPoint> {
        self.transform.reference()
    }

    /// Mean stride since the previous call
    pub fn take_average_step_length(&mut self) -> f32 {
        self.pdr.take_average_step_length()
    }

    pub fn register_event_callback(&mut self, callback: EventCallback) -> CallbackHandle {
        self.callbacks.register(callback)
    }

    pub fn unregister_callback(&mut self, handle: CallbackHandle) -> bool {
        self.callbacks.unregister(handle)
    }

    fn estimator_mut(&mut self) -> FusionResult<&mut Box<dyn PositionEstimator>> {
        self.estimator.as_mut().ok_or(FusionError::NotInitialized)
    }

    fn estimator_state(&self) -> FusionResult<EstimatorState> {
        self.estimator
            .as_ref()
            .map(|estimator| estimator.state())
            .ok_or(FusionError::NotInitialized)
    }

    fn observation(&mut self, fix: &AbsoluteFix) -> FusionResult<Observation> {
        let planar = self.transform.to_planar(&fix.position)?;
        Ok(Observation::new(planar.to_vector(), fix.covariance))
    }

    /// Suspension and outlier checks; `Some` when the fix must not be fused
    fn screen(&mut self, source: FixSource, observation: &Observation) -> FusionResult<Option<FixDisposition>> {
        if self.conveyance.is_confirmed() {
            return Ok(Some(FixDisposition::Suspended));
        }

        let fused = self.estimator_state()?.position;
        let outlier = self.gate.is_outlier(&fused, &observation.position);
        self.outlier_flags.set(source, outlier);
        if outlier {
            info!(
                ?source,
                distance_m = (observation.position - fused).norm(),
                threshold_m = self.gate.threshold_m(),
                "Fix rejected as outlier"
            );
            return Ok(Some(FixDisposition::Outlier));
        }
        Ok(None)
    }

    fn recover(&mut self, observation: &Observation) -> FusionResult<FixDisposition> {
        let initial = Matrix2::from_diagonal_element(self.config.estimator.initial_variance);
        self.estimator_mut()?.reset(&observation.position, &initial);
        self.recovery_pending = false;
        info!(x = observation.position.x, y = observation.position.y, "Estimate reset after conveyance ride");
        Ok(FixDisposition::Recovered)
    }

    fn fuse_single(&mut self, observation: &Observation) -> FusionResult<FixDisposition> {
        if self.recovery_pending {
            return self.recover(observation);
        }
        let state = self.estimator_state()?;
        let (weighted, _) = self.gate.weigh(&state, observation);
        let result = self.estimator_mut()?.update(&weighted);
        self.settle(result, "absolute fix update")
    }

    /// Map an estimator result to a disposition; numeric faults skip the fix
    fn settle(&mut self, result: FusionResult<()>, context: &str) -> FusionResult<FixDisposition> {
        match result {
            Ok(()) => Ok(FixDisposition::Applied),
            Err(error) if error.is_recoverable() => {
                warn!(%error, context, "Skipping fix after numeric fault");
                self.callbacks.trigger(SessionEvent::NumericFault {
                    context: error.to_string(),
                });
                Ok(FixDisposition::Rejected)
            }
            Err(error) => Err(error),
        }
    }

    fn finish_fix(&mut self, source: FixSource, disposition: FixDisposition) -> FusionResult<()> {
        self.stats.record(disposition);
        debug!(?source, ?disposition, "Fix processed");
        if disposition.was_fused() {
            self.record_trajectory()?;
        }
        self.callbacks.trigger(SessionEvent::FixProcessed { source, disposition });
        Ok(())
    }

    fn record_trajectory(&mut self) -> FusionResult<()> {
        let fused = self.fused_position()?;
        if self.trajectory.len() >= self.config.trajectory_capacity {
            self.trajectory.pop_front();
        }
        self.trajectory.push_back(TrajectoryPoint {
            timestamp_ms: self.last_timestamp_ms,
            position: fused.position,
            accuracy_m: fused.accuracy_m,
            floor: self.pdr.floor(),
        });
        Ok(())
    }
}

impl std::fmt::Debug for FusionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FusionSession")
            .field("recording", &self.recording)
            .field("reference", &self.transform.reference())
            .field("conveyance", &self.conveyance.state())
            .field("stats", &self.stats)
            .finish()
    }
}
