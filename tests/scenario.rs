use pdr_fusion::algorithms::coordinates::apply_offset;
use pdr_fusion::api::{EventOutcome, FixDisposition, FixSpec, FusionEvent, FusionSession, SharedSession};
use pdr_fusion::core::{FixSource, GeoPoint, MotionSample, PlanarPoint};
use pdr_fusion::utils::config::{EstimatorKind, FusionConfig};

const START_LAT: f64 = 55.9229;
const START_LON: f64 = -3.1745;

fn config(kind: EstimatorKind) -> FusionConfig {
    let mut config = FusionConfig::default();
    config.pdr.manual_stride_m = Some(0.7);
    config.estimator.kind = kind;
    config.estimator.particle_seed = Some(7);
    config.estimator.particle_count = 2000;
    config
}

fn walk_three_steps_east(session: &mut FusionSession) {
    for i in 1..=3 {
        session
            .on_step(&MotionSample::new(i * 500, vec![9.8; 12], 0.0))
            .unwrap();
    }
}

fn point(east: f64, north: f64) -> GeoPoint {
    let start = GeoPoint::new(START_LAT, START_LON).unwrap();
    apply_offset(&start, &PlanarPoint::new(east, north))
}

#[test]
fn test_walk_fix_and_outlier_for_every_estimator() {
    for kind in [EstimatorKind::Kalman, EstimatorKind::BatchWindow, EstimatorKind::Particle] {
        let mut session = FusionSession::new(config(kind)).unwrap();
        session.start(GeoPoint::new(START_LAT, START_LON).unwrap()).unwrap();
        walk_three_steps_east(&mut session);

        let pdr = session.pdr_position();
        assert!((pdr.x - 2.1).abs() < 1e-5, "{:?}", kind);
        assert!(pdr.y.abs() < 1e-5, "{:?}", kind);

        let before = session.fused_position().unwrap();
        assert!((before.planar.x - 2.1).abs() < 0.3, "{:?}: {}", kind, before.planar.x);

        // Accepted fix about 3 m ahead pulls the estimate forward
        let fix = session.fix_with_accuracy(point(5.1, 0.0), 3.0, FixSource::Wireless).unwrap();
        assert_eq!(session.on_absolute_fix(&fix).unwrap(), FixDisposition::Applied, "{:?}", kind);
        let after = session.fused_position().unwrap();
        assert!(after.planar.x > before.planar.x, "{:?}", kind);
        assert!(after.planar.x < 5.1, "{:?}", kind);

        // 50 m jump is an outlier and changes nothing
        let far = session.fix_with_accuracy(point(52.1, 0.0), 3.0, FixSource::Satellite).unwrap();
        assert_eq!(session.on_absolute_fix(&far).unwrap(), FixDisposition::Outlier, "{:?}", kind);
        assert_eq!(session.fused_position().unwrap(), after, "{:?}", kind);
        assert!(session.outlier_flags().satellite);
    }
}

#[test]
fn test_json_replay_through_shared_session() {
    let json = format!(
        r#"[
            {{"type": "start", "latitude": {lat}, "longitude": {lon}}},
            {{"type": "step", "timestamp_ms": 500, "accel_magnitudes": [9.8, 9.9, 10.4, 11.0, 10.1, 9.5], "heading_rad": 0.0}},
            {{"type": "step", "timestamp_ms": 1000, "heading_rad": 0.0}},
            {{"type": "elevation", "elevation_m": 35.0}},
            {{"type": "acceleration", "gravity": [0.0, 0.0, 9.8], "linear": [0.1, 0.0, 0.0]}},
            {{"type": "fix", "latitude": {lat}, "longitude": {lon}, "source": "satellite", "accuracy_m": 4.0}},
            {{"type": "tag", "label": "entrance"}},
            {{"type": "stop"}},
            {{"type": "fix", "latitude": {lat}, "longitude": {lon}, "source": "wireless"}}
        ]"#,
        lat = START_LAT,
        lon = START_LON
    );
    let events: Vec<FusionEvent> = serde_json::from_str(&json).unwrap();
    let shared = SharedSession::new(config(EstimatorKind::Kalman)).unwrap();

    let outcomes: Vec<EventOutcome> = events
        .into_iter()
        .map(|event| shared.dispatch(event).unwrap())
        .collect();

    assert_eq!(outcomes[0], EventOutcome::Started);
    assert_eq!(outcomes[5], EventOutcome::Fix { disposition: FixDisposition::Applied });
    assert!(matches!(&outcomes[6], EventOutcome::Tagged { tag } if tag.label.as_deref() == Some("entrance")));
    assert_eq!(outcomes[7], EventOutcome::Stopped);
    assert_eq!(outcomes[8], EventOutcome::Fix { disposition: FixDisposition::Dropped });

    let session = shared.lock();
    assert_eq!(session.stats().steps, 2);
    assert_eq!(session.stats().dropped, 1);
    assert_eq!(session.tags().len(), 1);
    assert!(!session.is_recording());
}

#[test]
fn test_joint_fix_event() {
    let shared = SharedSession::new(config(EstimatorKind::Kalman)).unwrap();
    shared
        .dispatch(FusionEvent::Start { latitude: START_LAT, longitude: START_LON })
        .unwrap();
    let far = point(100.0, 0.0);
    let near = point(1.0, 1.0);
    let outcome = shared
        .dispatch(FusionEvent::JointFix {
            satellite: FixSpec::new(far.latitude, far.longitude, FixSource::Satellite).with_accuracy(5.0),
            wireless: FixSpec::new(near.latitude, near.longitude, FixSource::Wireless).with_accuracy(2.0),
        })
        .unwrap();
    assert_eq!(
        outcome,
        EventOutcome::JointFix {
            satellite: FixDisposition::Outlier,
            wireless: FixDisposition::Applied,
        }
    );
}
