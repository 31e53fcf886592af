//! End-to-end detection scenarios over a full multi-sensor stream.

use sentinel_engine::{spawn_sequencer, DetectionEngine, DetectorConfig};
use sentinel_types::{
    CascadeStage, DetectionSnapshot, DetectionState, DetectorKind, EscalationEvent, SensorEvent, SensorKind, Vec3,
};

const G: f32 = 9.81;
const FIELD: Vec3 = Vec3 { x: 0.0, y: 20.0, z: -40.0 };
const UPRIGHT: Vec3 = Vec3 { x: 0.0, y: G, z: 0.0 };
const FACE_UP: Vec3 = Vec3 { x: 0.0, y: 0.0, z: G };
const STILL: Vec3 = Vec3 { x: 0.05, y: 0.05, z: 0.05 };
const MOVING: Vec3 = Vec3 { x: 1.0, y: 1.0, z: 0.5 };

/// A phone on a 50 Hz sensor clock. Each tick delivers raw accelerometer,
/// magnetometer, gravity and linear acceleration with one timestamp.
struct Phone {
    engine: DetectionEngine,
    t_ms: u64,
    escalations: Vec<EscalationEvent>,
    last: Option<DetectionSnapshot>,
}

impl Phone {
    fn new() -> Self {
        Self {
            engine: DetectionEngine::new(DetectorConfig::default(), 100),
            t_ms: 5_000,
            escalations: Vec::new(),
            last: None,
        }
    }

    fn tick(&mut self, gravity: Vec3, linear: Vec3) {
        self.t_ms += 20;
        let ts = self.t_ms * 1_000_000;
        let raw = gravity.add(&linear);
        for (kind, v) in [
            (SensorKind::Accelerometer, raw),
            (SensorKind::Magnetometer, FIELD),
            (SensorKind::Gravity, gravity),
            (SensorKind::LinearAcceleration, linear),
        ] {
            let out = self.engine.dispatch(SensorEvent::new(kind, v, ts));
            if let Some(snap) = out.snapshot {
                self.last = Some(snap);
            }
            self.escalations.extend(out.escalation);
        }
    }

    fn hold(&mut self, gravity: Vec3, linear: Vec3, ms: u64) {
        for _ in 0..ms / 20 {
            self.tick(gravity, linear);
        }
    }

    fn state(&self) -> DetectionState {
        self.last.map(|s| s.state).unwrap_or_default()
    }

    fn escalated(&self, source: DetectorKind) -> usize {
        self.escalations.iter().filter(|e| e.source == source).count()
    }

    /// Free fall, a hard landing face up, then lying still.
    fn fall(&mut self, lying_ms: u64) {
        self.hold(UPRIGHT, UPRIGHT.scale(-1.0), 300);
        self.tick(FACE_UP, Vec3::new(0.0, 0.0, 25.0));
        self.hold(FACE_UP, STILL, lying_ms);
    }
}

#[test]
fn crash_then_stillness_confirms_after_validation() {
    let mut phone = Phone::new();
    phone.hold(UPRIGHT, STILL, 1_000);
    assert_eq!(phone.state(), DetectionState::Monitoring);

    // Car impact, phone stays upright in its mount
    phone.tick(UPRIGHT, Vec3::new(0.0, 0.0, -40.0));
    assert_eq!(phone.state(), DetectionState::PotentialImpact);

    phone.hold(UPRIGHT, STILL, 1_980);
    assert_eq!(phone.state(), DetectionState::PotentialImpact);
    phone.tick(UPRIGHT, STILL);
    assert_eq!(phone.state(), DetectionState::Validating);
    let validation_started = phone.last.and_then(|s| s.validation_started_ms);
    assert_eq!(validation_started, Some(phone.t_ms));

    phone.hold(UPRIGHT, STILL, 29_980);
    assert_eq!(phone.state(), DetectionState::Validating);
    phone.tick(UPRIGHT, STILL);
    assert_eq!(phone.state(), DetectionState::ConfirmedAccident);
    assert!(phone.last.map(|s| s.confirmed).unwrap_or(false));
    assert_eq!(phone.last.and_then(|s| s.validation_started_ms), validation_started);

    phone.hold(UPRIGHT, MOVING, 2_000);
    assert_eq!(phone.state(), DetectionState::ConfirmedAccident);
    assert_eq!(phone.escalated(DetectorKind::Primary), 1);
    assert_eq!(phone.escalated(DetectorKind::Cascade), 0);
}

#[test]
fn motion_after_spike_is_a_false_alarm() {
    let mut phone = Phone::new();
    phone.hold(UPRIGHT, STILL, 1_000);
    phone.tick(UPRIGHT, Vec3::new(25.0, 0.0, 0.0));
    assert_eq!(phone.state(), DetectionState::PotentialImpact);

    phone.hold(UPRIGHT, MOVING, 2_000);
    assert_eq!(phone.state(), DetectionState::Monitoring);
    phone.hold(UPRIGHT, MOVING, 40_000);
    assert!(phone.escalations.is_empty());
}

#[test]
fn fall_confirms_cascade_within_half_a_second() {
    let mut phone = Phone::new();
    phone.hold(UPRIGHT, STILL, 1_000);
    phone.fall(340);

    assert_eq!(phone.engine.cascade_stage(), CascadeStage::Confirmed);
    assert_eq!(phone.escalated(DetectorKind::Cascade), 1);
    // The primary detector is still inside its settle window
    assert_eq!(phone.state(), DetectionState::PotentialImpact);

    phone.hold(FACE_UP, STILL, 32_000);
    assert_eq!(phone.state(), DetectionState::ConfirmedAccident);
    assert_eq!(phone.escalated(DetectorKind::Cascade), 1);
    assert_eq!(phone.escalated(DetectorKind::Primary), 1);
}

#[test]
fn free_fall_without_impact_returns_to_idle() {
    let mut phone = Phone::new();
    phone.hold(UPRIGHT, STILL, 1_000);
    phone.hold(UPRIGHT, UPRIGHT.scale(-0.7), 200);
    assert_eq!(phone.engine.cascade_stage(), CascadeStage::FreeFallDetected);

    // Caught before hitting anything
    phone.hold(UPRIGHT, STILL, 1_600);
    assert_eq!(phone.engine.cascade_stage(), CascadeStage::Idle);
    phone.hold(FACE_UP, STILL, 2_000);
    assert_eq!(phone.engine.cascade_stage(), CascadeStage::Idle);
    assert!(phone.escalations.is_empty());
}

#[test]
fn reset_after_confirmation_behaves_like_new() {
    let mut phone = Phone::new();
    phone.hold(UPRIGHT, STILL, 1_000);
    phone.fall(33_000);
    assert_eq!(phone.engine.primary_state(), DetectionState::ConfirmedAccident);
    assert_eq!(phone.engine.cascade_stage(), CascadeStage::Confirmed);

    phone.engine.reset(None);
    assert_eq!(phone.engine.primary_state(), DetectionState::Idle);
    assert_eq!(phone.engine.cascade_stage(), CascadeStage::Idle);

    phone.escalations.clear();
    phone.hold(FACE_UP, STILL, 40_000);
    assert_eq!(phone.state(), DetectionState::Monitoring);
    assert_eq!(phone.engine.cascade_stage(), CascadeStage::Idle);
    assert!(phone.escalations.is_empty());

    // And it can detect again
    phone.hold(UPRIGHT, STILL, 1_000);
    phone.fall(340);
    assert_eq!(phone.escalated(DetectorKind::Cascade), 1);
}

#[tokio::test]
async fn sequenced_fall_escalates_through_channel() {
    let (handle, mut outputs, task) = spawn_sequencer(DetectorConfig::default(), 500);

    let producer = {
        let handle = handle.clone();
        std::thread::spawn(move || {
            let mut t_ms = 1_000u64;
            let mut send = |gravity: Vec3, linear: Vec3| {
                t_ms += 20;
                let ts = t_ms * 1_000_000;
                let raw = [gravity.x + linear.x, gravity.y + linear.y, gravity.z + linear.z];
                handle.submit(SensorKind::Accelerometer, &raw, ts).unwrap();
                handle.submit(SensorKind::Magnetometer, &[FIELD.x, FIELD.y, FIELD.z], ts).unwrap();
            };
            for _ in 0..50 {
                send(UPRIGHT, STILL);
            }
            for _ in 0..15 {
                send(UPRIGHT, UPRIGHT.scale(-1.0));
            }
            send(FACE_UP, Vec3::new(0.0, 0.0, 25.0));
            for _ in 0..20 {
                send(FACE_UP, STILL);
            }
        })
    };
    producer.join().unwrap();

    let escalation = outputs.escalations.recv().await.unwrap();
    assert_eq!(escalation.source, DetectorKind::Cascade);
    assert!(escalation.snapshot.is_none());

    handle.history().await.unwrap();
    assert_eq!(*outputs.cascade_stage.borrow(), CascadeStage::Confirmed);

    handle.reset(Some(DetectorKind::Cascade)).unwrap();
    handle.history().await.unwrap();
    assert_eq!(*outputs.cascade_stage.borrow(), CascadeStage::Idle);

    let engine = task.shutdown().await.unwrap();
    assert_eq!(engine.history().len(), (50 + 15 + 1 + 20) * 2);
}
