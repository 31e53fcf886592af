//! scenarios.rs — Motion presets for the sensor simulator
//!
//! Each preset is a timeline of phases describing what the device is doing.
//! `motion.rs` turns a timeline into timestamped sensor events.

use clap::ValueEnum;
use sentinel_types::Vec3;

/// Unit "up" vectors in the device frame: the direction the gravity sensor
/// reports while the device holds that pose.
pub const UPRIGHT: Vec3 = Vec3 { x: 0.0, y: 1.0, z: 0.0 };
pub const FACE_UP: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 1.0 };
pub const UPSIDE_DOWN: Vec3 = Vec3 { x: 0.0, y: -1.0, z: 0.0 };

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScenarioKind {
    /// Resting and ordinary handling, nothing should fire
    Baseline,
    /// Dropped on its edge, bounces, picked straight back up
    PhoneDrop,
    /// Free fall, hard landing, person lies still face up
    Fall,
    /// Frontal impact, rollover, occupant motionless
    CarCrash,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Motion {
    /// Device at rest in a fixed pose
    Rest { up: Vec3 },
    /// Held or carried: extra per-axis linear noise and some rotation
    Handling { up: Vec3, sigma_mps2: f32 },
    /// Raw accelerometer reads ~0; linear acceleration is −g
    FreeFall { up: Vec3 },
    /// Linear acceleration spike, applied for the whole phase
    Impact { up: Vec3, linear_mps2: Vec3 },
    /// Rotates about the x axis from `from` to `to` while shaking
    Tumble { from: Vec3, to: Vec3, sigma_mps2: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Phase {
    pub label: &'static str,
    pub duration_ms: u64,
    pub motion: Motion,
}

const fn phase(label: &'static str, duration_ms: u64, motion: Motion) -> Phase {
    Phase { label, duration_ms, motion }
}

pub fn timeline(kind: ScenarioKind) -> Vec<Phase> {
    match kind {
        ScenarioKind::Baseline => preset_baseline(),
        ScenarioKind::PhoneDrop => preset_phone_drop(),
        ScenarioKind::Fall => preset_fall(),
        ScenarioKind::CarCrash => preset_car_crash(),
    }
}

pub fn duration_ms(phases: &[Phase]) -> u64 {
    phases.iter().map(|p| p.duration_ms).sum()
}

pub fn preset_baseline() -> Vec<Phase> {
    vec![
        phase("on desk", 5_000, Motion::Rest { up: FACE_UP }),
        phase("picked up", 10_000, Motion::Handling { up: UPRIGHT, sigma_mps2: 1.0 }),
        phase("pocket", 5_000, Motion::Rest { up: UPRIGHT }),
    ]
}

pub fn preset_phone_drop() -> Vec<Phase> {
    vec![
        phase("in hand", 2_000, Motion::Rest { up: UPRIGHT }),
        phase("slips", 300, Motion::FreeFall { up: UPRIGHT }),
        phase("edge hits floor", 20, Motion::Impact { up: UPRIGHT, linear_mps2: Vec3 { x: 0.0, y: 25.0, z: 0.0 } }),
        phase("bounces", 300, Motion::Handling { up: UPRIGHT, sigma_mps2: 3.0 }),
        phase("picked up", 10_000, Motion::Handling { up: UPRIGHT, sigma_mps2: 1.0 }),
    ]
}

pub fn preset_fall() -> Vec<Phase> {
    vec![
        phase("walking", 2_000, Motion::Rest { up: UPRIGHT }),
        phase("falling", 400, Motion::FreeFall { up: UPRIGHT }),
        phase("hits ground", 20, Motion::Impact { up: FACE_UP, linear_mps2: Vec3 { x: 0.0, y: 0.0, z: 25.0 } }),
        phase("lying still", 35_000, Motion::Rest { up: FACE_UP }),
    ]
}

pub fn preset_car_crash() -> Vec<Phase> {
    vec![
        phase("driving", 3_000, Motion::Handling { up: UPRIGHT, sigma_mps2: 0.3 }),
        phase("collision", 40, Motion::Impact { up: UPRIGHT, linear_mps2: Vec3 { x: 0.0, y: 0.0, z: -45.0 } }),
        phase("rollover", 1_500, Motion::Tumble { from: UPRIGHT, to: UPSIDE_DOWN, sigma_mps2: 3.0 }),
        phase("motionless", 35_000, Motion::Rest { up: UPSIDE_DOWN }),
    ]
}
