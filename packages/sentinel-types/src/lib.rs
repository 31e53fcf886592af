//! # sentinel-types
//!
//! Shared sensor and detection structures for the Sentinel fall/crash engine.
//!
//! These types are used by:
//! - `engine`: sequencing sensor events and running both detectors
//! - `packages/sentinel-sim`: producing synthetic sensor envelopes
//! - any alerting/UI collaborator consuming snapshots and escalations
//!
//! ## Conventions
//!
//! - **Device frame**: Android sensor frame, X = right, Y = up the screen, Z = out of the screen
//! - **Units**: acceleration in m/s², angular rate in rad/s, magnetic field in µT
//! - **Timestamps**: monotonic sensor clock in nanoseconds, never wall-clock

use serde::{Deserialize, Serialize};

// ── Sensor Kind ───────────────────────────────────────────────────────────────

/// Which physical (or fused) sensor produced a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SensorKind {
    /// Raw accelerometer, gravity included (cascade detector input)
    Accelerometer,
    /// Accelerometer with gravity removed (primary detector input)
    LinearAcceleration,
    Gyroscope,
    /// Fused gravity direction
    Gravity,
    Magnetometer,
}

impl SensorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accelerometer => "accelerometer",
            Self::LinearAcceleration => "linear_acceleration",
            Self::Gyroscope => "gyroscope",
            Self::Gravity => "gravity",
            Self::Magnetometer => "magnetometer",
        }
    }
}

// ── 3D Vector ─────────────────────────────────────────────────────────────────

/// 3-axis sensor reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f32, y: f32, z: f32) -> Self { Self { x, y, z } }

    /// Copy the first three values out of a producer-owned buffer.
    /// Missing components read as zero.
    pub fn from_slice(values: &[f32]) -> Self {
        let at = |i: usize| values.get(i).copied().unwrap_or(0.0);
        Self::new(at(0), at(1), at(2))
    }

    /// Exactly zero on every axis; used as the "never observed" sentinel.
    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn scale(&self, k: f32) -> Vec3 {
        Vec3::new(self.x * k, self.y * k, self.z * k)
    }

    pub fn add(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn sub(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn dot(&self, other: &Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Vec3) -> Vec3 {
        Vec3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }
}

// ── Sensor Event ──────────────────────────────────────────────────────────────

/// One timestamped reading, owned by value. Producers build these from their
/// callback buffers before handing off, so nothing aliases driver memory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorEvent {
    pub kind: SensorKind,
    pub vector: Vec3,
    /// Monotonic sensor timestamp (nanoseconds)
    pub timestamp_ns: u64,
}

impl SensorEvent {
    pub fn new(kind: SensorKind, vector: Vec3, timestamp_ns: u64) -> Self {
        Self { kind, vector, timestamp_ns }
    }

    pub fn timestamp_ms(&self) -> u64 { self.timestamp_ns / 1_000_000 }
}

/// Batch of events from one producer, as carried over UDP by the host bridge.
/// The bridge drops an envelope whose `seq_num` does not advance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorEnvelope {
    pub source_id: u32,
    pub seq_num: u32,
    pub events: Vec<SensorEvent>,
}

// ── Primary detector output ───────────────────────────────────────────────────

/// Spike-then-validate state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectionState {
    #[default]
    Idle,
    Monitoring,
    PotentialImpact,
    Validating,
    ConfirmedAccident,
}

impl DetectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Monitoring => "MONITORING",
            Self::PotentialImpact => "POTENTIAL_IMPACT",
            Self::Validating => "VALIDATING",
            Self::ConfirmedAccident => "CONFIRMED_ACCIDENT",
        }
    }
}

/// Coarse motion context. Reserved for vehicular-context heuristics; the
/// detectors never populate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityHint {
    Still,
    OnFoot,
    InVehicle,
    Unknown,
}

/// Produced once per linear-acceleration sample. Never mutated after creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionSnapshot {
    pub timestamp_ns: u64,
    pub accel: Vec3,
    /// Total acceleration magnitude, m/s²
    pub tam: f32,
    /// m/s³
    pub jerk: f32,
    pub gyro: Vec3,
    pub gyro_magnitude: f32,
    pub gravity: Vec3,
    /// Angle between current gravity and the gravity-at-rest reference, degrees
    pub orientation_change_deg: f32,
    /// Signal magnitude area over the last ~1 s, m/s²
    pub sma: f32,
    /// Time spent so far in the impact settle window, ms (0 outside it)
    pub impact_duration_ms: u64,
    pub state: DetectionState,
    pub confirmed: bool,
    /// Sensor-clock time (ms) the validation window opened
    pub validation_started_ms: Option<u64>,
    /// Unused: no velocity input is wired yet
    pub speed_mps: Option<f32>,
    /// Unused: no activity recognition is wired yet
    pub activity_hint: Option<ActivityHint>,
}

// ── Cascade detector output ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CascadeStage {
    #[default]
    Idle,
    FreeFallDetected,
    ImpactDetected,
    Confirmed,
}

impl CascadeStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::FreeFallDetected => "FREE_FALL_DETECTED",
            Self::ImpactDetected => "IMPACT_DETECTED",
            Self::Confirmed => "CONFIRMED",
        }
    }
}

// ── Escalation (engine → alerting collaborator) ───────────────────────────────

/// Which detector a confirmation or a reset refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    Primary,
    Cascade,
}

impl std::str::FromStr for DetectorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(Self::Primary),
            "cascade" => Ok(Self::Cascade),
            other => Err(format!("unknown detector '{other}'")),
        }
    }
}

/// Emitted once per false→true transition of a detector's confirmed flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationEvent {
    pub source: DetectorKind,
    /// Sensor-clock time of the confirming sample
    pub timestamp_ns: u64,
    /// Present for primary confirmations
    pub snapshot: Option<DetectionSnapshot>,
}
