//! # primary
//!
//! Spike-then-validate accident classifier over linear acceleration,
//! gyroscope and gravity.
//!
//! ```text
//! IDLE ──gravity seen──▶ MONITORING ──TAM+jerk spike──▶ POTENTIAL_IMPACT
//!                            ▲                              │ 2 s
//!                            ├──────── no swing, moving ────┤
//!                            │                              ▼ swing or still
//!                            └──────── moving ───────── VALIDATING
//!                                                           │ 30 s, still
//!                                                           ▼
//!                                                   CONFIRMED_ACCIDENT (sticky)
//! ```
//!
//! Deadlines are compared on sample arrival against detector time (see
//! [`crate::clock::Timeline`]), so a transition fires on the first sample at
//! or past its deadline. With no samples, nothing moves.

use std::sync::Arc;

use sentinel_types::{DetectionSnapshot, DetectionState, SensorKind, Vec3};
use tracing::{debug, info};

use crate::clock::{Clock, Timeline, WallClock};
use crate::config::PrimaryThresholds;
use crate::signal::{self, MovingAverage};

pub struct PrimaryDetector {
    cfg: PrimaryThresholds,
    state: DetectionState,
    /// Previous linear-acceleration sample and its timestamp (ns)
    prev_accel: Option<(Vec3, u64)>,
    sma: MovingAverage,
    /// Orientation immediately before a suspected impact
    gravity_at_rest: Vec3,
    last_gyro: Vec3,
    last_gravity: Option<Vec3>,
    impact_started_ms: Option<u64>,
    validation_started_ms: Option<u64>,
    timeline: Timeline,
}

impl PrimaryDetector {
    pub fn new(cfg: PrimaryThresholds) -> Self {
        Self::with_clock(cfg, Arc::new(WallClock))
    }

    /// Use `clock` for deadlines whenever sample timestamps cannot be trusted.
    pub fn with_clock(cfg: PrimaryThresholds, clock: Arc<dyn Clock>) -> Self {
        let sma = MovingAverage::new(cfg.sma_window);
        Self {
            cfg,
            state: DetectionState::Idle,
            prev_accel: None,
            sma,
            gravity_at_rest: Vec3::ZERO,
            last_gyro: Vec3::ZERO,
            last_gravity: None,
            impact_started_ms: None,
            validation_started_ms: None,
            timeline: Timeline::new(clock),
        }
    }

    pub fn state(&self) -> DetectionState { self.state }

    pub fn is_confirmed(&self) -> bool {
        self.state == DetectionState::ConfirmedAccident
    }

    pub fn config(&self) -> &PrimaryThresholds { &self.cfg }

    /// Feed one sample. Gyroscope and gravity only refresh the last-known
    /// vectors; linear acceleration runs the full pipeline and always yields
    /// a snapshot. Other kinds belong to the cascade detector.
    pub fn observe(&mut self, kind: SensorKind, vector: Vec3, timestamp_ns: u64) -> Option<DetectionSnapshot> {
        match kind {
            SensorKind::Gyroscope => {
                self.last_gyro = vector;
                None
            }
            SensorKind::Gravity => {
                self.last_gravity = Some(vector);
                None
            }
            SensorKind::LinearAcceleration => Some(self.on_acceleration(vector, timestamp_ns)),
            SensorKind::Accelerometer | SensorKind::Magnetometer => None,
        }
    }

    /// Back to the constructed state. Safe to call from any state, any number of times.
    pub fn reset(&mut self) {
        if self.state != DetectionState::Idle {
            info!("Primary: reset from {}", self.state.as_str());
        }
        *self = Self::with_clock(self.cfg.clone(), self.timeline.clock());
    }

    fn on_acceleration(&mut self, accel: Vec3, timestamp_ns: u64) -> DetectionSnapshot {
        let now_ms = self.timeline.advance(timestamp_ns);

        let tam = signal::magnitude(&accel);
        let jerk = match self.prev_accel {
            Some((prev, prev_ts)) => {
                let dt = if prev_ts == 0 || timestamp_ns == 0 {
                    self.cfg.default_dt_secs
                } else {
                    ((timestamp_ns as f64 - prev_ts as f64) / 1e9) as f32
                };
                signal::derivative(&accel, Some(&prev), dt)
            }
            None => 0.0,
        };

        self.sma.push(signal::l1_magnitude(&accel));
        let sma = self.sma.average();

        let gravity = self.last_gravity.unwrap_or(Vec3::ZERO);
        let orientation_change_deg = signal::angle_between_degrees(&gravity, &self.gravity_at_rest);
        let gyro_magnitude = signal::magnitude(&self.last_gyro);

        self.advance(now_ms, tam, jerk, sma, orientation_change_deg);
        self.prev_accel = Some((accel, timestamp_ns));

        let impact_duration_ms = self
            .impact_started_ms
            .map(|start| now_ms.saturating_sub(start))
            .unwrap_or(0);

        DetectionSnapshot {
            timestamp_ns,
            accel,
            tam,
            jerk,
            gyro: self.last_gyro,
            gyro_magnitude,
            gravity,
            orientation_change_deg,
            sma,
            impact_duration_ms,
            state: self.state,
            confirmed: self.is_confirmed(),
            validation_started_ms: self.validation_started_ms,
            speed_mps: None,
            activity_hint: None,
        }
    }

    fn advance(&mut self, now_ms: u64, tam: f32, jerk: f32, sma: f32, orientation_change_deg: f32) {
        match self.state {
            DetectionState::Idle => {
                if self.last_gravity.is_some() {
                    self.transition(DetectionState::Monitoring);
                }
            }
            DetectionState::Monitoring => {
                let gravity = self.last_gravity.unwrap_or(Vec3::ZERO);
                if sma < self.cfg.rest_sma_mps2 {
                    self.gravity_at_rest = gravity;
                }
                if tam > self.cfg.impact_tam_mps2 && jerk > self.cfg.impact_jerk_mps3 {
                    debug!("Primary: spike TAM={tam:.1} m/s² jerk={jerk:.0} m/s³");
                    self.gravity_at_rest = gravity;
                    self.impact_started_ms = Some(now_ms);
                    self.validation_started_ms = None;
                    self.transition(DetectionState::PotentialImpact);
                }
            }
            DetectionState::PotentialImpact => {
                let started = self.impact_started_ms.unwrap_or(now_ms);
                if now_ms.saturating_sub(started) >= self.cfg.impact_window_ms {
                    self.impact_started_ms = None;
                    let swung = orientation_change_deg > self.cfg.orientation_change_deg;
                    let still = sma < self.cfg.still_sma_mps2;
                    if swung || still {
                        info!("Primary: impact held (swing={orientation_change_deg:.0}°, SMA={sma:.2})");
                        self.validation_started_ms = Some(now_ms);
                        self.transition(DetectionState::Validating);
                    } else {
                        info!("Primary: false alarm after settle window (SMA={sma:.2})");
                        self.transition(DetectionState::Monitoring);
                    }
                }
            }
            DetectionState::Validating => {
                let started = self.validation_started_ms.unwrap_or(now_ms);
                if now_ms.saturating_sub(started) >= self.cfg.validation_window_ms {
                    if sma < self.cfg.still_sma_mps2 {
                        self.transition(DetectionState::ConfirmedAccident);
                    } else {
                        info!("Primary: motion resumed during validation (SMA={sma:.2})");
                        self.validation_started_ms = None;
                        self.transition(DetectionState::Monitoring);
                    }
                }
            }
            DetectionState::ConfirmedAccident => {}
        }
    }

    fn transition(&mut self, to: DetectionState) {
        info!("Primary: {} → {}", self.state.as_str(), to.as_str());
        self.state = to;
    }
}
