//! # engine
//!
//! Synchronous owner of both detectors. Routes each event by kind, tracks
//! the confirmed flags so escalation fires on the false→true edge only, and
//! keeps the diagnostic history.
//!
//! One `dispatch` call is one atomic step: it either runs to completion or
//! is never started, so whoever owns the engine (the sequencer task) can be
//! cancelled between events without leaving a detector half-updated.

use sentinel_types::{
    CascadeStage, DetectionSnapshot, DetectionState, DetectorKind, EscalationEvent, SensorEvent,
    SensorKind, Vec3,
};
use std::sync::Arc;

use tracing::{info, warn};

use crate::cascade::CascadeFallDetector;
use crate::clock::{Clock, WallClock};
use crate::config::DetectorConfig;
use crate::history::RecentHistory;
use crate::primary::PrimaryDetector;

/// What one event produced.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Present for linear-acceleration events
    pub snapshot: Option<DetectionSnapshot>,
    /// Present when the event went to the cascade detector
    pub cascade_stage: Option<CascadeStage>,
    pub escalation: Option<EscalationEvent>,
}

pub struct DetectionEngine {
    primary: PrimaryDetector,
    cascade: CascadeFallDetector,
    /// Latest raw accelerometer vector, paired with magnetometer readings
    last_accel: Vec3,
    history: RecentHistory,
    primary_confirmed: bool,
    cascade_confirmed: bool,
}

impl DetectionEngine {
    pub fn new(config: DetectorConfig, history_capacity: usize) -> Self {
        Self::with_clock(config, history_capacity, Arc::new(WallClock))
    }

    /// Both detectors fall back to `clock` when sample timestamps are unusable.
    pub fn with_clock(config: DetectorConfig, history_capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            primary: PrimaryDetector::with_clock(config.primary, Arc::clone(&clock)),
            cascade: CascadeFallDetector::with_clock(config.cascade, clock),
            last_accel: Vec3::ZERO,
            history: RecentHistory::new(history_capacity),
            primary_confirmed: false,
            cascade_confirmed: false,
        }
    }

    /// Non-finite samples are dropped before they reach history or a detector.
    pub fn dispatch(&mut self, event: SensorEvent) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        if !event.vector.is_finite() {
            warn!("Engine: dropped non-finite {} sample", event.kind.as_str());
            return outcome;
        }
        self.history.record(event);

        match event.kind {
            SensorKind::LinearAcceleration | SensorKind::Gyroscope | SensorKind::Gravity => {
                let snapshot = self.primary.observe(event.kind, event.vector, event.timestamp_ns);
                if let Some(snap) = snapshot {
                    if snap.confirmed && !self.primary_confirmed {
                        warn!(
                            "🚨 Primary detector confirmed an accident (t={}ms, SMA={:.2})",
                            event.timestamp_ms(),
                            snap.sma
                        );
                        outcome.escalation = Some(EscalationEvent {
                            source: DetectorKind::Primary,
                            timestamp_ns: event.timestamp_ns,
                            snapshot: Some(snap),
                        });
                    }
                    self.primary_confirmed = snap.confirmed;
                }
                outcome.snapshot = snapshot;
            }
            SensorKind::Accelerometer => {
                self.last_accel = event.vector;
                let confirmed = self.cascade.observe_accelerometer(event.vector, event.timestamp_ms());
                if confirmed && !self.cascade_confirmed {
                    warn!("🚨 Cascade detector confirmed a fall (t={}ms)", event.timestamp_ms());
                    outcome.escalation = Some(EscalationEvent {
                        source: DetectorKind::Cascade,
                        timestamp_ns: event.timestamp_ns,
                        snapshot: None,
                    });
                }
                self.cascade_confirmed = confirmed;
                outcome.cascade_stage = Some(self.cascade.stage());
            }
            SensorKind::Magnetometer => {
                self.cascade.observe_magnetometer(event.vector, self.last_accel);
                outcome.cascade_stage = Some(self.cascade.stage());
            }
        }

        outcome
    }

    /// Reset one detector, or both when `target` is `None`.
    pub fn reset(&mut self, target: Option<DetectorKind>) {
        if target != Some(DetectorKind::Cascade) {
            self.primary.reset();
            self.primary_confirmed = false;
        }
        if target != Some(DetectorKind::Primary) {
            self.cascade.reset();
            self.cascade_confirmed = false;
            self.last_accel = Vec3::ZERO;
        }
        info!("Engine: reset {}", match target {
            Some(DetectorKind::Primary) => "primary",
            Some(DetectorKind::Cascade) => "cascade",
            None => "both detectors",
        });
    }

    pub fn primary_state(&self) -> DetectionState { self.primary.state() }
    pub fn cascade_stage(&self) -> CascadeStage { self.cascade.stage() }
    pub fn history(&self) -> &RecentHistory { &self.history }
}
