//! # cascade
//!
//! Four-stage fall classifier over the raw accelerometer and magnetometer:
//! free fall (SMV < 0.6 g), impact (SMV > 1.8 g within 1.6 s), then a
//! 333 ms window that must be both still (SMV std-dev < 0.1 g) and lying
//! down (mean |pitch| < 50°).
//!
//! Independent of the primary detector: different sensors, thresholds and
//! timeline. Its result is reported on its own, never merged.

use std::collections::VecDeque;
use std::sync::Arc;

use sentinel_types::{CascadeStage, Vec3};
use tracing::{debug, info};

use crate::clock::{Clock, Timeline, WallClock};
use crate::config::CascadeThresholds;
use crate::orientation;
use crate::signal;

pub struct CascadeFallDetector {
    cfg: CascadeThresholds,
    stage: CascadeStage,
    stage_entered_ms: u64,
    /// SMV samples (g) collected in the stillness window
    smv_window: VecDeque<f32>,
    /// |pitch| samples (degrees) collected in the stillness window
    pitch_window: VecDeque<f32>,
    /// Output of the last successful orientation fusion
    pitch_deg: f32,
    timeline: Timeline,
}

impl CascadeFallDetector {
    pub fn new(cfg: CascadeThresholds) -> Self {
        Self::with_clock(cfg, Arc::new(WallClock))
    }

    pub fn with_clock(cfg: CascadeThresholds, clock: Arc<dyn Clock>) -> Self {
        Self {
            cfg,
            stage: CascadeStage::Idle,
            stage_entered_ms: 0,
            smv_window: VecDeque::new(),
            pitch_window: VecDeque::new(),
            pitch_deg: 0.0,
            timeline: Timeline::new(clock),
        }
    }

    pub fn stage(&self) -> CascadeStage { self.stage }

    pub fn is_confirmed(&self) -> bool { self.stage == CascadeStage::Confirmed }

    /// Pitch from the last successful fusion (degrees)
    pub fn pitch_deg(&self) -> f32 { self.pitch_deg }

    pub fn config(&self) -> &CascadeThresholds { &self.cfg }

    /// Refresh the cached pitch from a magnetometer reading and the latest
    /// raw accelerometer vector. A degenerate fusion keeps the previous pitch.
    pub fn observe_magnetometer(&mut self, field: Vec3, last_accel: Vec3) {
        match orientation::pitch_degrees(&last_accel, &field, self.cfg.gravity_mps2) {
            Some(pitch) => self.pitch_deg = pitch,
            None => debug!("Cascade: orientation fusion degenerate, keeping pitch {:.1}°", self.pitch_deg),
        }
    }

    /// Feed one raw accelerometer sample. Returns true once confirmed and on
    /// every call after that until `reset()`. A `timestamp_ms` of 0 means
    /// unknown.
    pub fn observe_accelerometer(&mut self, accel: Vec3, timestamp_ms: u64) -> bool {
        let now_ms = self.timeline.advance(timestamp_ms.saturating_mul(1_000_000));
        let smv = signal::magnitude(&accel) / self.cfg.gravity_mps2;
        let elapsed = now_ms.saturating_sub(self.stage_entered_ms);

        match self.stage {
            CascadeStage::Idle => {
                if smv < self.cfg.free_fall_g {
                    self.enter(CascadeStage::FreeFallDetected, now_ms);
                }
                false
            }
            CascadeStage::FreeFallDetected => {
                if elapsed > self.cfg.impact_window_ms {
                    debug!("Cascade: no impact within {} ms", self.cfg.impact_window_ms);
                    self.enter(CascadeStage::Idle, now_ms);
                } else if smv > self.cfg.impact_g {
                    debug!("Cascade: impact SMV={smv:.2} g after {elapsed} ms of free fall");
                    self.enter(CascadeStage::ImpactDetected, now_ms);
                }
                false
            }
            CascadeStage::ImpactDetected => {
                if elapsed < self.cfg.stillness_window_ms {
                    self.smv_window.push_back(smv);
                    self.pitch_window.push_back(self.pitch_deg.abs());
                    return false;
                }
                if self.window_shows_person_down() {
                    self.enter(CascadeStage::Confirmed, now_ms);
                    true
                } else {
                    self.enter(CascadeStage::Idle, now_ms);
                    false
                }
            }
            CascadeStage::Confirmed => true,
        }
    }

    pub fn reset(&mut self) {
        if self.stage != CascadeStage::Idle {
            info!("Cascade: reset from {}", self.stage.as_str());
        }
        *self = Self::with_clock(self.cfg.clone(), self.timeline.clock());
    }

    fn window_shows_person_down(&self) -> bool {
        if self.smv_window.is_empty() {
            return false;
        }
        let spread = signal::standard_deviation(&self.smv_window);
        let pitch = signal::mean(&self.pitch_window);
        let still = spread < self.cfg.stillness_std_g;
        let lying = pitch < self.cfg.lying_pitch_deg;
        info!(
            "Cascade: stillness window closed (σ={spread:.3} g, pitch={pitch:.1}°, n={})",
            self.smv_window.len()
        );
        still && lying
    }

    fn enter(&mut self, to: CascadeStage, now_ms: u64) {
        if to != self.stage {
            info!("Cascade: {} → {}", self.stage.as_str(), to.as_str());
        }
        self.stage = to;
        self.stage_entered_ms = now_ms;
        self.smv_window.clear();
        self.pitch_window.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const G: f32 = 9.81;
    const FIELD: Vec3 = Vec3 { x: 0.0, y: 20.0, z: -40.0 };

    fn z_g(g: f32) -> Vec3 { Vec3::new(0.0, 0.0, g * G) }

    struct Rig {
        det: CascadeFallDetector,
        t_ms: u64,
    }

    impl Rig {
        fn new() -> Self {
            Self { det: CascadeFallDetector::new(CascadeThresholds::default()), t_ms: 10_000 }
        }

        fn step(&mut self, accel: Vec3, dt_ms: u64) -> bool {
            self.t_ms += dt_ms;
            self.det.observe_accelerometer(accel, self.t_ms)
        }

        fn hold(&mut self, accel: Vec3, ms: u64) -> bool {
            let mut out = false;
            for _ in 0..(ms / 20) {
                out = self.step(accel, 20);
            }
            out
        }

        /// Phone lying flat on the ground; magnetometer fixes pitch ≈ 0°.
        fn lying_flat(&mut self) {
            self.det.observe_magnetometer(FIELD, z_g(1.0));
        }
    }

    #[test]
    fn resting_phone_stays_idle() {
        let mut rig = Rig::new();
        assert!(!rig.hold(z_g(1.0), 5_000));
        assert_eq!(rig.det.stage(), CascadeStage::Idle);
    }

    #[test]
    fn free_fall_impact_still_and_flat_confirms() {
        let mut rig = Rig::new();
        rig.lying_flat();

        assert!(!rig.step(z_g(0.3), 20));
        assert_eq!(rig.det.stage(), CascadeStage::FreeFallDetected);

        assert!(!rig.hold(z_g(0.3), 300));
        assert!(!rig.step(z_g(2.0), 20));
        assert_eq!(rig.det.stage(), CascadeStage::ImpactDetected);

        // 320 ms of near-constant 1 g with a little jitter
        for i in 0..16 {
            let jitter = if i % 2 == 0 { 0.02 } else { -0.02 };
            assert!(!rig.step(z_g(1.0 + jitter), 20));
        }
        assert!(rig.step(z_g(1.0), 20));
        assert_eq!(rig.det.stage(), CascadeStage::Confirmed);

        // Sticky
        assert!(rig.hold(z_g(1.0), 1_000));
        assert!(rig.step(z_g(0.1), 20));
    }

    #[test]
    fn missing_impact_times_out_to_idle() {
        let mut rig = Rig::new();
        rig.step(z_g(0.3), 20);
        assert_eq!(rig.det.stage(), CascadeStage::FreeFallDetected);

        // Slow sink back to 1 g, never above 1.8 g
        assert!(!rig.hold(z_g(1.0), 1_600));
        assert_eq!(rig.det.stage(), CascadeStage::FreeFallDetected);
        assert!(!rig.step(z_g(1.0), 20));
        assert_eq!(rig.det.stage(), CascadeStage::Idle);

        // A late spike no longer counts
        assert!(!rig.step(z_g(2.5), 20));
        assert!(!rig.hold(z_g(1.0), 1_000));
        assert_eq!(rig.det.stage(), CascadeStage::Idle);
    }

    #[test]
    fn impact_on_the_last_millisecond_still_counts() {
        let mut rig = Rig::new();
        rig.step(z_g(0.3), 20);
        assert!(!rig.hold(z_g(1.0), 1_580));
        assert_eq!(rig.det.stage(), CascadeStage::FreeFallDetected);

        // Exactly 1600 ms after free fall began
        assert!(!rig.step(z_g(2.5), 20));
        assert_eq!(rig.det.stage(), CascadeStage::ImpactDetected);
    }

    #[test]
    fn unknown_timestamps_time_out_on_wall_clock() {
        let wall = ManualClock::at(9_000);
        let mut det = CascadeFallDetector::with_clock(CascadeThresholds::default(), wall.clone());
        det.observe_accelerometer(z_g(0.3), 0);
        assert_eq!(det.stage(), CascadeStage::FreeFallDetected);

        for _ in 0..80 {
            wall.tick(20);
            det.observe_accelerometer(z_g(1.0), 0);
        }
        assert_eq!(det.stage(), CascadeStage::FreeFallDetected);
        wall.tick(20);
        det.observe_accelerometer(z_g(1.0), 0);
        assert_eq!(det.stage(), CascadeStage::Idle);
    }

    #[test]
    fn movement_after_impact_is_not_a_fall() {
        let mut rig = Rig::new();
        rig.lying_flat();
        rig.step(z_g(0.3), 20);
        rig.step(z_g(2.0), 20);

        for i in 0..16 {
            let g = if i % 2 == 0 { 1.4 } else { 0.7 };
            rig.step(z_g(g), 20);
        }
        assert!(!rig.step(z_g(1.0), 20));
        assert_eq!(rig.det.stage(), CascadeStage::Idle);
    }

    #[test]
    fn upright_after_impact_is_not_lying_down() {
        let mut rig = Rig::new();
        let upright = Vec3::new(0.0, G, 0.0);
        rig.det.observe_magnetometer(FIELD, upright);
        assert!((rig.det.pitch_deg().abs() - 90.0).abs() < 0.1);

        rig.step(Vec3::new(0.0, 0.3 * G, 0.0), 20);
        rig.step(Vec3::new(0.0, 2.0 * G, 0.0), 20);
        rig.hold(upright, 320);
        assert!(!rig.step(upright, 20));
        assert_eq!(rig.det.stage(), CascadeStage::Idle);
    }

    #[test]
    fn degenerate_fusion_keeps_previous_pitch() {
        let mut rig = Rig::new();
        rig.det.observe_magnetometer(FIELD, Vec3::new(0.0, G, 0.0));
        let before = rig.det.pitch_deg();
        rig.det.observe_magnetometer(FIELD, z_g(0.05));
        assert_eq!(rig.det.pitch_deg(), before);
    }

    #[test]
    fn reset_from_confirmed_then_baseline_stays_idle() {
        let mut rig = Rig::new();
        rig.lying_flat();
        rig.step(z_g(0.3), 20);
        rig.step(z_g(2.0), 20);
        rig.hold(z_g(1.0), 340);
        assert!(rig.det.is_confirmed());

        rig.det.reset();
        rig.det.reset();
        assert_eq!(rig.det.stage(), CascadeStage::Idle);
        assert_eq!(rig.det.pitch_deg(), 0.0);

        assert!(!rig.hold(z_g(1.0), 10_000));
        assert_eq!(rig.det.stage(), CascadeStage::Idle);
    }
}
