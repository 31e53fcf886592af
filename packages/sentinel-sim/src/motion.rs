//! motion.rs — Turns a scenario timeline into sensor events
//!
//! Every tick emits one reading per sensor, all sharing a timestamp, in the
//! order a phone typically delivers them: raw accelerometer, magnetometer,
//! gravity, gyroscope, linear acceleration. The raw accelerometer is always
//! gravity + linear acceleration so the two detectors see a consistent world.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use sentinel_types::{SensorEvent, SensorKind, Vec3};

use crate::scenarios::{Motion, Phase};

pub const STANDARD_GRAVITY: f32 = 9.81;

/// Sensor clock origin. Non-zero so consecutive timestamps always give a
/// real dt.
const CLOCK_ORIGIN_NS: u64 = 1_000_000_000;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct NoiseConfig {
    /// Per-axis σ on linear acceleration at rest (m/s²)
    pub linear_sigma_mps2: f32,
    /// Per-axis σ on the gyroscope (rad/s)
    pub gyro_sigma_rads: f32,
    /// Per-axis σ on the magnetometer (µT)
    pub magnetic_sigma_ut: f32,
}

/// All sensor readings for one tick.
#[derive(Debug, Clone)]
pub struct Frame {
    pub t_ms: u64,
    pub events: Vec<SensorEvent>,
}

pub struct SensorSynth {
    rng: StdRng,
    noise: NoiseConfig,
    /// Earth field in the device frame (µT)
    field: Vec3,
    period_ms: u64,
}

impl SensorSynth {
    pub fn new(noise: NoiseConfig, field: Vec3, rate_hz: f64, seed: u64) -> Self {
        let period_ms = ((1000.0 / rate_hz).round() as u64).max(1);
        Self { rng: StdRng::seed_from_u64(seed), noise, field, period_ms }
    }

    pub fn period_ms(&self) -> u64 { self.period_ms }

    pub fn render(&mut self, phases: &[Phase]) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut t_ms = 0u64;
        for phase in phases {
            let ticks = (phase.duration_ms / self.period_ms).max(1);
            for i in 0..ticks {
                let progress = (i + 1) as f32 / ticks as f32;
                t_ms += self.period_ms;
                frames.push(self.sample(phase, progress, t_ms));
            }
        }
        frames
    }

    fn sample(&mut self, phase: &Phase, progress: f32, t_ms: u64) -> Frame {
        let (up, linear, gyro) = match phase.motion {
            Motion::Rest { up } => (up, self.gaussian(self.noise.linear_sigma_mps2), self.gaussian(self.noise.gyro_sigma_rads)),
            Motion::Handling { up, sigma_mps2 } => (up, self.gaussian(sigma_mps2), self.gaussian(sigma_mps2 * 0.3)),
            Motion::FreeFall { up } => {
                let linear = up.scale(-STANDARD_GRAVITY).add(&self.gaussian(self.noise.linear_sigma_mps2));
                (up, linear, self.gaussian(self.noise.gyro_sigma_rads))
            }
            Motion::Impact { up, linear_mps2 } => {
                (up, linear_mps2.add(&self.gaussian(self.noise.linear_sigma_mps2)), self.gaussian(self.noise.gyro_sigma_rads))
            }
            Motion::Tumble { from, to, sigma_mps2 } => {
                let start = from.z.atan2(from.y);
                let sweep = to.z.atan2(to.y) - start;
                let theta = start + sweep * progress;
                let up = Vec3::new(0.0, theta.cos(), theta.sin());
                let rate = sweep / (phase.duration_ms.max(1) as f32 / 1000.0);
                let gyro = Vec3::new(rate, 0.0, 0.0).add(&self.gaussian(self.noise.gyro_sigma_rads));
                (up, self.gaussian(sigma_mps2), gyro)
            }
        };

        let gravity = up.scale(STANDARD_GRAVITY);
        let raw = gravity.add(&linear);
        let jitter = self.gaussian(self.noise.magnetic_sigma_ut);
        let magnetic = self.field.add(&jitter);
        let ts = CLOCK_ORIGIN_NS + t_ms * 1_000_000;

        Frame {
            t_ms,
            events: vec![
                SensorEvent::new(SensorKind::Accelerometer, raw, ts),
                SensorEvent::new(SensorKind::Magnetometer, magnetic, ts),
                SensorEvent::new(SensorKind::Gravity, gravity, ts),
                SensorEvent::new(SensorKind::Gyroscope, gyro, ts),
                SensorEvent::new(SensorKind::LinearAcceleration, linear, ts),
            ],
        }
    }

    /// Independent N(0, σ²) on each axis; σ = 0 gives exact zeros.
    fn gaussian(&mut self, sigma: f32) -> Vec3 {
        match Normal::new(0.0f32, sigma) {
            Ok(n) if sigma > 0.0 => Vec3::new(n.sample(&mut self.rng), n.sample(&mut self.rng), n.sample(&mut self.rng)),
            _ => Vec3::ZERO,
        }
    }
}
