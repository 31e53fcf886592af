//! # clock
//!
//! Detector time for the deadline checks.
//!
//! Sensor timestamps drive the timeline while they move forward. A sample
//! stamped 0 (unknown) or earlier than its predecessor advances the timeline
//! by the wall-clock time since the previous sample instead, so a stream
//! with bad timestamps still reaches its deadlines.

use std::sync::Arc;

use chrono::Utc;

/// Millisecond wall clock.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WallClock;

impl Clock for WallClock {
    fn now_ms(&self) -> u64 {
        Utc::now().timestamp_millis().max(0) as u64
    }
}

#[derive(Debug, Clone, Copy)]
struct Mark {
    sensor_ns: u64,
    wall_ms: u64,
    now_ns: u64,
}

#[derive(Clone)]
pub struct Timeline {
    clock: Arc<dyn Clock>,
    last: Option<Mark>,
}

impl Timeline {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock, last: None }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Place a sample on the timeline and return its detector time (ms).
    /// Never goes backwards.
    pub fn advance(&mut self, sensor_ns: u64) -> u64 {
        let wall_ms = self.clock.now_ms();
        let now_ns = match self.last {
            None if sensor_ns > 0 => sensor_ns,
            None => wall_ms.saturating_mul(1_000_000),
            Some(m) if sensor_ns > 0 && m.sensor_ns > 0 && sensor_ns >= m.sensor_ns => {
                m.now_ns.saturating_add(sensor_ns - m.sensor_ns)
            }
            Some(m) => m.now_ns.saturating_add(wall_ms.saturating_sub(m.wall_ms).saturating_mul(1_000_000)),
        };
        self.last = Some(Mark { sensor_ns, wall_ms, now_ns });
        now_ns / 1_000_000
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new(Arc::new(WallClock))
    }
}

/// Hand-driven clock for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ManualClock(std::sync::atomic::AtomicU64);

#[cfg(test)]
impl ManualClock {
    pub fn at(ms: u64) -> Arc<Self> {
        Arc::new(Self(std::sync::atomic::AtomicU64::new(ms)))
    }

    pub fn tick(&self, ms: u64) {
        self.0.fetch_add(ms, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_sensor_time_while_it_moves_forward() {
        let wall = ManualClock::at(1_000_000);
        let mut t = Timeline::new(wall.clone());
        assert_eq!(t.advance(5_000_000_000), 5_000);
        wall.tick(3);
        assert_eq!(t.advance(5_020_000_000), 5_020);
        assert_eq!(t.advance(5_020_000_000), 5_020);
    }

    #[test]
    fn zero_timestamps_advance_with_wall_clock() {
        let wall = ManualClock::at(70_000);
        let mut t = Timeline::new(wall.clone());
        assert_eq!(t.advance(0), 70_000);
        wall.tick(20);
        assert_eq!(t.advance(0), 70_020);
        wall.tick(20);
        assert_eq!(t.advance(0), 70_040);
    }

    #[test]
    fn backwards_jump_falls_back_then_resumes_sensor_deltas() {
        let wall = ManualClock::at(0);
        let mut t = Timeline::new(wall.clone());
        assert_eq!(t.advance(2_000_000_000), 2_000);
        wall.tick(20);
        // Sensor clock restarted
        assert_eq!(t.advance(1_000_000), 2_020);
        assert_eq!(t.advance(21_000_000), 2_040);
    }

    #[test]
    fn wall_clock_is_epoch_millis() {
        assert!(WallClock.now_ms() > 1_600_000_000_000);
    }
}
