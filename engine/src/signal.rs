//! # signal
//!
//! Stateless vector math shared by both detectors. Nothing here can fail:
//! degenerate inputs (no previous sample, non-positive dt, zero vectors,
//! empty buffers) collapse to zero instead of producing NaN or a spike.

use std::collections::VecDeque;

use sentinel_types::Vec3;

/// Euclidean norm.
pub fn magnitude(v: &Vec3) -> f32 {
    (v.x * v.x + v.y * v.y + v.z * v.z).sqrt()
}

/// `|x| + |y| + |z|`, the per-sample term of the signal magnitude area.
pub fn l1_magnitude(v: &Vec3) -> f32 {
    v.x.abs() + v.y.abs() + v.z.abs()
}

/// Magnitude of the per-axis finite difference ("jerk" when fed acceleration).
pub fn derivative(current: &Vec3, previous: Option<&Vec3>, dt_secs: f32) -> f32 {
    let prev = match previous {
        Some(p) => p,
        None => return 0.0,
    };
    if !(dt_secs > 0.0) {
        return 0.0;
    }
    magnitude(&current.sub(prev).scale(1.0 / dt_secs))
}

/// Angle between two vectors in degrees; 0 when either is the zero sentinel.
pub fn angle_between_degrees(a: &Vec3, b: &Vec3) -> f32 {
    if a.is_zero() || b.is_zero() {
        return 0.0;
    }
    let cos = (a.dot(b) / (magnitude(a) * magnitude(b))).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

/// Arithmetic mean; 0 for an empty buffer.
pub fn mean<'a, I>(samples: I) -> f32
where
    I: IntoIterator<Item = &'a f32>,
{
    let (sum, n) = samples.into_iter().fold((0.0f32, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { 0.0 } else { sum / n as f32 }
}

/// Population standard deviation (divides by N); 0 for an empty buffer.
pub fn standard_deviation<'a, I>(samples: I) -> f32
where
    I: IntoIterator<Item = &'a f32>,
    I::IntoIter: Clone,
{
    let iter = samples.into_iter();
    let n = iter.clone().count();
    if n == 0 {
        return 0.0;
    }
    let mu = mean(iter.clone());
    let var = iter.map(|v| (v - mu) * (v - mu)).sum::<f32>() / n as f32;
    var.sqrt()
}

// ── Moving average ────────────────────────────────────────────────────────────

/// Strict-FIFO bounded window of L1 magnitudes. Pushing past capacity evicts
/// the oldest entry.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    window: VecDeque<f32>,
    capacity: usize,
}

impl MovingAverage {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { window: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, value: f32) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(value);
    }

    pub fn average(&self) -> f32 {
        mean(&self.window)
    }

    pub fn len(&self) -> usize { self.window.len() }
    pub fn is_empty(&self) -> bool { self.window.is_empty() }
    pub fn capacity(&self) -> usize { self.capacity }

    pub fn clear(&mut self) {
        self.window.clear();
    }
}
