//! # orientation
//!
//! Accelerometer + magnetometer fusion into a device→world rotation matrix
//! and Euler angles, following the Android `SensorManager` conventions
//! (world frame: X east, Y magnetic north, Z up).
//!
//! Only pitch feeds the cascade detector; azimuth and roll come along for
//! diagnostics.

use sentinel_types::Vec3;

use crate::signal;

/// Row-major 3×3 rotation matrix
pub type RotationMatrix = [[f32; 3]; 3];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    pub azimuth_deg: f32,
    pub pitch_deg: f32,
    pub roll_deg: f32,
}

/// Build the rotation matrix from a gravity estimate and a geomagnetic reading.
///
/// Returns `None` when the device is close to free fall (|a|² < 0.01·g²) or
/// when the field is nearly parallel to gravity, since neither gives a
/// usable east vector.
pub fn rotation_matrix(gravity: &Vec3, geomagnetic: &Vec3, g: f32) -> Option<RotationMatrix> {
    let norm_sq_a = gravity.dot(gravity);
    if norm_sq_a < 0.01 * g * g {
        return None;
    }

    let h = geomagnetic.cross(gravity);
    let norm_h = signal::magnitude(&h);
    if norm_h < 0.1 {
        return None;
    }

    let h = h.scale(1.0 / norm_h);
    let a = gravity.scale(1.0 / norm_sq_a.sqrt());
    let m = a.cross(&h);

    Some([
        [h.x, h.y, h.z],
        [m.x, m.y, m.z],
        [a.x, a.y, a.z],
    ])
}

pub fn orientation(r: &RotationMatrix) -> Orientation {
    Orientation {
        azimuth_deg: r[0][1].atan2(r[1][1]).to_degrees(),
        pitch_deg: (-r[2][1]).clamp(-1.0, 1.0).asin().to_degrees(),
        roll_deg: (-r[2][0]).atan2(r[2][2]).to_degrees(),
    }
}

/// Pitch in degrees, or `None` if the fusion is degenerate.
pub fn pitch_degrees(gravity: &Vec3, geomagnetic: &Vec3, g: f32) -> Option<f32> {
    rotation_matrix(gravity, geomagnetic, g).map(|r| orientation(&r).pitch_deg)
}
