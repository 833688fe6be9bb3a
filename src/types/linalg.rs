//! Linear algebra type system for the fusion engine
//!
//! Fixed-size nalgebra aliases shared by the orientation estimator and the
//! dead-reckoning integrator, so frame conversions are checked at compile time.

use nalgebra::{Matrix3, UnitQuaternion, Vector3};

// ===== Frames =====
// Device frame: sensor axes as reported by the collaborator.
// World frame: East, North, Up.

/// 3-vector in either frame (m/s², rad/s, µT, m/s depending on context)
pub type Vec3 = Vector3<f64>;

/// Device → world rotation. Rows are the world axes (E, N, U) in device coordinates.
pub type RotationMat = Matrix3<f64>;

/// Unit quaternion carried by the gyroscope integration path
pub type Attitude = UnitQuaternion<f64>;

// ===== Constants =====
pub const STANDARD_GRAVITY: f64 = 9.80665; // m/s²
pub const METERS_PER_DEGREE: f64 = 111_000.0; // flat-earth approximation

/// Rotate a device-frame vector into the world frame
#[inline]
pub fn rotate_to_world(rotation: &RotationMat, device: &Vec3) -> Vec3 {
    rotation * device
}
