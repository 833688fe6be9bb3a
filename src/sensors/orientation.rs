//! Device attitude from gravity + magnetic field (absolute) and gyroscope (incremental).
//!
//! The rotation matrix maps device-frame vectors into the world frame
//! (East, North, Up). Azimuth wraps at ±180°; consumers that difference
//! azimuths must go through [`crate::geodesy::angle_difference`].

use log::{debug, warn};
use nalgebra::{Rotation3, UnitQuaternion};
use serde::{Deserialize, Serialize};

use crate::types::{Attitude, RotationMat, Vec3, STANDARD_GRAVITY};

/// Rates below this are treated as "not rotating" [rad/s]
pub const GYRO_EPSILON: f64 = 1e-6;

/// Below this horizontal field strength the compass heading is undefined
const MIN_HORIZONTAL_FIELD: f64 = 0.1;

/// Gravity readings this weak mean free fall; tilt is undefined
const FREE_FALL_GRAVITY_SQ: f64 = 0.01 * STANDARD_GRAVITY * STANDARD_GRAVITY;

/// Serializable view of the current attitude
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrientationState {
    pub rotation: RotationMat,
    pub azimuth_deg: f64,
    pub pitch_deg: f64,
    pub roll_deg: f64,
}

/// Tilt-compensated compass construction.
///
/// Returns `None` when gravity is too weak (free fall) or the magnetic
/// field is nearly parallel to gravity (no horizontal component).
pub fn rotation_from_gravity_magnetic(gravity: &Vec3, magnetic: &Vec3) -> Option<RotationMat> {
    if gravity.norm_squared() < FREE_FALL_GRAVITY_SQ {
        return None;
    }

    // H points East, M points North, A points Up (all in device coordinates)
    let h = magnetic.cross(gravity);
    let norm_h = h.norm();
    if norm_h < MIN_HORIZONTAL_FIELD {
        return None;
    }
    let h = h / norm_h;
    let a = gravity.normalize();
    let m = a.cross(&h);

    Some(RotationMat::from_rows(&[
        h.transpose(),
        m.transpose(),
        a.transpose(),
    ]))
}

/// (azimuth, pitch, roll) in radians
pub fn euler_from_rotation(r: &RotationMat) -> (f64, f64, f64) {
    let azimuth = r[(0, 1)].atan2(r[(1, 1)]);
    let pitch = (-r[(2, 1)]).clamp(-1.0, 1.0).asin();
    let roll = (-r[(2, 0)]).atan2(r[(2, 2)]);
    (azimuth, pitch, roll)
}

pub struct OrientationEstimator {
    rotation: RotationMat,
    attitude: Attitude,
    azimuth: f64,
    pitch: f64,
    roll: f64,
    absolute_updates: u64,
    gyro_updates: u64,
}

impl OrientationEstimator {
    pub fn new() -> Self {
        Self {
            rotation: RotationMat::identity(),
            attitude: Attitude::identity(),
            azimuth: 0.0,
            pitch: 0.0,
            roll: 0.0,
            absolute_updates: 0,
            gyro_updates: 0,
        }
    }

    /// Absolute update from the low-passed gravity vector and the magnetometer.
    ///
    /// Leaves the state untouched and returns false when the geometry is degenerate.
    pub fn update_absolute(&mut self, gravity: &Vec3, magnetic: &Vec3) -> bool {
        let Some(rotation) = rotation_from_gravity_magnetic(gravity, magnetic) else {
            warn!(
                "[orientation] degenerate gravity/magnetic pair (|g|={:.3}, |m|={:.3}), keeping previous attitude",
                gravity.norm(),
                magnetic.norm()
            );
            return false;
        };

        self.rotation = rotation;
        // Keep the gyro path continuous with the absolute attitude
        self.attitude =
            UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation));
        self.refresh_angles();
        self.absolute_updates += 1;
        true
    }

    /// Integrate one gyroscope reading over `dt` seconds
    pub fn update_gyroscope(&mut self, gyro: &Vec3, dt: f64) {
        let rate = gyro.norm();
        if rate < GYRO_EPSILON {
            return;
        }

        let angle = rate * dt;
        let axis = nalgebra::Unit::new_unchecked(gyro / rate);
        let delta = UnitQuaternion::from_axis_angle(&axis, angle);

        // Body-frame increment composes on the right; renormalize against drift
        self.attitude = UnitQuaternion::new_normalize((self.attitude * delta).into_inner());

        self.rotation = self.attitude.to_rotation_matrix().into_inner();
        self.refresh_angles();
        self.gyro_updates += 1;

        debug!(
            "[orientation] gyro step |w|={:.4} rad/s dt={:.3}s azimuth={:.1}",
            rate,
            dt,
            self.azimuth_deg()
        );
    }

    fn refresh_angles(&mut self) {
        let (azimuth, pitch, roll) = euler_from_rotation(&self.rotation);
        self.azimuth = azimuth;
        self.pitch = pitch;
        self.roll = roll;
    }

    pub fn rotation(&self) -> &RotationMat {
        &self.rotation
    }

    pub fn attitude(&self) -> &Attitude {
        &self.attitude
    }

    /// Degrees in (-180, 180]
    pub fn azimuth_deg(&self) -> f64 {
        self.azimuth.to_degrees()
    }

    pub fn pitch_deg(&self) -> f64 {
        self.pitch.to_degrees()
    }

    pub fn roll_deg(&self) -> f64 {
        self.roll.to_degrees()
    }

    pub fn update_counts(&self) -> (u64, u64) {
        (self.absolute_updates, self.gyro_updates)
    }

    pub fn state(&self) -> OrientationState {
        OrientationState {
            rotation: self.rotation,
            azimuth_deg: self.azimuth_deg(),
            pitch_deg: self.pitch_deg(),
            roll_deg: self.roll_deg(),
        }
    }
}

impl Default for OrientationEstimator {
    fn default() -> Self {
        Self::new()
    }
}
