//! Sensor-ingest stage: bias removal, gravity low-pass, and rate throttling.
//!
//! Turns [`RawSensorFrame`]s into the [`SensorSample`]s the dead-reckoning
//! integrator consumes.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::types::{RawSensorFrame, SensorSample, Vec3, STANDARD_GRAVITY};

pub const GRAVITY_ALPHA: f64 = 0.8;
pub const MIN_SAMPLE_INTERVAL_MILLIS: i64 = 10; // ~100 Hz

/// First-order low-pass gravity estimate: `g = g + α(a − g)`
#[derive(Clone, Debug)]
pub struct GravityFilter {
    alpha: f64,
    gravity: Option<Vec3>,
}

impl GravityFilter {
    pub fn new(alpha: f64) -> Self {
        Self { alpha, gravity: None }
    }

    /// Update with one accelerometer reading and return the gravity estimate.
    /// The first reading seeds the filter directly.
    pub fn update(&mut self, accel: &Vec3) -> Vec3 {
        let next = match self.gravity {
            Some(g) => g + (accel - g) * self.alpha,
            None => *accel,
        };
        self.gravity = Some(next);
        next
    }

    pub fn gravity(&self) -> Option<Vec3> {
        self.gravity
    }

    pub fn reset(&mut self) {
        self.gravity = None;
    }
}

impl Default for GravityFilter {
    fn default() -> Self {
        Self::new(GRAVITY_ALPHA)
    }
}

/// Per-axis sensor bias measured while the device sits still and level
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorCalibration {
    pub accel_bias: Vec3,
    pub gyro_bias: Vec3,
}

impl SensorCalibration {
    /// Average bias over stationary frames. The accelerometer z-axis keeps
    /// standard gravity, so only the excess is treated as bias.
    pub fn from_stationary_frames(frames: &[RawSensorFrame]) -> Option<Self> {
        if frames.is_empty() {
            return None;
        }

        let n = frames.len() as f64;
        let accel_sum = frames.iter().fold(Vec3::zeros(), |acc, f| acc + f.accelerometer);
        let gyro_sum = frames.iter().fold(Vec3::zeros(), |acc, f| acc + f.gyroscope);

        let mut accel_bias = accel_sum / n;
        accel_bias.z -= STANDARD_GRAVITY;

        let calibration = Self {
            accel_bias,
            gyro_bias: gyro_sum / n,
        };
        info!(
            "[calibration] {} frames: accel bias [{:.4}, {:.4}, {:.4}] gyro bias [{:.5}, {:.5}, {:.5}]",
            frames.len(),
            calibration.accel_bias.x,
            calibration.accel_bias.y,
            calibration.accel_bias.z,
            calibration.gyro_bias.x,
            calibration.gyro_bias.y,
            calibration.gyro_bias.z
        );
        Some(calibration)
    }

    pub fn apply(&self, frame: &RawSensorFrame) -> RawSensorFrame {
        RawSensorFrame {
            timestamp_millis: frame.timestamp_millis,
            accelerometer: frame.accelerometer - self.accel_bias,
            gyroscope: frame.gyroscope - self.gyro_bias,
            magnetic: frame.magnetic,
        }
    }
}

pub struct SensorPreprocessor {
    calibration: SensorCalibration,
    gravity: GravityFilter,
    last_emit_millis: Option<i64>,
    frames_in: u64,
    samples_out: u64,
}

impl SensorPreprocessor {
    pub fn new(calibration: SensorCalibration) -> Self {
        Self {
            calibration,
            gravity: GravityFilter::default(),
            last_emit_millis: None,
            frames_in: 0,
            samples_out: 0,
        }
    }

    pub fn set_calibration(&mut self, calibration: SensorCalibration) {
        self.calibration = calibration;
    }

    /// Every frame updates the gravity estimate; samples are emitted at most
    /// once per [`MIN_SAMPLE_INTERVAL_MILLIS`].
    pub fn process(&mut self, raw: &RawSensorFrame) -> Option<SensorSample> {
        self.frames_in += 1;
        let frame = self.calibration.apply(raw);
        let gravity = self.gravity.update(&frame.accelerometer);

        if let Some(last) = self.last_emit_millis {
            if frame.timestamp_millis.saturating_sub(last) < MIN_SAMPLE_INTERVAL_MILLIS {
                return None;
            }
        }
        self.last_emit_millis = Some(frame.timestamp_millis);
        self.samples_out += 1;

        if self.samples_out % 1000 == 0 {
            debug!(
                "[preprocess] {} frames in, {} samples out",
                self.frames_in, self.samples_out
            );
        }

        Some(SensorSample {
            timestamp_millis: frame.timestamp_millis,
            gravity,
            magnetic: frame.magnetic,
            gyroscope: frame.gyroscope,
            linear_acceleration: frame.accelerometer - gravity,
        })
    }

    pub fn counts(&self) -> (u64, u64) {
        (self.frames_in, self.samples_out)
    }
}

impl Default for SensorPreprocessor {
    fn default() -> Self {
        Self::new(SensorCalibration::default())
    }
}
