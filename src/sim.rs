//! Synthetic straight-line drive.
//!
//! Produces sensor data and satellite fixes that agree with each other, so a
//! clean run is classified Trusted throughout, plus optional spoof injection
//! for exercising the inertial fallback. The device lies flat with its y axis
//! along the direction of travel.
//!
//! Phases: STATIONARY → ACCELERATE → CRUISE

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::geodesy;
use crate::types::{Fix, RawSensorFrame, SensorSample, Vec3, STANDARD_GRAVITY};

/// Horizontal / vertical geomagnetic field components [µT]
const FIELD_HORIZONTAL: f64 = 22.0;
const FIELD_VERTICAL: f64 = 40.0;

/// Simple pseudo-random noise generator (deterministic for reproducibility)
struct NoiseGen {
    state: u32,
}

impl NoiseGen {
    fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Returns noise in range [-amplitude, +amplitude]
    fn next(&mut self, amplitude: f64) -> f64 {
        self.state = self.state.wrapping_mul(1103515245).wrapping_add(12345);
        let normalized = (self.state as f64 / u32::MAX as f64) * 2.0 - 1.0;
        normalized * amplitude
    }
}

/// Fake satellite fixes from an external mock-location app
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpoofInjection {
    /// First spoofed fix at or after this time
    pub from_millis: i64,
    /// Constant displacement north of the true track
    pub offset_m: f64,
    /// Added to the true speed
    pub speed_offset: f32,
    /// Added to the true bearing
    pub bearing_offset_deg: f32,
    pub provider_id: String,
}

impl Default for SpoofInjection {
    fn default() -> Self {
        Self {
            from_millis: 6_000,
            offset_m: 5_000.0,
            speed_offset: 30.0,
            bearing_offset_deg: 120.0,
            provider_id: "mock-gps".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DriveProfile {
    pub start_lat: f64,
    pub start_lon: f64,
    /// Direction of travel [deg]; keep it non-zero so fixes carry a bearing
    pub heading_deg: f64,
    pub start_millis: i64,
    pub stationary_secs: f64,
    pub accel_mps2: f64,
    pub accel_secs: f64,
    pub cruise_secs: f64,
    pub sample_interval_millis: i64,
    pub fix_interval_millis: i64,
    /// Per-axis accelerometer noise amplitude [m/s²]
    pub accel_noise: f64,
    pub satellite_confidence: f32,
    pub seed: u32,
    pub spoof: Option<SpoofInjection>,
}

impl Default for DriveProfile {
    fn default() -> Self {
        Self {
            start_lat: 37.7749,
            start_lon: -122.4194,
            heading_deg: 60.0,
            start_millis: 0,
            stationary_secs: 2.0,
            accel_mps2: 1.0,
            accel_secs: 8.0,
            cruise_secs: 10.0,
            sample_interval_millis: 10,
            fix_interval_millis: 1_000,
            accel_noise: 0.02,
            satellite_confidence: 0.9,
            seed: 42,
            spoof: None,
        }
    }
}

impl DriveProfile {
    pub fn duration_millis(&self) -> i64 {
        ((self.stationary_secs + self.accel_secs + self.cruise_secs) * 1000.0).round() as i64
    }

    /// Ground-truth (distance along track [m], speed [m/s], acceleration [m/s²])
    /// at `elapsed` seconds since the start
    pub fn kinematics_at(&self, elapsed: f64) -> (f64, f64, f64) {
        let accel_start = self.stationary_secs;
        let accel_end = accel_start + self.accel_secs;

        if elapsed < accel_start {
            (0.0, 0.0, 0.0)
        } else if elapsed < accel_end {
            let tau = elapsed - accel_start;
            (0.5 * self.accel_mps2 * tau * tau, self.accel_mps2 * tau, self.accel_mps2)
        } else {
            let cruise_speed = self.accel_mps2 * self.accel_secs;
            let accel_distance = 0.5 * self.accel_mps2 * self.accel_secs * self.accel_secs;
            (accel_distance + cruise_speed * (elapsed - accel_end), cruise_speed, 0.0)
        }
    }

    /// Ground-truth position at `elapsed` seconds
    pub fn position_at(&self, elapsed: f64) -> (f64, f64) {
        let (distance, _, _) = self.kinematics_at(elapsed);
        let heading = self.heading_deg.to_radians();
        geodesy::offset_position(
            self.start_lat,
            self.start_lon,
            distance * heading.cos(),
            distance * heading.sin(),
        )
    }

    /// Magnetometer reading of a flat device whose y axis points at `heading_deg`
    fn magnetic(&self) -> Vec3 {
        let heading = self.heading_deg.to_radians();
        Vec3::new(
            -heading.sin() * FIELD_HORIZONTAL,
            heading.cos() * FIELD_HORIZONTAL,
            -FIELD_VERTICAL,
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SimEvent {
    Raw(RawSensorFrame),
    Sample(SensorSample),
    Satellite(Fix),
}

impl SimEvent {
    pub fn timestamp_millis(&self) -> i64 {
        match self {
            SimEvent::Raw(frame) => frame.timestamp_millis,
            SimEvent::Sample(sample) => sample.timestamp_millis,
            SimEvent::Satellite(fix) => fix.timestamp_millis,
        }
    }
}

/// Iterator over the drive's events in timestamp order. At equal timestamps
/// the sensor event comes before the satellite fix.
pub struct DriveSimulator {
    profile: DriveProfile,
    noise: NoiseGen,
    raw_frames: bool,
    elapsed_millis: i64,
    pending: VecDeque<SimEvent>,
}

impl DriveSimulator {
    pub fn new(profile: DriveProfile) -> Self {
        let noise = NoiseGen::new(profile.seed);
        Self {
            profile,
            noise,
            raw_frames: false,
            elapsed_millis: 0,
            pending: VecDeque::new(),
        }
    }

    /// Emit raw frames (gravity still included) instead of preprocessed samples
    pub fn with_raw_frames(mut self, raw: bool) -> Self {
        self.raw_frames = raw;
        self
    }

    pub fn profile(&self) -> &DriveProfile {
        &self.profile
    }

    fn sensor_event(&mut self, timestamp_millis: i64, forward_accel: f64) -> SimEvent {
        let amplitude = self.profile.accel_noise;
        let noise = Vec3::new(
            self.noise.next(amplitude),
            self.noise.next(amplitude),
            self.noise.next(amplitude),
        );
        let linear = Vec3::new(0.0, forward_accel, 0.0) + noise;
        let gravity = Vec3::new(0.0, 0.0, STANDARD_GRAVITY);
        let magnetic = self.profile.magnetic();

        if self.raw_frames {
            SimEvent::Raw(RawSensorFrame {
                timestamp_millis,
                accelerometer: gravity + linear,
                gyroscope: Vec3::zeros(),
                magnetic,
            })
        } else {
            SimEvent::Sample(SensorSample {
                timestamp_millis,
                gravity,
                magnetic,
                gyroscope: Vec3::zeros(),
                linear_acceleration: linear,
            })
        }
    }

    fn satellite_fix(&self, timestamp_millis: i64, elapsed: f64) -> Fix {
        let profile = &self.profile;
        let (_, speed, _) = profile.kinematics_at(elapsed);
        let (lat, lon) = profile.position_at(elapsed);
        // A parked receiver reports no bearing
        let bearing = if speed > 0.0 { geodesy::normalize_bearing(profile.heading_deg) } else { 0.0 };

        let fix = Fix::satellite(lat, lon, speed as f32, bearing as f32, timestamp_millis)
            .with_confidence(profile.satellite_confidence);

        match &profile.spoof {
            Some(spoof) if timestamp_millis >= spoof.from_millis => {
                let (spoof_lat, spoof_lon) = geodesy::offset_position(lat, lon, spoof.offset_m, 0.0);
                let spoof_bearing = geodesy::normalize_bearing((bearing as f32 + spoof.bearing_offset_deg) as f64);
                let mut spoofed = fix
                    .with_speed(speed as f32 + spoof.speed_offset)
                    .with_bearing(spoof_bearing as f32)
                    .with_provider(spoof.provider_id.clone(), true);
                spoofed.latitude = spoof_lat;
                spoofed.longitude = spoof_lon;
                spoofed
            }
            _ => fix,
        }
    }
}

impl Iterator for DriveSimulator {
    type Item = SimEvent;

    fn next(&mut self) -> Option<SimEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        if self.elapsed_millis > self.profile.duration_millis() {
            return None;
        }

        let elapsed_millis = self.elapsed_millis;
        let timestamp_millis = self.profile.start_millis + elapsed_millis;
        let elapsed = elapsed_millis as f64 / 1000.0;
        let (_, _, forward_accel) = self.profile.kinematics_at(elapsed);

        let sensor = self.sensor_event(timestamp_millis, forward_accel);
        if elapsed_millis % self.profile.fix_interval_millis.max(1) == 0 {
            let fix = self.satellite_fix(timestamp_millis, elapsed);
            self.pending.push_back(SimEvent::Satellite(fix));
        }

        self.elapsed_millis += self.profile.sample_interval_millis.max(1);
        Some(sensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor_fusion::FusionOrchestrator;
    use crate::spoofing::TrustLevel;
    use crate::types::LocationSource;
    use approx::assert_abs_diff_eq;

    fn drive(orchestrator: &mut FusionOrchestrator, simulator: DriveSimulator) {
        for event in simulator {
            match event {
                SimEvent::Raw(frame) => {
                    orchestrator.on_raw_sensor(&frame);
                }
                SimEvent::Sample(sample) => {
                    orchestrator.on_sensor_sample(&sample);
                }
                SimEvent::Satellite(fix) => {
                    orchestrator.on_satellite_fix(&fix);
                }
            }
        }
    }

    #[test]
    fn test_event_counts_and_order() {
        let events: Vec<_> = DriveSimulator::new(DriveProfile::default()).collect();
        let fixes = events.iter().filter(|e| matches!(e, SimEvent::Satellite(_))).count();
        let samples = events.iter().filter(|e| matches!(e, SimEvent::Sample(_))).count();

        assert_eq!(fixes, 21);
        assert_eq!(samples, 2_001);
        assert!(events
            .windows(2)
            .all(|pair| pair[0].timestamp_millis() <= pair[1].timestamp_millis()));
    }

    #[test]
    fn test_kinematics() {
        let profile = DriveProfile::default();
        assert_eq!(profile.kinematics_at(1.0), (0.0, 0.0, 0.0));

        let (distance, speed, accel) = profile.kinematics_at(6.0);
        assert_abs_diff_eq!(distance, 8.0);
        assert_abs_diff_eq!(speed, 4.0);
        assert_abs_diff_eq!(accel, 1.0);

        let (distance, speed, accel) = profile.kinematics_at(15.0);
        assert_abs_diff_eq!(distance, 32.0 + 8.0 * 5.0);
        assert_abs_diff_eq!(speed, 8.0);
        assert_abs_diff_eq!(accel, 0.0);
    }

    #[test]
    fn test_clean_drive_is_trusted() {
        let mut orchestrator = FusionOrchestrator::default();
        drive(&mut orchestrator, DriveSimulator::new(DriveProfile::default()));

        let counters = orchestrator.counters();
        assert_eq!(counters.trusted_fixes, 21);
        assert_eq!(counters.suspicious_fixes, 0);
        assert_eq!(counters.spoofed_fixes, 0);
        assert!(!orchestrator.is_spoofed());

        let published = orchestrator.published_location().unwrap();
        assert_eq!(published.source, LocationSource::Satellite);
        assert_abs_diff_eq!(published.speed, 8.0);
    }

    #[test]
    fn test_spoofed_drive_falls_back_to_inertial() {
        let profile = DriveProfile {
            spoof: Some(SpoofInjection::default()),
            ..DriveProfile::default()
        };
        let mut orchestrator = FusionOrchestrator::default();
        drive(&mut orchestrator, DriveSimulator::new(profile));

        let counters = orchestrator.counters();
        // Fixes at 0..=5 s are genuine, 6..=20 s come from the mock provider
        assert_eq!(counters.trusted_fixes, 6);
        assert_eq!(counters.spoofed_fixes, 15);
        assert!(orchestrator.is_spoofed());

        let published = orchestrator.published_location().unwrap();
        assert_eq!(published.source, LocationSource::Inertial);
        assert_eq!(orchestrator.last_verdict().unwrap().level, TrustLevel::Spoofed);

        // Inertial output stays near the true track, nowhere near the fake one
        let (true_lat, true_lon) = DriveProfile::default().position_at(20.0);
        let error = geodesy::haversine_distance(published.latitude, published.longitude, true_lat, true_lon);
        assert!(error < 1_000.0, "inertial drifted {error:.0} m");
    }

    #[test]
    fn test_raw_frames_feed_preprocessor() {
        let profile = DriveProfile {
            cruise_secs: 0.0,
            ..DriveProfile::default()
        };
        let events: Vec<_> = DriveSimulator::new(profile).with_raw_frames(true).collect();
        assert!(events.iter().all(|e| !matches!(e, SimEvent::Sample(_))));

        let mut orchestrator = FusionOrchestrator::default();
        for event in events {
            match event {
                SimEvent::Raw(frame) => {
                    orchestrator.on_raw_sensor(&frame);
                }
                SimEvent::Satellite(fix) => {
                    orchestrator.on_satellite_fix(&fix);
                }
                SimEvent::Sample(_) => unreachable!(),
            }
        }
        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.sensor_frames, 1_001);
        assert_eq!(snapshot.sensor_samples, 1_001);
        assert_eq!(snapshot.counters.trusted_fixes, 11);
    }
}
