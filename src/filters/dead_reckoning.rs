//! Inertial dead reckoning: world-frame acceleration → velocity → position.
//!
//! One mutex covers the navigation state together with the orientation
//! estimator and movement classifier, so `initialize` and `on_sample` are
//! symmetric writers that never observe each other half-way through.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::{IntegratorConfig, MovementConfig};
use crate::geodesy;
use crate::sensors::movement::{MovementClassifier, MovementState};
use crate::sensors::orientation::{OrientationEstimator, OrientationState};
use crate::types::{rotate_to_world, Fix, LocationSource, SensorSample, Vec3};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NavigationState {
    pub latitude: f64,
    pub longitude: f64,
    /// World frame (east, north, up) [m/s]
    pub velocity: Vec3,
    pub last_update_millis: Option<i64>,
    /// The trusted fix the integration is anchored to
    pub seed: Option<Fix>,
}

impl NavigationState {
    fn new() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            velocity: Vec3::zeros(),
            last_update_millis: None,
            seed: None,
        }
    }

    pub fn horizontal_speed(&self) -> f64 {
        self.velocity.x.hypot(self.velocity.y)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IntegratorStats {
    pub integrated: u64,
    pub skipped_gaps: u64,
    pub reseeds: u64,
}

struct Inner {
    nav: NavigationState,
    orientation: OrientationEstimator,
    movement: MovementClassifier,
    stats: IntegratorStats,
    last_output: Option<Fix>,
}

pub struct DeadReckoningIntegrator {
    config: IntegratorConfig,
    inner: Mutex<Inner>,
}

impl DeadReckoningIntegrator {
    pub fn new(config: IntegratorConfig, movement: MovementConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                nav: NavigationState::new(),
                orientation: OrientationEstimator::new(),
                movement: MovementClassifier::new(movement),
                stats: IntegratorStats::default(),
                last_output: None,
            }),
        }
    }

    // Every write to the guarded state is a whole-field assignment, so a
    // panic elsewhere cannot leave it torn.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reseed from a trusted absolute fix: position = fix, velocity = 0,
    /// clock = fix timestamp.
    pub fn initialize(&self, fix: &Fix) {
        let mut inner = self.lock();
        inner.nav.latitude = fix.latitude;
        inner.nav.longitude = fix.longitude;
        inner.nav.velocity = Vec3::zeros();
        inner.nav.last_update_millis = Some(fix.timestamp_millis);
        inner.nav.seed = Some(fix.clone());
        inner.stats.reseeds += 1;

        let bearing = geodesy::normalize_bearing(inner.orientation.azimuth_deg()) as f32;
        inner.last_output = Some(
            fix.clone()
                .with_source(LocationSource::Inertial)
                .with_speed(0.0)
                .with_bearing(bearing),
        );

        info!(
            "[dead-reckoning] reseeded at ({:.6}, {:.6}) t={}",
            fix.latitude, fix.longitude, fix.timestamp_millis
        );
    }

    /// Integrate one preprocessed sensor sample.
    ///
    /// Returns the updated inertial fix, or `None` when the step was skipped
    /// (first sample, sensor gap, clock going backwards) or the integrator has
    /// not been seeded yet.
    pub fn on_sample(&self, sample: &SensorSample) -> Option<Fix> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let now = sample.timestamp_millis;
        let dt = match inner.nav.last_update_millis {
            None => {
                inner.nav.last_update_millis = Some(now);
                debug!("[dead-reckoning] first sample at t={}, clock synced", now);
                return None;
            }
            // Unrepresentable intervals are treated like any other gap
            Some(last) => now.checked_sub(last).map(|ms| ms as f64 / 1000.0),
        };
        inner.nav.last_update_millis = Some(now);

        let dt = match dt {
            Some(dt) if (0.0..=self.config.max_step_secs).contains(&dt) => dt,
            Some(dt) => {
                inner.stats.skipped_gaps += 1;
                warn!("[dead-reckoning] sensor gap dt={:.3}s, skipping integration", dt);
                return None;
            }
            None => {
                inner.stats.skipped_gaps += 1;
                warn!("[dead-reckoning] sample interval overflows at t={}, resyncing", now);
                return None;
            }
        };

        inner.orientation.update_absolute(&sample.gravity, &sample.magnetic);
        inner.orientation.update_gyroscope(&sample.gyroscope, dt);

        let movement = inner.movement.update(sample.linear_magnitude(), now);
        let world_accel = rotate_to_world(inner.orientation.rotation(), &sample.linear_acceleration);

        match movement {
            // Hard reset so accelerometer bias cannot accumulate while parked
            MovementState::Stationary => inner.nav.velocity = Vec3::zeros(),
            MovementState::Moving => inner.nav.velocity += world_accel * dt,
        }

        let (lat, lon) = geodesy::offset_position(
            inner.nav.latitude,
            inner.nav.longitude,
            inner.nav.velocity.y * dt,
            inner.nav.velocity.x * dt,
        );
        inner.nav.latitude = lat;
        inner.nav.longitude = lon;
        inner.stats.integrated += 1;

        let seed = inner.nav.seed.as_ref()?;
        let fix = Fix::new(lat, lon, now, LocationSource::Inertial)
            .with_speed(inner.nav.horizontal_speed() as f32)
            .with_bearing(geodesy::normalize_bearing(inner.orientation.azimuth_deg()) as f32)
            .with_confidence(seed.confidence)
            .with_altitude(seed.altitude);
        inner.last_output = Some(fix.clone());
        Some(fix)
    }

    /// Latest inertial fix, if the integrator has been seeded
    pub fn current_fix(&self) -> Option<Fix> {
        self.lock().last_output.clone()
    }

    /// (speed [m/s], bearing [deg, 0-360)) used to cross-check satellite fixes.
    /// Available before seeding: velocity and heading do not need an anchor.
    pub fn speed_and_bearing(&self) -> (f64, f64) {
        let inner = self.lock();
        (
            inner.nav.horizontal_speed(),
            geodesy::normalize_bearing(inner.orientation.azimuth_deg()),
        )
    }

    pub fn navigation_state(&self) -> NavigationState {
        self.lock().nav.clone()
    }

    pub fn movement_state(&self) -> MovementState {
        self.lock().movement.state()
    }

    pub fn orientation(&self) -> OrientationState {
        self.lock().orientation.state()
    }

    pub fn stats(&self) -> IntegratorStats {
        self.lock().stats.clone()
    }

    pub fn is_seeded(&self) -> bool {
        self.lock().nav.seed.is_some()
    }
}

impl Default for DeadReckoningIntegrator {
    fn default() -> Self {
        Self::new(IntegratorConfig::default(), MovementConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::METERS_PER_DEGREE;
    use approx::assert_abs_diff_eq;
    use std::sync::Arc;

    // Flat, top edge pointing north: device frame == world frame
    fn sample(t: i64, linear: Vec3) -> SensorSample {
        SensorSample {
            timestamp_millis: t,
            gravity: Vec3::new(0.0, 0.0, 9.81),
            magnetic: Vec3::new(0.0, 22.0, -40.0),
            gyroscope: Vec3::zeros(),
            linear_acceleration: linear,
        }
    }

    fn seeded(lat: f64, lon: f64) -> DeadReckoningIntegrator {
        let integrator = DeadReckoningIntegrator::default();
        integrator.initialize(&Fix::satellite(lat, lon, 0.0, 0.0, 0).with_confidence(0.9));
        integrator
    }

    #[test]
    fn test_constant_acceleration_for_ten_seconds() {
        let integrator = seeded(10.0, 20.0);
        let mut last = None;
        for step in 1..=1000 {
            last = integrator.on_sample(&sample(step * 10, Vec3::new(0.0, 1.0, 0.0)));
        }

        assert_eq!(integrator.movement_state(), MovementState::Moving);
        let nav = integrator.navigation_state();
        assert_abs_diff_eq!(nav.velocity.y, 10.0, epsilon = 1e-6);
        assert_abs_diff_eq!(nav.velocity.x, 0.0, epsilon = 1e-9);

        let fix = last.unwrap();
        assert_eq!(fix.source, LocationSource::Inertial);
        assert_abs_diff_eq!(fix.speed, 10.0, epsilon = 1e-4);
        assert_abs_diff_eq!(fix.bearing, 0.0, epsilon = 1e-4);
        assert_eq!(fix.confidence, 0.9);
        // Euler sum of v·dt over 1000 steps: 50.05 m north
        assert_abs_diff_eq!((fix.latitude - 10.0) * METERS_PER_DEGREE, 50.05, epsilon = 1e-6);
        assert_abs_diff_eq!(fix.longitude, 20.0, epsilon = 1e-12);
    }

    #[test]
    fn test_stationary_forces_zero_velocity() {
        let integrator = seeded(0.0, 0.0);
        for step in 1..=200 {
            integrator.on_sample(&sample(step * 10, Vec3::new(2.0, 0.0, 0.0)));
        }
        assert!(integrator.navigation_state().velocity.x > 3.0);

        // Quiet for more than the debounce window
        let mut t = 2_000;
        while t <= 3_200 {
            t += 10;
            integrator.on_sample(&sample(t, Vec3::new(0.01, 0.0, 0.0)));
        }
        assert_eq!(integrator.movement_state(), MovementState::Stationary);
        assert_eq!(integrator.navigation_state().velocity, Vec3::zeros());
        assert_eq!(integrator.speed_and_bearing().0, 0.0);
    }

    #[test]
    fn test_gap_skips_integration_and_resyncs() {
        let integrator = seeded(0.0, 0.0);
        integrator.on_sample(&sample(10, Vec3::new(0.0, 1.0, 0.0)));
        let before = integrator.navigation_state();

        assert!(integrator.on_sample(&sample(5_000, Vec3::new(0.0, 50.0, 0.0))).is_none());
        let after = integrator.navigation_state();
        assert_eq!(after.velocity, before.velocity);
        assert_eq!(after.latitude, before.latitude);
        assert_eq!(after.last_update_millis, Some(5_000));
        assert_eq!(integrator.stats().skipped_gaps, 1);

        // Next regular step integrates again from the resynced clock
        assert!(integrator.on_sample(&sample(5_010, Vec3::new(0.0, 1.0, 0.0))).is_some());
    }

    #[test]
    fn test_backwards_clock_is_skipped() {
        let integrator = seeded(0.0, 0.0);
        integrator.on_sample(&sample(100, Vec3::zeros()));
        assert!(integrator.on_sample(&sample(50, Vec3::new(1.0, 0.0, 0.0))).is_none());
        assert_eq!(integrator.navigation_state().velocity, Vec3::zeros());
    }

    #[test]
    fn test_extreme_timestamps_resync_without_overflow() {
        let integrator = seeded(0.0, 0.0);
        integrator.on_sample(&sample(-1, Vec3::zeros()));
        assert!(integrator.on_sample(&sample(i64::MAX, Vec3::new(0.0, 50.0, 0.0))).is_none());
        assert!(integrator.on_sample(&sample(i64::MIN, Vec3::new(0.0, 50.0, 0.0))).is_none());

        let state = integrator.navigation_state();
        assert_eq!(state.velocity, Vec3::zeros());
        assert_eq!(state.last_update_millis, Some(i64::MIN));
        assert_eq!(integrator.stats().skipped_gaps, 2);
    }

    #[test]
    fn test_first_sample_only_syncs_clock() {
        let integrator = DeadReckoningIntegrator::default();
        assert!(integrator.on_sample(&sample(1_000, Vec3::new(5.0, 0.0, 0.0))).is_none());
        assert_eq!(integrator.navigation_state().velocity, Vec3::zeros());

        // Unseeded: velocity still integrates, but no fix is produced
        assert!(integrator.on_sample(&sample(1_010, Vec3::new(5.0, 0.0, 0.0))).is_none());
        assert_abs_diff_eq!(integrator.speed_and_bearing().0, 0.05, epsilon = 1e-9);
        assert!(integrator.current_fix().is_none());
    }

    #[test]
    fn test_initialize_resets_velocity() {
        let integrator = seeded(0.0, 0.0);
        for step in 1..=50 {
            integrator.on_sample(&sample(step * 10, Vec3::new(0.0, 3.0, 0.0)));
        }
        integrator.initialize(&Fix::satellite(1.0, 2.0, 0.0, 0.0, 500));
        let nav = integrator.navigation_state();
        assert_eq!(nav.velocity, Vec3::zeros());
        assert_eq!((nav.latitude, nav.longitude), (1.0, 2.0));
        assert_eq!(nav.last_update_millis, Some(500));
        assert_eq!(integrator.current_fix().unwrap().source, LocationSource::Inertial);
    }

    #[test]
    fn test_concurrent_initialize_and_samples() {
        let integrator = Arc::new(seeded(0.0, 0.0));
        let writer = {
            let integrator = Arc::clone(&integrator);
            std::thread::spawn(move || {
                for step in 1..=500 {
                    integrator.on_sample(&sample(step * 10, Vec3::new(0.0, 0.5, 0.0)));
                }
            })
        };
        for i in 0..50 {
            integrator.initialize(&Fix::satellite(0.0, 0.0, 0.0, 0.0, i * 100));
        }
        writer.join().unwrap();
        let nav = integrator.navigation_state();
        assert!(nav.latitude.is_finite() && nav.velocity.y.is_finite());
        assert_eq!(integrator.stats().reseeds, 51);
    }
}
