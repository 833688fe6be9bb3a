//! Per-fix spoofing cross-check.
//!
//! Remembers exactly one prior satellite fix. Each new fix is compared
//! against it (apparent speed) and against the inertial speed/bearing
//! estimate, then becomes the new reference whatever the verdict.

use log::{debug, info, warn};

use super::{SpoofingFlag, TrustLevel, TrustVerdict};
use crate::config::ClassifierConfig;
use crate::geodesy;
use crate::types::Fix;

pub struct SpoofingTrustClassifier {
    config: ClassifierConfig,
    previous: Option<Fix>,
    last_level: Option<TrustLevel>,
    classified: u64,
}

impl SpoofingTrustClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            previous: None,
            last_level: None,
            classified: 0,
        }
    }

    /// Classify one satellite fix.
    ///
    /// `imu_speed` [m/s] and `imu_bearing` [deg] come from the dead-reckoning
    /// integrator and are independent of the satellite stream.
    pub fn classify(&mut self, fix: &Fix, imu_speed: f64, imu_bearing: f64) -> TrustVerdict {
        let mut flags = Vec::new();

        if fix.is_synthetic_provider
            && fix.provider_id.as_deref() != Some(self.config.own_provider_id.as_str())
        {
            flags.push(SpoofingFlag::SyntheticProvider);
        }

        if let Some(prev) = &self.previous {
            // Unrepresentable intervals (hostile timestamps) skip the speed checks
            let elapsed_secs = fix
                .timestamp_millis
                .checked_sub(prev.timestamp_millis)
                .map(|ms| ms as f64 / 1000.0)
                .unwrap_or(0.0);
            if elapsed_secs > 0.0 {
                let apparent_speed = prev.distance_to(fix) / elapsed_secs;
                if apparent_speed > self.config.max_realistic_speed {
                    flags.push(SpoofingFlag::Teleportation);
                }

                let speed_diff = (fix.speed as f64 - imu_speed).abs();
                if speed_diff > self.config.speed_diff_threshold {
                    flags.push(SpoofingFlag::SpeedMismatch);
                }

                debug!(
                    "[spoofing] apparent {:.1} m/s over {:.3}s, speed diff {:.1} m/s",
                    apparent_speed, elapsed_secs, speed_diff
                );
            }

            if fix.has_bearing() {
                let bearing_diff = geodesy::angle_difference(fix.bearing as f64, imu_bearing).abs();
                if bearing_diff > self.config.bearing_diff_threshold {
                    flags.push(SpoofingFlag::BearingMismatch);
                }
            }
        }

        self.previous = Some(fix.clone());
        self.classified += 1;

        let verdict = TrustVerdict::new(flags, self.config.spoofed_flag_count);
        self.log_transition(&verdict);
        verdict
    }

    fn log_transition(&mut self, verdict: &TrustVerdict) {
        if self.last_level == Some(verdict.level) {
            return;
        }
        match verdict.level {
            TrustLevel::Trusted => info!("[spoofing] satellite fixes trusted"),
            TrustLevel::Suspicious => warn!("[spoofing] suspicious fix: {}", verdict.description()),
            TrustLevel::Spoofed => warn!("[spoofing] SPOOFING DETECTED: {}", verdict.description()),
        }
        self.last_level = Some(verdict.level);
    }

    /// The fix the next one will be compared against
    pub fn previous_fix(&self) -> Option<&Fix> {
        self.previous.as_ref()
    }

    pub fn classified_count(&self) -> u64 {
        self.classified
    }

    /// Forget the reference fix (new navigation session)
    pub fn reset(&mut self) {
        self.previous = None;
        self.last_level = None;
    }
}

impl Default for SpoofingTrustClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::METERS_PER_DEGREE;

    #[test]
    fn test_teleport_100km_in_one_second() {
        let mut classifier = SpoofingTrustClassifier::default();
        classifier.classify(&Fix::satellite(45.0, 7.0, 0.0, 0.0, 0), 0.0, 0.0);

        let jumped = Fix::satellite(45.0 + 100_000.0 / METERS_PER_DEGREE, 7.0, 0.0, 0.0, 1_000);
        let verdict = classifier.classify(&jumped, 0.0, 0.0);
        assert!(verdict.has_flag(SpoofingFlag::Teleportation));
        assert_ne!(verdict.level, TrustLevel::Trusted);
    }

    #[test]
    fn test_consistent_fixes_are_trusted() {
        let mut classifier = SpoofingTrustClassifier::default();
        let first = Fix::satellite(45.0, 7.0, 12.0, 90.0, 0);
        let second = Fix::satellite(45.0, 7.0, 12.0, 90.0, 1_000);

        let verdict = classifier.classify(&first, 12.0, 90.0);
        assert!(verdict.is_trusted());
        let verdict = classifier.classify(&second, 12.0, 90.0);
        assert_eq!(verdict.level, TrustLevel::Trusted);
        assert_eq!(verdict.confidence, 1.0);
        assert!(verdict.flags.is_empty());
    }

    #[test]
    fn test_three_flags_is_spoofed() {
        let mut classifier = SpoofingTrustClassifier::default();
        classifier.classify(&Fix::satellite(45.0, 7.0, 0.0, 0.0, 0), 0.0, 0.0);

        let fake = Fix::satellite(46.0, 7.0, 80.0, 0.0, 1_000).with_provider("fake-gps", true);
        let verdict = classifier.classify(&fake, 0.0, 0.0);
        assert_eq!(
            verdict.flags,
            vec![
                SpoofingFlag::SyntheticProvider,
                SpoofingFlag::Teleportation,
                SpoofingFlag::SpeedMismatch
            ]
        );
        assert!(verdict.is_spoofed());
        assert_eq!(verdict.confidence, 0.0);
    }

    #[test]
    fn test_own_synthetic_provider_not_flagged() {
        let mut classifier = SpoofingTrustClassifier::default();
        let own = Fix::satellite(45.0, 7.0, 0.0, 0.0, 0).with_provider("location-fusion", true);
        assert!(classifier.classify(&own, 0.0, 0.0).is_trusted());

        let anonymous = Fix {
            is_synthetic_provider: true,
            ..Fix::satellite(45.0, 7.0, 0.0, 0.0, 1_000)
        };
        let verdict = classifier.classify(&anonymous, 0.0, 0.0);
        assert_eq!(verdict.flags, vec![SpoofingFlag::SyntheticProvider]);
        assert_eq!(verdict.level, TrustLevel::Suspicious);
    }

    #[test]
    fn test_bearing_wraps_around_north() {
        let mut classifier = SpoofingTrustClassifier::default();
        let fix = Fix::satellite(45.0, 7.0, 0.0, 350.0, 0);
        assert!(classifier.classify(&fix, 0.0, 10.0).is_trusted());

        let fix = Fix::satellite(45.0, 7.0, 0.0, 300.0, 1_000);
        assert!(classifier.classify(&fix, 0.0, 10.0).has_flag(SpoofingFlag::BearingMismatch));
    }

    #[test]
    fn test_first_fix_not_bearing_checked() {
        let mut classifier = SpoofingTrustClassifier::default();
        let verdict = classifier.classify(&Fix::satellite(45.0, 7.0, 10.0, 90.0, 1_000), 10.0, 0.0);
        assert!(verdict.is_trusted());
        assert!(verdict.flags.is_empty());

        // Same bearing gap is flagged once there is a reference fix
        let verdict = classifier.classify(&Fix::satellite(45.0, 7.0, 10.0, 90.0, 1_100), 10.0, 0.0);
        assert_eq!(verdict.flags, vec![SpoofingFlag::BearingMismatch]);
    }

    #[test]
    fn test_bearing_checked_at_same_timestamp() {
        let mut classifier = SpoofingTrustClassifier::default();
        classifier.classify(&Fix::satellite(45.0, 7.0, 0.0, 0.0, 1_000), 0.0, 0.0);
        let verdict = classifier.classify(&Fix::satellite(45.0, 7.0, 0.0, 180.0, 1_000), 0.0, 0.0);
        assert_eq!(verdict.flags, vec![SpoofingFlag::BearingMismatch]);
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let mut classifier = SpoofingTrustClassifier::default();
        classifier.classify(&Fix::satellite(45.0, 7.0, 0.0, 0.0, -1), 0.0, 0.0);
        let verdict = classifier.classify(&Fix::satellite(46.0, 7.0, 50.0, 0.0, i64::MAX), 0.0, 0.0);
        assert!(!verdict.has_flag(SpoofingFlag::Teleportation));
        assert!(!verdict.has_flag(SpoofingFlag::SpeedMismatch));

        let verdict = classifier.classify(&Fix::satellite(46.0, 7.0, 0.0, 0.0, i64::MIN), 0.0, 0.0);
        assert!(verdict.is_trusted());
    }

    #[test]
    fn test_reference_advances_even_when_spoofed() {
        let mut classifier = SpoofingTrustClassifier::default();
        classifier.classify(&Fix::satellite(45.0, 7.0, 0.0, 0.0, 0), 0.0, 0.0);
        classifier.classify(&Fix::satellite(50.0, 7.0, 0.0, 0.0, 1_000), 0.0, 0.0);
        assert_eq!(classifier.previous_fix().unwrap().latitude, 50.0);

        // Compared against the teleported fix, not the last trusted one
        let verdict = classifier.classify(&Fix::satellite(50.0, 7.0, 0.0, 0.0, 2_000), 0.0, 0.0);
        assert!(verdict.is_trusted());
    }

    #[test]
    fn test_same_timestamp_skips_speed_checks() {
        let mut classifier = SpoofingTrustClassifier::default();
        classifier.classify(&Fix::satellite(45.0, 7.0, 0.0, 0.0, 1_000), 0.0, 0.0);
        let verdict = classifier.classify(&Fix::satellite(46.0, 7.0, 50.0, 0.0, 1_000), 0.0, 0.0);
        assert!(verdict.is_trusted());
    }

    #[test]
    fn test_sub_second_interval_uses_fractional_seconds() {
        let mut classifier = SpoofingTrustClassifier::default();
        classifier.classify(&Fix::satellite(45.0, 7.0, 0.0, 0.0, 0), 0.0, 0.0);
        // ~200 m in half a second
        let fix = Fix::satellite(45.0 + 200.0 / METERS_PER_DEGREE, 7.0, 0.0, 0.0, 500);
        let verdict = classifier.classify(&fix, 0.0, 0.0);
        assert!(verdict.has_flag(SpoofingFlag::Teleportation));
    }

    #[test]
    fn test_speed_mismatch_threshold() {
        let mut classifier = SpoofingTrustClassifier::default();
        classifier.classify(&Fix::satellite(45.0, 7.0, 0.0, 0.0, 0), 0.0, 0.0);
        let fix = Fix::satellite(45.0, 7.0, 19.0, 0.0, 1_000);
        assert!(classifier.classify(&fix, 10.0, 0.0).is_trusted());
        let fix = Fix::satellite(45.0, 7.0, 21.0, 0.0, 2_000);
        assert!(classifier.classify(&fix, 10.0, 0.0).has_flag(SpoofingFlag::SpeedMismatch));
    }
}
