use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{FusionError, FusionResult};

// ─── Spoofing classifier ─────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Apparent speed between consecutive fixes above which a jump is a teleport [m/s]
    pub max_realistic_speed: f64,
    /// Allowed |fix speed − inertial speed| [m/s]
    pub speed_diff_threshold: f64,
    /// Allowed |fix bearing − inertial bearing| [degrees]
    pub bearing_diff_threshold: f64,
    /// Flag count at which a fix is classified Spoofed
    pub spoofed_flag_count: usize,
    /// Provider id of this app's own location injector (never flagged as synthetic)
    pub own_provider_id: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            max_realistic_speed: 300.0,
            speed_diff_threshold: 10.0,
            bearing_diff_threshold: 45.0,
            spoofed_flag_count: 3,
            own_provider_id: "location-fusion".to_string(),
        }
    }
}

// ─── Movement classifier ─────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Linear acceleration magnitude below which the device may be still [m/s²]
    pub stationary_threshold: f64,
    /// How long the magnitude must stay low before declaring Stationary [ms]
    pub debounce_millis: i64,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            stationary_threshold: 0.1,
            debounce_millis: 1_000,
        }
    }
}

// ─── Dead reckoning ──────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorConfig {
    /// Sensor gap above which integration is skipped and the clock resynced [s]
    pub max_step_secs: f64,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self { max_step_secs: 1.0 }
    }
}

// ─── Road snapping ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapConfig {
    /// Candidate search radius [m]
    pub search_radius_m: f64,
    /// Acceptance gate on the projected distance [m]
    pub max_snap_distance_m: f64,
    /// Cap on candidates pulled from the spatial index
    pub max_candidates: usize,
    /// Snap every published fix onto the road index before handing it to sinks
    pub snap_published: bool,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            search_radius_m: 50.0,
            max_snap_distance_m: 30.0,
            max_candidates: 100,
            snap_published: false,
        }
    }
}

// ─── Peer sync ───────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Device id stamped on outgoing peer packets
    pub device_id: i64,
}

// ─── Top level ───────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub classifier: ClassifierConfig,
    pub movement: MovementConfig,
    pub integrator: IntegratorConfig,
    pub snap: SnapConfig,
    pub peer: PeerConfig,
}

impl FusionConfig {
    pub fn from_json_str(json: &str) -> FusionResult<Self> {
        let config: FusionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> FusionResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| FusionError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Reject values that would make a component meaningless
    pub fn validate(&self) -> FusionResult<()> {
        let positive = [
            ("classifier.max_realistic_speed", self.classifier.max_realistic_speed),
            ("classifier.speed_diff_threshold", self.classifier.speed_diff_threshold),
            ("classifier.bearing_diff_threshold", self.classifier.bearing_diff_threshold),
            ("movement.stationary_threshold", self.movement.stationary_threshold),
            ("integrator.max_step_secs", self.integrator.max_step_secs),
            ("snap.search_radius_m", self.snap.search_radius_m),
            ("snap.max_snap_distance_m", self.snap.max_snap_distance_m),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(FusionError::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }

        if self.classifier.spoofed_flag_count == 0 {
            return Err(FusionError::InvalidConfig(
                "classifier.spoofed_flag_count must be at least 1".to_string(),
            ));
        }
        if self.movement.debounce_millis < 0 {
            return Err(FusionError::InvalidConfig(
                "movement.debounce_millis must not be negative".to_string(),
            ));
        }
        if self.snap.max_candidates == 0 {
            return Err(FusionError::InvalidConfig(
                "snap.max_candidates must be at least 1".to_string(),
            ));
        }
        if self.snap.max_snap_distance_m > self.snap.search_radius_m {
            return Err(FusionError::InvalidConfig(format!(
                "snap.max_snap_distance_m ({}) exceeds snap.search_radius_m ({})",
                self.snap.max_snap_distance_m, self.snap.search_radius_m
            )));
        }
        Ok(())
    }
}
