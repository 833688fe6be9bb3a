pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

use crate::geodesy;

/// Provenance of a [`Fix`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocationSource {
    Satellite,
    Inertial,
    PeerFused,
    MapMatched,
    Hybrid,
}

impl LocationSource {
    pub fn label(&self) -> &'static str {
        match self {
            LocationSource::Satellite => "satellite",
            LocationSource::Inertial => "inertial",
            LocationSource::PeerFused => "peer",
            LocationSource::MapMatched => "map-matched",
            LocationSource::Hybrid => "hybrid",
        }
    }
}

/// A single position/velocity/heading observation with provenance.
///
/// Treated as an immutable value: components derive new fixes with the
/// `with_*` builders instead of mutating one another's copies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    /// Ground speed [m/s]
    #[serde(default)]
    pub speed: f32,
    /// Bearing [degrees]; 0 means unset
    #[serde(default)]
    pub bearing: f32,
    pub timestamp_millis: i64,
    pub source: LocationSource,
    /// 0.0-1.0
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub altitude: f32,
    #[serde(default)]
    pub is_synthetic_provider: bool,
    #[serde(default)]
    pub provider_id: Option<String>,
}

fn default_confidence() -> f32 {
    1.0
}

impl Fix {
    pub fn new(latitude: f64, longitude: f64, timestamp_millis: i64, source: LocationSource) -> Self {
        Self {
            latitude,
            longitude,
            speed: 0.0,
            bearing: 0.0,
            timestamp_millis,
            source,
            confidence: 1.0,
            altitude: 0.0,
            is_synthetic_provider: false,
            provider_id: None,
        }
    }

    /// Raw satellite fix as delivered by the positioning collaborator
    pub fn satellite(latitude: f64, longitude: f64, speed: f32, bearing: f32, timestamp_millis: i64) -> Self {
        Self::new(latitude, longitude, timestamp_millis, LocationSource::Satellite)
            .with_speed(speed)
            .with_bearing(bearing)
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_bearing(mut self, bearing: f32) -> Self {
        self.bearing = bearing;
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_altitude(mut self, altitude: f32) -> Self {
        self.altitude = altitude;
        self
    }

    pub fn with_source(mut self, source: LocationSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_timestamp(mut self, timestamp_millis: i64) -> Self {
        self.timestamp_millis = timestamp_millis;
        self
    }

    /// Attach provider metadata (used by the spoofing classifier)
    pub fn with_provider(mut self, provider_id: impl Into<String>, is_synthetic: bool) -> Self {
        self.provider_id = Some(provider_id.into());
        self.is_synthetic_provider = is_synthetic;
        self
    }

    pub fn has_bearing(&self) -> bool {
        self.bearing != 0.0
    }

    /// Great-circle distance in meters
    pub fn distance_to(&self, other: &Fix) -> f64 {
        geodesy::haversine_distance(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

/// Preprocessed sensor sample consumed by the dead-reckoning integrator.
///
/// `gravity` and `linear_acceleration` come from the sensor-ingest low-pass
/// stage (see [`crate::sensors::preprocess`]).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub timestamp_millis: i64,
    pub gravity: Vec3,
    pub magnetic: Vec3,
    pub gyroscope: Vec3,
    pub linear_acceleration: Vec3,
}

impl SensorSample {
    pub fn linear_magnitude(&self) -> f64 {
        self.linear_acceleration.norm()
    }
}

/// Raw accelerometer/gyroscope/magnetometer triple, before gravity removal
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawSensorFrame {
    pub timestamp_millis: i64,
    pub accelerometer: Vec3,
    pub gyroscope: Vec3,
    pub magnetic: Vec3,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_bearing() {
        let fix = Fix::satellite(10.0, 20.0, 5.0, 0.0, 1_000);
        assert!(!fix.has_bearing());
        assert!(fix.clone().with_bearing(90.0).has_bearing());
    }

    #[test]
    fn test_derived_copy_leaves_original() {
        let fix = Fix::satellite(10.0, 20.0, 5.0, 45.0, 1_000);
        let derived = fix.clone().with_source(LocationSource::MapMatched);
        assert_eq!(fix.source, LocationSource::Satellite);
        assert_eq!(derived.source, LocationSource::MapMatched);
        assert_eq!(derived.latitude, fix.latitude);
    }

    #[test]
    fn test_fix_json_defaults() {
        let json = r#"{"latitude":1.0,"longitude":2.0,"timestamp_millis":5,"source":"Satellite"}"#;
        let fix: Fix = serde_json::from_str(json).unwrap();
        assert_eq!(fix.confidence, 1.0);
        assert_eq!(fix.speed, 0.0);
        assert!(fix.provider_id.is_none());
    }
}
