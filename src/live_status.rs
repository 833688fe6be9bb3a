use serde::{Deserialize, Serialize};
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::sensor_fusion::FusionSnapshot;
use crate::spoofing::TrustLevel;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LiveStatus {
    pub timestamp: f64,
    pub uptime_seconds: u64,
    // Satellite trust
    pub trusted_fixes: u64,
    pub suspicious_fixes: u64,
    pub spoofed_fixes: u64,
    pub spoofing_active: bool,
    pub trust_level: Option<TrustLevel>,
    pub flags: Vec<String>,
    pub status_text: String,
    // Published location
    pub published_count: u64,
    pub location_source: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub bearing: f64,
    // Inertial
    pub inertial_updates: u64,
    pub inertial_speed: f64,
    pub stationary: bool,
    pub azimuth_deg: f64,
    pub sensor_gaps_skipped: u64,
    pub reseeds: u64,
    // Peers / roads
    pub peer_count: usize,
    pub dropped_peer_packets: u64,
    pub road_segments: usize,
}

impl LiveStatus {
    pub fn new() -> Self {
        Self {
            timestamp: current_timestamp(),
            uptime_seconds: 0,
            trusted_fixes: 0,
            suspicious_fixes: 0,
            spoofed_fixes: 0,
            spoofing_active: false,
            trust_level: None,
            flags: Vec::new(),
            status_text: "GPS: Waiting".to_string(),
            published_count: 0,
            location_source: None,
            latitude: 0.0,
            longitude: 0.0,
            speed: 0.0,
            bearing: 0.0,
            inertial_updates: 0,
            inertial_speed: 0.0,
            stationary: false,
            azimuth_deg: 0.0,
            sensor_gaps_skipped: 0,
            reseeds: 0,
            peer_count: 0,
            dropped_peer_packets: 0,
            road_segments: 0,
        }
    }

    pub fn from_snapshot(snapshot: &FusionSnapshot, uptime_seconds: u64) -> Self {
        let mut status = Self::new();
        status.update(snapshot, uptime_seconds);
        status
    }

    pub fn update(&mut self, snapshot: &FusionSnapshot, uptime_seconds: u64) {
        self.timestamp = current_timestamp();
        self.uptime_seconds = uptime_seconds;

        let counters = &snapshot.counters;
        self.trusted_fixes = counters.trusted_fixes;
        self.suspicious_fixes = counters.suspicious_fixes;
        self.spoofed_fixes = counters.spoofed_fixes;
        self.spoofing_active = snapshot.spoofed;
        self.published_count = counters.published;
        self.inertial_updates = counters.inertial_updates;
        self.dropped_peer_packets = counters.dropped_peer_packets;

        if let Some(status) = &snapshot.status {
            self.trust_level = Some(status.level);
            self.flags = status.flags.iter().map(|f| f.name().to_string()).collect();
            self.status_text = status.text.clone();
        }

        if let Some(fix) = &snapshot.last_published {
            self.location_source = Some(fix.source.label().to_string());
            self.latitude = fix.latitude;
            self.longitude = fix.longitude;
            self.speed = fix.speed as f64;
            self.bearing = fix.bearing as f64;
        }

        self.inertial_speed = snapshot.last_inertial.as_ref().map_or(0.0, |f| f.speed as f64);
        self.stationary = snapshot.movement == crate::sensors::MovementState::Stationary;
        self.azimuth_deg = snapshot.orientation.azimuth_deg;
        self.sensor_gaps_skipped = snapshot.integrator.skipped_gaps;
        self.reseeds = snapshot.integrator.reseeds;
        self.peer_count = snapshot.peer_count;
        self.road_segments = snapshot.road_segments;
    }

    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

impl Default for LiveStatus {
    fn default() -> Self {
        Self::new()
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor_fusion::FusionOrchestrator;
    use crate::types::Fix;

    #[test]
    fn test_from_snapshot() {
        let mut orchestrator = FusionOrchestrator::default();
        orchestrator.on_satellite_fix(&Fix::satellite(45.0, 7.0, 2.0, 0.0, 1_000));
        orchestrator.on_satellite_fix(
            &Fix::satellite(45.00001, 7.0, 2.0, 0.0, 2_000).with_provider("mock-app", true),
        );

        let status = LiveStatus::from_snapshot(&orchestrator.snapshot(), 12);
        assert_eq!(status.trusted_fixes, 1);
        assert_eq!(status.suspicious_fixes, 1);
        assert_eq!(status.trust_level, Some(TrustLevel::Suspicious));
        assert_eq!(status.flags, vec!["MOCK_PROVIDER".to_string()]);
        assert_eq!(status.status_text, "GPS: Suspicious - MOCK_PROVIDER");
        assert_eq!(status.location_source.as_deref(), Some("satellite"));
        assert_eq!(status.latitude, 45.00001);
        assert_eq!(status.uptime_seconds, 12);
        assert_eq!(status.reseeds, 1);
    }

    #[test]
    fn test_save_writes_json() {
        let path = std::env::temp_dir().join(format!("live_status_{}.json", std::process::id()));
        let path_str = path.to_string_lossy().to_string();

        LiveStatus::new().save(&path_str).unwrap();
        let parsed: LiveStatus = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.status_text, "GPS: Waiting");
        assert_eq!(parsed.peer_count, 0);

        fs::remove_file(path).unwrap();
    }
}
