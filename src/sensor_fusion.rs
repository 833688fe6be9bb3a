// sensor_fusion.rs: Orchestration layer for location fusion
//
// Everything in this module is independent of:
//   - tokio / async runtime
//   - sockets, files, platform location APIs
//
// Satellite fixes, sensor frames and peer packets go in; trust verdicts,
// published locations and events come out. The runtime module drives it from
// a channel, the replay binary drives it from a recorded session, tests drive
// it directly.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::FusionConfig;
use crate::filters::dead_reckoning::{DeadReckoningIntegrator, IntegratorStats};
use crate::map_match::{RoadSegment, RoadSnapMatcher, RoadTree, SpatialIndex};
use crate::peer::{PeerConsensusFuser, PeerEstimate, PeerSyncCodec, PACKET_LEN};
use crate::sensors::movement::MovementState;
use crate::sensors::orientation::OrientationState;
use crate::sensors::preprocess::{SensorCalibration, SensorPreprocessor};
use crate::spoofing::classifier::SpoofingTrustClassifier;
use crate::spoofing::{SpoofingFlag, TrustLevel, TrustVerdict};
use crate::types::{Fix, RawSensorFrame, SensorSample};

// ─── Sinks ───────────────────────────────────────────────────────────────────

/// Receives every authoritative location the orchestrator publishes
pub trait LocationSink: Send {
    fn publish_location(&mut self, fix: &Fix);
}

/// Receives the trust status after every satellite fix
pub trait StatusSink: Send {
    fn publish_status(&mut self, status: &FusionStatus);
}

/// In-memory sink; clones share the same buffers
#[derive(Clone, Default)]
pub struct RecordingSink {
    locations: Arc<Mutex<Vec<Fix>>>,
    statuses: Arc<Mutex<Vec<FusionStatus>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn locations(&self) -> Vec<Fix> {
        self.locations.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn statuses(&self) -> Vec<FusionStatus> {
        self.statuses.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl LocationSink for RecordingSink {
    fn publish_location(&mut self, fix: &Fix) {
        self.locations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(fix.clone());
    }
}

impl StatusSink for RecordingSink {
    fn publish_status(&mut self, status: &FusionStatus) {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(status.clone());
    }
}

// ─── Status ──────────────────────────────────────────────────────────────────

/// Human-facing trust status derived from one verdict
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FusionStatus {
    pub level: TrustLevel,
    pub flags: Vec<SpoofingFlag>,
    pub text: String,
    pub timestamp_millis: i64,
}

impl FusionStatus {
    pub fn from_verdict(verdict: &TrustVerdict, timestamp_millis: i64) -> Self {
        let text = match verdict.level {
            TrustLevel::Trusted => "GPS: Normal".to_string(),
            TrustLevel::Suspicious => format!("GPS: Suspicious - {}", verdict.description()),
            TrustLevel::Spoofed => format!("GPS: SPOOFED! {}", verdict.description()),
        };
        Self {
            level: verdict.level,
            flags: verdict.flags.clone(),
            text,
            timestamp_millis,
        }
    }
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum FusionEvent {
    Published { fix: Fix },
    SatelliteClassified { verdict: TrustVerdict, timestamp_millis: i64 },
    SatelliteSuppressed { timestamp_millis: i64 },
    IntegratorReseeded { latitude: f64, longitude: f64 },
    InertialUpdate { fix: Fix },
    SpoofStateChanged { spoofed: bool },
    PeerJoined { device_id: i64 },
    PeerUpdated { device_id: i64 },
    PeerPacketDropped { len: usize },
}

// ─── Fusion output snapshot ──────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FusionCounters {
    pub trusted_fixes: u64,
    pub suspicious_fixes: u64,
    pub spoofed_fixes: u64,
    pub inertial_updates: u64,
    pub published: u64,
    pub peer_packets: u64,
    pub dropped_peer_packets: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FusionSnapshot {
    pub counters: FusionCounters,
    pub spoofed: bool,
    pub last_published: Option<Fix>,
    pub last_inertial: Option<Fix>,
    pub last_verdict: Option<TrustVerdict>,
    pub status: Option<FusionStatus>,
    pub peer_count: usize,
    pub road_segments: usize,
    pub movement: MovementState,
    pub orientation: OrientationState,
    pub integrator: IntegratorStats,
    pub sensor_frames: u64,
    pub sensor_samples: u64,
}

// ─── The orchestrator ────────────────────────────────────────────────────────

/// Merges the trust-gated satellite stream and the inertial stream into one
/// authoritative location.
///
/// Per satellite fix:
/// - Trusted: publish the fix and reseed the integrator from it
/// - Suspicious: publish the fix, leave the integrator alone
/// - Spoofed: publish nothing; inertial updates are published instead until a
///   later fix is no longer Spoofed
///
/// The last published value wins; there is no blending between streams.
pub struct FusionOrchestrator {
    config: FusionConfig,
    preprocessor: SensorPreprocessor,
    integrator: DeadReckoningIntegrator,
    classifier: SpoofingTrustClassifier,
    peers: PeerConsensusFuser,
    roads: RoadTree,
    snapper: RoadSnapMatcher,

    location_sinks: Vec<Box<dyn LocationSink>>,
    status_sinks: Vec<Box<dyn StatusSink>>,

    spoofed: bool,
    published: Option<Fix>,
    last_verdict: Option<TrustVerdict>,
    status: Option<FusionStatus>,
    counters: FusionCounters,
}

impl FusionOrchestrator {
    pub fn new(config: FusionConfig) -> Self {
        Self {
            preprocessor: SensorPreprocessor::default(),
            integrator: DeadReckoningIntegrator::new(config.integrator.clone(), config.movement.clone()),
            classifier: SpoofingTrustClassifier::new(config.classifier.clone()),
            peers: PeerConsensusFuser::new(),
            roads: RoadTree::new(),
            snapper: RoadSnapMatcher::new(config.snap.clone()),
            config,
            location_sinks: Vec::new(),
            status_sinks: Vec::new(),
            spoofed: false,
            published: None,
            last_verdict: None,
            status: None,
            counters: FusionCounters::default(),
        }
    }

    pub fn add_location_sink(&mut self, sink: Box<dyn LocationSink>) {
        self.location_sinks.push(sink);
    }

    pub fn add_status_sink(&mut self, sink: Box<dyn StatusSink>) {
        self.status_sinks.push(sink);
    }

    pub fn set_calibration(&mut self, calibration: SensorCalibration) {
        info!(
            "[fusion] calibration set: accel bias ({:.3}, {:.3}, {:.3}), gyro bias ({:.4}, {:.4}, {:.4})",
            calibration.accel_bias.x,
            calibration.accel_bias.y,
            calibration.accel_bias.z,
            calibration.gyro_bias.x,
            calibration.gyro_bias.y,
            calibration.gyro_bias.z
        );
        self.preprocessor.set_calibration(calibration);
    }

    /// Estimate biases from frames recorded while the device lay still.
    /// Returns false (calibration unchanged) when `frames` is empty.
    pub fn calibrate_from_frames(&mut self, frames: &[RawSensorFrame]) -> bool {
        match SensorCalibration::from_stationary_frames(frames) {
            Some(calibration) => {
                self.set_calibration(calibration);
                true
            }
            None => false,
        }
    }

    // ── Sensor stream ────────────────────────────────────────────────────

    /// Feed a raw frame (~100 Hz). Throttled frames produce no events.
    pub fn on_raw_sensor(&mut self, raw: &RawSensorFrame) -> Vec<FusionEvent> {
        match self.preprocessor.process(raw) {
            Some(sample) => self.on_sensor_sample(&sample),
            None => Vec::new(),
        }
    }

    /// Feed an already preprocessed sample.
    pub fn on_sensor_sample(&mut self, sample: &SensorSample) -> Vec<FusionEvent> {
        let mut events = Vec::new();

        let Some(fix) = self.integrator.on_sample(sample) else {
            return events;
        };
        self.counters.inertial_updates += 1;
        events.push(FusionEvent::InertialUpdate { fix: fix.clone() });

        if self.spoofed {
            let published = self.publish(fix);
            events.push(FusionEvent::Published { fix: published });
        }

        events
    }

    // ── Satellite stream ─────────────────────────────────────────────────

    /// Classify one satellite fix and act on the verdict.
    ///
    /// Fixes must arrive in the order they were produced; the classifier
    /// compares each one with its predecessor.
    pub fn on_satellite_fix(&mut self, fix: &Fix) -> Vec<FusionEvent> {
        let mut events = Vec::new();

        let (imu_speed, imu_bearing) = self.integrator.speed_and_bearing();
        let verdict = self.classifier.classify(fix, imu_speed, imu_bearing);
        events.push(FusionEvent::SatelliteClassified {
            verdict: verdict.clone(),
            timestamp_millis: fix.timestamp_millis,
        });

        let status = FusionStatus::from_verdict(&verdict, fix.timestamp_millis);
        for sink in &mut self.status_sinks {
            sink.publish_status(&status);
        }
        self.status = Some(status);

        match verdict.level {
            TrustLevel::Trusted => {
                self.counters.trusted_fixes += 1;
                let published = self.publish(fix.clone());
                events.push(FusionEvent::Published { fix: published });

                self.integrator.initialize(fix);
                events.push(FusionEvent::IntegratorReseeded {
                    latitude: fix.latitude,
                    longitude: fix.longitude,
                });
            }
            TrustLevel::Suspicious => {
                self.counters.suspicious_fixes += 1;
                let published = self.publish(fix.clone());
                events.push(FusionEvent::Published { fix: published });
            }
            TrustLevel::Spoofed => {
                self.counters.spoofed_fixes += 1;
                warn!(
                    "[fusion] suppressing spoofed fix at t={} ({})",
                    fix.timestamp_millis,
                    verdict.description()
                );
                events.push(FusionEvent::SatelliteSuppressed {
                    timestamp_millis: fix.timestamp_millis,
                });
            }
        }

        let spoofed = verdict.is_spoofed();
        if spoofed != self.spoofed {
            self.spoofed = spoofed;
            if spoofed {
                warn!("[fusion] switching authoritative location to inertial stream");
            } else {
                info!("[fusion] satellite stream authoritative again");
            }
            events.push(FusionEvent::SpoofStateChanged { spoofed });
        }

        self.last_verdict = Some(verdict);
        events
    }

    fn publish(&mut self, fix: Fix) -> Fix {
        let fix = if self.config.snap.snap_published {
            self.snapper.snap(&fix, &self.roads).unwrap_or(fix)
        } else {
            fix
        };

        for sink in &mut self.location_sinks {
            sink.publish_location(&fix);
        }
        debug!(
            "[fusion] published {} fix ({:.6}, {:.6}) t={}",
            fix.source.label(),
            fix.latitude,
            fix.longitude,
            fix.timestamp_millis
        );
        self.counters.published += 1;
        self.published = Some(fix.clone());
        fix
    }

    // ── Peer stream ──────────────────────────────────────────────────────

    /// Packet from transport peer `peer_id`. The estimate is stored under
    /// `peer_id`; the device id inside the packet is not trusted.
    pub fn on_peer_packet(&mut self, peer_id: i64, bytes: &[u8], received_at_millis: i64) -> Vec<FusionEvent> {
        self.counters.peer_packets += 1;
        match PeerSyncCodec::try_decode(bytes) {
            Ok(packet) => self.on_peer_estimate(PeerEstimate {
                fix: packet.fix,
                device_id: peer_id,
                received_at_millis,
            }),
            Err(e) => {
                self.counters.dropped_peer_packets += 1;
                warn!("[fusion] dropping peer packet: {}", e);
                vec![FusionEvent::PeerPacketDropped { len: bytes.len() }]
            }
        }
    }

    pub fn on_peer_estimate(&mut self, estimate: PeerEstimate) -> Vec<FusionEvent> {
        let device_id = estimate.device_id;
        if self.peers.on_estimate(estimate) {
            vec![FusionEvent::PeerJoined { device_id }]
        } else {
            vec![FusionEvent::PeerUpdated { device_id }]
        }
    }

    /// Confidence-weighted centroid of all known peers
    pub fn peer_consensus(&self) -> Option<Fix> {
        self.peers.fuse()
    }

    pub fn peers(&self) -> &PeerConsensusFuser {
        &self.peers
    }

    /// The last published location encoded for broadcast to peers
    pub fn outgoing_packet(&self) -> Option<[u8; PACKET_LEN]> {
        self.published
            .as_ref()
            .map(|fix| PeerSyncCodec::encode(fix, self.config.peer.device_id))
    }

    // ── Road network ─────────────────────────────────────────────────────

    pub fn insert_road(&mut self, segment: RoadSegment) {
        self.roads.insert(segment);
    }

    /// Bulk-load into an empty index, insert one by one otherwise
    pub fn load_roads(&mut self, segments: Vec<RoadSegment>) {
        let count = segments.len();
        if self.roads.segment_count() == 0 {
            self.roads = RoadTree::from_segments(segments);
        } else {
            for segment in segments {
                self.roads.insert(segment);
            }
        }
        info!(
            "[fusion] loaded {} road segments ({} total)",
            count,
            self.roads.segment_count()
        );
    }

    pub fn snap_to_road(&self, fix: &Fix) -> Option<Fix> {
        self.snapper.snap(fix, &self.roads)
    }

    pub fn roads(&self) -> &RoadTree {
        &self.roads
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn published_location(&self) -> Option<&Fix> {
        self.published.as_ref()
    }

    pub fn status(&self) -> Option<&FusionStatus> {
        self.status.as_ref()
    }

    pub fn last_verdict(&self) -> Option<&TrustVerdict> {
        self.last_verdict.as_ref()
    }

    pub fn is_spoofed(&self) -> bool {
        self.spoofed
    }

    pub fn integrator(&self) -> &DeadReckoningIntegrator {
        &self.integrator
    }

    pub fn counters(&self) -> &FusionCounters {
        &self.counters
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn snapshot(&self) -> FusionSnapshot {
        let (sensor_frames, sensor_samples) = self.preprocessor.counts();
        FusionSnapshot {
            counters: self.counters.clone(),
            spoofed: self.spoofed,
            last_published: self.published.clone(),
            last_inertial: self.integrator.current_fix(),
            last_verdict: self.last_verdict.clone(),
            status: self.status.clone(),
            peer_count: self.peers.peer_count(),
            road_segments: self.roads.segment_count(),
            movement: self.integrator.movement_state(),
            orientation: self.integrator.orientation(),
            integrator: self.integrator.stats(),
            sensor_frames,
            sensor_samples,
        }
    }
}

impl Default for FusionOrchestrator {
    fn default() -> Self {
        Self::new(FusionConfig::default())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
