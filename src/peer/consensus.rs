use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::codec::PeerSyncCodec;
use crate::types::{Fix, LocationSource};

/// Latest position reported by one peer device.
///
/// `device_id` is the transport's id for the remote, not the id the remote
/// wrote into its packet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeerEstimate {
    pub fix: Fix,
    pub device_id: i64,
    pub received_at_millis: i64,
}

impl PeerEstimate {
    pub fn confidence(&self) -> f32 {
        self.fix.confidence
    }
}

/// Confidence-weighted centroid over the latest estimate of every known peer.
///
/// Peers are only ever replaced by a newer estimate from the same device or
/// removed explicitly; nothing expires on its own.
#[derive(Default)]
pub struct PeerConsensusFuser {
    peers: Mutex<HashMap<i64, PeerEstimate>>,
}

impl PeerConsensusFuser {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<i64, PeerEstimate>> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store an estimate, replacing any previous one from the same device.
    /// Returns true when the device was not known before.
    pub fn on_estimate(&self, estimate: PeerEstimate) -> bool {
        let device_id = estimate.device_id;
        let replaced = self.lock().insert(device_id, estimate).is_some();
        if replaced {
            debug!("[peer] updated estimate from device {}", device_id);
        } else {
            info!("[peer] device {} joined consensus", device_id);
        }
        !replaced
    }

    /// Decode a raw packet from transport peer `peer_id` and store it under
    /// that id. Malformed packets are dropped.
    pub fn on_packet(&self, peer_id: i64, bytes: &[u8], received_at_millis: i64) -> Option<i64> {
        let packet = match PeerSyncCodec::try_decode(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("[peer] dropping packet: {}", e);
                return None;
            }
        };
        if packet.device_id != peer_id {
            debug!(
                "[peer] transport peer {} claims device id {}",
                peer_id, packet.device_id
            );
        }
        self.on_estimate(PeerEstimate {
            fix: packet.fix,
            device_id: peer_id,
            received_at_millis,
        });
        Some(peer_id)
    }

    pub fn remove_peer(&self, device_id: i64) -> Option<PeerEstimate> {
        let removed = self.lock().remove(&device_id);
        if removed.is_some() {
            info!("[peer] device {} removed", device_id);
        }
        removed
    }

    pub fn peer_count(&self) -> usize {
        self.lock().len()
    }

    /// Snapshot of all estimates, ordered by device id
    pub fn estimates(&self) -> Vec<PeerEstimate> {
        let mut estimates: Vec<_> = self.lock().values().cloned().collect();
        estimates.sort_by_key(|e| e.device_id);
        estimates
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Weighted centroid of all peers.
    ///
    /// `None` with no peers or when the confidences sum to zero. The output
    /// confidence is the mean peer confidence; the timestamp is the newest
    /// peer timestamp.
    pub fn fuse(&self) -> Option<Fix> {
        let peers = self.lock();
        if peers.is_empty() {
            return None;
        }

        let mut weighted_lat = 0.0;
        let mut weighted_lon = 0.0;
        let mut total_weight = 0.0;
        let mut newest = i64::MIN;

        for estimate in peers.values() {
            let weight = estimate.confidence() as f64;
            weighted_lat += estimate.fix.latitude * weight;
            weighted_lon += estimate.fix.longitude * weight;
            total_weight += weight;
            newest = newest.max(estimate.fix.timestamp_millis);
        }

        if total_weight == 0.0 {
            return None;
        }

        Some(
            Fix::new(
                weighted_lat / total_weight,
                weighted_lon / total_weight,
                newest,
                LocationSource::PeerFused,
            )
            .with_confidence((total_weight / peers.len() as f64) as f32),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::sync::Arc;

    fn estimate(device_id: i64, lat: f64, lon: f64, confidence: f32) -> PeerEstimate {
        PeerEstimate {
            fix: Fix::new(lat, lon, 1_000 + device_id, LocationSource::PeerFused).with_confidence(confidence),
            device_id,
            received_at_millis: 2_000,
        }
    }

    #[test]
    fn test_no_peers() {
        assert!(PeerConsensusFuser::new().fuse().is_none());
    }

    #[test]
    fn test_weighted_centroid() {
        let fuser = PeerConsensusFuser::new();
        fuser.on_estimate(estimate(1, 10.0, 10.0, 1.0));
        fuser.on_estimate(estimate(2, 20.0, 20.0, 3.0));

        let fused = fuser.fuse().unwrap();
        assert_abs_diff_eq!(fused.latitude, 17.5, epsilon = 1e-12);
        assert_abs_diff_eq!(fused.longitude, 17.5, epsilon = 1e-12);
        assert_abs_diff_eq!(fused.confidence, 2.0);
        assert_eq!(fused.source, LocationSource::PeerFused);
        assert_eq!(fused.timestamp_millis, 1_002);
    }

    #[test]
    fn test_new_estimate_replaces_old() {
        let fuser = PeerConsensusFuser::new();
        assert!(fuser.on_estimate(estimate(1, 10.0, 10.0, 1.0)));
        fuser.on_estimate(estimate(2, 20.0, 20.0, 3.0));
        assert!(!fuser.on_estimate(estimate(1, 20.0, 20.0, 1.0)));

        assert_eq!(fuser.peer_count(), 2);
        let fused = fuser.fuse().unwrap();
        assert_abs_diff_eq!(fused.latitude, 20.0, epsilon = 1e-12);
        assert_abs_diff_eq!(fused.longitude, 20.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_total_confidence() {
        let fuser = PeerConsensusFuser::new();
        fuser.on_estimate(estimate(1, 10.0, 10.0, 0.0));
        fuser.on_estimate(estimate(2, 30.0, 30.0, 0.0));
        assert!(fuser.fuse().is_none());
    }

    #[test]
    fn test_packets_and_bookkeeping() {
        let fuser = PeerConsensusFuser::new();
        let fix = Fix::new(5.0, 6.0, 100, LocationSource::Satellite).with_confidence(0.5);
        let bytes = PeerSyncCodec::encode(&fix, 42);

        assert_eq!(fuser.on_packet(42, &bytes, 150), Some(42));
        assert_eq!(fuser.on_packet(42, &bytes[..20], 160), None);
        assert_eq!(fuser.peer_count(), 1);

        let estimates = fuser.estimates();
        assert_eq!(estimates[0].received_at_millis, 150);
        assert_eq!(estimates[0].fix.latitude, 5.0);

        assert!(fuser.remove_peer(42).is_some());
        assert!(fuser.remove_peer(42).is_none());
        fuser.on_packet(42, &bytes, 200);
        fuser.clear();
        assert!(fuser.fuse().is_none());
    }

    #[test]
    fn test_packets_keyed_by_transport_id() {
        let fuser = PeerConsensusFuser::new();
        let honest = PeerSyncCodec::encode(&Fix::new(10.0, 10.0, 1, LocationSource::Satellite).with_confidence(1.0), 5);
        let forged = PeerSyncCodec::encode(&Fix::new(80.0, 80.0, 2, LocationSource::Satellite).with_confidence(1.0), 5);

        assert_eq!(fuser.on_packet(100, &honest, 10), Some(100));
        assert_eq!(fuser.on_packet(200, &forged, 20), Some(200));
        assert_eq!(fuser.peer_count(), 2);

        let fused = fuser.fuse().unwrap();
        assert_abs_diff_eq!(fused.latitude, 45.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fused.longitude, 45.0, epsilon = 1e-9);

        let ids: Vec<i64> = fuser.estimates().iter().map(|e| e.device_id).collect();
        assert_eq!(ids, vec![100, 200]);
    }

    #[test]
    fn test_concurrent_arrivals() {
        let fuser = Arc::new(PeerConsensusFuser::new());
        let handles: Vec<_> = (0..4)
            .map(|device| {
                let fuser = Arc::clone(&fuser);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        fuser.on_estimate(estimate(device, 10.0 + i as f64 * 0.01, 10.0, 1.0));
                        let _ = fuser.fuse();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(fuser.peer_count(), 4);
        assert_abs_diff_eq!(fuser.fuse().unwrap().latitude, 10.99, epsilon = 1e-9);
    }
}
