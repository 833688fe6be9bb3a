//! Fixed 36-byte peer sync packet.
//!
//! ```text
//! offset  size  field
//!      0     8  timestamp_millis  i64 LE
//!      8     8  latitude          f64 LE
//!     16     8  longitude         f64 LE
//!     24     4  confidence        f32 LE
//!     28     8  device_id         i64 LE
//! ```
//!
//! No header, version or checksum: a buffer is valid iff it is exactly
//! [`PACKET_LEN`] bytes. Speed and bearing are not carried.

use crate::error::{FusionError, FusionResult};
use crate::types::{Fix, LocationSource};

pub const PACKET_LEN: usize = 36;

const TIMESTAMP_OFFSET: usize = 0;
const LATITUDE_OFFSET: usize = 8;
const LONGITUDE_OFFSET: usize = 16;
const CONFIDENCE_OFFSET: usize = 24;
const DEVICE_ID_OFFSET: usize = 28;

/// A decoded peer estimate as it came off the wire
#[derive(Clone, Debug, PartialEq)]
pub struct PeerPacket {
    pub fix: Fix,
    pub device_id: i64,
}

pub struct PeerSyncCodec;

impl PeerSyncCodec {
    pub fn encode(fix: &Fix, device_id: i64) -> [u8; PACKET_LEN] {
        let mut buf = [0u8; PACKET_LEN];
        buf[TIMESTAMP_OFFSET..LATITUDE_OFFSET].copy_from_slice(&fix.timestamp_millis.to_le_bytes());
        buf[LATITUDE_OFFSET..LONGITUDE_OFFSET].copy_from_slice(&fix.latitude.to_le_bytes());
        buf[LONGITUDE_OFFSET..CONFIDENCE_OFFSET].copy_from_slice(&fix.longitude.to_le_bytes());
        buf[CONFIDENCE_OFFSET..DEVICE_ID_OFFSET].copy_from_slice(&fix.confidence.to_le_bytes());
        buf[DEVICE_ID_OFFSET..PACKET_LEN].copy_from_slice(&device_id.to_le_bytes());
        buf
    }

    pub fn try_decode(bytes: &[u8]) -> FusionResult<PeerPacket> {
        if bytes.len() != PACKET_LEN {
            return Err(FusionError::MalformedPacket {
                len: bytes.len(),
                expected: PACKET_LEN,
            });
        }

        let timestamp_millis = i64::from_le_bytes(field(bytes, TIMESTAMP_OFFSET));
        let latitude = f64::from_le_bytes(field(bytes, LATITUDE_OFFSET));
        let longitude = f64::from_le_bytes(field(bytes, LONGITUDE_OFFSET));
        let confidence = f32::from_le_bytes(field(bytes, CONFIDENCE_OFFSET));
        let device_id = i64::from_le_bytes(field(bytes, DEVICE_ID_OFFSET));

        let fix = Fix::new(latitude, longitude, timestamp_millis, LocationSource::PeerFused)
            .with_confidence(confidence);
        Ok(PeerPacket { fix, device_id })
    }

    /// Lenient decode for untrusted transports: anything malformed is `None`
    pub fn decode(bytes: &[u8]) -> Option<PeerPacket> {
        Self::try_decode(bytes).ok()
    }
}

// Caller guarantees `offset + N <= bytes.len()`
fn field<const N: usize>(bytes: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}
