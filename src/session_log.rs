//! Recorded fusion sessions (`.json` or gzip `.json.gz`).
//!
//! Each stream is stored separately; [`SessionLog::inputs`] merges them back
//! into one timestamp-ordered input sequence for replay.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::config::FusionConfig;
use crate::error::{FusionError, FusionResult};
use crate::map_match::RoadSegment;
use crate::runtime::FusionInput;
use crate::types::{Fix, RawSensorFrame, SensorSample};

/// One peer packet as it arrived on the transport
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedPacket {
    /// Transport id of the sender
    #[serde(default)]
    pub peer_id: i64,
    pub received_at_millis: i64,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionLog {
    #[serde(default)]
    pub config: Option<FusionConfig>,
    #[serde(default)]
    pub roads: Vec<RoadSegment>,
    #[serde(default)]
    pub raw_frames: Vec<RawSensorFrame>,
    #[serde(default)]
    pub samples: Vec<SensorSample>,
    #[serde(default)]
    pub fixes: Vec<Fix>,
    #[serde(default)]
    pub peer_packets: Vec<RecordedPacket>,
}

fn is_gzip(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}

fn io_error(path: &Path, source: std::io::Error) -> FusionError {
    FusionError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl SessionLog {
    pub fn load(path: impl AsRef<Path>) -> FusionResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| io_error(path, e))?;
        let log = if is_gzip(path) {
            serde_json::from_reader(BufReader::new(GzDecoder::new(file)))?
        } else {
            serde_json::from_reader(BufReader::new(file))?
        };
        Ok(log)
    }

    /// Write as JSON, gzip-compressed when the path ends in `.gz`
    pub fn save(&self, path: impl AsRef<Path>) -> FusionResult<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| io_error(path, e))?;
        if is_gzip(path) {
            let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
            serde_json::to_writer(&mut encoder, self)?;
            encoder
                .finish()
                .and_then(|mut writer| writer.flush())
                .map_err(|e| io_error(path, e))?;
        } else {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, self)?;
            writer.flush().map_err(|e| io_error(path, e))?;
        }
        Ok(())
    }

    pub fn input_count(&self) -> usize {
        self.raw_frames.len() + self.samples.len() + self.fixes.len() + self.peer_packets.len()
    }

    /// All recorded inputs merged by timestamp.
    ///
    /// Order within each stream is kept. At equal timestamps sensor data
    /// comes first, then satellite fixes, then peer packets.
    pub fn inputs(&self) -> Vec<FusionInput> {
        let mut keyed: Vec<(i64, u8, FusionInput)> = Vec::with_capacity(self.input_count());
        keyed.extend(
            self.raw_frames
                .iter()
                .map(|f| (f.timestamp_millis, 0, FusionInput::Sensor(f.clone()))),
        );
        keyed.extend(
            self.samples
                .iter()
                .map(|s| (s.timestamp_millis, 0, FusionInput::Sample(s.clone()))),
        );
        keyed.extend(
            self.fixes
                .iter()
                .map(|f| (f.timestamp_millis, 1, FusionInput::SatelliteFix(f.clone()))),
        );
        keyed.extend(self.peer_packets.iter().map(|p| {
            (
                p.received_at_millis,
                2,
                FusionInput::PeerPacket {
                    peer_id: p.peer_id,
                    bytes: p.bytes.clone(),
                    received_at_millis: p.received_at_millis,
                },
            )
        }));

        // Stable: ties inside one stream keep their recorded order
        keyed.sort_by_key(|(timestamp, rank, _)| (*timestamp, *rank));
        keyed.into_iter().map(|(_, _, input)| input).collect()
    }
}
