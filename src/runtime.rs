//! Async driver for [`FusionOrchestrator`].
//!
//! One tokio task owns the orchestrator and drains a bounded queue of
//! [`FusionInput`]s. Producers (sensor callbacks, the satellite-fix listener,
//! the peer transport) hold cheap [`FusionSender`] clones; consumers watch the
//! latest published location and status.

use log::{debug, info};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{FusionError, FusionResult};
use crate::sensor_fusion::{FusionEvent, FusionOrchestrator, FusionSnapshot, FusionStatus, LocationSink, StatusSink};
use crate::types::{Fix, RawSensorFrame, SensorSample};

#[derive(Clone, Debug)]
pub enum FusionInput {
    Sensor(RawSensorFrame),
    Sample(SensorSample),
    SatelliteFix(Fix),
    /// Raw packet from transport peer `peer_id` (derived from the remote's address)
    PeerPacket {
        peer_id: i64,
        bytes: Vec<u8>,
        received_at_millis: i64,
    },
    Shutdown,
}

// ─── Watch-backed sinks ──────────────────────────────────────────────────────

struct WatchLocationSink(watch::Sender<Option<Fix>>);

impl LocationSink for WatchLocationSink {
    fn publish_location(&mut self, fix: &Fix) {
        self.0.send_replace(Some(fix.clone()));
    }
}

struct WatchStatusSink(watch::Sender<Option<FusionStatus>>);

impl StatusSink for WatchStatusSink {
    fn publish_status(&mut self, status: &FusionStatus) {
        self.0.send_replace(Some(status.clone()));
    }
}

// ─── Producer side ───────────────────────────────────────────────────────────

/// Cloneable input handle
#[derive(Clone)]
pub struct FusionSender {
    tx: mpsc::Sender<FusionInput>,
}

impl FusionSender {
    /// Queue an input, waiting for room
    pub async fn send(&self, input: FusionInput) -> FusionResult<()> {
        self.tx.send(input).await.map_err(|_| FusionError::RuntimeClosed)
    }

    /// Queue an input without waiting. For callbacks that must not block.
    pub fn try_send(&self, input: FusionInput) -> FusionResult<()> {
        self.tx.try_send(input).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => FusionError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => FusionError::RuntimeClosed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Handle to a running fusion task
pub struct FusionHandle {
    sender: FusionSender,
    location_rx: watch::Receiver<Option<Fix>>,
    status_rx: watch::Receiver<Option<FusionStatus>>,
    task: JoinHandle<FusionSnapshot>,
}

impl FusionHandle {
    pub fn sender(&self) -> FusionSender {
        self.sender.clone()
    }

    pub async fn send(&self, input: FusionInput) -> FusionResult<()> {
        self.sender.send(input).await
    }

    pub fn try_send(&self, input: FusionInput) -> FusionResult<()> {
        self.sender.try_send(input)
    }

    pub fn subscribe_location(&self) -> watch::Receiver<Option<Fix>> {
        self.location_rx.clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<Option<FusionStatus>> {
        self.status_rx.clone()
    }

    /// Latest authoritative location, if anything was published yet
    pub fn location(&self) -> Option<Fix> {
        self.location_rx.borrow().clone()
    }

    pub fn status(&self) -> Option<FusionStatus> {
        self.status_rx.borrow().clone()
    }

    /// Stop the task after everything queued so far and return its final state
    pub async fn shutdown(self) -> FusionResult<FusionSnapshot> {
        // Already stopped is fine; the task result still carries the snapshot
        let _ = self.sender.send(FusionInput::Shutdown).await;
        self.task.await.map_err(|_| FusionError::RuntimeClosed)
    }
}

// ─── The task ────────────────────────────────────────────────────────────────

pub struct FusionRuntime;

impl FusionRuntime {
    /// Spawn the fusion task on the current tokio runtime.
    ///
    /// # Arguments
    /// * `orchestrator` - configured orchestrator; sinks already attached keep working
    /// * `capacity` - input queue bound (at least 1)
    pub fn spawn(mut orchestrator: FusionOrchestrator, capacity: usize) -> FusionHandle {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (location_tx, location_rx) = watch::channel(orchestrator.published_location().cloned());
        let (status_tx, status_rx) = watch::channel(orchestrator.status().cloned());

        orchestrator.add_location_sink(Box::new(WatchLocationSink(location_tx)));
        orchestrator.add_status_sink(Box::new(WatchStatusSink(status_tx)));

        let task = tokio::spawn(run(orchestrator, rx));
        info!("[runtime] fusion task started (queue capacity {})", capacity.max(1));

        FusionHandle {
            sender: FusionSender { tx },
            location_rx,
            status_rx,
            task,
        }
    }
}

async fn run(mut orchestrator: FusionOrchestrator, mut rx: mpsc::Receiver<FusionInput>) -> FusionSnapshot {
    let mut processed = 0u64;

    while let Some(input) = rx.recv().await {
        let events = match input {
            FusionInput::Sensor(frame) => orchestrator.on_raw_sensor(&frame),
            FusionInput::Sample(sample) => orchestrator.on_sensor_sample(&sample),
            FusionInput::SatelliteFix(fix) => orchestrator.on_satellite_fix(&fix),
            FusionInput::PeerPacket {
                peer_id,
                bytes,
                received_at_millis,
            } => orchestrator.on_peer_packet(peer_id, &bytes, received_at_millis),
            FusionInput::Shutdown => break,
        };
        processed += 1;

        for event in &events {
            if let FusionEvent::SpoofStateChanged { spoofed } = event {
                debug!("[runtime] spoof state -> {} after {} inputs", spoofed, processed);
            }
        }
    }

    info!("[runtime] fusion task stopped after {} inputs", processed);
    orchestrator.snapshot()
}
