//! Location fusion and trust engine.
//!
//! Cross-checks satellite fixes against an inertial dead-reckoning estimate,
//! falls back to the inertial estimate when the satellite stream looks
//! spoofed, and adds peer consensus and road snapping on top.

pub mod config;
pub mod error;
pub mod filters;
pub mod geodesy;
pub mod live_status;
pub mod map_match;
pub mod peer;
pub mod runtime;
pub mod sensor_fusion;
pub mod sensors;
pub mod session_log;
pub mod sim;
pub mod spoofing;
pub mod types;

pub use config::FusionConfig;
pub use error::{FusionError, FusionResult};
pub use runtime::{FusionHandle, FusionInput, FusionRuntime, FusionSender};
pub use sensor_fusion::{
    FusionEvent, FusionOrchestrator, FusionSnapshot, FusionStatus, LocationSink, RecordingSink, StatusSink,
};
pub use spoofing::{SpoofingFlag, TrustLevel, TrustVerdict};
pub use types::{Fix, LocationSource, RawSensorFrame, SensorSample};
