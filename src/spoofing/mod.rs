pub mod classifier;

pub use classifier::SpoofingTrustClassifier;

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrustLevel {
    Trusted,
    Suspicious,
    Spoofed,
}

impl TrustLevel {
    /// Bucket a flag count; `spoofed_at` flags or more is Spoofed
    pub fn from_flag_count(count: usize, spoofed_at: usize) -> Self {
        if count >= spoofed_at {
            TrustLevel::Spoofed
        } else if count > 0 {
            TrustLevel::Suspicious
        } else {
            TrustLevel::Trusted
        }
    }

    pub fn confidence(&self) -> f32 {
        match self {
            TrustLevel::Trusted => 1.0,
            TrustLevel::Suspicious => 0.5,
            TrustLevel::Spoofed => 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpoofingFlag {
    Teleportation,
    SpeedMismatch,
    BearingMismatch,
    SyntheticProvider,
    /// Reserved; no current check raises it
    NoMovement,
}

impl SpoofingFlag {
    pub fn name(&self) -> &'static str {
        match self {
            SpoofingFlag::Teleportation => "TELEPORTATION",
            SpoofingFlag::SpeedMismatch => "SPEED_MISMATCH",
            SpoofingFlag::BearingMismatch => "BEARING_MISMATCH",
            SpoofingFlag::SyntheticProvider => "MOCK_PROVIDER",
            SpoofingFlag::NoMovement => "NO_MOVEMENT",
        }
    }
}

impl fmt::Display for SpoofingFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Classifier output for one satellite fix
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrustVerdict {
    pub level: TrustLevel,
    /// In detection order, no duplicates
    pub flags: Vec<SpoofingFlag>,
    pub confidence: f32,
}

impl TrustVerdict {
    pub fn new(flags: Vec<SpoofingFlag>, spoofed_at: usize) -> Self {
        let level = TrustLevel::from_flag_count(flags.len(), spoofed_at);
        Self {
            level,
            flags,
            confidence: level.confidence(),
        }
    }

    pub fn is_trusted(&self) -> bool {
        self.level == TrustLevel::Trusted
    }

    pub fn is_spoofed(&self) -> bool {
        self.level == TrustLevel::Spoofed
    }

    pub fn has_flag(&self, flag: SpoofingFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// Comma-separated flag names, e.g. "TELEPORTATION, SPEED_MISMATCH"
    pub fn description(&self) -> String {
        self.flags
            .iter()
            .map(|flag| flag.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
