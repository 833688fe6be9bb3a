use log::info;
use serde::{Deserialize, Serialize};

use crate::config::MovementConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementState {
    Moving,
    Stationary,
}

/// Debounced stationary detector.
///
/// Moving → Stationary needs the magnitude to stay under the threshold for
/// longer than the debounce window; a single reading at or above the
/// threshold flips back to Moving immediately.
pub struct MovementClassifier {
    config: MovementConfig,
    state: MovementState,
    low_since_millis: Option<i64>,
    last_magnitude: f64,
}

impl MovementClassifier {
    pub fn new(config: MovementConfig) -> Self {
        Self {
            config,
            state: MovementState::Moving,
            low_since_millis: None,
            last_magnitude: 0.0,
        }
    }

    /// Feed one linear-acceleration magnitude [m/s²] observed at `timestamp_millis`
    pub fn update(&mut self, magnitude: f64, timestamp_millis: i64) -> MovementState {
        self.last_magnitude = magnitude;

        if magnitude < self.config.stationary_threshold {
            match self.low_since_millis {
                None => self.low_since_millis = Some(timestamp_millis),
                Some(since) => {
                    if timestamp_millis.saturating_sub(since) > self.config.debounce_millis
                        && self.state == MovementState::Moving
                    {
                        info!("[movement] stationary after {} ms below threshold", timestamp_millis.saturating_sub(since));
                        self.state = MovementState::Stationary;
                    }
                }
            }
        } else {
            if self.state == MovementState::Stationary {
                info!("[movement] moving (|a|={:.3} m/s²)", magnitude);
            }
            self.low_since_millis = None;
            self.state = MovementState::Moving;
        }

        self.state
    }

    pub fn state(&self) -> MovementState {
        self.state
    }

    pub fn is_stationary(&self) -> bool {
        self.state == MovementState::Stationary
    }

    pub fn last_magnitude(&self) -> f64 {
        self.last_magnitude
    }
}

impl Default for MovementClassifier {
    fn default() -> Self {
        Self::new(MovementConfig::default())
    }
}
