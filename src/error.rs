use thiserror::Error;

/// Location fusion error types
///
/// Core operations degrade gracefully and return `Option`; these errors only
/// surface at the edges (packet parsing, configuration, runtime plumbing).
#[derive(Error, Debug)]
pub enum FusionError {
    #[error("Malformed peer packet: expected {expected} bytes, got {len}")]
    MalformedPacket { len: usize, expected: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Fusion runtime is not running")]
    RuntimeClosed,

    #[error("Fusion input queue is full")]
    QueueFull,
}

/// Result type for fallible fusion operations
pub type FusionResult<T> = Result<T, FusionError>;
