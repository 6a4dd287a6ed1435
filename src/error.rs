//! Error types for incoming streams

use thiserror::Error;

/// Why the render buffer refused a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Render time is too far in the past
    TooOld { late_ms: i64 },
    /// Render time is too far in the future
    TooFarAhead { ahead_ms: i64 },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::TooOld { late_ms } => write!(f, "frame is {late_ms}ms too old"),
            RejectReason::TooFarAhead { ahead_ms } => {
                write!(f, "frame is {ahead_ms}ms into the future")
            }
        }
    }
}

/// Errors reported by stream operations
///
/// Every failing operation leaves the stream unchanged.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream is not running")]
    NotRunning,

    #[error("operation not allowed while the stream is running")]
    AlreadyRunning,

    #[error("failed to spawn presentation thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    #[error("render delay {delay_ms}ms outside [{min_ms}, {max_ms}]ms")]
    RenderDelayOutOfRange { delay_ms: u32, min_ms: u32, max_ms: u32 },

    #[error("frame rejected: {0}")]
    FrameRejected(RejectReason),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("config parse error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StreamError>;
