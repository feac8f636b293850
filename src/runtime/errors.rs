//! Error types for the runtime system

use crossbeam_channel::{RecvError, SendError};

/// Error type for work function operations
///
/// `Shutdown` doubles as the end-of-input signal: cursors return it once their
/// channel has no further edges, and decoders pass it up to stop their loop.
#[derive(Debug, thiserror::Error)]
pub enum WorkError {
    #[error("Failed to receive from input channel: {0}")]
    RecvError(#[from] RecvError),

    #[error("Failed to send to output channel: {0}")]
    SendError(String),

    #[error("Node-specific error: {0}")]
    NodeError(String),

    #[error("Shutdown signal received")]
    Shutdown,
}

impl WorkError {
    /// True for the clean end-of-input / stop condition.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, WorkError::Shutdown)
    }
}

impl<T> From<SendError<T>> for WorkError {
    fn from(e: SendError<T>) -> Self {
        WorkError::SendError(format!("{}", e))
    }
}

/// Result type for work functions
pub type WorkResult<T = ()> = Result<T, WorkError>;
