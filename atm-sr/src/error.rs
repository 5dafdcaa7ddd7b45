//! Survey runner error types

use thiserror::Error;

/// Result type for survey runner operations
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Errors raised while initializing or driving a survey
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Every manifest candidate failed to load
    #[error("Manifest unavailable: {0}")]
    ManifestUnavailable(String),

    /// Cursor beyond the end of the presentation order
    #[error("Item {index} is out of range for an order of {len} items")]
    OutOfRange { index: usize, len: usize },

    /// Stored order does not fit the loaded manifest
    #[error("Presentation order of {order_len} items does not match manifest of {manifest_len} items")]
    OrderMismatch { order_len: usize, manifest_len: usize },

    /// Operation not valid in the current survey phase
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Awaited save to the session service failed
    #[error("Failed to save progress to server: {0}")]
    RemoteSaveFailed(String),

    /// Local progress store I/O error
    #[error("Local progress store error: {0}")]
    Io(#[from] std::io::Error),

    /// Local progress document could not be encoded
    #[error("Local progress encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] atm_common::Error),
}
