//! Common error types for the survey services

use thiserror::Error;

/// Common result type for survey operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the session service and survey runner
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Participant identifier outside the id alphabet or of the wrong length
    #[error("Invalid participant id: {0:?}")]
    InvalidParticipantId(String),

    /// Manifest with no items
    #[error("Manifest is empty")]
    EmptyManifest,

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Update that would rewrite state already stored for a participant
    #[error("Conflict: {0}")]
    Conflict(String),
}
