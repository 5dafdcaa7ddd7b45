//! Session Record Store client
//!
//! The runner talks to the session service through [`SessionRemote`] so the
//! HTTP client can be swapped for an in-process store in tests.

use async_trait::async_trait;
use atm_common::{ParticipantId, ProgressUpdate, SessionState};
use thiserror::Error;

pub mod http;

#[cfg(test)]
pub(crate) mod memory;

pub use http::HttpSessionRemote;

/// Errors returned by the session service client
#[derive(Error, Debug)]
pub enum RemoteError {
    /// No record exists for the participant
    #[error("Session not found")]
    NotFound,

    /// Request could not be sent or timed out
    #[error("Network error: {0}")]
    Network(String),

    /// Service answered with an error status
    #[error("Server rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Response body could not be decoded
    #[error("Invalid response: {0}")]
    Decode(String),

    /// Background sync worker is no longer running
    #[error("Sync worker stopped")]
    Closed,
}

/// Operations of the session service used by the survey runner
#[async_trait]
pub trait SessionRemote: Send + Sync {
    /// Create an empty record unless one exists
    async fn ensure_session(&self, participant_id: &ParticipantId) -> Result<(), RemoteError>;

    /// Stored session, `None` when the service has no record
    async fn get_session(
        &self,
        participant_id: &ParticipantId,
    ) -> Result<Option<SessionState>, RemoteError>;

    /// Merge `update` over the stored record
    async fn save_progress(&self, update: &ProgressUpdate) -> Result<(), RemoteError>;
}
