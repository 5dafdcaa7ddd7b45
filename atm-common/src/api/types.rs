//! Shared API request/response types

use serde::{Deserialize, Serialize};

use crate::participant::ParticipantId;
use crate::session::SessionState;

/// Body of `POST /api/session`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsureSessionRequest {
    pub participant_id: ParticipantId,
}

/// Reply of `POST /api/session`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsureSessionResponse {
    pub ok: bool,
    pub participant_id: ParticipantId,
}

/// Acknowledgement returned by write endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// Reply of `GET /api/results.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsResponse {
    pub sessions: Vec<SessionState>,
}

/// Error envelope returned by every failing endpoint
///
/// # Examples
///
/// ```
/// use atm_common::api::ErrorResponse;
///
/// let body: ErrorResponse = serde_json::from_str(
///     r#"{"error": {"code": "NOT_FOUND", "message": "no session for k7m2p9x4q"}}"#,
/// ).unwrap();
/// assert_eq!(body.error.code, "NOT_FOUND");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
