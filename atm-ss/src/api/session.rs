//! Session endpoints: ensure, load, save progress

use atm_common::api::{EnsureSessionRequest, EnsureSessionResponse, OkResponse};
use atm_common::{ParticipantId, ProgressUpdate, SessionState};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use tracing::{debug, info, warn};

use crate::db::sessions::StoreError;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => ApiError::Database(e),
            corrupt @ StoreError::Corrupt { .. } => ApiError::Internal(corrupt.to_string()),
        }
    }
}

/// Map body extraction failures (bad JSON, missing fields, invalid id) to 400
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

/// POST /api/session
///
/// Creates an empty record for the participant unless one exists.
pub async fn ensure_session(
    State(state): State<AppState>,
    payload: Result<Json<EnsureSessionRequest>, JsonRejection>,
) -> ApiResult<Json<EnsureSessionResponse>> {
    let request = body(payload)?;
    let participant_id = request.participant_id;

    if state.sessions.ensure(&participant_id).await? {
        info!("Created session record for {}", participant_id);
    }

    Ok(Json(EnsureSessionResponse {
        ok: true,
        participant_id,
    }))
}

/// GET /api/session/:id
pub async fn get_session(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<SessionState>> {
    let participant_id = ParticipantId::parse(&raw_id)?;

    state
        .sessions
        .get(&participant_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no session for {participant_id}")))
}

/// POST /api/progress
///
/// Merges the payload over the stored record, writes it, then appends the
/// responses the ledger does not hold yet. Ledger failures are logged and do
/// not fail the save; the missing rows go out with the next save.
pub async fn save_progress(
    State(state): State<AppState>,
    payload: Result<Json<ProgressUpdate>, JsonRejection>,
) -> ApiResult<Json<OkResponse>> {
    let update = body(payload)?;
    let participant_id = update.participant_id.clone();

    let _guard = state.locks.acquire(&participant_id.storage_key()).await;

    let previous = state.sessions.get(&participant_id).await?;

    let merged = SessionState::apply_update(previous.as_ref(), update, atm_common::time::now())
        .inspect_err(|e| warn!("Rejected progress for {}: {}", participant_id, e))?;
    state.sessions.put(&merged).await?;

    let ledger_len = state.sessions.ledger_len(&participant_id).await?;
    match state.ledger.append_new(ledger_len, &merged.responses).await {
        Ok(0) => {}
        Ok(rows) => {
            debug!("Appended {} ledger rows for {}", rows, participant_id);
            if let Err(e) = state
                .sessions
                .set_ledger_len(&participant_id, merged.responses.len())
                .await
            {
                warn!("Failed to record ledger position for {}: {}", participant_id, e);
            }
        }
        Err(e) => warn!("Failed to append ledger rows for {}: {}", participant_id, e),
    }

    if merged.completed && previous.as_ref().map_or(true, |p| !p.completed) {
        info!("Participant {} completed the survey", participant_id);
    }

    Ok(Json(OkResponse::ok()))
}
