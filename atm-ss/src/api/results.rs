//! Export endpoints: session list and raw ledger download

use atm_common::api::ResultsResponse;
use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::ApiResult;
use crate::AppState;

/// GET /api/results.json
pub async fn results_json(State(state): State<AppState>) -> ApiResult<Json<ResultsResponse>> {
    let sessions = state.sessions.list().await?;
    Ok(Json(ResultsResponse { sessions }))
}

/// GET /api/results.csv
///
/// Returns the ledger as stored, creating it with only a header if no
/// judgment has been recorded yet.
pub async fn results_csv(State(state): State<AppState>) -> ApiResult<Response> {
    let content = state.ledger.read_all().await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"results.csv\""),
        ],
        content,
    )
        .into_response())
}
