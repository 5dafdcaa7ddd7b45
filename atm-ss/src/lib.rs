//! atm-ss library - Session Service
//!
//! Stores per-participant survey progress, appends newly recorded judgments to
//! the results ledger, and exposes both for export.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod db;
pub mod error;
pub mod ledger;
pub mod locks;

use db::SessionStore;
use ledger::LedgerSink;
use locks::ParticipantLocks;

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Session Record Store
    pub sessions: SessionStore,
    /// Results ledger
    pub ledger: Arc<LedgerSink>,
    /// Serializes progress saves per participant
    pub locks: ParticipantLocks,
}

impl AppState {
    /// Create new application state
    pub fn new(sessions: SessionStore, ledger: LedgerSink) -> Self {
        Self {
            sessions,
            ledger: Arc::new(ledger),
            locks: ParticipantLocks::new(),
        }
    }
}

/// Build application router
///
/// Paths outside `/api` and `/health` are served from `static_root` when one
/// is configured (survey site, manifest and audio files).
pub fn build_router(state: AppState, static_root: Option<PathBuf>) -> Router {
    use axum::routing::{get, post};

    let router = Router::new()
        .route("/api/session", post(api::ensure_session))
        .route("/api/session/:id", get(api::get_session))
        .route("/api/progress", post(api::save_progress))
        .route("/api/results.json", get(api::results_json))
        .route("/api/results.csv", get(api::results_csv))
        .merge(api::health_routes())
        .with_state(state);

    let router = match static_root {
        Some(root) => router.fallback_service(ServeDir::new(root)),
        None => router,
    };

    router
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
