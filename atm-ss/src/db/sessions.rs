//! Session Record Store
//!
//! One row per participant, keyed by the sanitized participant id. Order and
//! responses are stored as JSON text; timestamps as RFC 3339 strings.
//! `ledger_len` counts the responses already written to the ledger and is
//! only changed through [`SessionStore::set_ledger_len`].

use atm_common::{ParticipantId, SessionState};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::warn;

/// Session store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored row that no longer decodes into a session
    #[error("Corrupt session record {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

type SessionRow = (String, Option<String>, String, i64, i64, String, String);

const SELECT_COLUMNS: &str =
    "SELECT participant_id, order_json, responses_json, cursor, completed, created_at, updated_at FROM sessions";

/// Server-side store of per-participant session records
#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create an empty record unless one exists. Returns true when created.
    pub async fn ensure(&self, participant_id: &ParticipantId) -> Result<bool, StoreError> {
        let now = atm_common::time::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO sessions
                (participant_id, order_json, responses_json, cursor, completed, created_at, updated_at)
            VALUES (?, NULL, '[]', 0, 0, ?, ?)
            "#,
        )
        .bind(participant_id.storage_key())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Load the record of one participant
    pub async fn get(
        &self,
        participant_id: &ParticipantId,
    ) -> Result<Option<SessionState>, StoreError> {
        let row: Option<SessionRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE participant_id = ?"))
                .bind(participant_id.storage_key())
                .fetch_optional(&self.pool)
                .await?;

        row.map(decode_row).transpose()
    }

    /// Insert or replace the record of `state.participant_id`
    pub async fn put(&self, state: &SessionState) -> Result<(), StoreError> {
        let key = state.participant_id.storage_key();
        let order_json = state
            .order
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| corrupt(&key, e))?;
        let responses_json =
            serde_json::to_string(&state.responses).map_err(|e| corrupt(&key, e))?;
        let now = atm_common::time::now();
        let created_at = state.created_at.unwrap_or(now).to_rfc3339();
        let updated_at = state.updated_at.unwrap_or(now).to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO sessions
                (participant_id, order_json, responses_json, cursor, completed, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(participant_id) DO UPDATE SET
                order_json = excluded.order_json,
                responses_json = excluded.responses_json,
                cursor = excluded.cursor,
                completed = excluded.completed,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&key)
        .bind(order_json)
        .bind(responses_json)
        .bind(state.index as i64)
        .bind(state.completed)
        .bind(created_at)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Number of this participant's responses already in the ledger (0 if no record)
    pub async fn ledger_len(&self, participant_id: &ParticipantId) -> Result<usize, StoreError> {
        let key = participant_id.storage_key();
        let stored: Option<i64> =
            sqlx::query_scalar("SELECT ledger_len FROM sessions WHERE participant_id = ?")
                .bind(&key)
                .fetch_optional(&self.pool)
                .await?;

        stored
            .map(|n| usize::try_from(n).map_err(|e| corrupt(&key, e)))
            .transpose()
            .map(Option::unwrap_or_default)
    }

    /// Record that the first `len` responses are in the ledger
    pub async fn set_ledger_len(
        &self,
        participant_id: &ParticipantId,
        len: usize,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE sessions SET ledger_len = ? WHERE participant_id = ?")
            .bind(len as i64)
            .bind(participant_id.storage_key())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Every readable record, oldest first. Undecodable rows are skipped.
    pub async fn list(&self) -> Result<Vec<SessionState>, StoreError> {
        let rows: Vec<SessionRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} ORDER BY created_at, participant_id"))
                .fetch_all(&self.pool)
                .await?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            match decode_row(row) {
                Ok(state) => sessions.push(state),
                Err(e) => warn!("Skipping session record: {}", e),
            }
        }
        Ok(sessions)
    }
}

fn corrupt(key: &str, reason: impl ToString) -> StoreError {
    StoreError::Corrupt {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_timestamp(key: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| corrupt(key, e))
}

fn decode_row(row: SessionRow) -> Result<SessionState, StoreError> {
    let (key, order_json, responses_json, cursor, completed, created_at, updated_at) = row;

    let participant_id = ParticipantId::parse(&key).map_err(|e| corrupt(&key, e))?;
    let order = order_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| corrupt(&key, e))?;
    let responses = serde_json::from_str(&responses_json).map_err(|e| corrupt(&key, e))?;
    let index = usize::try_from(cursor).map_err(|e| corrupt(&key, e))?;

    Ok(SessionState {
        participant_id,
        order,
        responses,
        index,
        completed: completed != 0,
        created_at: Some(parse_timestamp(&key, &created_at)?),
        updated_at: Some(parse_timestamp(&key, &updated_at)?),
    })
}
