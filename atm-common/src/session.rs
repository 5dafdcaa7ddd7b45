//! Session and response model
//!
//! A [`SessionState`] is the resumable record of one participant's progress.
//! The same shape lives on the participant's device and on the session
//! service; both copies obey the same invariants:
//!
//! - `index == responses.len()` (the cursor counts recorded responses)
//! - `completed == (index >= order.len())`
//! - responses are append-only and position `i` answers `order[i]`

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::participant::ParticipantId;
use crate::shuffle::shuffled_indices;
use crate::{Error, Result};

/// Presentation order: a permutation of manifest indices
pub type Order = Vec<usize>;

/// Participant's verdict on one item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Judgment {
    Yes,
    No,
    #[serde(rename = "Not Sure")]
    NotSure,
}

impl Judgment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Judgment::Yes => "Yes",
            Judgment::No => "No",
            Judgment::NotSure => "Not Sure",
        }
    }
}

impl fmt::Display for Judgment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded judgment. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub participant_id: ParticipantId,
    /// Written with millisecond precision, the same text as the ledger
    #[serde(with = "crate::time::iso_millis")]
    pub timestamp: DateTime<Utc>,
    /// Position in the participant's order
    pub index: usize,
    /// Position in the manifest
    pub manifest_index: usize,
    pub audio: String,
    pub label: String,
    pub filename: String,
    pub response: Judgment,
}

/// Full resumable progress of one participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub participant_id: ParticipantId,
    pub order: Option<Order>,
    #[serde(default)]
    pub responses: Vec<ResponseRecord>,
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Partial session payload sent by the survey runner.
///
/// Omitted fields keep their stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub participant_id: ParticipantId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Order>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responses: Option<Vec<ResponseRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl SessionState {
    /// Record shell with no order yet
    pub fn empty(participant_id: ParticipantId, now: DateTime<Utc>) -> Self {
        Self {
            participant_id,
            order: None,
            responses: Vec::new(),
            index: 0,
            completed: false,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    /// New session with the participant's deterministic order over `manifest_len` items
    pub fn fresh(participant_id: ParticipantId, manifest_len: usize, now: DateTime<Utc>) -> Self {
        let order = shuffled_indices(participant_id.as_str(), manifest_len);
        Self {
            order: Some(order),
            ..Self::empty(participant_id, now)
        }
    }

    /// Number of items in the order (0 while no order exists)
    pub fn total(&self) -> usize {
        self.order.as_ref().map_or(0, Vec::len)
    }

    /// Whether any judgment has been recorded
    pub fn has_progress(&self) -> bool {
        self.index > 0 || !self.responses.is_empty()
    }

    /// Whether the cursor has reached the end of a known order
    pub fn cursor_at_end(&self) -> bool {
        self.order.as_ref().is_some_and(|order| self.index >= order.len())
    }

    /// Full snapshot in update form
    pub fn to_update(&self) -> ProgressUpdate {
        ProgressUpdate {
            participant_id: self.participant_id.clone(),
            order: self.order.clone(),
            responses: Some(self.responses.clone()),
            index: Some(self.index),
            completed: Some(self.completed),
        }
    }

    /// Check the cursor, completion and response-position invariants
    pub fn validate(&self) -> Result<()> {
        let Some(order) = &self.order else {
            if self.has_progress() || self.completed {
                return Err(Error::InvalidInput(
                    "responses recorded without a presentation order".to_string(),
                ));
            }
            return Ok(());
        };

        validate_order(order)?;

        if self.index != self.responses.len() {
            return Err(Error::InvalidInput(format!(
                "cursor {} does not match {} recorded responses",
                self.index,
                self.responses.len()
            )));
        }
        if self.index > order.len() {
            return Err(Error::InvalidInput(format!(
                "cursor {} beyond order length {}",
                self.index,
                order.len()
            )));
        }
        if self.completed != self.cursor_at_end() {
            return Err(Error::InvalidInput(format!(
                "completed={} disagrees with cursor {} of {}",
                self.completed,
                self.index,
                order.len()
            )));
        }

        for (position, record) in self.responses.iter().enumerate() {
            if record.participant_id != self.participant_id {
                return Err(Error::InvalidInput(format!(
                    "response {position} belongs to participant {}",
                    record.participant_id
                )));
            }
            if record.index != position || record.manifest_index != order[position] {
                return Err(Error::InvalidInput(format!(
                    "response {position} answers position {} / manifest index {}, expected {} / {}",
                    record.index, record.manifest_index, position, order[position]
                )));
            }
        }
        Ok(())
    }

    /// Merge a progress update over the stored record.
    ///
    /// Fields absent from `update` keep their stored value. The order may be
    /// set once and never changed; stored responses must remain a prefix of
    /// the merged responses. `completed` is derived from the merged cursor.
    pub fn apply_update(
        previous: Option<&SessionState>,
        update: ProgressUpdate,
        now: DateTime<Utc>,
    ) -> Result<SessionState> {
        let base = match previous {
            Some(stored) if stored.participant_id != update.participant_id => {
                return Err(Error::Conflict(format!(
                    "stored record belongs to {}, update is for {}",
                    stored.participant_id, update.participant_id
                )));
            }
            Some(stored) => stored.clone(),
            None => SessionState::empty(update.participant_id.clone(), now),
        };

        let order = match update.order {
            Some(order) => {
                validate_order(&order)?;
                if base.order.as_ref().is_some_and(|stored| *stored != order) {
                    return Err(Error::Conflict(
                        "presentation order is already fixed for this participant".to_string(),
                    ));
                }
                Some(order)
            }
            None => base.order.clone(),
        };

        let responses = match update.responses {
            Some(responses) => {
                let stored = &base.responses;
                if responses.len() < stored.len() || responses[..stored.len()] != stored[..] {
                    return Err(Error::Conflict(format!(
                        "update with {} responses does not extend the {} stored responses",
                        responses.len(),
                        stored.len()
                    )));
                }
                responses
            }
            None => base.responses.clone(),
        };

        let mut merged = SessionState {
            participant_id: base.participant_id,
            order,
            responses,
            index: update.index.unwrap_or(base.index),
            completed: false,
            created_at: base.created_at.or(Some(now)),
            updated_at: Some(now),
        };
        merged.completed = merged.cursor_at_end();

        if update.completed == Some(true) && !merged.completed {
            return Err(Error::InvalidInput(format!(
                "completion claimed at cursor {} of {}",
                merged.index,
                merged.total()
            )));
        }

        merged.validate()?;
        Ok(merged)
    }
}

/// An order must be a non-empty permutation of `0..len`
pub fn validate_order(order: &[usize]) -> Result<()> {
    if order.is_empty() {
        return Err(Error::InvalidInput("presentation order is empty".to_string()));
    }
    let mut seen = vec![false; order.len()];
    for &manifest_index in order {
        match seen.get_mut(manifest_index) {
            Some(slot) if !*slot => *slot = true,
            _ => {
                return Err(Error::InvalidInput(format!(
                    "presentation order is not a permutation (manifest index {manifest_index})"
                )));
            }
        }
    }
    Ok(())
}
