//! Progress Reconciliation
//!
//! Picks one authoritative session from the device copy and the service copy.
//! A service record carrying an order wins outright; otherwise the device copy
//! is used; with neither, a fresh session is created from the participant's
//! deterministic order. No field-level merge is attempted.

use atm_common::{ParticipantId, SessionState};
use chrono::{DateTime, Utc};

/// Where the reconciled session came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Remote,
    Local,
    Fresh,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub state: SessionState,
    pub source: Source,
}

impl Reconciled {
    /// Whether the service lacks this session and should be sent it
    pub fn push_remote(&self) -> bool {
        self.source != Source::Remote
    }
}

pub fn reconcile(
    local: Option<SessionState>,
    remote: Option<SessionState>,
    participant_id: &ParticipantId,
    manifest_len: usize,
    now: DateTime<Utc>,
) -> Reconciled {
    if let Some(remote) = remote.filter(|r| r.order.is_some()) {
        return Reconciled {
            state: remote,
            source: Source::Remote,
        };
    }
    if let Some(local) = local.filter(|l| l.order.is_some()) {
        return Reconciled {
            state: local,
            source: Source::Local,
        };
    }
    Reconciled {
        state: SessionState::fresh(participant_id.clone(), manifest_len, now),
        source: Source::Fresh,
    }
}
