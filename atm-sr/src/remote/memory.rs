//! In-process session store applying the service's merge rules

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use atm_common::{ParticipantId, ProgressUpdate, SessionState};

use super::{RemoteError, SessionRemote};

#[derive(Debug, Default)]
pub(crate) struct MemoryRemote {
    sessions: Mutex<HashMap<ParticipantId, SessionState>>,
    offline: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryRemote {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a network error
    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of accepted saves
    pub(crate) fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub(crate) fn insert(&self, state: SessionState) {
        self.sessions
            .lock()
            .unwrap()
            .insert(state.participant_id.clone(), state);
    }

    pub(crate) fn stored(&self, participant_id: &ParticipantId) -> Option<SessionState> {
        self.sessions.lock().unwrap().get(participant_id).cloned()
    }

    fn check_online(&self) -> Result<(), RemoteError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Network("offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionRemote for MemoryRemote {
    async fn ensure_session(&self, participant_id: &ParticipantId) -> Result<(), RemoteError> {
        self.check_online()?;
        self.sessions
            .lock()
            .unwrap()
            .entry(participant_id.clone())
            .or_insert_with(|| SessionState::empty(participant_id.clone(), atm_common::time::now()));
        Ok(())
    }

    async fn get_session(
        &self,
        participant_id: &ParticipantId,
    ) -> Result<Option<SessionState>, RemoteError> {
        self.check_online()?;
        Ok(self.stored(participant_id))
    }

    async fn save_progress(&self, update: &ProgressUpdate) -> Result<(), RemoteError> {
        self.check_online()?;
        let mut sessions = self.sessions.lock().unwrap();
        let previous = sessions.get(&update.participant_id);
        let merged = SessionState::apply_update(previous, update.clone(), atm_common::time::now())
            .map_err(|e| RemoteError::Rejected {
                status: 409,
                message: e.to_string(),
            })?;
        sessions.insert(merged.participant_id.clone(), merged);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
