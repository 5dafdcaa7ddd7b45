//! Local Progress Store
//!
//! Device-local copy of the participant's identity, order, cursor, responses
//! and intro flag. The whole record is read and written as one document so a
//! reset clears every field at once.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use atm_common::{Order, ParticipantId, ResponseRecord, SessionState};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::Result;

/// Everything the runner keeps on the participant's device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalProgress {
    #[serde(default)]
    pub participant_id: Option<ParticipantId>,
    #[serde(default)]
    pub order: Option<Order>,
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub responses: Vec<ResponseRecord>,
    #[serde(default)]
    pub intro_seen: bool,
}

impl LocalProgress {
    /// Empty progress owned by `participant_id`
    pub fn for_participant(participant_id: ParticipantId) -> Self {
        Self {
            participant_id: Some(participant_id),
            ..Self::default()
        }
    }

    /// Snapshot of `state` as stored locally
    pub fn from_session(state: &SessionState, intro_seen: bool) -> Self {
        Self {
            participant_id: Some(state.participant_id.clone()),
            order: state.order.clone(),
            index: state.index,
            responses: state.responses.clone(),
            intro_seen,
        }
    }

    /// Stored progress as a session for `participant_id`.
    ///
    /// Absent when no order is stored, when the progress belongs to another
    /// participant, or when the stored fields are inconsistent.
    pub fn session_for(&self, participant_id: &ParticipantId) -> Option<SessionState> {
        if self.participant_id.as_ref() != Some(participant_id) {
            return None;
        }
        let order = self.order.clone()?;
        let mut state = SessionState {
            participant_id: participant_id.clone(),
            order: Some(order),
            responses: self.responses.clone(),
            index: self.index,
            completed: false,
            created_at: None,
            updated_at: None,
        };
        state.completed = state.cursor_at_end();

        match state.validate() {
            Ok(()) => Some(state),
            Err(e) => {
                warn!("Discarding inconsistent local progress for {}: {}", participant_id, e);
                None
            }
        }
    }
}

/// Storage for [`LocalProgress`], scoped to one device/profile
#[async_trait]
pub trait LocalProgressStore: Send + Sync {
    /// Stored progress, or the default when nothing is stored
    async fn get(&self) -> Result<LocalProgress>;

    /// Replace the stored progress
    async fn set(&self, progress: &LocalProgress) -> Result<()>;

    /// Remove every stored field in one operation
    async fn clear(&self) -> Result<()>;
}

/// JSON document on disk, replaced atomically on every write
#[derive(Debug, Clone)]
pub struct FileProgressStore {
    path: PathBuf,
}

impl FileProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl LocalProgressStore for FileProgressStore {
    async fn get(&self) -> Result<LocalProgress> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LocalProgress::default())
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&bytes) {
            Ok(progress) => Ok(progress),
            Err(e) => {
                warn!(
                    "Ignoring unreadable progress file {}: {}",
                    self.path.display(),
                    e
                );
                Ok(LocalProgress::default())
            }
        }
    }

    async fn set(&self, progress: &LocalProgress) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(progress)?;
        let temp = self.temp_path();
        fs::write(&temp, json).await?;
        fs::rename(&temp, &self.path).await?;
        debug!(
            "Saved local progress ({} responses) to {}",
            progress.responses.len(),
            self.path.display()
        );
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    progress: Mutex<Option<LocalProgress>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<LocalProgress>> {
        // A poisoned slot still holds the last complete write
        self.progress.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LocalProgressStore for MemoryProgressStore {
    async fn get(&self) -> Result<LocalProgress> {
        Ok(self.slot().clone().unwrap_or_default())
    }

    async fn set(&self, progress: &LocalProgress) -> Result<()> {
        *self.slot() = Some(progress.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.slot() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atm_common::Judgment;

    fn pid() -> ParticipantId {
        ParticipantId::parse("k7m2p9x4q").unwrap()
    }

    fn record(position: usize, manifest_index: usize) -> ResponseRecord {
        ResponseRecord {
            participant_id: pid(),
            timestamp: atm_common::time::now(),
            index: position,
            manifest_index,
            audio: format!("alpha_data/{manifest_index}.wav"),
            label: "hello".to_string(),
            filename: format!("{manifest_index}.wav"),
            response: Judgment::Yes,
        }
    }

    fn progress() -> LocalProgress {
        LocalProgress {
            participant_id: Some(pid()),
            order: Some(vec![2, 0, 1]),
            index: 1,
            responses: vec![record(0, 2)],
            intro_seen: true,
        }
    }

    #[tokio::test]
    async fn test_file_store_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProgressStore::new(dir.path().join("progress.json"));
        assert_eq!(store.get().await.unwrap(), LocalProgress::default());
    }

    #[tokio::test]
    async fn test_file_store_set_get_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProgressStore::new(dir.path().join("nested").join("progress.json"));

        store.set(&progress()).await.unwrap();
        assert_eq!(store.get().await.unwrap(), progress());
        assert!(!store.temp_path().exists());

        store.clear().await.unwrap();
        assert!(!store.path().exists());
        assert_eq!(store.get().await.unwrap(), LocalProgress::default());

        // Clearing twice is fine
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_ignores_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = FileProgressStore::new(&path);
        assert_eq!(store.get().await.unwrap(), LocalProgress::default());
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryProgressStore::new();
        store.set(&progress()).await.unwrap();
        assert_eq!(store.get().await.unwrap().index, 1);
        store.clear().await.unwrap();
        assert_eq!(store.get().await.unwrap(), LocalProgress::default());
    }

    #[test]
    fn test_session_for_matching_participant() {
        let state = progress().session_for(&pid()).unwrap();
        assert_eq!(state.order, Some(vec![2, 0, 1]));
        assert_eq!(state.index, 1);
        assert!(!state.completed);
    }

    #[test]
    fn test_session_for_other_participant_is_absent() {
        let other = ParticipantId::parse("aaaaaaaaa").unwrap();
        assert!(progress().session_for(&other).is_none());
    }

    #[test]
    fn test_session_for_without_order_is_absent() {
        let local = LocalProgress::for_participant(pid());
        assert!(local.session_for(&pid()).is_none());
    }

    #[test]
    fn test_session_for_inconsistent_cursor_is_absent() {
        let mut local = progress();
        local.index = 3;
        assert!(local.session_for(&pid()).is_none());
    }
}
