//! Survey Runner
//!
//! Phases:
//! - `Intro`: shown until the participant begins, unless progress exists
//! - `Presenting`: cursor inside the order
//! - `Done`: cursor at the end of the order (terminal)
//!
//! Every judgment is written to the local store before it is handed to the
//! background sync, so a crash between the two never loses the local copy.

use std::sync::Arc;

use atm_common::participant;
use atm_common::{Item, Judgment, Manifest, ParticipantId, ResponseRecord, SessionState};
use reqwest::Url;
use tracing::{debug, info, warn};

use crate::error::{Result, RunnerError};
use crate::local_store::{LocalProgress, LocalProgressStore};
use crate::reconcile::{reconcile, Source};
use crate::remote::{RemoteError, SessionRemote};
use crate::sync::RemoteSync;

/// Query parameter carrying the participant id in resume links
pub const RESUME_PARAM: &str = "sid";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Intro,
    Presenting,
    Done,
}

/// Item at the cursor, ready for display
#[derive(Debug, Clone, PartialEq)]
pub struct Presentation {
    /// 1-based position within the order
    pub position: usize,
    pub total: usize,
    pub manifest_index: usize,
    pub item: Item,
    pub filename: String,
    pub question: String,
}

/// Resolve the item at `index` of `order`.
///
/// Fails with [`RunnerError::OutOfRange`] at or past the end of the order.
pub fn present(order: &[usize], index: usize, manifest: &Manifest) -> Result<Presentation> {
    let manifest_index = *order.get(index).ok_or(RunnerError::OutOfRange {
        index,
        len: order.len(),
    })?;
    let item = manifest
        .get(manifest_index)
        .ok_or(RunnerError::OrderMismatch {
            order_len: order.len(),
            manifest_len: manifest.len(),
        })?
        .clone();

    Ok(Presentation {
        position: index + 1,
        total: order.len(),
        manifest_index,
        filename: item.display_filename(),
        question: item.question(),
        item,
    })
}

/// Outcome of recording a judgment
#[derive(Debug)]
pub enum Advance {
    /// More items remain
    Next(ResponseRecord),
    /// The last item was answered; `saved` is the result of the final save
    Completed {
        response: ResponseRecord,
        saved: Result<()>,
    },
}

/// Shareable resume reference
#[derive(Debug)]
pub struct ResumeLink {
    pub url: String,
    /// Result of the save made before handing out the link
    pub saved: Result<()>,
}

/// Build a resume link by setting the `sid` query parameter on `base`
pub fn resume_url(base: &str, participant_id: &ParticipantId) -> Result<String> {
    let mut url = Url::parse(base)
        .map_err(|e| atm_common::Error::InvalidInput(format!("resume link base {base:?}: {e}")))?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != RESUME_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(RESUME_PARAM, participant_id.as_str());
    Ok(url.into())
}

fn save_failed(e: RemoteError) -> RunnerError {
    RunnerError::RemoteSaveFailed(e.to_string())
}

/// Drives one participant through the survey
pub struct SurveyRunner {
    local: Arc<dyn LocalProgressStore>,
    sync: RemoteSync,
    manifest: Manifest,
    state: SessionState,
    intro_seen: bool,
}

impl SurveyRunner {
    /// Resolve identity, reconcile progress and start the sync worker.
    ///
    /// `explicit_sid` (from a resume link) takes precedence over the id stored
    /// on this device. Service failures during startup are logged and treated
    /// as "no remote progress".
    pub async fn start(
        local: Arc<dyn LocalProgressStore>,
        remote: Arc<dyn SessionRemote>,
        manifest: Manifest,
        explicit_sid: Option<&str>,
    ) -> Result<Self> {
        let stored = local.get().await?;
        let participant_id = participant::resolve(explicit_sid, stored.participant_id.clone())?;

        // Progress saved under another id does not carry over
        let stored = if stored.participant_id.as_ref() == Some(&participant_id) {
            stored
        } else {
            LocalProgress::for_participant(participant_id.clone())
        };
        local.set(&stored).await?;
        info!("Participant: {}", participant_id);

        if let Err(e) = remote.ensure_session(&participant_id).await {
            warn!("Failed to ensure session for {}: {}", participant_id, e);
        }

        let remote_state = match remote.get_session(&participant_id).await {
            Ok(state) => state,
            Err(RemoteError::NotFound) => None,
            Err(e) => {
                warn!("Failed to load remote progress for {}: {}", participant_id, e);
                None
            }
        };

        let reconciled = reconcile(
            stored.session_for(&participant_id),
            remote_state,
            &participant_id,
            manifest.len(),
            atm_common::time::now(),
        );
        debug!("Reconciled progress from {:?}", reconciled.source);

        let order_len = reconciled.state.total();
        if order_len != manifest.len() {
            return Err(RunnerError::OrderMismatch {
                order_len,
                manifest_len: manifest.len(),
            });
        }

        let push = reconciled.push_remote();
        let state = reconciled.state;
        let intro_seen = stored.intro_seen || state.has_progress();
        local
            .set(&LocalProgress::from_session(&state, intro_seen))
            .await?;

        let sync = RemoteSync::spawn(remote);
        if push {
            sync.submit(state.to_update());
        }

        if reconciled.source == Source::Remote {
            info!(
                "Resuming {} at item {} of {}",
                participant_id,
                state.index,
                state.total()
            );
        }

        Ok(Self {
            local,
            sync,
            manifest,
            state,
            intro_seen,
        })
    }

    pub fn participant_id(&self) -> &ParticipantId {
        &self.state.participant_id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn phase(&self) -> Phase {
        if self.state.cursor_at_end() {
            Phase::Done
        } else if !self.intro_seen {
            Phase::Intro
        } else {
            Phase::Presenting
        }
    }

    async fn persist_local(&self, state: &SessionState, intro_seen: bool) -> Result<()> {
        self.local
            .set(&LocalProgress::from_session(state, intro_seen))
            .await
    }

    /// Leave the introduction
    pub async fn begin(&mut self) -> Result<()> {
        if self.intro_seen {
            return Ok(());
        }
        self.persist_local(&self.state, true).await?;
        self.intro_seen = true;
        Ok(())
    }

    /// Item at the cursor
    pub fn current(&self) -> Result<Presentation> {
        let order = self.state.order.as_deref().unwrap_or_default();
        present(order, self.state.index, &self.manifest)
    }

    /// Record a judgment for the current item and advance.
    ///
    /// The new state is stored locally first. Intermediate saves to the
    /// service are queued without waiting; the final save is awaited.
    pub async fn record(&mut self, response: Judgment) -> Result<Advance> {
        if self.phase() == Phase::Intro {
            return Err(RunnerError::InvalidState(
                "survey has not begun".to_string(),
            ));
        }
        let presentation = self.current()?;

        let record = ResponseRecord {
            participant_id: self.state.participant_id.clone(),
            timestamp: atm_common::time::now(),
            index: self.state.index,
            manifest_index: presentation.manifest_index,
            audio: presentation.item.audio.clone(),
            label: presentation.item.label.clone(),
            filename: presentation.filename.clone(),
            response,
        };

        let mut next = self.state.clone();
        next.responses.push(record.clone());
        next.index += 1;
        next.completed = next.cursor_at_end();
        next.updated_at = Some(record.timestamp);

        self.persist_local(&next, self.intro_seen).await?;
        self.state = next;

        if !self.state.completed {
            self.sync.submit(self.state.to_update());
            return Ok(Advance::Next(record));
        }

        info!("Participant {} answered every item", self.state.participant_id);
        let saved = self.save_now().await;
        Ok(Advance::Completed {
            response: record,
            saved,
        })
    }

    async fn save_now(&self) -> Result<()> {
        self.sync
            .save(self.state.to_update())
            .await
            .map_err(save_failed)
            .inspect_err(|e| warn!("{}", e))
    }

    /// Send the completed state and wait for the service to accept it
    pub async fn complete(&self) -> Result<()> {
        if !self.state.completed {
            return Err(RunnerError::InvalidState(format!(
                "cannot complete at item {} of {}",
                self.state.index,
                self.state.total()
            )));
        }
        self.save_now().await
    }

    /// Save now and produce a link that resumes this participant elsewhere.
    ///
    /// The link is returned even if the save fails; `saved` tells whether the
    /// service holds the current progress.
    pub async fn continue_later(&self, link_base: &str) -> Result<ResumeLink> {
        let url = resume_url(link_base, &self.state.participant_id)?;
        let saved = self.save_now().await;
        Ok(ResumeLink { url, saved })
    }

    /// Clear all local progress in one operation. The service copy is kept.
    pub async fn reset(self) -> Result<()> {
        self.sync.shutdown().await;
        self.local.clear().await?;
        info!("Cleared local progress for {}", self.state.participant_id);
        Ok(())
    }

    /// Flush queued saves and stop the sync worker
    pub async fn shutdown(self) {
        self.sync.shutdown().await;
    }
}
