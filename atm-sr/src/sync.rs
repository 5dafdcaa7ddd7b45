//! Ordered background sync to the session service
//!
//! One worker task per runner sends progress snapshots in submission order,
//! so an earlier snapshot can never land after a later one. Fire-and-forget
//! snapshots still queued behind a newer snapshot are skipped; each snapshot
//! carries the full state, so the newer one covers them.

use std::sync::Arc;

use atm_common::ProgressUpdate;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::remote::{RemoteError, SessionRemote};

type Ack = oneshot::Sender<Result<(), RemoteError>>;

struct SaveJob {
    update: ProgressUpdate,
    ack: Option<Ack>,
}

/// Handle to the sync worker
pub struct RemoteSync {
    tx: mpsc::UnboundedSender<SaveJob>,
    worker: JoinHandle<()>,
}

impl RemoteSync {
    /// Start the worker for `remote`
    pub fn spawn(remote: Arc<dyn SessionRemote>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(remote, rx));
        Self { tx, worker }
    }

    /// Queue a snapshot without waiting. Failures are logged by the worker.
    pub fn submit(&self, update: ProgressUpdate) {
        if self.tx.send(SaveJob { update, ack: None }).is_err() {
            warn!("Sync worker stopped, progress not sent");
        }
    }

    /// Queue a snapshot and wait until it has been sent.
    ///
    /// Completes after every snapshot queued before it.
    pub async fn save(&self, update: ProgressUpdate) -> Result<(), RemoteError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(SaveJob {
                update,
                ack: Some(ack),
            })
            .map_err(|_| RemoteError::Closed)?;
        done.await.map_err(|_| RemoteError::Closed)?
    }

    /// Send everything still queued, then stop the worker
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            warn!("Sync worker ended abnormally: {}", e);
        }
    }
}

async fn run_worker(remote: Arc<dyn SessionRemote>, mut rx: mpsc::UnboundedReceiver<SaveJob>) {
    while let Some(mut job) = rx.recv().await {
        // Skip fire-and-forget snapshots already superseded by a queued one
        while job.ack.is_none() {
            match rx.try_recv() {
                Ok(next) => {
                    debug!(
                        "Skipping superseded snapshot at index {:?}",
                        job.update.index
                    );
                    job = next;
                }
                Err(_) => break,
            }
        }

        let result = remote.save_progress(&job.update).await;
        match job.ack {
            Some(ack) => {
                // The waiter may have gone away; nothing else to report to
                let _ = ack.send(result);
            }
            None => {
                if let Err(e) = result {
                    warn!(
                        "Background save for {} failed: {}",
                        job.update.participant_id, e
                    );
                }
            }
        }
    }
    debug!("Sync worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use atm_common::{ParticipantId, SessionState};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records every index it receives, slowly
    #[derive(Default)]
    struct RecordingRemote {
        seen: Mutex<Vec<Option<usize>>>,
        fail: bool,
    }

    #[async_trait]
    impl SessionRemote for RecordingRemote {
        async fn ensure_session(&self, _: &ParticipantId) -> Result<(), RemoteError> {
            Ok(())
        }

        async fn get_session(&self, _: &ParticipantId) -> Result<Option<SessionState>, RemoteError> {
            Ok(None)
        }

        async fn save_progress(&self, update: &ProgressUpdate) -> Result<(), RemoteError> {
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.seen.lock().unwrap().push(update.index);
            if self.fail {
                return Err(RemoteError::Network("down".to_string()));
            }
            Ok(())
        }
    }

    fn update(index: usize) -> ProgressUpdate {
        ProgressUpdate {
            participant_id: ParticipantId::parse("k7m2p9x4q").unwrap(),
            order: None,
            responses: None,
            index: Some(index),
            completed: None,
        }
    }

    #[tokio::test]
    async fn test_saves_arrive_in_submission_order() {
        let remote = Arc::new(RecordingRemote::default());
        let sync = RemoteSync::spawn(remote.clone());

        for index in 0..5 {
            sync.submit(update(index));
        }
        sync.save(update(5)).await.unwrap();

        let seen = remote.seen.lock().unwrap().clone();
        assert_eq!(seen.last(), Some(&Some(5)));
        let indices: Vec<usize> = seen.iter().map(|i| i.unwrap()).collect();
        assert!(indices.windows(2).all(|w| w[0] < w[1]), "{indices:?}");
    }

    #[tokio::test]
    async fn test_awaited_save_reports_failure() {
        let remote = Arc::new(RecordingRemote {
            fail: true,
            ..Default::default()
        });
        let sync = RemoteSync::spawn(remote);

        sync.submit(update(0));
        let err = sync.save(update(1)).await.unwrap_err();
        assert!(matches!(err, RemoteError::Network(_)));
    }

    #[tokio::test]
    async fn test_shutdown_flushes_queue() {
        let remote = Arc::new(RecordingRemote::default());
        let sync = RemoteSync::spawn(remote.clone());

        sync.submit(update(0));
        sync.submit(update(1));
        sync.shutdown().await;

        let seen = remote.seen.lock().unwrap().clone();
        assert_eq!(seen.last(), Some(&Some(1)));
    }
}
