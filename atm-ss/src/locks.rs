//! Per-participant write serialization
//!
//! Progress saves read the stored record, merge, write it back and append to
//! the ledger. Holding the participant's lock across those steps keeps two
//! concurrent saves for the same participant from both appending the same
//! suffix or overwriting each other's merge.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Lazily created async lock per participant key
///
/// An entry lives only while some save holds or waits for it.
#[derive(Clone, Default)]
pub struct ParticipantLocks {
    inner: LockMap,
}

/// Exclusive access to one participant key, released on drop
pub struct ParticipantGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: String,
    map: LockMap,
}

impl ParticipantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn acquire(&self, key: &str) -> ParticipantGuard {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(key.to_string()).or_default().clone()
        };
        let guard = lock.lock_owned().await;

        ParticipantGuard {
            guard: Some(guard),
            key: key.to_string(),
            map: self.inner.clone(),
        }
    }

    /// Number of keys currently held or waited on
    pub fn tracked(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Drop for ParticipantGuard {
    fn drop(&mut self) {
        self.guard.take();

        let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        // The map holds one reference; any other belongs to a waiter
        if map
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = ParticipantLocks::new();
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let active = active.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("k7m2p9x4q").await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = ParticipantLocks::new();
        let _a = locks.acquire("aaaaaaaaa").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("bbbbbbbbb")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_released_keys_are_forgotten() {
        let locks = ParticipantLocks::new();
        for n in 0..100 {
            let _guard = locks.acquire(&format!("participant{n}")).await;
            assert_eq!(locks.tracked(), 1);
        }
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn test_key_with_waiter_is_kept_until_waiter_is_done() {
        let locks = ParticipantLocks::new();
        let first = locks.acquire("k7m2p9x4q").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("k7m2p9x4q").await;
                tokio::time::sleep(Duration::from_millis(5)).await;
            })
        };
        // Let the waiter clone the entry and park on it
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(first);
        assert_eq!(locks.tracked(), 1);

        waiter.await.unwrap();
        assert_eq!(locks.tracked(), 0);
    }
}
