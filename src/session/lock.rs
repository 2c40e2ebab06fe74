//! Process-local stop locks, keyed by session id.
//!
//! The lock map is a same-process fast path that keeps concurrent stop
//! triggers (timer expiry, explicit end-early, client teardown, webhook) from
//! each calling the provider's stop API or racing to write a transcript. It
//! is not durable: the conditional completion write in the store is what
//! guarantees at-most-once finalization across processes.

use std::collections::HashMap;

use tokio::sync::Mutex;
use uuid::Uuid;

/// Stop progress for one session. Absent from the map means no stop has been
/// attempted in this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopState {
    /// A stop is in flight.
    Stopping,
    /// The stop ran to completion.
    Stopped,
}

/// Outcome of trying to claim the stop for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopAttempt {
    /// This caller holds the lock and must run the stop.
    Acquired,
    /// Another caller is mid-stop.
    AlreadyStopping,
    /// A stop already finished in this process.
    AlreadyStopped,
}

/// Per-session stop locks, owned by the coordinator instance.
#[derive(Default)]
pub struct StopLockMap {
    inner: Mutex<HashMap<Uuid, StopState>>,
}

impl StopLockMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim the stop for `session_id`. The check and the
    /// transition to `Stopping` happen under one lock acquisition, so exactly
    /// one concurrent caller observes `Acquired`.
    pub async fn begin(&self, session_id: Uuid) -> StopAttempt {
        let mut map = self.inner.lock().await;
        match map.get(&session_id) {
            Some(StopState::Stopping) => StopAttempt::AlreadyStopping,
            Some(StopState::Stopped) => StopAttempt::AlreadyStopped,
            None => {
                map.insert(session_id, StopState::Stopping);
                StopAttempt::Acquired
            }
        }
    }

    /// Mark the stop finished.
    pub async fn finish(&self, session_id: Uuid) {
        self.inner
            .lock()
            .await
            .insert(session_id, StopState::Stopped);
    }

    /// Release a claimed lock without finishing, so a later retry can
    /// acquire it again. Used when the completion write fails.
    pub async fn release(&self, session_id: Uuid) {
        self.inner.lock().await.remove(&session_id);
    }

    /// Drop the entry for a session observed as completed. Optional cleanup;
    /// the completed-check short-circuits before the lock either way.
    pub async fn clear(&self, session_id: Uuid) {
        self.inner.lock().await.remove(&session_id);
    }

    #[cfg(test)]
    pub async fn state(&self, session_id: Uuid) -> Option<StopState> {
        self.inner.lock().await.get(&session_id).copied()
    }
}
