//! Per-session concurrency control.
//!
//! The orchestrator holds a session's lock across the status check,
//! task creation, and message enqueue, so at most one worker is ever
//! bound to a session.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Keyed mutex: each session id maps to a `Semaphore(1)`.
pub struct SessionLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for SessionLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the lock for a session, waiting if another caller holds
    /// it. The permit releases on drop.
    pub async fn acquire(&self, session_id: &str) -> OwnedSemaphorePermit {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(session_id.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        sem.acquire_owned()
            .await
            .expect("session semaphore is never closed")
    }

    /// Drop lock entries for sessions nobody currently holds.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequential_acquire_release() {
        let map = SessionLockMap::new();
        let permit = map.acquire("s1").await;
        drop(permit);
        let permit = map.acquire("s1").await;
        drop(permit);
    }

    #[tokio::test]
    async fn different_sessions_do_not_contend() {
        let map = SessionLockMap::new();
        let _p1 = map.acquire("s1").await;
        let _p2 = map.acquire("s2").await;
        assert_eq!(map.len(), 2);
    }

    #[tokio::test]
    async fn same_session_waits_for_release() {
        let map = Arc::new(SessionLockMap::new());
        let p1 = map.acquire("s1").await;

        let waiter = {
            let map = map.clone();
            tokio::spawn(async move {
                let _p2 = map.acquire("s1").await;
                42
            })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(p1);
        assert_eq!(waiter.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn prune_keeps_held_locks() {
        let map = SessionLockMap::new();
        let permit = map.acquire("held").await;
        let released = map.acquire("released").await;
        drop(released);

        map.prune_idle();
        assert_eq!(map.len(), 1);
        drop(permit);

        map.prune_idle();
        assert!(map.is_empty());
    }
}
