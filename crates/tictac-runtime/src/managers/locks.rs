//! Per-session mutual exclusion
//!
//! Every operation that reads a session, decides, writes it and announces the
//! result holds that session's lock for the whole sequence. Two moves against
//! the same session therefore run one after the other and the second sees the
//! turn already flipped by the first.

use std::sync::Arc;

use dashmap::DashMap;
use tictac_core::SessionId;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct SessionLocks {
    locks: DashMap<SessionId, Arc<Mutex<()>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `session_id`
    pub async fn acquire(&self, session_id: SessionId) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(session_id).or_default().value().clone();
        lock.lock_owned().await
    }

    /// Drop the lock entry of a removed session once nobody holds or awaits it
    pub fn forget(&self, session_id: SessionId) {
        self.locks
            .remove_if(&session_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_session_is_serialized() {
        let locks = Arc::new(SessionLocks::new());
        let guard = locks.acquire(SessionId::new(1)).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(SessionId::new(1)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_other_sessions_do_not_block() {
        let locks = SessionLocks::new();
        let _one = locks.acquire(SessionId::new(1)).await;
        let two = tokio::time::timeout(Duration::from_secs(1), locks.acquire(SessionId::new(2))).await;
        assert!(two.is_ok());
    }

    #[tokio::test]
    async fn test_forget_keeps_held_locks() {
        let locks = SessionLocks::new();
        let guard = locks.acquire(SessionId::new(1)).await;
        locks.forget(SessionId::new(1));
        assert_eq!(locks.len(), 1);

        drop(guard);
        locks.forget(SessionId::new(1));
        assert!(locks.is_empty());
    }
}
