//! Short-TTL mutex shared by every process through the store.
//!
//! Acquisition never waits: callers either own the lock or move on. Each
//! acquisition writes a fresh owner token so a holder whose lock already
//! expired cannot delete a lock someone else now owns.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::{KvStore, StoreError};

pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(10);

/// Proof of ownership for one acquisition of a lock key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockGuard {
    key: String,
    token: String,
}

impl LockGuard {
    pub fn token(&self) -> &str {
        &self.token
    }
}

#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Try to take `key` without blocking. `None` means another owner holds it.
    pub async fn try_acquire(&self, key: &str) -> Result<Option<LockGuard>, StoreError> {
        let token = Uuid::new_v4().to_string();
        if self.store.set_if_absent(key, &token, self.ttl).await? {
            debug!(lock_key = key, "rebuild lock acquired");
            Ok(Some(LockGuard {
                key: key.to_string(),
                token,
            }))
        } else {
            debug!(lock_key = key, "rebuild lock busy");
            Ok(None)
        }
    }

    /// Release a lock this caller owns. Returns `false` when the lock had
    /// already expired or passed to another owner; nothing is deleted then.
    pub async fn release(&self, guard: &LockGuard) -> Result<bool, StoreError> {
        let released = self
            .store
            .compare_and_delete(&guard.key, &guard.token)
            .await?;
        if !released {
            warn!(
                lock_key = %guard.key,
                ttl_ms = self.ttl.as_millis() as u64,
                "rebuild lock was no longer owned at release; it outlived its ttl"
            );
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use crate::store::MemoryStore;

    use super::*;

    fn lock_over(store: &MemoryStore) -> DistributedLock {
        DistributedLock::new(Arc::new(store.clone()), DEFAULT_LOCK_TTL)
    }

    #[tokio::test]
    async fn second_acquire_fails_while_held() {
        let store = MemoryStore::new();
        let lock = lock_over(&store);

        let guard = lock.try_acquire("lock:shop:1").await.expect("store ok");
        assert!(guard.is_some());
        assert!(lock.try_acquire("lock:shop:1").await.expect("store ok").is_none());
    }

    #[tokio::test]
    async fn release_allows_reacquire() {
        let store = MemoryStore::new();
        let lock = lock_over(&store);

        let guard = lock
            .try_acquire("lock:shop:1")
            .await
            .expect("store ok")
            .expect("acquired");
        assert!(lock.release(&guard).await.expect("store ok"));
        assert!(lock.try_acquire("lock:shop:1").await.expect("store ok").is_some());
    }

    #[tokio::test]
    async fn lock_key_carries_ttl() {
        let store = MemoryStore::new();
        let lock = lock_over(&store);

        lock.try_acquire("lock:shop:1").await.expect("store ok");
        let remaining = store.remaining_ttl("lock:shop:1").expect("ttl set");
        assert!(remaining <= DEFAULT_LOCK_TTL);
        assert!(remaining > Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_owner_cannot_release_new_owner() {
        let store = MemoryStore::new();
        let lock = lock_over(&store);

        let stale = lock
            .try_acquire("lock:shop:1")
            .await
            .expect("store ok")
            .expect("acquired");

        tokio::time::advance(DEFAULT_LOCK_TTL).await;

        let current = lock
            .try_acquire("lock:shop:1")
            .await
            .expect("store ok")
            .expect("reacquired after expiry");
        assert_ne!(stale.token(), current.token());

        assert!(!lock.release(&stale).await.expect("store ok"));
        assert!(lock.try_acquire("lock:shop:1").await.expect("store ok").is_none());

        assert!(lock.release(&current).await.expect("store ok"));
    }
}
