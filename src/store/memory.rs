//! Process-local store adapter.
//!
//! Backs tests and single-process deployments. Expired keys are dropped
//! lazily when touched; every operation works on one map shard entry so it is
//! atomic with respect to other callers in the same process.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use super::{KvStore, StoreError};

#[derive(Debug, Clone)]
struct Slot {
    value: String,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(value: &str, ttl: Option<Duration>, now: Instant) -> Self {
        Self {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| now + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Slot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Time left before `key` expires. `None` when the key is absent or has no TTL.
    pub fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let slot = self.entries.get(key)?;
        if slot.is_expired(now) {
            return None;
        }
        slot.expires_at.map(|at| at.saturating_duration_since(now))
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|slot| !slot.value().is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(slot) if !slot.is_expired(now) => return Ok(Some(slot.value.clone())),
            Some(_) => {}
            None => return Ok(None),
        }
        // the read guard is released above; reap the stale slot
        self.entries.remove_if(key, |_, slot| slot.is_expired(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let slot = Slot::new(value, ttl, Instant::now());
        self.entries.insert(key.to_string(), slot);
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let slot = Slot::new(value, Some(ttl), now);
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(slot);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(slot);
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, slot)| !slot.is_expired(now)))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove_if(key, |_, slot| {
                !slot.is_expired(now) && slot.value == expected
            })
            .is_some())
    }

    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(Slot::new("1", None, now));
                    return Ok(1);
                }
                let slot = occupied.get_mut();
                let current: i64 = slot.value.parse().map_err(|_| StoreError::NotAnInteger {
                    key: key.to_string(),
                })?;
                let next = current.checked_add(1).ok_or_else(|| StoreError::Overflow {
                    key: key.to_string(),
                })?;
                slot.value = next.to_string();
                Ok(next)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::new("1", None, now));
                Ok(1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn set_with_ttl_expires() {
        let store = MemoryStore::new();
        store
            .set("k", "v", Some(Duration::from_secs(5)))
            .await
            .expect("set");

        assert_eq!(store.get("k").await.expect("get").as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.get("k").await.expect("get"), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn set_without_ttl_persists() {
        let store = MemoryStore::new();
        store.set("k", "v", None).await.expect("set");
        assert_eq!(store.remaining_ttl("k"), None);
        assert_eq!(store.get("k").await.expect("get").as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn empty_value_is_a_hit() {
        let store = MemoryStore::new();
        store.set("k", "", None).await.expect("set");
        assert_eq!(store.get("k").await.expect("get").as_deref(), Some(""));
    }

    #[tokio::test(start_paused = true)]
    async fn set_if_absent_first_writer_wins_until_expiry() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(10);

        assert!(store.set_if_absent("lock", "a", ttl).await.expect("first"));
        assert!(!store.set_if_absent("lock", "b", ttl).await.expect("second"));
        assert_eq!(store.get("lock").await.expect("get").as_deref(), Some("a"));

        tokio::time::advance(ttl).await;
        assert!(store.set_if_absent("lock", "b", ttl).await.expect("after expiry"));
        assert_eq!(store.get("lock").await.expect("get").as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn compare_and_delete_requires_matching_value() {
        let store = MemoryStore::new();
        store.set("lock", "owner-a", None).await.expect("set");

        assert!(!store.compare_and_delete("lock", "owner-b").await.expect("cad"));
        assert!(store.get("lock").await.expect("get").is_some());

        assert!(store.compare_and_delete("lock", "owner-a").await.expect("cad"));
        assert!(store.get("lock").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let store = MemoryStore::new();
        store.set("k", "v", None).await.expect("set");
        assert!(store.delete("k").await.expect("delete"));
        assert!(!store.delete("k").await.expect("delete again"));
    }

    #[tokio::test]
    async fn increment_creates_then_counts() {
        let store = MemoryStore::new();
        assert_eq!(store.increment("icr").await.expect("incr"), 1);
        assert_eq!(store.increment("icr").await.expect("incr"), 2);
        assert_eq!(store.get("icr").await.expect("get").as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn increment_rejects_non_integer() {
        let store = MemoryStore::new();
        store.set("icr", "abc", None).await.expect("set");
        let err = store.increment("icr").await.expect_err("not an integer");
        assert!(matches!(err, StoreError::NotAnInteger { .. }));
    }

    #[tokio::test]
    async fn increment_reports_overflow() {
        let store = MemoryStore::new();
        store
            .set("icr", &i64::MAX.to_string(), None)
            .await
            .expect("set");
        let err = store.increment("icr").await.expect_err("overflow");
        assert!(matches!(err, StoreError::Overflow { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_distinct() {
        let store = MemoryStore::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..50 {
                    seen.push(store.increment("icr").await.expect("incr"));
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.expect("join"));
        }
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 400);
        assert_eq!(all.last().copied(), Some(400));
    }
}
