//! Cache-aside facade over the shared store.
//!
//! Two read strategies are offered:
//!
//! - **Passthrough** caches both values and absence. A lookup for an id the
//!   backing store does not know writes a short-lived null marker, so repeated
//!   lookups stop reaching the loader. Concurrent misses on one key are not
//!   coordinated; each may call the loader until someone writes the key.
//! - **Logical expiration** never lets a hot key disappear from the store.
//!   Entries carry their own expiry; the first reader to see a stale entry
//!   takes the rebuild lock and queues a background reload, and every reader
//!   (that one included) gets the stale value back without waiting.

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use crate::store::KvStore;

use super::config::CacheConfig;
use super::entry::{CacheEntry, Decoded, NULL_MARKER, decode, encode};
use super::error::{BoxError, CacheError};
use super::executor::{RebuildExecutor, RebuildJob};
use super::keys::KeyPrefix;
use super::lock::{DistributedLock, LockGuard};

const METRIC_LOOKUP: &str = "stampede_cache_lookup_total";
const METRIC_LOADER_CALLS: &str = "stampede_cache_loader_calls_total";
const METRIC_LOCK_BUSY: &str = "stampede_cache_rebuild_lock_busy_total";

const PASSTHROUGH: &str = "passthrough";
const LOGICAL: &str = "logical_expire";

fn record_lookup(strategy: &'static str, result: &'static str) {
    counter!(METRIC_LOOKUP, "strategy" => strategy, "result" => result).increment(1);
}

pub struct CacheClient {
    store: Arc<dyn KvStore>,
    lock: DistributedLock,
    executor: Arc<dyn RebuildExecutor>,
    config: CacheConfig,
}

impl CacheClient {
    pub fn new(
        store: Arc<dyn KvStore>,
        executor: Arc<dyn RebuildExecutor>,
        config: CacheConfig,
    ) -> Self {
        let lock = DistributedLock::new(Arc::clone(&store), config.lock_ttl);
        Self {
            store,
            lock,
            executor,
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Write `value` as JSON under `key`, expiring after `ttl`.
    pub async fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError>
    where
        T: Serialize,
    {
        let json = encode(value).map_err(|source| CacheError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.store.set(key, &json, Some(ttl)).await?;
        Ok(())
    }

    /// Write `value` wrapped with a logical expiry of now + `logical_ttl`.
    /// The store key itself never expires.
    pub async fn set_with_logical_expire<T>(
        &self,
        key: &str,
        value: &T,
        logical_ttl: Duration,
    ) -> Result<(), CacheError>
    where
        T: Serialize,
    {
        let json = encode_logical(key, value, logical_ttl)?;
        self.store.set(key, &json, None).await?;
        Ok(())
    }

    /// Remove the raw entry at `key`.
    pub async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.store.delete(key).await?)
    }

    /// Drop the cached entry for `id`, typically right after the
    /// authoritative record was written.
    pub async fn invalidate<Id>(&self, prefix: &KeyPrefix, id: &Id) -> Result<bool, CacheError>
    where
        Id: Display,
    {
        let key = prefix.cache_key(id);
        let removed = self.store.delete(&key).await?;
        debug!(cache_key = %key, removed, "cache entry invalidated");
        Ok(removed)
    }

    /// Resolve `id`, caching both found values and confirmed absence.
    ///
    /// Returns `Ok(None)` when the loader reports the record missing, now or
    /// within the null-marker TTL of an earlier lookup. Loader errors are
    /// returned to the caller unchanged in meaning.
    #[instrument(level = "debug", skip_all, fields(prefix = %prefix, id = %id))]
    pub async fn query_with_passthrough<T, Id, F, Fut, E>(
        &self,
        prefix: &KeyPrefix,
        id: Id,
        loader: F,
        ttl: Duration,
    ) -> Result<Option<T>, CacheError>
    where
        T: Serialize + DeserializeOwned,
        Id: Display,
        F: FnOnce(Id) -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
        E: Into<BoxError>,
    {
        let key = prefix.cache_key(&id);

        match self.store.get(&key).await? {
            Some(raw) => match decode::<T>(&raw) {
                Ok(Decoded::Value(value)) => {
                    record_lookup(PASSTHROUGH, "hit");
                    return Ok(Some(value));
                }
                Ok(Decoded::NullMarker) => {
                    record_lookup(PASSTHROUGH, "null_hit");
                    return Ok(None);
                }
                Err(err) => {
                    record_lookup(PASSTHROUGH, "corrupt");
                    warn!(cache_key = %key, error = %err, "undecodable cache entry; reloading");
                }
            },
            None => record_lookup(PASSTHROUGH, "miss"),
        }

        counter!(METRIC_LOADER_CALLS, "strategy" => PASSTHROUGH).increment(1);
        let loaded = loader(id)
            .await
            .map_err(|err| CacheError::loader(key.as_str(), err))?;

        match loaded {
            Some(value) => {
                self.set(&key, &value, ttl).await?;
                Ok(Some(value))
            }
            None => {
                let null_ttl = self.config.null_ttl;
                self.store.set(&key, NULL_MARKER, Some(null_ttl)).await?;
                debug!(
                    cache_key = %key,
                    null_ttl_ms = null_ttl.as_millis() as u64,
                    "cached absence"
                );
                Ok(None)
            }
        }
    }

    /// Resolve `id` from a pre-warmed logical-expiration entry.
    ///
    /// A key that was never written yields `Ok(None)` without calling the
    /// loader. A stale entry is returned as-is while at most one background
    /// rebuild per lock TTL reloads it through `loader`.
    #[instrument(level = "debug", skip_all, fields(prefix = %prefix, id = %id))]
    pub async fn query_with_logical_expire<T, Id, F, Fut, E>(
        &self,
        prefix: &KeyPrefix,
        id: Id,
        loader: F,
        logical_ttl: Duration,
    ) -> Result<Option<T>, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        Id: Display + Send + 'static,
        F: FnOnce(Id) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let key = prefix.cache_key(&id);

        let Some(raw) = self.store.get(&key).await? else {
            record_lookup(LOGICAL, "miss");
            return Ok(None);
        };

        let stale = match decode::<CacheEntry<T>>(&raw) {
            Ok(Decoded::Value(entry)) => {
                if !entry.is_expired(OffsetDateTime::now_utc()) {
                    record_lookup(LOGICAL, "fresh");
                    return Ok(Some(entry.data));
                }
                record_lookup(LOGICAL, "stale");
                Some(entry.data)
            }
            Ok(Decoded::NullMarker) => {
                record_lookup(LOGICAL, "null_hit");
                return Ok(None);
            }
            Err(err) => {
                record_lookup(LOGICAL, "corrupt");
                warn!(cache_key = %key, error = %err, "undecodable cache entry; scheduling rebuild");
                None
            }
        };

        let lock_key = prefix.lock_key(&id);
        self.schedule_rebuild(key, lock_key, id, loader, logical_ttl)
            .await?;
        Ok(stale)
    }

    async fn schedule_rebuild<T, Id, F, Fut, E>(
        &self,
        key: String,
        lock_key: String,
        id: Id,
        loader: F,
        logical_ttl: Duration,
    ) -> Result<(), CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        Id: Send + 'static,
        F: FnOnce(Id) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let Some(guard) = self.lock.try_acquire(&lock_key).await? else {
            counter!(METRIC_LOCK_BUSY).increment(1);
            return Ok(());
        };

        let task = rebuild_under_lock(
            Arc::clone(&self.store),
            self.lock.clone(),
            guard.clone(),
            key.clone(),
            id,
            loader,
            logical_ttl,
        );

        if let Err(err) = self.executor.submit(RebuildJob::new(key.as_str(), task)) {
            // the job was dropped unrun, so nobody else will release the lock
            warn!(cache_key = %key, error = %err, "rebuild not queued; releasing lock");
            self.lock.release(&guard).await?;
        }
        Ok(())
    }
}

/// Wrap `value` with a logical expiry of now + `logical_ttl` and encode it.
///
/// Kept synchronous so no borrow of the value is held across a store call;
/// rebuild futures then stay `Send` for any `T: Send`.
fn encode_logical<T>(key: &str, value: &T, logical_ttl: Duration) -> Result<String, CacheError>
where
    T: Serialize,
{
    let entry = CacheEntry::new(value, OffsetDateTime::now_utc(), logical_ttl);
    encode(&entry).map_err(|source| CacheError::Encode {
        key: key.to_string(),
        source,
    })
}

/// Reload one entry and release its lock whether the reload succeeded,
/// failed or panicked.
async fn rebuild_under_lock<T, Id, F, Fut, E>(
    store: Arc<dyn KvStore>,
    lock: DistributedLock,
    guard: LockGuard,
    key: String,
    id: Id,
    loader: F,
    logical_ttl: Duration,
) -> Result<(), CacheError>
where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: FnOnce(Id) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    E: Into<BoxError>,
{
    let outcome = AssertUnwindSafe(refresh_entry::<T, Id, F, Fut, E>(
        store.as_ref(),
        &key,
        id,
        loader,
        logical_ttl,
    ))
    .catch_unwind()
    .await;

    let released = lock.release(&guard).await;

    match outcome {
        Ok(result) => result?,
        Err(_) => return Err(CacheError::RebuildPanicked { key }),
    }
    released?;
    Ok(())
}

async fn refresh_entry<T, Id, F, Fut, E>(
    store: &dyn KvStore,
    key: &str,
    id: Id,
    loader: F,
    logical_ttl: Duration,
) -> Result<(), CacheError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce(Id) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    E: Into<BoxError>,
{
    // A reader may have taken the lock after an earlier rebuild already
    // committed; skip the reload in that case.
    if let Some(raw) = store.get(key).await? {
        let fresh = match decode::<CacheEntry<T>>(&raw) {
            Ok(Decoded::Value(entry)) => !entry.is_expired(OffsetDateTime::now_utc()),
            _ => false,
        };
        if fresh {
            debug!(cache_key = key, "entry already refreshed; skipping reload");
            return Ok(());
        }
    }

    counter!(METRIC_LOADER_CALLS, "strategy" => LOGICAL).increment(1);
    let loaded = loader(id)
        .await
        .map_err(|err| CacheError::loader(key, err))?;

    match loaded {
        Some(value) => {
            let json = encode_logical(key, &value, logical_ttl)?;
            store.set(key, &json, None).await?;
            debug!(cache_key = key, "cache entry rebuilt");
        }
        None => {
            store.delete(key).await?;
            warn!(
                cache_key = key,
                "record no longer exists in backing store; cache entry removed"
            );
        }
    }
    Ok(())
}
