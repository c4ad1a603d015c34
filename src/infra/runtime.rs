//! Wiring of the store, rebuild pool, cache client and id generator.

use std::sync::Arc;

use tracing::info;

use crate::cache::{CacheClient, CacheConfig, RebuildConfig, TracingObserver, WorkerPool};
use crate::config::{Settings, StoreSettings};
use crate::id::IdGenerator;
use crate::store::{KvStore, MemoryStore, RedisStore};

use super::error::InfraError;

/// Open the configured store: Redis when a URL is set, otherwise a
/// process-local map.
pub async fn connect_store(settings: &StoreSettings) -> Result<Arc<dyn KvStore>, InfraError> {
    match settings.url.as_deref() {
        Some(url) => {
            let store = RedisStore::connect(url, settings.timeout).await?;
            Ok(Arc::new(store))
        }
        None => {
            info!(
                target = "stampede::store",
                "no store url configured; using in-memory store"
            );
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Everything a command needs, owned in one place so shutdown is explicit.
pub struct Runtime {
    store: Arc<dyn KvStore>,
    pool: Arc<WorkerPool>,
    cache: CacheClient,
    ids: IdGenerator,
}

impl Runtime {
    pub async fn start(settings: &Settings) -> Result<Self, InfraError> {
        let store = connect_store(&settings.store).await?;
        Ok(Self::with_store(store, settings))
    }

    /// Build on an already-open store. Must run inside a tokio runtime.
    pub fn with_store(store: Arc<dyn KvStore>, settings: &Settings) -> Self {
        let pool = Arc::new(WorkerPool::start(
            &RebuildConfig::from(&settings.rebuild),
            Arc::new(TracingObserver),
        ));
        let cache = CacheClient::new(
            Arc::clone(&store),
            pool.clone(),
            CacheConfig::from(&settings.cache),
        );
        let ids = IdGenerator::new(Arc::clone(&store));

        Self {
            store,
            pool,
            cache,
            ids,
        }
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn cache(&self) -> &CacheClient {
        &self.cache
    }

    pub fn ids(&self) -> &IdGenerator {
        &self.ids
    }

    /// Drain queued rebuilds and stop the workers.
    pub async fn shutdown(self) {
        self.pool.shutdown().await;
    }
}
