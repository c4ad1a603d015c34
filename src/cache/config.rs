//! Cache client and rebuild pool configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_NULL_TTL: Duration = Duration::from_secs(2 * 60);
const DEFAULT_LOCK_TTL: Duration = super::lock::DEFAULT_LOCK_TTL;
const DEFAULT_ENTRY_TTL: Duration = Duration::from_secs(30 * 60);
const DEFAULT_REBUILD_WORKERS: usize = 10;
const DEFAULT_REBUILD_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Lifetime of a cached "not found" marker.
    pub null_ttl: Duration,
    /// Lifetime of a rebuild lock; bounds how long a crashed rebuild blocks others.
    pub lock_ttl: Duration,
    /// TTL used by callers that do not pick their own.
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            null_ttl: DEFAULT_NULL_TTL,
            lock_ttl: DEFAULT_LOCK_TTL,
            default_ttl: DEFAULT_ENTRY_TTL,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            null_ttl: settings.null_ttl,
            lock_ttl: settings.lock_ttl,
            default_ttl: settings.default_ttl,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildConfig {
    pub workers: NonZeroUsize,
    pub queue_capacity: NonZeroUsize,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            workers: NonZeroUsize::new(DEFAULT_REBUILD_WORKERS).unwrap_or(NonZeroUsize::MIN),
            queue_capacity: NonZeroUsize::new(DEFAULT_REBUILD_QUEUE_CAPACITY)
                .unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl From<&crate::config::RebuildSettings> for RebuildConfig {
    fn from(settings: &crate::config::RebuildSettings) -> Self {
        Self {
            workers: settings.workers,
            queue_capacity: settings.queue_capacity,
        }
    }
}
