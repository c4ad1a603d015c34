//! Cache-aside layer over a shared key-value store.
//!
//! - [`CacheClient`] reads through either a passthrough strategy (caches
//!   absence with a short-lived null marker) or a logical-expiration strategy
//!   (serves stale entries while one background rebuild refreshes them).
//! - [`DistributedLock`] provides the single-flight guarantee for rebuilds
//!   across every process sharing the store.
//! - [`WorkerPool`] runs those rebuilds off the reader's path.
//!
//! Keys are always built from a validated [`KeyPrefix`]:
//!
//! ```text
//! cache key   <prefix><id>         e.g. cache:shop:42
//! lock key    lock:<prefix><id>    e.g. lock:cache:shop:42
//! ```

mod client;
mod config;
mod entry;
mod error;
mod executor;
mod keys;
mod lock;
mod poison;
mod warmer;

pub use client::CacheClient;
pub use config::{CacheConfig, RebuildConfig};
pub use entry::{CacheEntry, Decoded, NULL_MARKER, decode, encode};
pub use error::{BoxError, CacheError};
pub use executor::{
    RebuildExecutor, RebuildJob, RebuildObserver, SubmitError, TracingObserver, WorkerPool,
};
pub use keys::{IdPrefix, KeyError, KeyPrefix};
pub use lock::{DEFAULT_LOCK_TTL, DistributedLock, LockGuard};
pub use warmer::{CacheWarmer, WarmReport};
