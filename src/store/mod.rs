//! Shared key-value store contract.
//!
//! Every process talks to the same store; it is the only cross-process
//! synchronization point. Individual operations are atomic but cannot be
//! composed into transactions, and failures are never retried here.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

mod memory;
mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store operation timed out")]
    Timeout,
    #[error("value at `{key}` is not an integer")]
    NotAnInteger { key: String },
    #[error("increment would overflow `{key}`")]
    Overflow { key: String },
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// String-keyed, TTL-capable store shared by every process.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read the value at `key`. An existing empty string is `Some("")`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Unconditionally overwrite `key`. `None` keeps the key until deleted.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Write `key` only if it does not exist. Returns whether the write happened.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Remove `key`. Returns whether a key was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Remove `key` only while it still holds `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError>;

    /// Atomically add one to the integer at `key`, creating it at zero first.
    async fn increment(&self, key: &str) -> Result<i64, StoreError>;
}
