//! Stored representations for cached values.
//!
//! Plain values are JSON. Logical-expiration values wrap the payload in a
//! [`CacheEntry`] carrying its own expiry. Cached absence is the empty string.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Sentinel written when the loader reports that a record does not exist.
pub const NULL_MARKER: &str = "";

/// A value together with the instant after which readers treat it as stale.
///
/// The store key holding an entry never carries a TTL; staleness is judged
/// only from `expire_at_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    /// Unix milliseconds, UTC.
    pub expire_at_ms: i64,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, now: OffsetDateTime, logical_ttl: Duration) -> Self {
        let ttl_ms = i64::try_from(logical_ttl.as_millis()).unwrap_or(i64::MAX);
        Self {
            data,
            expire_at_ms: unix_millis(now).saturating_add(ttl_ms),
        }
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expire_at_ms <= unix_millis(now)
    }
}

pub(crate) fn unix_millis(at: OffsetDateTime) -> i64 {
    i64::try_from(at.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

/// What a raw stored string turned out to be.
#[derive(Debug)]
pub enum Decoded<T> {
    Value(T),
    NullMarker,
}

pub fn encode<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(value)
}

pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<Decoded<T>, serde_json::Error> {
    if raw == NULL_MARKER {
        return Ok(Decoded::NullMarker);
    }
    serde_json::from_str(raw).map(Decoded::Value)
}
