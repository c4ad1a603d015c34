//! Globally unique, roughly time-ordered 64-bit ids.
//!
//! Layout: the high 32 bits hold seconds since 2002-01-01 00:00:00 UTC, the
//! low 32 bits a per-prefix, per-day sequence kept in the shared store:
//!
//! ```text
//!  63                      32 31                       0
//! +-------------------------+-------------------------+
//! |  seconds since epoch    |  daily sequence         |
//! +-------------------------+-------------------------+
//! ```

use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{debug, instrument};

use crate::cache::IdPrefix;
use crate::store::{KvStore, StoreError};

/// 2002-01-01 00:00:00 UTC.
pub const BEGIN_TIMESTAMP: i64 = 1_009_843_200;
pub const COUNT_BITS: u32 = 32;

const SEQUENCE_MASK: i64 = (1 << COUNT_BITS) - 1;
const MAX_TIMESTAMP_OFFSET: i64 = i64::MAX >> COUNT_BITS;

#[derive(Debug, Error)]
pub enum IdError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("clock reads {unix_seconds}, before the id epoch")]
    ClockBeforeEpoch { unix_seconds: i64 },
    #[error("timestamp offset {offset} no longer fits in the id layout")]
    TimestampOverflow { offset: i64 },
    #[error("daily sequence for `{key}` is exhausted (reached {sequence})")]
    SequenceExhausted { key: String, sequence: i64 },
    #[error("failed to format day key: {0}")]
    DayKey(#[from] time::error::Format),
}

/// Decomposed form of a generated id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdComponents {
    pub timestamp_offset: i64,
    pub sequence: u32,
}

impl IdComponents {
    pub fn decode(id: i64) -> Self {
        Self {
            timestamp_offset: id >> COUNT_BITS,
            sequence: (id & SEQUENCE_MASK) as u32,
        }
    }

    pub fn unix_seconds(&self) -> i64 {
        self.timestamp_offset + BEGIN_TIMESTAMP
    }

    /// Wall-clock second the id was minted in, if representable.
    pub fn issued_at(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp(self.unix_seconds()).ok()
    }
}

#[derive(Clone)]
pub struct IdGenerator {
    store: Arc<dyn KvStore>,
}

impl IdGenerator {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn next_id(&self, prefix: &IdPrefix) -> Result<i64, IdError> {
        self.next_id_at(prefix, OffsetDateTime::now_utc()).await
    }

    /// Mint an id as if the current time were `now`.
    #[instrument(level = "debug", skip(self), fields(prefix = %prefix))]
    pub async fn next_id_at(&self, prefix: &IdPrefix, now: OffsetDateTime) -> Result<i64, IdError> {
        let unix_seconds = now.unix_timestamp();
        let offset = unix_seconds - BEGIN_TIMESTAMP;
        if offset < 0 {
            return Err(IdError::ClockBeforeEpoch { unix_seconds });
        }
        if offset > MAX_TIMESTAMP_OFFSET {
            return Err(IdError::TimestampOverflow { offset });
        }

        let key = prefix.counter_key(&day_key(now)?);
        let sequence = self.store.increment(&key).await?;
        if !(0..=SEQUENCE_MASK).contains(&sequence) {
            return Err(IdError::SequenceExhausted { key, sequence });
        }

        let id = (offset << COUNT_BITS) | sequence;
        debug!(counter_key = %key, sequence, id, "id generated");
        Ok(id)
    }
}

/// `YYYY:MM:DD` for the UTC day containing `at`.
pub fn day_key(at: OffsetDateTime) -> Result<String, time::error::Format> {
    let utc = at.to_offset(time::UtcOffset::UTC);
    utc.format(format_description!("[year]:[month]:[day]"))
}
