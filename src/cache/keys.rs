//! Store key conventions.
//!
//! Cache entries live at `<prefix><id>`, rebuild locks at `lock:<prefix><id>`
//! and ID counters at `icr:<prefix>:<YYYY:MM:DD>`. Prefixes are validated so
//! unrelated entity types sharing a numeric id space cannot collide.

use std::fmt;

use thiserror::Error;

const MAX_PREFIX_LEN: usize = 128;
const LOCK_NAMESPACE: &str = "lock:";
const COUNTER_NAMESPACE: &str = "icr:";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("key prefix must not be empty")]
    Empty,
    #[error("key prefix exceeds {MAX_PREFIX_LEN} bytes")]
    TooLong,
    #[error("key prefix `{0}` contains whitespace or non-ASCII characters")]
    InvalidCharacters(String),
    #[error("cache key prefix `{0}` must end with `:`")]
    MissingSeparator(String),
    #[error("id prefix `{0}` must not contain `:`")]
    SeparatorInIdPrefix(String),
}

fn check_charset(raw: &str) -> Result<(), KeyError> {
    if raw.is_empty() {
        return Err(KeyError::Empty);
    }
    if raw.len() > MAX_PREFIX_LEN {
        return Err(KeyError::TooLong);
    }
    if !raw.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(KeyError::InvalidCharacters(raw.to_string()));
    }
    Ok(())
}

/// Namespace for one entity type's cache entries, e.g. `cache:shop:`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPrefix(String);

impl KeyPrefix {
    pub fn new(raw: impl Into<String>) -> Result<Self, KeyError> {
        let raw = raw.into();
        check_charset(&raw)?;
        if !raw.ends_with(':') {
            return Err(KeyError::MissingSeparator(raw));
        }
        Ok(Self(raw))
    }

    pub fn cache_key(&self, id: &impl fmt::Display) -> String {
        format!("{}{id}", self.0)
    }

    pub fn lock_key(&self, id: &impl fmt::Display) -> String {
        format!("{LOCK_NAMESPACE}{}{id}", self.0)
    }
}

impl fmt::Display for KeyPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Namespace for one business entity's ID sequence, e.g. `order`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdPrefix(String);

impl IdPrefix {
    pub fn new(raw: impl Into<String>) -> Result<Self, KeyError> {
        let raw = raw.into();
        check_charset(&raw)?;
        if raw.contains(':') {
            return Err(KeyError::SeparatorInIdPrefix(raw));
        }
        Ok(Self(raw))
    }

    /// Counter key for the day rendered as `YYYY:MM:DD`.
    pub fn counter_key(&self, day_key: &str) -> String {
        format!("{COUNTER_NAMESPACE}{}:{day_key}", self.0)
    }
}

impl fmt::Display for IdPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_and_lock_keys_share_the_prefix() {
        let prefix = KeyPrefix::new("cache:shop:").expect("valid prefix");
        assert_eq!(prefix.cache_key(&42), "cache:shop:42");
        assert_eq!(prefix.lock_key(&42), "lock:cache:shop:42");
    }

    #[test]
    fn distinct_prefixes_never_share_lock_keys() {
        let shops = KeyPrefix::new("shop:").expect("valid");
        let users = KeyPrefix::new("user:").expect("valid");
        assert_ne!(shops.lock_key(&7), users.lock_key(&7));
    }

    #[test]
    fn cache_prefix_requires_trailing_separator() {
        assert_eq!(
            KeyPrefix::new("shop"),
            Err(KeyError::MissingSeparator("shop".to_string()))
        );
    }

    #[test]
    fn rejects_empty_and_whitespace_prefixes() {
        assert_eq!(KeyPrefix::new(""), Err(KeyError::Empty));
        assert!(matches!(
            KeyPrefix::new("my shop:"),
            Err(KeyError::InvalidCharacters(_))
        ));
        assert!(matches!(
            IdPrefix::new("ordér"),
            Err(KeyError::InvalidCharacters(_))
        ));
    }

    #[test]
    fn rejects_oversized_prefix() {
        let raw = format!("{}:", "a".repeat(MAX_PREFIX_LEN));
        assert_eq!(KeyPrefix::new(raw), Err(KeyError::TooLong));
    }

    #[test]
    fn id_prefix_counter_key() {
        let prefix = IdPrefix::new("order").expect("valid");
        assert_eq!(prefix.counter_key("2024:03:09"), "icr:order:2024:03:09");
        assert!(matches!(
            IdPrefix::new("order:2"),
            Err(KeyError::SeparatorInIdPrefix(_))
        ));
    }
}
