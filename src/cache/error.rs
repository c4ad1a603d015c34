use std::error::Error as StdError;

use thiserror::Error;

use crate::store::StoreError;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to serialize value for `{key}`: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("loader failed for `{key}`: {source}")]
    Loader {
        key: String,
        #[source]
        source: BoxError,
    },
    #[error("rebuild for `{key}` panicked")]
    RebuildPanicked { key: String },
}

impl CacheError {
    pub fn loader(key: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Loader {
            key: key.into(),
            source: source.into(),
        }
    }
}
