use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}

impl InfraError {
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
