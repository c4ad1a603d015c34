use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use super::client::CacheClient;
use super::error::{BoxError, CacheError};
use super::keys::KeyPrefix;

/// Outcome of one warm-up batch.
#[derive(Debug, Default)]
pub struct WarmReport {
    pub warmed: usize,
    pub missing: usize,
    pub failures: Vec<CacheError>,
}

impl WarmReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Seeds logical-expiration entries ahead of traffic.
///
/// Readers using logical expiration never load a key that was never written,
/// so hot keys have to pass through here (or an equivalent job) first.
pub struct CacheWarmer<'a> {
    client: &'a CacheClient,
}

impl<'a> CacheWarmer<'a> {
    pub fn new(client: &'a CacheClient) -> Self {
        Self { client }
    }

    /// Load every id and write it with a logical expiry of `logical_ttl`.
    ///
    /// Absent records and loader failures do not stop the batch; store
    /// failures do, since every following write would hit the same store.
    pub async fn warm<T, Id, I, F, Fut, E>(
        &self,
        prefix: &KeyPrefix,
        ids: I,
        mut loader: F,
        logical_ttl: Duration,
    ) -> Result<WarmReport, CacheError>
    where
        T: Serialize,
        Id: Display,
        I: IntoIterator<Item = Id>,
        F: FnMut(Id) -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
        E: Into<BoxError>,
    {
        let mut report = WarmReport::default();

        for id in ids {
            let key = prefix.cache_key(&id);
            match loader(id).await {
                Ok(Some(value)) => {
                    self.client
                        .set_with_logical_expire(&key, &value, logical_ttl)
                        .await?;
                    report.warmed += 1;
                }
                Ok(None) => {
                    report.missing += 1;
                    warn!(cache_key = %key, "record not found; skipped warm-up");
                }
                Err(err) => {
                    let err = CacheError::loader(key, err);
                    warn!(error = %err, "warm-up load failed");
                    report.failures.push(err);
                }
            }
        }

        info!(
            target = "stampede::warmer",
            prefix = %prefix,
            warmed = report.warmed,
            missing = report.missing,
            failed = report.failures.len(),
            "cache warm-up finished"
        );
        Ok(report)
    }
}
