#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use stampede::cache::{CacheError, RebuildExecutor, RebuildJob, SubmitError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shop {
    pub id: u64,
    pub name: String,
}

pub fn shop(id: u64, name: &str) -> Shop {
    Shop {
        id,
        name: name.to_string(),
    }
}

/// Executor that records jobs and runs them only when asked.
#[derive(Default)]
pub struct ManualExecutor {
    jobs: Mutex<Vec<RebuildJob>>,
}

impl ManualExecutor {
    pub fn pending(&self) -> usize {
        self.jobs.lock().expect("jobs lock").len()
    }

    pub fn pending_keys(&self) -> Vec<String> {
        self.jobs
            .lock()
            .expect("jobs lock")
            .iter()
            .map(|job| job.key().to_string())
            .collect()
    }

    pub async fn run_pending(&self) -> Vec<Result<(), CacheError>> {
        let jobs = std::mem::take(&mut *self.jobs.lock().expect("jobs lock"));
        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            results.push(job.run().await);
        }
        results
    }
}

impl RebuildExecutor for ManualExecutor {
    fn submit(&self, job: RebuildJob) -> Result<(), SubmitError> {
        self.jobs.lock().expect("jobs lock").push(job);
        Ok(())
    }
}

/// Loader double backed by a fixed answer, counting its invocations.
#[derive(Clone, Default)]
pub struct CountingLoader {
    calls: Arc<AtomicUsize>,
}

impl CountingLoader {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn answering(
        &self,
        answer: Option<Shop>,
    ) -> impl FnOnce(u64) -> std::future::Ready<Result<Option<Shop>, Infallible>>
    + Send
    + 'static {
        let calls = Arc::clone(&self.calls);
        move |_id| {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(answer))
        }
    }
}
