//! Bounded worker pool for background cache rebuilds.
//!
//! Rebuilds are fire-and-forget: the caller that noticed a stale entry hands
//! a [`RebuildJob`] to a [`RebuildExecutor`] and returns immediately. The pool
//! is owned by whoever builds the cache client, so tests can swap in their own
//! executor and production code controls startup and shutdown explicitly.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::BoxFuture;
use metrics::{counter, gauge, histogram};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::RebuildConfig;
use super::error::CacheError;
use super::poison::mutex_lock;

const SOURCE: &str = "cache::executor";

const METRIC_REBUILD_SUBMITTED: &str = "stampede_rebuild_submitted_total";
const METRIC_REBUILD_REJECTED: &str = "stampede_rebuild_rejected_total";
const METRIC_REBUILD_COMPLETED: &str = "stampede_rebuild_completed_total";
const METRIC_REBUILD_FAILED: &str = "stampede_rebuild_failed_total";
const METRIC_REBUILD_MS: &str = "stampede_rebuild_ms";
const METRIC_REBUILD_QUEUE_LEN: &str = "stampede_rebuild_queue_len";

/// One unit of background rebuild work for a single cache key.
pub struct RebuildJob {
    key: String,
    task: BoxFuture<'static, Result<(), CacheError>>,
}

impl RebuildJob {
    pub fn new<F>(key: impl Into<String>, task: F) -> Self
    where
        F: Future<Output = Result<(), CacheError>> + Send + 'static,
    {
        Self {
            key: key.into(),
            task: task.boxed(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Drive the job to completion. A panic inside the task becomes
    /// [`CacheError::RebuildPanicked`].
    pub async fn run(self) -> Result<(), CacheError> {
        let Self { key, task } = self;
        match AssertUnwindSafe(task).catch_unwind().await {
            Ok(result) => result,
            Err(_) => Err(CacheError::RebuildPanicked { key }),
        }
    }
}

impl std::fmt::Debug for RebuildJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RebuildJob").field("key", &self.key).finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("rebuild queue is full; dropped job for `{key}`")]
    QueueFull { key: String },
    #[error("rebuild pool is shut down; dropped job for `{key}`")]
    ShutDown { key: String },
}

/// Accepts rebuild jobs without blocking the submitting caller.
pub trait RebuildExecutor: Send + Sync {
    fn submit(&self, job: RebuildJob) -> Result<(), SubmitError>;
}

/// Hook for watching the rebuild path. Failed rebuilds are never surfaced to
/// readers, so this is where a permanently failing rebuild shows up.
pub trait RebuildObserver: Send + Sync {
    fn on_submitted(&self, _key: &str) {}
    fn on_rejected(&self, _key: &str, _reason: &SubmitError) {}
    fn on_completed(&self, _key: &str, _elapsed: Duration) {}
    fn on_failed(&self, _key: &str, _elapsed: Duration, _error: &CacheError) {}
}

/// Default observer: structured logs plus `stampede_rebuild_*` metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RebuildObserver for TracingObserver {
    fn on_submitted(&self, key: &str) {
        counter!(METRIC_REBUILD_SUBMITTED).increment(1);
        debug!(cache_key = key, "cache rebuild queued");
    }

    fn on_rejected(&self, key: &str, reason: &SubmitError) {
        counter!(METRIC_REBUILD_REJECTED).increment(1);
        warn!(cache_key = key, reason = %reason, "cache rebuild rejected");
    }

    fn on_completed(&self, key: &str, elapsed: Duration) {
        counter!(METRIC_REBUILD_COMPLETED).increment(1);
        histogram!(METRIC_REBUILD_MS, "outcome" => "ok").record(elapsed.as_secs_f64() * 1000.0);
        debug!(
            cache_key = key,
            elapsed_ms = elapsed.as_millis() as u64,
            "cache rebuild complete"
        );
    }

    fn on_failed(&self, key: &str, elapsed: Duration, err: &CacheError) {
        counter!(METRIC_REBUILD_FAILED).increment(1);
        histogram!(METRIC_REBUILD_MS, "outcome" => "error")
            .record(elapsed.as_secs_f64() * 1000.0);
        error!(
            cache_key = key,
            elapsed_ms = elapsed.as_millis() as u64,
            error = %err,
            "cache rebuild failed; stale entry kept"
        );
    }
}

/// Fixed set of tokio workers draining a bounded queue.
pub struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<RebuildJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    observer: Arc<dyn RebuildObserver>,
    capacity: usize,
}

impl WorkerPool {
    /// Spawn the workers on the current tokio runtime.
    pub fn start(config: &RebuildConfig, observer: Arc<dyn RebuildObserver>) -> Self {
        let capacity = config.queue_capacity.get();
        let (tx, rx) = mpsc::channel(capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let workers = (0..config.workers.get())
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let observer = Arc::clone(&observer);
                tokio::spawn(worker_loop(worker, rx, observer))
            })
            .collect();

        info!(
            target = "stampede::rebuild",
            workers = config.workers.get(),
            queue_capacity = capacity,
            "rebuild pool started"
        );

        Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            observer,
            capacity,
        }
    }

    /// Jobs accepted but not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        mutex_lock(&self.sender, SOURCE, "queued")
            .as_ref()
            .map_or(0, |tx| self.capacity - tx.capacity())
    }

    /// Stop accepting jobs, let workers finish everything already queued,
    /// then wait for them to exit.
    pub async fn shutdown(&self) {
        let sender = mutex_lock(&self.sender, SOURCE, "shutdown.sender").take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let workers = std::mem::take(&mut *mutex_lock(&self.workers, SOURCE, "shutdown.workers"));
        for handle in workers {
            if let Err(err) = handle.await {
                warn!(target = "stampede::rebuild", error = %err, "rebuild worker exited abnormally");
            }
        }
        info!(target = "stampede::rebuild", "rebuild pool stopped");
    }
}

impl RebuildExecutor for WorkerPool {
    fn submit(&self, job: RebuildJob) -> Result<(), SubmitError> {
        let key = job.key.clone();
        let result = match mutex_lock(&self.sender, SOURCE, "submit").as_ref() {
            None => Err(SubmitError::ShutDown { key: key.clone() }),
            Some(tx) => {
                let outcome = tx.try_send(job).map_err(|err| match err {
                    TrySendError::Full(_) => SubmitError::QueueFull { key: key.clone() },
                    TrySendError::Closed(_) => SubmitError::ShutDown { key: key.clone() },
                });
                gauge!(METRIC_REBUILD_QUEUE_LEN).set((self.capacity - tx.capacity()) as f64);
                outcome
            }
        };

        match &result {
            Ok(()) => self.observer.on_submitted(&key),
            Err(reason) => self.observer.on_rejected(&key, reason),
        }
        result
    }
}

async fn worker_loop(
    worker: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<RebuildJob>>>,
    observer: Arc<dyn RebuildObserver>,
) {
    loop {
        let next = rx.lock().await.recv().await;
        let Some(job) = next else {
            break;
        };

        let key = job.key.clone();
        let started = Instant::now();
        match job.run().await {
            Ok(()) => observer.on_completed(&key, started.elapsed()),
            Err(err) => observer.on_failed(&key, started.elapsed(), &err),
        }
    }
    debug!(target = "stampede::rebuild", worker, "rebuild worker exiting");
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::{Notify, oneshot};

    use super::*;

    #[derive(Default)]
    struct CountingObserver {
        submitted: AtomicUsize,
        rejected: AtomicUsize,
        completed: AtomicUsize,
        failed: AtomicUsize,
    }

    impl RebuildObserver for CountingObserver {
        fn on_submitted(&self, _key: &str) {
            self.submitted.fetch_add(1, Ordering::SeqCst);
        }
        fn on_rejected(&self, _key: &str, _reason: &SubmitError) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
        }
        fn on_completed(&self, _key: &str, _elapsed: Duration) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
        fn on_failed(&self, _key: &str, _elapsed: Duration, _error: &CacheError) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config(workers: usize, queue_capacity: usize) -> RebuildConfig {
        RebuildConfig {
            workers: NonZeroUsize::new(workers).expect("non-zero"),
            queue_capacity: NonZeroUsize::new(queue_capacity).expect("non-zero"),
        }
    }

    #[tokio::test]
    async fn runs_submitted_jobs() {
        let observer = Arc::new(CountingObserver::default());
        let pool = WorkerPool::start(&config(2, 8), observer.clone());
        let (tx, rx) = oneshot::channel();

        pool.submit(RebuildJob::new("k", async move {
            let _ = tx.send(());
            Ok(())
        }))
        .expect("accepted");

        rx.await.expect("job ran");
        pool.shutdown().await;
        assert_eq!(observer.submitted.load(Ordering::SeqCst), 1);
        assert_eq!(observer.completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_drains_queue_then_rejects() {
        let observer = Arc::new(CountingObserver::default());
        let pool = WorkerPool::start(&config(1, 8), observer.clone());
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let ran = Arc::clone(&ran);
            pool.submit(RebuildJob::new("k", async move {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .expect("accepted");
        }

        pool.shutdown().await;
        assert_eq!(ran.load(Ordering::SeqCst), 5);

        let err = pool
            .submit(RebuildJob::new("late", async { Ok(()) }))
            .expect_err("closed pool");
        assert_eq!(err, SubmitError::ShutDown { key: "late".into() });
        assert_eq!(observer.rejected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn full_queue_rejects_without_blocking() {
        let observer = Arc::new(CountingObserver::default());
        let pool = WorkerPool::start(&config(1, 1), observer.clone());
        let gate = Arc::new(Notify::new());
        let (started_tx, started_rx) = oneshot::channel();

        let blocker = Arc::clone(&gate);
        pool.submit(RebuildJob::new("busy", async move {
            let _ = started_tx.send(());
            blocker.notified().await;
            Ok(())
        }))
        .expect("accepted");
        started_rx.await.expect("worker picked up job");

        pool.submit(RebuildJob::new("queued", async { Ok(()) }))
            .expect("fills the queue");
        assert_eq!(pool.queued(), 1);

        let err = pool
            .submit(RebuildJob::new("overflow", async { Ok(()) }))
            .expect_err("queue full");
        assert_eq!(
            err,
            SubmitError::QueueFull {
                key: "overflow".into()
            }
        );

        gate.notify_one();
        pool.shutdown().await;
        assert_eq!(observer.completed.load(Ordering::SeqCst), 2);
        assert_eq!(observer.rejected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_and_panicking_jobs_are_reported_and_workers_survive() {
        let observer = Arc::new(CountingObserver::default());
        let pool = WorkerPool::start(&config(1, 8), observer.clone());

        pool.submit(RebuildJob::new("err", async {
            Err(CacheError::loader("err", "backing store offline"))
        }))
        .expect("accepted");
        pool.submit(RebuildJob::new("panic", async {
            panic!("loader blew up");
        }))
        .expect("accepted");
        pool.submit(RebuildJob::new("ok", async { Ok(()) }))
            .expect("accepted");

        pool.shutdown().await;
        assert_eq!(observer.failed.load(Ordering::SeqCst), 2);
        assert_eq!(observer.completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_maps_panic_to_error() {
        let job = RebuildJob::new("k", async { panic!("boom") });
        let err = job.run().await.expect_err("panic captured");
        assert!(matches!(err, CacheError::RebuildPanicked { key } if key == "k"));
    }
}
