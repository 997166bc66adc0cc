//! Background invalidation jobs and the queue that runs them.
//!
//! Deleting a rated object schedules two independent jobs: one drops its
//! cached similarities, the other its cached recommendations. Submission never
//! blocks the deleting caller. Jobs are idempotent, so the queue may run one
//! more than once (at-least-once delivery), in any order.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use recommends_core::{DomainStorage, Error, ItemRef, Result};
use tokio::sync::{Notify, Semaphore, mpsc};

use crate::config::TaskConfig;

// ============================================================================
// Jobs
// ============================================================================

/// Which cached artifact an invalidation job clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationKind {
    /// Similarity entries (and cached votes) for the item.
    Similarities,
    /// Recommendation entries for the item.
    Recommendations,
}

/// Remove every cached reference to one deleted item from one vote domain.
#[derive(Clone)]
pub struct InvalidationJob {
    kind: InvalidationKind,
    item: ItemRef,
    storage: DomainStorage,
}

impl InvalidationJob {
    /// Create a job.
    pub fn new(kind: InvalidationKind, item: ItemRef, storage: DomainStorage) -> Self {
        Self {
            kind,
            item,
            storage,
        }
    }

    /// What this job clears.
    pub fn kind(&self) -> InvalidationKind {
        self.kind
    }

    /// The deleted item.
    pub fn item(&self) -> &ItemRef {
        &self.item
    }

    /// Run the job once. Returns the number of removed entries.
    pub async fn run(&self) -> Result<usize> {
        let removed = match self.kind {
            InvalidationKind::Similarities => self.storage.remove_similarities(&self.item).await?,
            InvalidationKind::Recommendations => {
                self.storage.remove_recommendations(&self.item).await?
            }
        };
        log::debug!(
            "Removed {removed} {:?} entries for {} in '{}'",
            self.kind,
            self.item,
            self.storage.scope()
        );
        Ok(removed)
    }
}

impl fmt::Debug for InvalidationJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvalidationJob")
            .field("kind", &self.kind)
            .field("item", &self.item)
            .field("scope", self.storage.scope())
            .finish()
    }
}

// ============================================================================
// TaskQueue trait
// ============================================================================

/// Fire-and-forget submission of invalidation jobs.
pub trait TaskQueue: Send + Sync {
    /// Enqueue `job` and return immediately.
    fn submit(&self, job: InvalidationJob) -> Result<()>;

    /// Queue name for diagnostics.
    fn name(&self) -> &str;
}

// ============================================================================
// WorkerPool
// ============================================================================

#[derive(Default)]
struct Inflight {
    count: AtomicUsize,
    idle: Notify,
}

impl Inflight {
    fn start(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Marks a job finished when dropped, including when the job panics.
struct FinishGuard(Arc<Inflight>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
}

/// Runs invalidation jobs on the tokio runtime.
///
/// A dispatcher task receives jobs over a channel and spawns each one, with a
/// semaphore bounding how many run at once. Failed jobs are retried with
/// exponential backoff while the error is retryable.
///
/// Creation fails with [`Error::TaskQueue`] outside a tokio runtime.
pub struct WorkerPool {
    sender: Mutex<Option<mpsc::UnboundedSender<InvalidationJob>>>,
    inflight: Arc<Inflight>,
}

impl WorkerPool {
    /// Start a pool configured by `config` on the current tokio runtime.
    pub fn new(config: &TaskConfig) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::task_queue(format!("worker pool needs a tokio runtime: {e}")))?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let inflight = Arc::new(Inflight::default());
        let retry = RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            initial_delay: config.initial_delay(),
        };
        let permits = Arc::new(Semaphore::new(config.workers.max(1)));

        runtime.spawn(dispatch(receiver, permits, retry, Arc::clone(&inflight)));

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            inflight,
        })
    }

    /// Jobs submitted and not yet finished.
    pub fn pending(&self) -> usize {
        self.inflight.count.load(Ordering::SeqCst)
    }

    /// Resolve once every submitted job has finished.
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.inflight.idle.notified();
            if self.pending() == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Stop accepting jobs and wait for the submitted ones to finish.
    pub async fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        self.wait_idle().await;
    }
}

impl TaskQueue for WorkerPool {
    fn submit(&self, job: InvalidationJob) -> Result<()> {
        let sender = self
            .sender
            .lock()
            .map_err(|_| Error::task_queue("worker pool lock poisoned"))?;
        let sender = sender
            .as_ref()
            .ok_or_else(|| Error::task_queue("worker pool is shut down"))?;

        log::debug!("Submitting {job:?}");
        self.inflight.start();
        if sender.send(job).is_err() {
            self.inflight.finish();
            return Err(Error::task_queue("worker pool dispatcher stopped"));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "worker-pool"
    }
}

async fn dispatch(
    mut receiver: mpsc::UnboundedReceiver<InvalidationJob>,
    permits: Arc<Semaphore>,
    retry: RetryPolicy,
    inflight: Arc<Inflight>,
) {
    while let Some(job) = receiver.recv().await {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let guard = FinishGuard(Arc::clone(&inflight));
        tokio::spawn(async move {
            let _guard = guard;
            let _permit = permit;
            if let Err(e) = run_with_retry(&job, retry).await {
                log::warn!("Giving up on {job:?}: {e}");
            }
        });
    }
}

async fn run_with_retry(job: &InvalidationJob, retry: RetryPolicy) -> Result<usize> {
    let backoff = ExponentialBuilder::default()
        .with_min_delay(retry.initial_delay)
        .with_max_times(retry.max_attempts.saturating_sub(1) as usize);

    (|| job.run())
        .retry(backoff)
        .when(Error::is_retryable)
        .notify(|err: &Error, delay: Duration| {
            log::warn!("Retrying {job:?} in {delay:?}: {err}");
        })
        .await
}
