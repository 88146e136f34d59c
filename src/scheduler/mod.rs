//! Fixed-size worker pool for background enrichment.
//!
//! Jobs are queued on an unbounded channel and executed by a fixed set of
//! named threads, so submitting never fails while the pool is running. Only
//! the number of concurrent fetches is bounded.
//!
//! The scheduler keeps one cancellation token per record, so submitting a
//! newer generation for a record supersedes the older job:
//! if it has not started it is dropped without fetching, and if it is running
//! its outcome is reported as cancelled.
//!
//! Lock ordering: the token registry lock is never held while a completion
//! callback runs, and callers must not submit while holding a record lock.

mod fetcher;
mod job;

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::error::{EnrichmentError, SchedulerError};
use crate::record::RecordId;

pub use fetcher::{fetcher_fn, Fetcher};
pub use job::{EnrichmentJob, JobOutcome};

use job::CancelToken;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of worker threads (concurrent fetches).
    pub workers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Point-in-time counters for a scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Jobs accepted onto the queue.
    pub submitted: u64,
    /// Jobs that produced a payload.
    pub completed: u64,
    /// Jobs whose fetch failed or panicked.
    pub failed: u64,
    /// Jobs that finished cancelled (superseded, dropped or shut down).
    pub cancelled: u64,
    /// Submissions refused after shutdown.
    pub rejected: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    rejected: AtomicU64,
}

#[derive(Debug)]
struct Registration {
    generation: u64,
    token: CancelToken,
}

type Registry = Mutex<HashMap<RecordId, Registration>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fixed-size pool executing enrichment jobs.
pub struct EnrichmentScheduler {
    tx: Mutex<Option<Sender<EnrichmentJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    registry: Arc<Registry>,
    counters: Arc<Counters>,
    worker_count: usize,
    shut_down: AtomicBool,
}

impl EnrichmentScheduler {
    /// Starts the worker threads.
    ///
    /// # Panics
    ///
    /// Panics if the operating system refuses to spawn a worker thread.
    pub fn new(config: SchedulerConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let workers = config.workers.max(1);
        let (tx, rx) = unbounded::<EnrichmentJob>();

        let registry: Arc<Registry> = Arc::default();
        let counters: Arc<Counters> = Arc::default();

        let mut handles = Vec::with_capacity(workers);
        for idx in 0..workers {
            let rx: Receiver<EnrichmentJob> = rx.clone();
            let fetcher = Arc::clone(&fetcher);
            let registry = Arc::clone(&registry);
            let counters = Arc::clone(&counters);
            let handle = thread::Builder::new()
                .name(format!("stockdex-enrich-{idx}"))
                .spawn(move || {
                    for job in &rx {
                        run_job(fetcher.as_ref(), &registry, &counters, job);
                    }
                })
                .expect("failed to spawn stockdex enrichment worker");
            handles.push(handle);
        }

        Self {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
            registry,
            counters,
            worker_count: workers,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Queues a job without blocking.
    ///
    /// Any job still registered for the same record with an older generation
    /// is cancelled. A job older than the one already registered is queued
    /// pre-cancelled so its completion still fires.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::ShutDown` after [`shutdown`](Self::shutdown).
    /// The job is dropped without its completion running.
    pub fn submit(&self, job: EnrichmentJob) -> Result<(), SchedulerError> {
        let tx = lock(&self.tx).clone();
        let Some(tx) = tx else {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(SchedulerError::ShutDown);
        };

        let record = job.record;
        let token = job.token.clone();
        self.register(record, job.generation, &token);

        // Only fails once every worker has exited.
        if tx.send(job).is_err() {
            self.unregister(record, &token);
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(SchedulerError::ShutDown);
        }
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn register(&self, record: RecordId, generation: u64, token: &CancelToken) {
        let mut registry = lock(&self.registry);
        if let Some(existing) = registry.get(&record) {
            if existing.generation > generation {
                debug!(%record, generation, newer = existing.generation, "submitted job already superseded");
                token.cancel();
                return;
            }
            debug!(%record, generation, superseded = existing.generation, "superseding enrichment job");
            existing.token.cancel();
        }
        registry.insert(
            record,
            Registration {
                generation,
                token: token.clone(),
            },
        );
    }

    fn unregister(&self, record: RecordId, token: &CancelToken) {
        unregister(&self.registry, record, token);
    }

    /// Cancels the job registered for `record`, if any.
    ///
    /// A queued job is dropped without fetching; a running job finishes but
    /// its outcome is reported as cancelled. Returns whether a job was found.
    pub fn cancel_if_pending(&self, record: RecordId) -> bool {
        let registry = lock(&self.registry);
        match registry.get(&record) {
            Some(reg) => {
                reg.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of jobs registered and not yet finished.
    #[must_use]
    pub fn pending(&self) -> usize {
        lock(&self.registry).len()
    }

    /// Stops accepting jobs.
    ///
    /// With `drain`, blocks until queued and in-flight jobs have finished.
    /// Without it, every outstanding job is cancelled and the call returns
    /// immediately; running fetches are not interrupted. Calling it again is
    /// harmless.
    pub fn shutdown(&self, drain: bool) {
        // Closing the channel lets workers exit once the queue is empty.
        let was_open = lock(&self.tx).take().is_some();
        self.shut_down.store(true, Ordering::Release);

        if !drain {
            self.cancel_all();
        }
        if was_open {
            info!(drain, "enrichment scheduler shutting down");
        }
        if drain {
            self.join_workers();
        }
    }

    /// Returns true once [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Snapshot of the scheduler's counters.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            cancelled: self.counters.cancelled.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }

    fn cancel_all(&self) {
        for reg in lock(&self.registry).values() {
            reg.token.cancel();
        }
    }

    fn join_workers(&self) {
        let handles = std::mem::take(&mut *lock(&self.workers));
        let current = thread::current().id();
        for handle in handles {
            // The last record handle can be dropped inside a completion on a
            // worker thread; that thread cannot join itself.
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for EnrichmentScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichmentScheduler")
            .field("workers", &self.worker_count)
            .field("shut_down", &self.is_shut_down())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Drop for EnrichmentScheduler {
    fn drop(&mut self) {
        // Outstanding jobs are cancelled and workers are detached; a hung
        // fetch keeps its thread alive but never blocks the dropping thread.
        self.shutdown(false);
        lock(&self.workers).clear();
    }
}

fn unregister(registry: &Registry, record: RecordId, token: &CancelToken) {
    let mut registry = lock(registry);
    if registry.get(&record).is_some_and(|reg| reg.token.same_as(token)) {
        registry.remove(&record);
    }
}

fn run_job(fetcher: &dyn Fetcher, registry: &Registry, counters: &Counters, job: EnrichmentJob) {
    let outcome = if job.token.is_cancelled() {
        Err(EnrichmentError::Cancelled)
    } else {
        match panic::catch_unwind(AssertUnwindSafe(|| fetcher.fetch(&job.url))) {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(err)) => {
                warn!(record = %job.record, url = %job.url, error = %err, "enrichment fetch failed");
                Err(EnrichmentError::from(err))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(record = %job.record, url = %job.url, %message, "enrichment fetch panicked");
                Err(EnrichmentError::Panicked { message })
            }
        }
    };

    // A cancel that lands mid-fetch still discards the result.
    let outcome = if job.token.is_cancelled() {
        Err(EnrichmentError::Cancelled)
    } else {
        outcome
    };

    unregister(registry, job.record, &job.token);

    match &outcome {
        Ok(_) => counters.completed.fetch_add(1, Ordering::Relaxed),
        Err(EnrichmentError::Cancelled) => counters.cancelled.fetch_add(1, Ordering::Relaxed),
        Err(_) => counters.failed.fetch_add(1, Ordering::Relaxed),
    };
    debug!(record = %job.record, generation = job.generation, ok = outcome.is_ok(), "enrichment job finished");

    let record = job.record;
    if panic::catch_unwind(AssertUnwindSafe(|| job.complete(outcome))).is_err() {
        warn!(%record, "enrichment completion callback panicked");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
