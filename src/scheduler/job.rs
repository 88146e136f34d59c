//! Enrichment jobs and their cancellation tokens.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use url::Url;

use crate::error::EnrichmentError;
use crate::record::RecordId;

/// Outcome delivered to a job's completion callback.
pub type JobOutcome = Result<String, EnrichmentError>;

/// Callback invoked exactly once with the job's generation and outcome.
pub(crate) type Completion = Box<dyn FnOnce(u64, JobOutcome) + Send + 'static>;

/// Cooperative cancellation flag shared between a job and the scheduler.
///
/// Cancelling never interrupts a running fetch; it only turns the job's
/// eventual outcome into `EnrichmentError::Cancelled`.
#[derive(Debug, Clone, Default)]
pub(crate) struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A unit of enrichment work: fetch `url` on behalf of one record generation.
pub struct EnrichmentJob {
    pub(crate) record: RecordId,
    pub(crate) generation: u64,
    pub(crate) url: Url,
    pub(crate) token: CancelToken,
    pub(crate) on_complete: Completion,
}

impl EnrichmentJob {
    /// Create a job with a fresh cancellation token.
    pub fn new<F>(record: RecordId, generation: u64, url: Url, on_complete: F) -> Self
    where
        F: FnOnce(u64, JobOutcome) + Send + 'static,
    {
        Self {
            record,
            generation,
            url,
            token: CancelToken::new(),
            on_complete: Box::new(on_complete),
        }
    }

    /// Record this job enriches.
    #[must_use]
    pub const fn record(&self) -> RecordId {
        self.record
    }

    /// Generation captured when the job was created.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Fetch target.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    pub(crate) fn complete(self, outcome: JobOutcome) {
        (self.on_complete)(self.generation, outcome);
    }
}

impl fmt::Debug for EnrichmentJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnrichmentJob")
            .field("record", &self.record)
            .field("generation", &self.generation)
            .field("url", &self.url.as_str())
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}
