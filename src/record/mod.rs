//! Directory entries and their enrichment lifecycle.
//!
//! An [`EntityRecord`] is built from one row. Its raw fields never change;
//! only the enrichment state does, under the record's own mutex. The
//! readiness gate is the condition "state is not `InProgress`", signalled
//! through a condition variable paired with that mutex, so waiting never
//! holds the lock.
//!
//! Every (re)schedule bumps the record's generation. A completion carrying
//! any other generation is discarded, so only the last-scheduled attempt can
//! become visible.

mod keys;
mod snapshot;
mod state;

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::scheduler::{EnrichmentJob, EnrichmentScheduler, JobOutcome};
use crate::source::Row;

pub use keys::{find_enrichment_url, parse_enrichment_url, sanitize_key, sanitize_keys};
pub use snapshot::{excerpt, RecordSnapshot, CONTENT_HEADER, ELLIPSIS};
pub use state::{EnrichmentState, EnrichmentStatus};

/// Derived key holding the fetched payload.
pub const CONTENT_KEY: &str = "content";
/// Derived key holding the completion timestamp.
pub const SCRAPED_AT_KEY: &str = "scraped_at";
/// Derived key holding the failure message.
pub const SCRAPE_ERROR_KEY: &str = "scrape_error";

/// Stable identifier of one record instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Creates a new random record ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-record settings.
#[derive(Debug, Clone)]
pub struct RecordConfig {
    /// Fields scanned for the enrichment URL, highest priority first.
    pub url_fields: Vec<String>,
    /// Upper bound [`EntityRecord::snapshot`] waits for enrichment.
    pub snapshot_timeout: Duration,
    /// Characters of payload shown in a rendered snapshot.
    pub excerpt_chars: usize,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            url_fields: vec!["URL".to_string(), "Url".to_string(), "Link".to_string()],
            snapshot_timeout: Duration::from_secs(30),
            excerpt_chars: 500,
        }
    }
}

#[derive(Debug)]
struct Enrichment {
    url: Option<Url>,
    generation: u64,
    state: EnrichmentState,
    // Last good payload, shown while a newer attempt is outstanding.
    retained: Option<(Arc<str>, DateTime<Utc>)>,
}

/// A single directory entry.
pub struct EntityRecord {
    id: RecordId,
    raw: Row,
    sanitized: IndexMap<String, String>,
    snapshot_timeout: Duration,
    excerpt_chars: usize,
    scheduler: Arc<EnrichmentScheduler>,
    enrichment: Mutex<Enrichment>,
    ready: Condvar,
    this: Weak<EntityRecord>,
}

impl EntityRecord {
    /// Builds a record from `row`, scheduling enrichment when one of the
    /// configured URL fields holds a valid web URL.
    pub fn from_row(row: Row, config: &RecordConfig, scheduler: Arc<EnrichmentScheduler>) -> Arc<Self> {
        let sanitized = sanitize_keys(&row);
        let url = find_enrichment_url(&row, &config.url_fields);
        let has_url = url.is_some();

        let record = Arc::new_cyclic(|this| Self {
            id: RecordId::new(),
            raw: row,
            sanitized,
            snapshot_timeout: config.snapshot_timeout,
            excerpt_chars: config.excerpt_chars,
            scheduler,
            enrichment: Mutex::new(Enrichment {
                url,
                generation: 0,
                state: EnrichmentState::NotStarted,
                retained: None,
            }),
            ready: Condvar::new(),
            this: this.clone(),
        });

        if has_url {
            record.schedule_enrichment();
        }
        record
    }

    fn lock(&self) -> MutexGuard<'_, Enrichment> {
        // State transitions are single assignments; a poisoned guard is consistent.
        self.enrichment.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a new enrichment attempt, superseding any outstanding one.
    ///
    /// Returns the new generation, or `None` when the record has no URL.
    /// A job the scheduler refuses is recorded as a failed attempt.
    pub fn schedule_enrichment(&self) -> Option<u64> {
        let (generation, url) = {
            let mut e = self.lock();
            let url = e.url.clone()?;
            let generation = e.generation + 1;
            e.generation = generation;
            e.state = EnrichmentState::InProgress { generation };
            (generation, url)
        };

        let this = self.this.clone();
        let job = EnrichmentJob::new(self.id, generation, url, move |generation, outcome| {
            // Records dropped by a directory rebuild ignore late results.
            if let Some(record) = this.upgrade() {
                record.complete(generation, outcome);
            }
        });

        debug!(record = %self.id, generation, url = %job.url(), "scheduling enrichment");
        if let Err(err) = self.scheduler.submit(job) {
            warn!(record = %self.id, generation, error = %err, "enrichment job rejected");
            self.complete(generation, Err(err.into()));
        }
        Some(generation)
    }

    /// Replaces the enrichment URL and reschedules.
    ///
    /// Nothing happens when `value` is invalid or equals the current URL.
    /// Returns whether an attempt was scheduled.
    pub fn set_enrichment_url(&self, value: &str) -> bool {
        let Some(url) = parse_enrichment_url(value) else {
            return false;
        };
        {
            let mut e = self.lock();
            if e.url.as_ref() == Some(&url) {
                return false;
            }
            e.url = Some(url);
        }
        self.schedule_enrichment().is_some()
    }

    pub(crate) fn complete(&self, generation: u64, outcome: JobOutcome) {
        {
            let mut e = self.lock();
            if e.generation != generation {
                debug!(record = %self.id, generation, current = e.generation, "discarding stale enrichment result");
                return;
            }
            let completed_at = Utc::now();
            let state = match outcome {
                Ok(payload) => {
                    let payload: Arc<str> = payload.into();
                    e.retained = Some((Arc::clone(&payload), completed_at));
                    EnrichmentState::Ready { payload, completed_at }
                }
                Err(error) => {
                    debug!(record = %self.id, generation, %error, "enrichment attempt failed");
                    EnrichmentState::Failed { error, completed_at }
                }
            };
            e.state = state;
        }
        self.ready.notify_all();
    }

    /// Returns true while an enrichment attempt is outstanding.
    #[must_use]
    pub fn is_enriching(&self) -> bool {
        self.lock().state.is_in_progress()
    }

    /// Blocks until the outstanding attempt finishes or `timeout` elapses.
    ///
    /// Returns true if no attempt is outstanding on return. Records that
    /// never scheduled enrichment return true immediately.
    pub fn wait_ready(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .ready
            .wait_timeout_while(guard, timeout, |e| e.state.is_in_progress())
            .unwrap_or_else(PoisonError::into_inner);
        !guard.state.is_in_progress()
    }

    /// Captures the record after waiting up to the configured bound.
    ///
    /// Never blocks longer than the bound and never fails; an attempt still
    /// running yields a snapshot without fresh content.
    #[must_use]
    pub fn snapshot(&self) -> RecordSnapshot {
        self.snapshot_within(self.snapshot_timeout)
    }

    /// Like [`snapshot`](Self::snapshot) with an explicit wait bound.
    #[must_use]
    pub fn snapshot_within(&self, timeout: Duration) -> RecordSnapshot {
        if !self.wait_ready(timeout) {
            debug!(record = %self.id, ?timeout, "snapshot taken before enrichment finished");
        }

        let e = self.lock();
        let status = e.state.status();
        let (content, scraped_at, error) = match &e.state {
            EnrichmentState::Ready { payload, completed_at } => (Some(Arc::clone(payload)), Some(*completed_at), None),
            EnrichmentState::Failed { error, completed_at } => (None, Some(*completed_at), Some(error.to_string())),
            EnrichmentState::InProgress { .. } => match &e.retained {
                Some((payload, at)) => (Some(Arc::clone(payload)), Some(*at), None),
                None => (None, None, None),
            },
            EnrichmentState::NotStarted => (None, None, None),
        };
        RecordSnapshot::new(self.raw.clone(), status, content, scraped_at, error, self.excerpt_chars)
    }

    /// Rendered form of [`snapshot`](Self::snapshot).
    #[must_use]
    pub fn render(&self) -> String {
        self.snapshot().to_string()
    }

    /// Returns `raw[key]`, else the enrichment-derived value for `content`,
    /// `scraped_at` or `scrape_error`, else `default`.
    #[must_use]
    pub fn get(&self, key: &str, default: &str) -> String {
        if let Some(v) = self.raw.get(key) {
            return v.clone();
        }
        self.derived(key).unwrap_or_else(|| default.to_string())
    }

    fn derived(&self, key: &str) -> Option<String> {
        let e = self.lock();
        match key {
            CONTENT_KEY => e
                .state
                .payload()
                .map(str::to_string)
                .or_else(|| e.retained.as_ref().map(|(p, _)| p.to_string())),
            SCRAPED_AT_KEY => e
                .state
                .completed_at()
                .or_else(|| e.retained.as_ref().map(|(_, at)| *at))
                .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true)),
            SCRAPE_ERROR_KEY => e.state.error().map(ToString::to_string),
            _ => None,
        }
    }

    /// Looks a raw value up by its sanitized key.
    #[must_use]
    pub fn field(&self, sanitized_key: &str) -> Option<&str> {
        self.sanitized
            .iter()
            .find(|(_, safe)| safe.as_str() == sanitized_key)
            .and_then(|(original, _)| self.raw.get(original))
            .map(String::as_str)
    }

    /// Raw fields followed by whichever derived keys currently have values.
    #[must_use]
    pub fn to_map(&self) -> Row {
        let mut out = self.raw.clone();
        for key in [CONTENT_KEY, SCRAPED_AT_KEY, SCRAPE_ERROR_KEY] {
            if out.contains_key(key) {
                continue;
            }
            if let Some(v) = self.derived(key) {
                out.insert(key.to_string(), v);
            }
        }
        out
    }

    /// This record's identifier.
    #[must_use]
    pub const fn id(&self) -> RecordId {
        self.id
    }

    /// Original fields in original order.
    #[must_use]
    pub const fn raw(&self) -> &Row {
        &self.raw
    }

    /// Original field name to sanitized key.
    #[must_use]
    pub const fn sanitized_keys(&self) -> &IndexMap<String, String> {
        &self.sanitized
    }

    /// Current enrichment URL.
    #[must_use]
    pub fn enrichment_url(&self) -> Option<Url> {
        self.lock().url.clone()
    }

    /// Current enrichment state.
    #[must_use]
    pub fn state(&self) -> EnrichmentState {
        self.lock().state.clone()
    }

    /// Number of attempts scheduled so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }
}

impl fmt::Debug for EntityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRecord")
            .field("id", &self.id)
            .field("fields", &self.raw.keys().collect::<Vec<_>>())
            .field("status", &self.lock().state.status())
            .finish_non_exhaustive()
    }
}
