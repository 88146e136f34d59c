//! Error types for stockdex.
//!
//! All errors in stockdex are strongly typed using thiserror.
//! Only loading reports errors to callers. Fetch failures and scheduler
//! refusals are captured as record state and never propagate out of a
//! lookup.

use thiserror::Error;

/// Errors reported by a [`RowSource`](crate::source::RowSource).
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Row source not found: {path}")]
    NotFound {
        path: String,
    },

    #[error("Row source unreadable: {message}")]
    Unreadable {
        message: String,
    },
}

/// Errors reported by a [`Fetcher`](crate::scheduler::Fetcher).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("HTTP {status} fetching {url}")]
    Http {
        status: u16,
        url: String,
    },

    #[error("Transport failure: {message}")]
    Transport {
        message: String,
    },

    #[error("Empty payload from {url}")]
    Empty {
        url: String,
    },
}

/// Why an enrichment attempt ended without a payload.
///
/// Stored on the record in the `Failed` state, so it must stay cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnrichmentError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Enrichment cancelled")]
    Cancelled,

    #[error("Enrichment job rejected: {reason}")]
    Rejected {
        reason: String,
    },

    #[error("Enrichment worker panicked: {message}")]
    Panicked {
        message: String,
    },
}

/// Errors returned when submitting work to the enrichment scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("Enrichment scheduler is shut down")]
    ShutDown,
}

impl From<SchedulerError> for EnrichmentError {
    fn from(err: SchedulerError) -> Self {
        Self::Rejected {
            reason: err.to_string(),
        }
    }
}

/// Top-level error type for stockdex.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

impl DirectoryError {
    /// Returns true if this is a row source error.
    #[must_use]
    pub const fn is_source(&self) -> bool {
        matches!(self, Self::Source(_))
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            // A missing file may appear after the next data refresh.
            Self::Source(e) => matches!(e, SourceError::NotFound { .. }),
        }
    }
}

/// Result type alias for stockdex operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;
