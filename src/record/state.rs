//! Enrichment lifecycle state.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EnrichmentError;

/// Where a record's enrichment stands.
///
/// `Ready` and `Failed` are both terminal for a generation: either one opens
/// the readiness gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentState {
    /// No enrichment was ever scheduled (no valid URL).
    NotStarted,
    /// A job for `generation` is queued or running.
    InProgress {
        /// Attempt this state belongs to.
        generation: u64,
    },
    /// The latest attempt produced a payload.
    Ready {
        /// Fetched page text, shared with snapshots and the retained copy.
        payload: Arc<str>,
        /// When the payload was stored.
        completed_at: DateTime<Utc>,
    },
    /// The latest attempt ended without a payload.
    Failed {
        /// Why the attempt failed.
        error: EnrichmentError,
        /// When the failure was recorded.
        completed_at: DateTime<Utc>,
    },
}

impl EnrichmentState {
    /// Coarse status of this state.
    #[must_use]
    pub const fn status(&self) -> EnrichmentStatus {
        match self {
            Self::NotStarted => EnrichmentStatus::NotStarted,
            Self::InProgress { .. } => EnrichmentStatus::InProgress,
            Self::Ready { .. } => EnrichmentStatus::Ready,
            Self::Failed { .. } => EnrichmentStatus::Failed,
        }
    }

    /// Returns true while a job is outstanding.
    #[must_use]
    pub const fn is_in_progress(&self) -> bool {
        matches!(self, Self::InProgress { .. })
    }

    /// Payload of a `Ready` state.
    #[must_use]
    pub fn payload(&self) -> Option<&str> {
        match self {
            Self::Ready { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// Completion time of a terminal state.
    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Ready { completed_at, .. } | Self::Failed { completed_at, .. } => Some(*completed_at),
            Self::NotStarted | Self::InProgress { .. } => None,
        }
    }

    /// Error of a `Failed` state.
    #[must_use]
    pub const fn error(&self) -> Option<&EnrichmentError> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Payload-free view of [`EnrichmentState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    /// Never scheduled.
    NotStarted,
    /// Job outstanding.
    InProgress,
    /// Payload available.
    Ready,
    /// Attempt failed.
    Failed,
}

impl fmt::Display for EnrichmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Ready => write!(f, "ready"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_match_variant() {
        let now = Utc::now();
        let ready = EnrichmentState::Ready {
            payload: Arc::from("page"),
            completed_at: now,
        };
        assert_eq!(ready.status(), EnrichmentStatus::Ready);
        assert_eq!(ready.payload(), Some("page"));
        assert_eq!(ready.completed_at(), Some(now));
        assert!(ready.error().is_none());

        let failed = EnrichmentState::Failed {
            error: EnrichmentError::Cancelled,
            completed_at: now,
        };
        assert_eq!(failed.status(), EnrichmentStatus::Failed);
        assert!(failed.payload().is_none());
        assert_eq!(failed.error(), Some(&EnrichmentError::Cancelled));

        let running = EnrichmentState::InProgress { generation: 3 };
        assert!(running.is_in_progress());
        assert!(running.completed_at().is_none());
        assert!(!EnrichmentState::NotStarted.is_in_progress());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&EnrichmentStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        assert_eq!(EnrichmentStatus::NotStarted.to_string(), "not_started");
    }
}
