//! Point-in-time, human-readable view of a record.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use super::state::EnrichmentStatus;
use crate::source::Row;

/// Header line that precedes the content excerpt.
pub const CONTENT_HEADER: &str = "--- Extracted content snippet (truncated) ---";

/// Marker appended to an excerpt cut short.
pub const ELLIPSIS: &str = "...";

/// Truncates `content` to `max_chars` characters, appending [`ELLIPSIS`]
/// only when something was cut.
#[must_use]
pub fn excerpt(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{ELLIPSIS}", &content[..cut]),
        None => content.to_string(),
    }
}

/// Captured record contents, rendered by its `Display` impl.
///
/// Renders every raw field as `key: value`, then the enrichment timestamp
/// and error if any, then the content excerpt section when a payload is
/// available.
#[derive(Debug, Clone, Serialize)]
pub struct RecordSnapshot {
    fields: Row,
    status: EnrichmentStatus,
    content: Option<Arc<str>>,
    scraped_at: Option<DateTime<Utc>>,
    error: Option<String>,
    #[serde(skip)]
    excerpt_chars: usize,
}

impl RecordSnapshot {
    pub(crate) fn new(
        fields: Row,
        status: EnrichmentStatus,
        content: Option<Arc<str>>,
        scraped_at: Option<DateTime<Utc>>,
        error: Option<String>,
        excerpt_chars: usize,
    ) -> Self {
        Self {
            fields,
            status,
            content,
            scraped_at,
            error,
            excerpt_chars,
        }
    }

    /// Raw fields in original order.
    #[must_use]
    pub const fn fields(&self) -> &Row {
        &self.fields
    }

    /// Enrichment status when the snapshot was taken.
    #[must_use]
    pub const fn status(&self) -> EnrichmentStatus {
        self.status
    }

    /// Full payload, possibly from an earlier attempt while a newer one runs.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// Truncated payload as rendered.
    #[must_use]
    pub fn excerpt(&self) -> Option<String> {
        self.content.as_deref().map(|c| excerpt(c, self.excerpt_chars))
    }

    /// When the shown payload or error was recorded.
    #[must_use]
    pub const fn scraped_at(&self) -> Option<DateTime<Utc>> {
        self.scraped_at
    }

    /// Failure message of the latest attempt.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// JSON form for collaborators that forward records as data.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "fields": self.fields,
            "status": self.status,
            "content": self.excerpt(),
            "scraped_at": self.scraped_at,
            "error": self.error,
        })
    }
}

impl fmt::Display for RecordSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fields.is_empty() && self.content.is_none() && self.error.is_none() {
            return write!(f, "(no data)");
        }

        let mut lines: Vec<String> = self.fields.iter().map(|(k, v)| format!("{k}: {v}")).collect();
        if let Some(at) = self.scraped_at {
            lines.push(format!("scraped_at: {}", at.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        if let Some(err) = &self.error {
            lines.push(format!("scrape_error: {err}"));
        }
        if let Some(text) = self.excerpt() {
            lines.push(format!("\n{CONTENT_HEADER}"));
            lines.push(text);
        }
        write!(f, "{}", lines.join("\n"))
    }
}
