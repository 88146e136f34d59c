//! # stockdex - prefix-searchable stock directory
//!
//! stockdex keeps an in-memory directory of stocks keyed by name. Lookups go
//! through a character trie with longest-valid-prefix fallback, and every
//! record that carries a web URL is enriched in the background with the
//! fetched page text.
//!
//! ## Core Concepts
//!
//! - **PrefixIndex**: trie over normalized names (trimmed, lowercased)
//! - **EntityRecord**: one row of attributes plus its enrichment state
//! - **EnrichmentScheduler**: fixed-size worker pool running fetch jobs,
//!   at most one live job per record
//! - **Directory**: index and records, rebuilt wholesale on every load
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//!
//! use stockdex::{fetcher_fn, row, Directory, DirectoryConfig};
//!
//! let directory = Directory::new(
//!     DirectoryConfig::default(),
//!     fetcher_fn(|url| Ok(format!("annual report from {url}"))),
//! );
//! directory.load(vec![
//!     row([("Name", "Infosys"), ("URL", "https://example.com/a")]),
//!     row([("Name", "Infotech"), ("URL", "")]),
//! ]);
//!
//! let matches = directory.find_matches("info", 5);
//! assert_eq!(matches.len(), 2);
//!
//! let infosys = &matches[0];
//! assert!(infosys.wait_ready(Duration::from_secs(5)));
//! assert!(infosys.render().contains("annual report"));
//! assert!(!matches[1].is_enriching());
//! # directory.shutdown(true);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod directory;
pub mod error;
pub mod index;
pub mod record;
pub mod scheduler;
pub mod source;

// Re-export primary types at crate root for convenience
pub use directory::{Directory, DirectoryConfig};
pub use error::{DirectoryError, DirectoryResult, EnrichmentError, FetchError, SchedulerError, SourceError};
pub use index::{normalize, PrefixIndex};
pub use record::{EnrichmentState, EnrichmentStatus, EntityRecord, RecordConfig, RecordId, RecordSnapshot};
pub use scheduler::{fetcher_fn, EnrichmentJob, EnrichmentScheduler, Fetcher, SchedulerConfig, SchedulerStats};
pub use source::{row, CsvRowSource, Row, RowSource};
