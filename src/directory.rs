//! The stock directory: name index plus records, rebuilt wholesale on load.
//!
//! Readers clone the current `Arc<Catalog>` under a short read lock and work
//! on that snapshot, so a concurrent load is observed either not at all or
//! completely.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::error::{DirectoryResult, SourceError};
use crate::index::{normalize, PrefixIndex};
use crate::record::{EntityRecord, RecordConfig};
use crate::scheduler::{EnrichmentScheduler, Fetcher, SchedulerConfig};
use crate::source::{Row, RowSource};

/// Directory configuration.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Field holding the entity name used as lookup key.
    pub name_field: String,
    /// Settings applied to every record.
    pub record: RecordConfig,
    /// Worker pool settings, used when the directory creates its scheduler.
    pub scheduler: SchedulerConfig,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            name_field: "Name".to_string(),
            record: RecordConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

#[derive(Debug, Default)]
struct Catalog {
    index: PrefixIndex,
    records: HashMap<String, Arc<EntityRecord>>,
}

/// Prefix-searchable set of entity records.
#[derive(Debug)]
pub struct Directory {
    config: DirectoryConfig,
    scheduler: Arc<EnrichmentScheduler>,
    catalog: RwLock<Arc<Catalog>>,
    load_lock: Mutex<()>,
}

impl Directory {
    /// Create an empty directory with its own scheduler.
    pub fn new(config: DirectoryConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let scheduler = Arc::new(EnrichmentScheduler::new(config.scheduler.clone(), fetcher));
        Self::with_scheduler(config, scheduler)
    }

    /// Create an empty directory sharing an existing scheduler.
    #[must_use]
    pub fn with_scheduler(config: DirectoryConfig, scheduler: Arc<EnrichmentScheduler>) -> Self {
        Self {
            config,
            scheduler,
            catalog: RwLock::new(Arc::default()),
            load_lock: Mutex::new(()),
        }
    }

    fn current(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replaces the directory contents with `rows`.
    ///
    /// Keys and values are trimmed; rows without a name are skipped and a
    /// later row with the same normalized name replaces an earlier one.
    /// Records are built (scheduling their enrichment) before the swap.
    /// Outstanding jobs of the replaced records are cancelled.
    ///
    /// Returns the number of records now in the directory.
    pub fn load<I>(&self, rows: I) -> usize
    where
        I: IntoIterator<Item = Row>,
    {
        let _serial = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut by_name: IndexMap<String, Row> = IndexMap::new();
        let mut skipped = 0usize;
        for row in rows {
            let row: Row = row
                .into_iter()
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .collect();
            let name = row.get(&self.config.name_field).map(|n| normalize(n)).unwrap_or_default();
            if name.is_empty() {
                skipped += 1;
                debug!(field = %self.config.name_field, "skipping row without a name");
                continue;
            }
            by_name.insert(name, row);
        }

        let mut index = PrefixIndex::new();
        let mut records = HashMap::with_capacity(by_name.len());
        for (name, row) in by_name {
            index.insert(&name);
            debug!(%name, "inserted into index");
            let record = EntityRecord::from_row(row, &self.config.record, Arc::clone(&self.scheduler));
            records.insert(name, record);
        }

        let loaded = records.len();
        let previous = {
            let mut current = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *current, Arc::new(Catalog { index, records }))
        };

        for record in previous.records.values() {
            self.scheduler.cancel_if_pending(record.id());
        }

        info!(loaded, skipped, replaced = previous.records.len(), "directory loaded");
        loaded
    }

    /// Loads from a row source.
    ///
    /// A source that does not exist leaves the directory unchanged and
    /// reports zero rows loaded.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::Source` when the source exists but cannot be
    /// read; the directory is left unchanged.
    pub fn load_from<S>(&self, source: &S) -> DirectoryResult<usize>
    where
        S: RowSource + ?Sized,
    {
        match source.rows() {
            Ok(rows) => Ok(self.load(rows)),
            Err(SourceError::NotFound { path }) => {
                warn!(%path, "row source not found; directory left unchanged");
                Ok(0)
            }
            Err(err) => {
                warn!(error = %err, "failed to read row source; directory left unchanged");
                Err(err.into())
            }
        }
    }

    /// Returns up to `limit` records whose names complete `query`.
    ///
    /// Order follows [`PrefixIndex::autocomplete`]. Records are returned
    /// whether or not their enrichment has finished.
    #[must_use]
    pub fn find_matches(&self, query: &str, limit: usize) -> Vec<Arc<EntityRecord>> {
        if limit == 0 {
            return Vec::new();
        }
        let query = normalize(query);
        if query.is_empty() {
            return Vec::new();
        }

        let catalog = self.current();
        let names = catalog.index.autocomplete(&query);
        debug!(%query, suggestions = ?names, "autocomplete suggestions");

        names
            .iter()
            .filter_map(|name| catalog.records.get(name).cloned())
            .take(limit)
            .collect()
    }

    /// Exact lookup by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<EntityRecord>> {
        self.current().records.get(&normalize(name)).cloned()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.current().records.len()
    }

    /// Returns true if nothing has been loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All normalized names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.current().records.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// The scheduler enriching this directory's records.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<EnrichmentScheduler> {
        &self.scheduler
    }

    /// Shuts the scheduler down; see [`EnrichmentScheduler::shutdown`].
    pub fn shutdown(&self, drain: bool) {
        self.scheduler.shutdown(drain);
    }
}
