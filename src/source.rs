//! Row sources that feed a directory load.
//!
//! A row is one entity as a string-keyed, string-valued mapping whose
//! iteration order is the column order of the underlying table.

use std::io;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::error::SourceError;

/// One entity as produced by a tabular source.
pub type Row = IndexMap<String, String>;

/// Provider of rows for [`Directory::load_from`](crate::Directory::load_from).
pub trait RowSource {
    /// Returns every row of the source.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::NotFound` when the backing data does not exist
    /// and `SourceError::Unreadable` when it exists but cannot be parsed.
    fn rows(&self) -> Result<Vec<Row>, SourceError>;
}

impl RowSource for [Row] {
    fn rows(&self) -> Result<Vec<Row>, SourceError> {
        Ok(self.to_vec())
    }
}

impl RowSource for Vec<Row> {
    fn rows(&self) -> Result<Vec<Row>, SourceError> {
        Ok(self.clone())
    }
}

/// Builds a row from `(field, value)` pairs, preserving their order.
///
/// # Examples
///
/// ```
/// use stockdex::source::row;
///
/// let r = row([("Name", "Infosys"), ("URL", "https://example.com/a")]);
/// assert_eq!(r.keys().collect::<Vec<_>>(), vec!["Name", "URL"]);
/// ```
pub fn row<K, V, I>(pairs: I) -> Row
where
    K: Into<String>,
    V: Into<String>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

/// Headered CSV file read in full on every call to [`RowSource::rows`].
///
/// Short records are padded with empty values; extra trailing cells are
/// dropped.
#[derive(Debug, Clone)]
pub struct CsvRowSource {
    path: PathBuf,
}

impl CsvRowSource {
    /// Create a source reading `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn unreadable(&self, err: &csv::Error) -> SourceError {
        SourceError::Unreadable {
            message: format!("{}: {err}", self.path.display()),
        }
    }
}

impl RowSource for CsvRowSource {
    fn rows(&self) -> Result<Vec<Row>, SourceError> {
        let mut reader = match csv::ReaderBuilder::new().flexible(true).from_path(&self.path) {
            Ok(reader) => reader,
            Err(err) => {
                if let csv::ErrorKind::Io(io_err) = err.kind() {
                    if io_err.kind() == io::ErrorKind::NotFound {
                        return Err(SourceError::NotFound {
                            path: self.path.display().to_string(),
                        });
                    }
                }
                return Err(self.unreadable(&err));
            }
        };

        let headers = reader.headers().map_err(|e| self.unreadable(&e))?.clone();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| self.unreadable(&e))?;
            let row: Row = headers
                .iter()
                .enumerate()
                .map(|(idx, field)| (field.to_string(), record.get(idx).unwrap_or("").to_string()))
                .collect();
            rows.push(row);
        }
        Ok(rows)
    }
}
