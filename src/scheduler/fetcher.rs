//! The fetch collaborator that turns a URL into page text.

use std::sync::Arc;

use url::Url;

use crate::error::FetchError;

/// Fetches the enrichment payload for a URL.
///
/// Implementations run on scheduler worker threads and may block for as long
/// as the fetch takes. The scheduler never interrupts a running fetch.
pub trait Fetcher: Send + Sync {
    /// Fetches `url` and returns its text content.
    ///
    /// # Errors
    ///
    /// Returns a `FetchError` describing why no payload could be produced.
    fn fetch(&self, url: &Url) -> Result<String, FetchError>;
}

impl<F> Fetcher for F
where
    F: Fn(&Url) -> Result<String, FetchError> + Send + Sync,
{
    fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        self(url)
    }
}

/// Wraps a closure as a shared fetcher.
///
/// # Examples
///
/// ```
/// use stockdex::scheduler::{fetcher_fn, Fetcher};
///
/// let fetcher = fetcher_fn(|url| Ok(format!("page for {url}")));
/// let url = url::Url::parse("https://example.com/a").unwrap();
/// assert_eq!(fetcher.fetch(&url).unwrap(), "page for https://example.com/a");
/// ```
pub fn fetcher_fn<F>(f: F) -> Arc<dyn Fetcher>
where
    F: Fn(&Url) -> Result<String, FetchError> + Send + Sync + 'static,
{
    Arc::new(f)
}
