//! Field-name sanitization and enrichment URL discovery.

use std::collections::HashSet;
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;
use url::Url;

use crate::source::Row;

static NON_IDENT: OnceLock<Regex> = OnceLock::new();

fn non_ident() -> &'static Regex {
    NON_IDENT.get_or_init(|| Regex::new(r"[^0-9a-z_]").expect("static sanitize pattern is valid"))
}

/// Turns a field name into an identifier-safe key.
///
/// The name is trimmed and lowercased, every character outside `[0-9a-z_]`
/// becomes `_`, a leading digit gets a `_` prefix and an empty result
/// becomes `_`.
///
/// # Examples
///
/// ```
/// use stockdex::record::sanitize_key;
///
/// assert_eq!(sanitize_key(" Market Cap (Cr.) "), "market_cap__cr__");
/// assert_eq!(sanitize_key("52W High"), "_52w_high");
/// assert_eq!(sanitize_key(""), "_");
/// ```
#[must_use]
pub fn sanitize_key(key: &str) -> String {
    let lowered = key.trim().to_lowercase();
    let mut s = non_ident().replace_all(&lowered, "_").into_owned();
    if s.starts_with(|c: char| c.is_ascii_digit()) {
        s.insert(0, '_');
    }
    if s.is_empty() {
        s.push('_');
    }
    s
}

/// Maps every field of `row` to a sanitized key, unique within the row.
///
/// Collisions keep the first field's key and suffix later ones with `_1`,
/// `_2`, and so on, skipping suffixed names that are already taken.
#[must_use]
pub fn sanitize_keys(row: &Row) -> IndexMap<String, String> {
    let mut taken: HashSet<String> = HashSet::with_capacity(row.len());
    let mut out = IndexMap::with_capacity(row.len());
    for key in row.keys() {
        let base = sanitize_key(key);
        let mut candidate = base.clone();
        let mut n = 1;
        while taken.contains(&candidate) {
            candidate = format!("{base}_{n}");
            n += 1;
        }
        taken.insert(candidate.clone());
        out.insert(key.clone(), candidate);
    }
    out
}

/// Parses `value` as an absolute `http`/`https` URL with a host.
#[must_use]
pub fn parse_enrichment_url(value: &str) -> Option<Url> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let url = Url::parse(value).ok()?;
    let web = matches!(url.scheme(), "http" | "https");
    let has_host = url.host_str().is_some_and(|h| !h.is_empty());
    (web && has_host).then_some(url)
}

/// Returns the first valid URL among `candidates`, in priority order.
#[must_use]
pub fn find_enrichment_url<S: AsRef<str>>(row: &Row, candidates: &[S]) -> Option<Url> {
    candidates
        .iter()
        .filter_map(|field| row.get(field.as_ref()))
        .find_map(|value| parse_enrichment_url(value))
}
