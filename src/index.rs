//! Prefix index over normalized entity names.
//!
//! The index is a character trie rebuilt wholesale on every directory load
//! and read-only afterwards. Children are kept in a `BTreeMap`, so every
//! traversal visits names in lexicographic order and results are
//! deterministic across builds.

use std::collections::BTreeMap;

/// Normalizes a name for insertion and lookup: trims surrounding whitespace
/// and lowercases.
///
/// Normalization is idempotent.
///
/// # Examples
///
/// ```
/// use stockdex::index::normalize;
///
/// assert_eq!(normalize("  Infosys Ltd "), "infosys ltd");
/// assert_eq!(normalize(&normalize(" TCS ")), normalize(" TCS "));
/// ```
#[must_use]
pub fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

#[derive(Debug, Default)]
struct TrieNode {
    children: BTreeMap<char, TrieNode>,
    terminal: bool,
}

/// Character trie supporting longest-valid-prefix autocomplete.
///
/// # Examples
///
/// ```
/// use stockdex::PrefixIndex;
///
/// let mut index = PrefixIndex::new();
/// index.insert("Infosys");
/// index.insert("Infotech");
///
/// assert_eq!(index.autocomplete("info"), vec!["infosys", "infotech"]);
/// // "infz" fails at 'z'; completions of "inf" are returned instead.
/// assert_eq!(index.autocomplete("infz"), vec!["infosys", "infotech"]);
/// assert!(index.autocomplete("xyz").is_empty());
/// ```
#[derive(Debug, Default)]
pub struct PrefixIndex {
    root: TrieNode,
    len: usize,
}

impl PrefixIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a word after normalizing it.
    ///
    /// Returns `true` if the word was not present before. Words that are
    /// empty after normalization are ignored.
    pub fn insert(&mut self, word: &str) -> bool {
        let word = normalize(word);
        if word.is_empty() {
            return false;
        }

        let mut node = &mut self.root;
        for ch in word.chars() {
            node = node.children.entry(ch).or_default();
        }

        if node.terminal {
            return false;
        }
        node.terminal = true;
        self.len += 1;
        true
    }

    /// Returns true if the normalized word was inserted.
    #[must_use]
    pub fn contains(&self, word: &str) -> bool {
        let word = normalize(word);
        let mut node = &self.root;
        for ch in word.chars() {
            match node.children.get(&ch) {
                Some(child) => node = child,
                None => return false,
            }
        }
        node.terminal && !word.is_empty()
    }

    /// Number of distinct words in the index.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no word has been inserted.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns completions for `prefix`.
    ///
    /// The prefix is normalized first. If every character matches, all words
    /// at or below the prefix node are returned (the prefix itself included
    /// when it is a word). If the walk fails part-way, completions of the
    /// longest matched prefix are returned instead. If not even the first
    /// character matches, or the prefix is empty, the result is empty.
    ///
    /// Words come back in depth-first pre-order with children visited in
    /// lexicographic order.
    #[must_use]
    pub fn autocomplete(&self, prefix: &str) -> Vec<String> {
        let prefix = normalize(prefix);
        if prefix.is_empty() {
            return Vec::new();
        }

        let mut node = &self.root;
        let mut matched = String::with_capacity(prefix.len());
        for ch in prefix.chars() {
            let Some(child) = node.children.get(&ch) else {
                break;
            };
            node = child;
            matched.push(ch);
        }

        if matched.is_empty() {
            return Vec::new();
        }

        let mut out = Vec::new();
        collect_words(node, matched, &mut out);
        out
    }
}

fn collect_words(start: &TrieNode, prefix: String, out: &mut Vec<String>) {
    let mut stack = vec![(start, prefix)];
    while let Some((node, word)) = stack.pop() {
        // Reverse push so the smallest character is popped first.
        for (&ch, child) in node.children.iter().rev() {
            let mut next = word.clone();
            next.push(ch);
            stack.push((child, next));
        }
        if node.terminal {
            out.push(word);
        }
    }
}
