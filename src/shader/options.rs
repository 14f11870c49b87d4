//! Compile-Time Option Sets
//!
//! An option string selects a program variant through preprocessor defines:
//! semicolon-separated `KEY` or `KEY=VALUE` tokens (a bare `KEY` means
//! `KEY=1`). [`ShaderOptions`] stores the parsed set in key-sorted order so
//! that semantically identical sets written in different token orders produce
//! the same canonical string, and therefore share one cache entry. The raw,
//! unsorted string is never used as a key.
//!
//! The sorted-`Vec` representation with binary-search insertion mirrors the
//! macro-set handling used for pipeline cache keys elsewhere in the engine
//! family; hashes come from `FxBuildHasher` over the sorted pairs.

use std::hash::{Hash, Hasher};

/// A canonical, order-independent set of preprocessor options.
///
/// # Performance
///
/// - Insertion/lookup: O(log n) via binary search
/// - Comparison and hashing: over the sorted pairs, so equal sets always
///   compare and hash equal regardless of the order they were written in
#[derive(Debug, Clone, Default)]
pub struct ShaderOptions {
    options: Vec<(String, String)>,
}

impl ShaderOptions {
    /// Creates an empty option set.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            options: Vec::new(),
        }
    }

    /// Parses a semicolon-separated option string.
    ///
    /// Empty tokens are skipped; surrounding whitespace is trimmed; a bare
    /// `KEY` becomes `KEY=1`; a repeated key keeps the last value.
    #[must_use]
    pub fn parse(option_string: &str) -> Self {
        let mut options = Self::new();
        for token in option_string.split(';') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            match token.split_once('=') {
                Some((key, value)) => options.set(key.trim(), value.trim()),
                None => options.set(token, "1"),
            }
        }
        options
    }

    /// Sets an option, keeping the set sorted by key. Last write wins.
    pub fn set(&mut self, key: &str, value: &str) {
        match self
            .options
            .binary_search_by(|(k, _)| k.as_str().cmp(key))
        {
            Ok(idx) => self.options[idx].1 = value.to_string(),
            Err(idx) => self
                .options
                .insert(idx, (key.to_string(), value.to_string())),
        }
    }

    /// Looks up an option value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options
            .binary_search_by(|(k, _)| k.as_str().cmp(key))
            .ok()
            .map(|idx| self.options[idx].1.as_str())
    }

    /// Whether the set contains a key.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.options
            .binary_search_by(|(k, _)| k.as_str().cmp(key))
            .is_ok()
    }

    /// Number of options in the set.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.options.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// The canonical cache-key form: sorted `KEY=VALUE` tokens joined by `;`.
    #[must_use]
    pub fn canonical_string(&self) -> String {
        let mut out = String::new();
        for (i, (key, value)) in self.options.iter().enumerate() {
            if i > 0 {
                out.push(';');
            }
            out.push_str(key);
            out.push('=');
            out.push_str(value);
        }
        out
    }

    /// Renders the set as preprocessor `#define` lines, one per option.
    #[must_use]
    pub fn define_block(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.options {
            out.push_str("#define ");
            out.push_str(key);
            out.push(' ');
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    /// Content hash of the sorted set, for cache lookups.
    #[must_use]
    pub fn compute_hash(&self) -> u64 {
        use std::hash::BuildHasher;

        rustc_hash::FxBuildHasher.hash_one(self)
    }
}

impl Hash for ShaderOptions {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.options.hash(state);
    }
}

impl PartialEq for ShaderOptions {
    fn eq(&self, other: &Self) -> bool {
        self.options == other.options
    }
}

impl Eq for ShaderOptions {}

impl From<&str> for ShaderOptions {
    fn from(option_string: &str) -> Self {
        Self::parse(option_string)
    }
}
