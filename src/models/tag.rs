use serde::{Deserialize, Serialize};

use super::TagId;

/// Normalizes a tag key or value for equality comparison.
///
/// Trims surrounding whitespace and lowercases. The result is only ever used
/// to compare; stored and displayed text keeps its original casing.
///
/// # Examples
///
/// ```
/// use tunebook::normalize;
///
/// assert_eq!(normalize("  Bebop "), "bebop");
/// assert_eq!(normalize("E♭"), normalize(" e♭"));
/// ```
#[must_use]
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// A row of the global tag vocabulary.
///
/// At most one tag exists per normalized (key, value) pair. Items share tags
/// by reference through associations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub key: String,
    pub value: String,
}

impl Tag {
    /// Returns the tag's content without its identity.
    pub fn pair(&self) -> TagPair {
        TagPair::new(&self.key, &self.value)
    }

    /// Returns true when this tag is the normalized match for `key`/`value`.
    pub fn matches(&self, key: &str, value: &str) -> bool {
        normalize(&self.key) == normalize(key) && normalize(&self.value) == normalize(value)
    }
}

/// A (key, value) pair as supplied by callers, before it has a tag id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TagPair {
    pub key: String,
    pub value: String,
}

impl TagPair {
    /// Creates a pair, keeping the given text as-is.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Returns true when the key or the value is empty after trimming.
    ///
    /// Blank pairs are dropped before they reach the tag catalog.
    pub fn is_blank(&self) -> bool {
        self.key.trim().is_empty() || self.value.trim().is_empty()
    }

    /// Returns the normalized (key, value) used as the pair's identity.
    pub fn identity(&self) -> (String, String) {
        (normalize(&self.key), normalize(&self.value))
    }

    /// Parses `key=value` text, splitting on the first `=`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tunebook::TagPair;
    ///
    /// let pair = TagPair::parse("Era=Hard Bop").unwrap();
    /// assert_eq!(pair, TagPair::new("Era", "Hard Bop"));
    /// assert!(TagPair::parse("no separator").is_none());
    /// ```
    pub fn parse(text: &str) -> Option<Self> {
        let (key, value) = text.split_once('=')?;
        Some(Self::new(key.trim(), value.trim()))
    }
}

/// Drops blank pairs and repeated normalized pairs, keeping first occurrences.
pub fn dedup_pairs<'a>(pairs: impl IntoIterator<Item = &'a TagPair>) -> Vec<TagPair> {
    let mut seen = std::collections::HashSet::new();
    pairs
        .into_iter()
        .filter(|pair| !pair.is_blank() && seen.insert(pair.identity()))
        .cloned()
        .collect()
}
