//! Numeric identifier extraction
//!
//! Identifiers are runs of 7 to 12 ASCII digits. A run that is shorter or
//! longer than that yields nothing, it is never truncated into a match.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;

pub const MIN_ID_LEN: usize = 7;
pub const MAX_ID_LEN: usize = 12;

// ASCII only: `\d` would also accept other Unicode decimal digits.
static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").unwrap());

/// Extract identifiers from free text, deduplicated, in order of first occurrence
pub fn extract_ids(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    DIGIT_RUN
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|run| is_valid_id(run))
        .filter(|run| seen.insert(*run))
        .map(str::to_string)
        .collect()
}

/// Whether `candidate` is exactly one identifier (`^\d{7,12}$`)
pub fn is_valid_id(candidate: &str) -> bool {
    (MIN_ID_LEN..=MAX_ID_LEN).contains(&candidate.len())
        && candidate.bytes().all(|b| b.is_ascii_digit())
}

/// Deduplicated set of target identifiers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierSet {
    ids: BTreeSet<String>,
}

impl IdentifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from any text: pasted lists, file contents, file names
    pub fn parse(text: &str) -> Self {
        let mut set = Self::new();
        set.extend_from_text(text);
        set
    }

    pub fn extend_from_text(&mut self, text: &str) {
        self.ids.extend(extract_ids(text));
    }

    /// Insert a single identifier; rejects anything that is not a valid id
    pub fn insert(&mut self, id: &str) -> bool {
        is_valid_id(id) && self.ids.insert(id.to_string())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// True when any identifier found in `text` is in this set
    pub fn matches_text(&self, text: &str) -> bool {
        extract_ids(text).iter().any(|id| self.contains(id))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

impl fmt::Display for IdentifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        write!(f, "{}", joined.join(","))
    }
}

impl<S: AsRef<str>> FromIterator<S> for IdentifierSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for item in iter {
            set.extend_from_text(item.as_ref());
        }
        set
    }
}
