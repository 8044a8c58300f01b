//! Free-text exercise search.

use std::fmt::Display;

use serde::Serialize;

use crate::error::{AppError, Result};

pub const MAX_QUERY_LEN: usize = 100;

const INVALID_QUERY: &str = "The query is not valid.";

/// A normalized query. Two queries are equal when they differ only in case
/// and whitespace, so `"Bench  Press"` equals `"benchpress"`.
#[derive(Debug, Clone, Serialize)]
pub struct SearchQuery {
    compact: String,
    tokens: Vec<String>,
}

impl PartialEq for SearchQuery {
    fn eq(&self, other: &Self) -> bool {
        self.compact == other.compact
    }
}

impl Eq for SearchQuery {}

/// Rejects queries longer than 100 characters or containing anything other
/// than letters, digits and whitespace.
pub fn validate(raw: &str) -> Result<()> {
    let ok = raw.chars().count() <= MAX_QUERY_LEN
        && raw.chars().all(|c| c.is_ascii_alphanumeric() || c.is_whitespace());
    if ok {
        Ok(())
    } else {
        Err(AppError::field("query", INVALID_QUERY))
    }
}

/// `None` when nothing is left after trimming: no filter at all.
pub fn normalize(raw: &str) -> Option<SearchQuery> {
    let tokens: Vec<String> = raw.split_whitespace().map(str::to_lowercase).collect();
    if tokens.is_empty() {
        return None;
    }
    Some(SearchQuery {
        compact: tokens.concat(),
        tokens,
    })
}

impl SearchQuery {
    pub fn compact(&self) -> &str {
        &self.compact
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// A haystack matches when its whitespace-free form contains the whole
    /// query, or when every query word is the prefix of one of its words.
    pub fn matches(&self, haystack: &str) -> bool {
        let hay = haystack.to_lowercase();
        let hay_compact: String = hay.split_whitespace().collect();
        if hay_compact.contains(&self.compact) {
            return true;
        }
        self.tokens
            .iter()
            .all(|t| hay.split_whitespace().any(|w| w.starts_with(t.as_str())))
    }
}

/// Full-text form: every word a required prefix, e.g. `bench:* & press:*`.
impl Display for SearchQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let expr = self
            .tokens
            .iter()
            .map(|t| format!("{t}:*"))
            .collect::<Vec<_>>()
            .join(" & ");
        write!(f, "{expr}")
    }
}
