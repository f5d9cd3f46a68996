//! Cross-source deduplication of candidate papers.
//!
//! Two records are duplicates when their titles agree on the first
//! `DEDUP_KEY_CHARS` characters after whitespace runs are collapsed and the
//! text is lower-cased. The first occurrence wins, so the output keeps the
//! relative order of the input.

use std::collections::HashSet;

use crate::models::{normalize_whitespace, truncate_chars, PaperRecord};

pub const DEDUP_KEY_CHARS: usize = 50;

/// Comparison key of a title.
pub fn dedup_key(title: &str) -> String {
    truncate_chars(&normalize_whitespace(title).to_lowercase(), DEDUP_KEY_CHARS)
}

/// Drops every record whose key was already seen. Stable and idempotent.
pub fn dedupe(candidates: &[PaperRecord]) -> Vec<PaperRecord> {
    let mut seen = HashSet::with_capacity(candidates.len());
    candidates
        .iter()
        .filter(|p| seen.insert(dedup_key(&p.title)))
        .cloned()
        .collect()
}
