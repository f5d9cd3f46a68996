//! Data models for the discovery pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One search query string with an optional per-source result bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), limit: None }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Normalized representation of one paper, whichever source produced it.
///
/// `title` and `source` are always populated; everything else is best-effort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub title: String,
    pub authors: Vec<String>,
    /// Publication year or date as the source reports it; empty when unknown.
    pub date: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub url: String,
    pub pdf_url: Option<String>,
    pub source: String,
    /// Source-provided relevance signal (citation count etc.), 0 when absent.
    pub relevance_score: f64,
}

impl PaperRecord {
    /// Builds a record with whitespace-normalized title, or `None` when the
    /// title is blank.
    pub fn try_new(title: &str, source: impl Into<String>) -> Option<Self> {
        let title = normalize_whitespace(title);
        if title.is_empty() {
            return None;
        }
        Some(Self {
            title,
            authors: Vec::new(),
            date: String::new(),
            abstract_text: String::new(),
            url: String::new(),
            pdf_url: None,
            source: source.into(),
            relevance_score: 0.0,
        })
    }
}

/// Per-source outcome of one aggregation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SourceResult {
    Success { papers: Vec<PaperRecord> },
    Failure { error: String },
}

impl SourceResult {
    pub fn is_success(&self) -> bool {
        matches!(self, SourceResult::Success { .. })
    }

    /// Papers of a successful source; empty for a failed one.
    pub fn papers(&self) -> &[PaperRecord] {
        match self {
            SourceResult::Success { papers } => papers,
            SourceResult::Failure { .. } => &[],
        }
    }
}

/// Input of the gap-fill workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapFillRequest {
    pub gap_text: String,
    pub key_concepts: Vec<String>,
    pub original_title: String,
}

/// Compact per-source status carried on a `SelectionResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceStatus {
    pub source: String,
    pub ok: bool,
    pub papers: usize,
    pub error: Option<String>,
}

/// Output of the gap-fill workflow. An empty `papers` list is a normal outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionResult {
    pub run_id: Uuid,
    /// At most one paper: the best-ranked candidate not already known.
    pub papers: Vec<PaperRecord>,
    pub summary: String,
    /// Queries actually dispatched to the sources.
    pub search_queries: Vec<String>,
    pub sources: Vec<SourceStatus>,
}

impl SelectionResult {
    pub fn selected(&self) -> Option<&PaperRecord> {
        self.papers.first()
    }
}

/// A paper plus the fields derived from its full page and abstract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedPaperRecord {
    #[serde(flatten)]
    pub paper: PaperRecord,
    pub summary: String,
    pub key_concepts: Vec<String>,
    pub methodology: Option<String>,
    pub theme: Option<String>,
}

impl EnrichedPaperRecord {
    /// Wraps a plain record with empty derived fields.
    pub fn from_paper(paper: PaperRecord) -> Self {
        let summary = summarize(&paper.abstract_text);
        Self {
            paper,
            summary,
            key_concepts: Vec::new(),
            methodology: None,
            theme: None,
        }
    }
}

const SUMMARY_CHARS: usize = 500;

/// Abstract shortened to 500 characters, with an ellipsis when cut.
pub fn summarize(abstract_text: &str) -> String {
    if abstract_text.chars().count() > SUMMARY_CHARS {
        format!("{}...", truncate_chars(abstract_text, SUMMARY_CHARS))
    } else {
        abstract_text.to_string()
    }
}

/// First `max` characters of `s` (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Collapses every whitespace run to a single space and trims the ends.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_new_rejects_blank_title() {
        assert!(PaperRecord::try_new("  \n ", "arxiv").is_none());
    }

    #[test]
    fn test_try_new_normalizes_title() {
        let p = PaperRecord::try_new("Detecting\n  Hallucinations ", "arxiv").unwrap();
        assert_eq!(p.title, "Detecting Hallucinations");
        assert_eq!(p.source, "arxiv");
        assert_eq!(p.relevance_score, 0.0);
    }

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("héllo wörld", 7), "héllo w");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_summarize_adds_ellipsis_only_when_cut() {
        assert_eq!(summarize("short"), "short");
        let long = "x".repeat(600);
        let s = summarize(&long);
        assert_eq!(s.len(), 503);
        assert!(s.ends_with("..."));
    }

    #[test]
    fn test_source_result_serializes_with_status_tag() {
        let r = SourceResult::Failure { error: "timed out".to_string() };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["status"], "failure");
        assert!(r.papers().is_empty());
    }
}
