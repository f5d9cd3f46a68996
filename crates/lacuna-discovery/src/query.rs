//! Search-query generation from a research-gap description.
//!
//! A deterministic baseline is always computed. When a text generator is
//! configured its answer replaces the baseline, unless it fails, times out or
//! produces nothing usable.

use std::sync::Arc;
use std::time::Duration;

use lacuna_llm::TextGenerator;
use tracing::{debug, instrument, warn};

use crate::models::Query;

/// Upper bound on generated queries.
pub const MAX_QUERIES: usize = 3;
const BASELINE_GAP_TOKENS: usize = 10;
const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(30);

pub struct QueryGenerator {
    generator: Option<Arc<dyn TextGenerator>>,
    timeout: Duration,
}

impl Default for QueryGenerator {
    fn default() -> Self { Self::new() }
}

impl QueryGenerator {
    /// Baseline-only generator.
    pub fn new() -> Self {
        Self { generator: None, timeout: DEFAULT_GENERATION_TIMEOUT }
    }

    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Baseline queries: the first ten tokens of the gap, then the first
    /// concept joined with the first gap token. Blank queries are dropped, so
    /// blank input yields an empty list.
    pub fn baseline(gap_text: &str, concepts: &[String]) -> Vec<Query> {
        let tokens: Vec<&str> = gap_text.split_whitespace().collect();
        let mut queries = Vec::with_capacity(2);

        let gap_query = tokens.iter().take(BASELINE_GAP_TOKENS).copied().collect::<Vec<_>>().join(" ");
        if !gap_query.is_empty() {
            queries.push(Query::new(gap_query));
        }

        if let Some(concept) = concepts.iter().map(|c| c.trim()).find(|c| !c.is_empty()) {
            let text = match tokens.first() {
                Some(first) => format!("{concept} {first}"),
                None => concept.to_string(),
            };
            queries.push(Query::new(text));
        }
        queries
    }

    /// Produces between zero (blank input) and three queries. Never fails.
    #[instrument(skip(self, gap_text, concepts))]
    pub async fn generate(&self, gap_text: &str, concepts: &[String]) -> Vec<Query> {
        let baseline = Self::baseline(gap_text, concepts);
        let Some(generator) = &self.generator else {
            return baseline;
        };
        if baseline.is_empty() {
            return baseline;
        }

        let prompt = query_prompt(gap_text, concepts);
        match tokio::time::timeout(self.timeout, generator.generate(&prompt)).await {
            Ok(Ok(text)) => {
                let queries = parse_query_lines(&text);
                if queries.is_empty() {
                    warn!("Query generation returned no usable lines; using baseline queries");
                    baseline
                } else {
                    debug!(n = queries.len(), "Using generated search queries");
                    queries
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Query generation failed; using baseline queries");
                baseline
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "Query generation timed out; using baseline queries");
                baseline
            }
        }
    }
}

fn query_prompt(gap_text: &str, concepts: &[String]) -> String {
    format!(
        "Generate 3 specific search queries to find papers addressing this research gap:\n\
         Gap: {gap_text}\n\
         Concepts: {}\n\n\
         Return only the 3 queries, one per line.",
        concepts.join(", ")
    )
}

/// Non-empty lines of a model reply, stripped of list numbering, bullets and
/// surrounding quotes, capped at `MAX_QUERIES`.
fn parse_query_lines(text: &str) -> Vec<Query> {
    text.lines()
        .map(clean_line)
        .filter(|l| !l.is_empty())
        .take(MAX_QUERIES)
        .map(Query::new)
        .collect()
}

fn clean_line(line: &str) -> String {
    let line = line.trim();
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    let line = if digits > 0 {
        let rest = &line[digits..];
        rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')).unwrap_or(line)
    } else {
        line
    };
    let line = line.trim_start().trim_start_matches(['-', '*', '•']).trim();
    line.trim_matches(|c| c == '"' || c == '\'' || c == '`').trim().to_string()
}
