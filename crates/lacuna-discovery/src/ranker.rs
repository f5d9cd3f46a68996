//! Candidate ranking.
//!
//! The default order is descending `relevance_score`, stable on ties. An
//! optional `Reranker` may replace it; its order is authoritative when it
//! succeeds and ignored when it fails.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lacuna_llm::{LlmError, TextGenerator};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::models::{truncate_chars, PaperRecord};

const DEFAULT_RERANK_TIMEOUT: Duration = Duration::from_secs(30);

lazy_static! {
    static ref INDEX: Regex = Regex::new(r"\d+").expect("valid regex");
}

/// Stable sort by descending relevance score.
pub fn rank_by_score(mut candidates: Vec<PaperRecord>) -> Vec<PaperRecord> {
    candidates.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(Ordering::Equal)
    });
    candidates
}

/// External re-ranking capability. Returns a permutation of candidate indices
/// (0-based), most relevant first. Indices it leaves out are appended in
/// default order.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, gap_text: &str, candidates: &[PaperRecord]) -> Result<Vec<usize>, LlmError>;
}

/// Asks a text generator for a comma-separated ordering of a numbered list.
pub struct LlmReranker {
    generator: Arc<dyn TextGenerator>,
}

impl LlmReranker {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Reranker for LlmReranker {
    async fn rerank(&self, gap_text: &str, candidates: &[PaperRecord]) -> Result<Vec<usize>, LlmError> {
        let reply = self.generator.generate(&rerank_prompt(gap_text, candidates)).await?;
        parse_ordering(&reply, candidates.len())
    }
}

fn rerank_prompt(gap_text: &str, candidates: &[PaperRecord]) -> String {
    let listing = candidates
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{}. {}: {}", i + 1, p.title, truncate_chars(&p.abstract_text, 300)))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Rank these papers by how well they address the research gap.\n\
         Gap: {gap_text}\n\n\
         Papers:\n{listing}\n\n\
         Return only the paper numbers, most relevant first, separated by commas."
    )
}

/// Reads 1-based indices from a reply. Out-of-range numbers and repeats are
/// ignored; a reply with no valid index is malformed.
fn parse_ordering(reply: &str, len: usize) -> Result<Vec<usize>, LlmError> {
    let mut order = Vec::with_capacity(len);
    for m in INDEX.find_iter(reply) {
        let Ok(n) = m.as_str().parse::<usize>() else { continue };
        if (1..=len).contains(&n) && !order.contains(&(n - 1)) {
            order.push(n - 1);
        }
    }
    if order.is_empty() {
        return Err(LlmError::Malformed(format!("no candidate index in re-rank reply: {reply:?}")));
    }
    Ok(order)
}

/// Reorders `default_order` by `indices`, then appends the candidates the
/// indices did not mention, keeping their default relative order.
fn apply_order(default_order: Vec<PaperRecord>, indices: &[usize]) -> Vec<PaperRecord> {
    let mut slots: Vec<Option<PaperRecord>> = default_order.into_iter().map(Some).collect();
    let mut ranked = Vec::with_capacity(slots.len());
    for &i in indices {
        if let Some(p) = slots.get_mut(i).and_then(Option::take) {
            ranked.push(p);
        }
    }
    ranked.extend(slots.into_iter().flatten());
    ranked
}

pub struct Ranker {
    reranker: Option<Arc<dyn Reranker>>,
    timeout: Duration,
}

impl Default for Ranker {
    fn default() -> Self { Self::new() }
}

impl Ranker {
    pub fn new() -> Self {
        Self { reranker: None, timeout: DEFAULT_RERANK_TIMEOUT }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Upper bound on one re-ranking call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ranks candidates; re-ranker failures and timeouts fall back to the score order.
    #[instrument(skip_all, fields(n = candidates.len()))]
    pub async fn rank(&self, gap_text: &str, candidates: Vec<PaperRecord>) -> Vec<PaperRecord> {
        let ranked = rank_by_score(candidates);
        let Some(reranker) = &self.reranker else {
            return ranked;
        };
        if ranked.len() < 2 {
            return ranked;
        }

        let reply = tokio::time::timeout(self.timeout, reranker.rerank(gap_text, &ranked))
            .await
            .unwrap_or(Err(LlmError::Timeout));
        match reply {
            Ok(indices) => {
                debug!(?indices, "Applying delegated ranking");
                apply_order(ranked, &indices)
            }
            Err(e) => {
                warn!(error = %e, "Re-ranking failed; keeping score order");
                ranked
            }
        }
    }
}
