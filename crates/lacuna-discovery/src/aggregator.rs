//! Concurrent fan-out of queries across the enabled sources.
//!
//! Every (source, query) pair runs as its own task with a per-request timeout.
//! An overall deadline bounds the whole call; tasks still running when it
//! elapses are aborted. Results are collected into one slot per pair and
//! folded into exactly one `SourceResult` per enabled source.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::{Id, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::error::{DiscoveryError, SourceError};
use crate::models::{PaperRecord, Query, SourceResult, SourceStatus};
use crate::sources::SourceAdapter;

/// Failure text recorded for a source whose tasks were cut off by the deadline.
pub const DEADLINE_FAILURE: &str = "did not complete before the search deadline";
/// Failure text recorded for a (source, query) task that panicked.
pub const TASK_PANICKED: &str = "search task panicked";

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Result bound per (source, query) when the query carries none.
    pub per_source_limit: usize,
    pub request_timeout: Duration,
    pub deadline: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            per_source_limit: 3,
            request_timeout: Duration::from_secs(20),
            deadline: Duration::from_secs(45),
        }
    }
}

/// Outcome of one source in one aggregation call.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub result: SourceResult,
}

/// One entry per enabled source, in enabled order.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateReport {
    pub sources: Vec<SourceReport>,
}

impl AggregateReport {
    pub fn get(&self, source: &str) -> Option<&SourceResult> {
        self.sources.iter().find(|r| r.source == source).map(|r| &r.result)
    }

    /// Successful candidates concatenated in source order, then query order.
    pub fn candidates(&self) -> Vec<PaperRecord> {
        self.sources
            .iter()
            .flat_map(|r| r.result.papers().iter().cloned())
            .collect()
    }

    pub fn statuses(&self) -> Vec<SourceStatus> {
        self.sources
            .iter()
            .map(|r| match &r.result {
                SourceResult::Success { papers } => SourceStatus {
                    source: r.source.clone(),
                    ok: true,
                    papers: papers.len(),
                    error: None,
                },
                SourceResult::Failure { error } => SourceStatus {
                    source: r.source.clone(),
                    ok: false,
                    papers: 0,
                    error: Some(error.clone()),
                },
            })
            .collect()
    }

    pub fn failed(&self) -> usize {
        self.sources.iter().filter(|r| !r.result.is_success()).count()
    }
}

type Slot = Option<Result<Vec<PaperRecord>, String>>;

pub struct SearchAggregator {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    config: AggregatorConfig,
}

impl SearchAggregator {
    /// Fails when no adapter is given or two adapters share an id.
    pub fn new(
        adapters: Vec<Arc<dyn SourceAdapter>>,
        config: AggregatorConfig,
    ) -> Result<Self, DiscoveryError> {
        if adapters.is_empty() {
            return Err(DiscoveryError::NoSourcesEnabled);
        }
        let mut seen = HashSet::new();
        for a in &adapters {
            if !seen.insert(a.id().to_string()) {
                return Err(DiscoveryError::DuplicateSource(a.id().to_string()));
            }
        }
        Ok(Self { adapters, config })
    }

    pub fn source_ids(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.id()).collect()
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    #[instrument(skip_all, fields(sources = self.adapters.len(), queries = queries.len()))]
    pub async fn search(&self, queries: &[Query]) -> AggregateReport {
        let deadline = Instant::now() + self.config.deadline;
        let mut slots: Vec<Vec<Slot>> = vec![vec![None; queries.len()]; self.adapters.len()];
        let mut set = JoinSet::new();
        let mut tasks: HashMap<Id, (usize, usize)> = HashMap::new();

        for (si, adapter) in self.adapters.iter().enumerate() {
            for (qi, query) in queries.iter().enumerate() {
                let adapter = Arc::clone(adapter);
                let text = query.text.clone();
                let limit = query.limit.unwrap_or(self.config.per_source_limit);
                let per_request = self.config.request_timeout;

                let handle = set.spawn(async move {
                    match tokio::time::timeout(per_request, adapter.search(&text, limit)).await {
                        Ok(r) => r,
                        Err(_) => Err(SourceError::Timeout(per_request)),
                    }
                });
                tasks.insert(handle.id(), (si, qi));
            }
        }

        loop {
            match tokio::time::timeout_at(deadline, set.join_next_with_id()).await {
                Ok(Some(Ok((id, result)))) => {
                    let Some(&(si, qi)) = tasks.get(&id) else { continue };
                    let source = self.adapters[si].id();
                    slots[si][qi] = Some(match result {
                        Ok(papers) => {
                            debug!(source, query = qi, n = papers.len(), "Source query finished");
                            Ok(papers)
                        }
                        Err(e) => {
                            warn!(source, query = qi, error = %e, "Source query failed");
                            Err(e.to_string())
                        }
                    });
                }
                Ok(Some(Err(e))) => {
                    let Some(&(si, qi)) = tasks.get(&e.id()) else { continue };
                    warn!(source = self.adapters[si].id(), query = qi, error = %e, "Search task did not finish normally");
                    let cause = if e.is_panic() { TASK_PANICKED } else { "search task was cancelled" };
                    slots[si][qi] = Some(Err(cause.to_string()));
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(outstanding = set.len(), deadline = ?self.config.deadline, "Search deadline elapsed; aborting outstanding tasks");
                    set.abort_all();
                    break;
                }
            }
        }

        let sources: Vec<SourceReport> = self
            .adapters
            .iter()
            .zip(slots)
            .map(|(adapter, slots)| SourceReport {
                source: adapter.id().to_string(),
                result: fold_slots(slots),
            })
            .collect();

        let report = AggregateReport { sources };
        info!(
            candidates = report.candidates().len(),
            failed = report.failed(),
            "Search fan-out complete"
        );
        report
    }
}

/// A source succeeds when any of its queries succeeded; it fails only when
/// none did.
fn fold_slots(slots: Vec<Slot>) -> SourceResult {
    if slots.is_empty() {
        return SourceResult::Success { papers: Vec::new() };
    }

    let mut papers = Vec::new();
    let mut any_ok = false;
    let mut first_error = None;
    for slot in slots {
        match slot {
            Some(Ok(p)) => {
                any_ok = true;
                papers.extend(p);
            }
            Some(Err(e)) => {
                first_error.get_or_insert(e);
            }
            None => {}
        }
    }

    if any_ok {
        SourceResult::Success { papers }
    } else {
        SourceResult::Failure {
            error: first_error.unwrap_or_else(|| DEADLINE_FAILURE.to_string()),
        }
    }
}
