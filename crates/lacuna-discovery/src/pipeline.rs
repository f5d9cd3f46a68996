//! Gap-fill orchestration.
//!
//! Drives one request through the stages:
//!   1. Generate up to three queries from the gap text and concepts
//!   2. Dispatch the first two across every enabled source
//!   3. Deduplicate the successful candidates by title prefix
//!   4. Rank them (score order, or a delegated re-ranker)
//!   5. Skip candidates the knowledge store already holds
//!   6. Select the first remaining candidate
//!   7. Optionally enrich it and append it to the knowledge store
//!   8. Emit a `GapFillEvent` on the broadcast channel
//!
//! No stage failure escapes: sources, generation, re-ranking and store
//! lookups all degrade to "fewer candidates" or "no selection".

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::aggregator::SearchAggregator;
use crate::dedup::dedupe;
use crate::enrich::Enricher;
use crate::error::{FetchError, StoreError};
use crate::filter::first_unknown;
use crate::models::{summarize, EnrichedPaperRecord, GapFillRequest, PaperRecord, SelectionResult};
use crate::query::QueryGenerator;
use crate::ranker::Ranker;
use crate::store::{AppendMetadata, KnowledgeStore};

/// Queries actually sent to the sources per request.
pub const MAX_DISPATCHED_QUERIES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GapFillStage {
    GenerateQueries,
    DispatchSearch,
    Dedupe,
    Rank,
    FilterKnown,
    Select,
    Enrich,
    Emit,
}

impl fmt::Display for GapFillStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GapFillStage::GenerateQueries => "generate_queries",
            GapFillStage::DispatchSearch  => "dispatch_search",
            GapFillStage::Dedupe          => "dedupe",
            GapFillStage::Rank            => "rank",
            GapFillStage::FilterKnown     => "filter_known",
            GapFillStage::Select          => "select",
            GapFillStage::Enrich          => "enrich",
            GapFillStage::Emit            => "emit",
        };
        f.write_str(s)
    }
}

// ── Events ────────────────────────────────────────────────────────────────────

/// Notification that a gap-filling paper was found (and possibly stored).
#[derive(Debug, Clone, Serialize)]
pub struct GapFillEvent {
    pub run_id: Uuid,
    pub original_title: String,
    pub selected_paper: PaperRecord,
    pub store_url: Option<String>,
    pub emitted_at: DateTime<Utc>,
}

// ── Full run summary ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct GapFillReport {
    pub selection: SelectionResult,
    pub enriched: Option<EnrichedPaperRecord>,
    pub enrichment_error: Option<String>,
    pub store_url: Option<String>,
    pub store_error: Option<String>,
    pub duration_ms: u64,
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

pub struct GapFillOrchestrator {
    aggregator: SearchAggregator,
    queries: QueryGenerator,
    ranker: Ranker,
    store: Option<Arc<dyn KnowledgeStore>>,
    enricher: Enricher,
    events: Option<broadcast::Sender<GapFillEvent>>,
}

impl GapFillOrchestrator {
    /// Baseline queries, score ranking, no store and no event channel.
    pub fn new(aggregator: SearchAggregator, enricher: Enricher) -> Self {
        Self {
            aggregator,
            queries: QueryGenerator::new(),
            ranker: Ranker::new(),
            store: None,
            enricher,
            events: None,
        }
    }

    pub fn with_query_generator(mut self, queries: QueryGenerator) -> Self {
        self.queries = queries;
        self
    }

    pub fn with_ranker(mut self, ranker: Ranker) -> Self {
        self.ranker = ranker;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn KnowledgeStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_events(mut self, tx: broadcast::Sender<GapFillEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn aggregator(&self) -> &SearchAggregator {
        &self.aggregator
    }

    /// Finds at most one new paper for the gap and announces it.
    pub async fn find(&self, request: &GapFillRequest) -> SelectionResult {
        let selection = self.select(request).await;
        if let Some(paper) = selection.selected() {
            self.emit(selection.run_id, request, paper.clone(), None);
        }
        selection
    }

    /// Fetches and analyses the page at `url`.
    pub async fn enrich(&self, url: &str) -> Result<EnrichedPaperRecord, FetchError> {
        self.enricher.enrich(url).await
    }

    /// Appends an enriched paper to the knowledge store.
    #[instrument(skip_all, fields(title = %record.paper.title))]
    pub async fn add_to_store(
        &self,
        record: &EnrichedPaperRecord,
        request: &GapFillRequest,
    ) -> Result<String, StoreError> {
        let store = self.store.as_ref().ok_or(StoreError::Unconfigured)?;
        let metadata = AppendMetadata::new(&request.original_title, &request.gap_text);
        let url = store.append(record, &metadata).await?;
        info!(url = %url, "Paper added to knowledge store");
        Ok(url)
    }

    /// Full workflow: select, enrich the selection, optionally store it, and
    /// emit one event. Enrichment and store failures are reported, not raised.
    #[instrument(skip_all, fields(original = %request.original_title, auto_add = auto_add))]
    pub async fn run(&self, request: &GapFillRequest, auto_add: bool) -> GapFillReport {
        let t0 = Instant::now();
        let selection = self.select(request).await;

        let mut report = GapFillReport {
            selection,
            enriched: None,
            enrichment_error: None,
            store_url: None,
            store_error: None,
            duration_ms: 0,
        };

        let Some(selected) = report.selection.selected().cloned() else {
            report.duration_ms = t0.elapsed().as_millis() as u64;
            return report;
        };
        let run_id = report.selection.run_id;

        stage(run_id, GapFillStage::Enrich);
        let enriched = if selected.url.is_empty() {
            report.enrichment_error = Some("selected paper has no URL".to_string());
            self.enricher.analyze(selected.clone()).await
        } else {
            match self.enricher.enrich(&selected.url).await {
                Ok(mut record) => {
                    fill_missing(&mut record.paper, &selected);
                    if record.summary.is_empty() {
                        record.summary = summarize(&record.paper.abstract_text);
                    }
                    record
                }
                Err(e) => {
                    warn!(url = %selected.url, error = %e, "Enrichment failed; using search metadata");
                    report.enrichment_error = Some(e.to_string());
                    self.enricher.analyze(selected.clone()).await
                }
            }
        };

        if auto_add {
            match self.add_to_store(&enriched, request).await {
                Ok(url) => report.store_url = Some(url),
                Err(e) => {
                    warn!(error = %e, "Could not add paper to knowledge store");
                    report.store_error = Some(e.to_string());
                }
            }
        }

        self.emit(run_id, request, selected, report.store_url.clone());
        report.enriched = Some(enriched);
        report.duration_ms = t0.elapsed().as_millis() as u64;
        report
    }

    #[instrument(skip_all, fields(original = %request.original_title))]
    async fn select(&self, request: &GapFillRequest) -> SelectionResult {
        let run_id = Uuid::new_v4();
        info!(run_id = %run_id, "Starting gap-fill search");

        stage(run_id, GapFillStage::GenerateQueries);
        let mut queries = self.queries.generate(&request.gap_text, &request.key_concepts).await;
        queries.truncate(MAX_DISPATCHED_QUERIES);
        let search_queries: Vec<String> = queries.iter().map(|q| q.text.clone()).collect();

        stage(run_id, GapFillStage::DispatchSearch);
        let report = self.aggregator.search(&queries).await;
        let candidates = report.candidates();

        stage(run_id, GapFillStage::Dedupe);
        let unique = dedupe(&candidates);
        debug!(raw = candidates.len(), unique = unique.len(), "Deduplicated candidates");

        stage(run_id, GapFillStage::Rank);
        let ranked = self.ranker.rank(&request.gap_text, unique).await;
        let summary = format!("Found {} papers addressing the research gaps", ranked.len());

        stage(run_id, GapFillStage::FilterKnown);
        let selected = first_unknown(&ranked, self.store.as_deref()).await;

        stage(run_id, GapFillStage::Select);
        match &selected {
            Some(p) => info!(run_id = %run_id, title = %p.title, source = %p.source, "Selected gap-filling paper"),
            None => info!(run_id = %run_id, candidates = ranked.len(), "No new paper selected"),
        }

        SelectionResult {
            run_id,
            papers: selected.into_iter().collect(),
            summary,
            search_queries,
            sources: report.statuses(),
        }
    }

    fn emit(&self, run_id: Uuid, request: &GapFillRequest, paper: PaperRecord, store_url: Option<String>) {
        stage(run_id, GapFillStage::Emit);
        if let Some(ref tx) = self.events {
            let _ = tx.send(GapFillEvent {
                run_id,
                original_title: request.original_title.clone(),
                selected_paper: paper,
                store_url,
                emitted_at: Utc::now(),
            });
        }
    }
}

fn stage(run_id: Uuid, stage: GapFillStage) {
    debug!(run_id = %run_id, stage = %stage, "Gap-fill stage");
}

/// Copies search metadata the landing page did not provide.
fn fill_missing(page: &mut PaperRecord, searched: &PaperRecord) {
    if page.authors.is_empty() {
        page.authors = searched.authors.clone();
    }
    if page.abstract_text.is_empty() {
        page.abstract_text = searched.abstract_text.clone();
    }
    if page.date.is_empty() {
        page.date = searched.date.clone();
    }
    if page.pdf_url.is_none() {
        page.pdf_url = searched.pdf_url.clone();
    }
    page.relevance_score = searched.relevance_score;
}
