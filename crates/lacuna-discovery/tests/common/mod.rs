//! In-memory doubles for the external capabilities of the pipeline.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lacuna_discovery::aggregator::{AggregatorConfig, SearchAggregator};
use lacuna_discovery::enrich::{Enricher, PageFetcher};
use lacuna_discovery::sources::SourceAdapter;
use lacuna_discovery::store::{AppendMetadata, KnowledgeStore};
use lacuna_discovery::{EnrichedPaperRecord, FetchError, GapFillRequest, PaperRecord, SourceError, StoreError};
use lacuna_llm::{LlmError, TextGenerator};

pub const GAP: &str = "LLM hallucination detection in code review is understudied";
pub const TOP_TITLE: &str = "Detecting Hallucinations in LLM Code Review";
pub const TOP_URL: &str = "https://arxiv.org/abs/2401.01234v1";

pub fn request() -> GapFillRequest {
    GapFillRequest {
        gap_text: GAP.to_string(),
        key_concepts: vec!["hallucination".to_string(), "code review".to_string()],
        original_title: "A Survey of LLM Code Assistants".to_string(),
    }
}

pub fn paper(title: &str, score: f64, source: &str) -> PaperRecord {
    let mut p = PaperRecord::try_new(title, source).expect("non-empty title");
    p.relevance_score = score;
    p.url = format!("https://example.org/{}", title.replace(' ', "-").to_lowercase());
    p
}

/// The two candidates of the reference scenario, as source "a" returns them.
pub fn scenario_papers() -> Vec<PaperRecord> {
    let mut top = paper(TOP_TITLE, 12.0, "a");
    top.url = TOP_URL.to_string();
    top.abstract_text = "Search abstract.".to_string();
    vec![top, paper("Unrelated Paper", 3.0, "a")]
}

// ── Sources ───────────────────────────────────────────────────────────────────

pub struct FakeSource {
    pub id: String,
    pub papers: Vec<PaperRecord>,
    pub fail: bool,
    pub delay: Duration,
    pub queries: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn ok(id: &str, papers: Vec<PaperRecord>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            papers,
            fail: false,
            delay: Duration::ZERO,
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            papers: Vec::new(),
            fail: true,
            delay: Duration::ZERO,
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn slow(id: &str, papers: Vec<PaperRecord>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            papers,
            fail: false,
            delay,
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn seen_queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceAdapter for FakeSource {
    fn id(&self) -> &str { &self.id }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<PaperRecord>, SourceError> {
        self.queries.lock().unwrap().push(query.to_string());
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(SourceError::Status(500));
        }
        Ok(self.papers.iter().take(limit).cloned().collect())
    }
}

pub fn aggregator(sources: Vec<Arc<FakeSource>>) -> SearchAggregator {
    let adapters: Vec<Arc<dyn SourceAdapter>> = sources
        .into_iter()
        .map(|s| s as Arc<dyn SourceAdapter>)
        .collect();
    let config = AggregatorConfig {
        per_source_limit: 3,
        request_timeout: Duration::from_millis(500),
        deadline: Duration::from_secs(2),
    };
    SearchAggregator::new(adapters, config).expect("at least one source")
}

// ── Knowledge store ───────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeStore {
    pub known: Vec<String>,
    pub fail_lookups: bool,
    pub fail_appends: bool,
    pub lookups: Mutex<Vec<String>>,
    pub appended: Mutex<Vec<(EnrichedPaperRecord, AppendMetadata)>>,
}

impl FakeStore {
    pub fn knowing(titles: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            known: titles.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        })
    }
}

#[async_trait]
impl KnowledgeStore for FakeStore {
    async fn exists(&self, title_prefix: &str) -> Result<bool, StoreError> {
        self.lookups.lock().unwrap().push(title_prefix.to_string());
        if self.fail_lookups {
            return Err(StoreError::Api { status: 503, message: "unavailable".to_string() });
        }
        Ok(self.known.iter().any(|k| k.contains(title_prefix)))
    }

    async fn append(&self, record: &EnrichedPaperRecord, metadata: &AppendMetadata) -> Result<String, StoreError> {
        if self.fail_appends {
            return Err(StoreError::Api { status: 400, message: "validation_error".to_string() });
        }
        let mut appended = self.appended.lock().unwrap();
        appended.push((record.clone(), metadata.clone()));
        Ok(format!("https://www.notion.so/page-{}", appended.len()))
    }
}

// ── Pages and text generation ─────────────────────────────────────────────────

pub const ARXIV_PAGE: &str = r#"<html><head>
  <meta name="citation_date" content="2024/01/03" />
</head><body>
  <h1 class="title mathjax"><span class="descriptor">Title:</span>Detecting Hallucinations in LLM Code Review</h1>
  <div class="authors"><span class="descriptor">Authors:</span><a href="/a/l">Ada Lovelace</a>, <a href="/a/t">Alan Turing</a></div>
  <blockquote class="abstract mathjax"><span class="descriptor">Abstract:</span>We study hallucinations in code review.</blockquote>
</body></html>"#;

/// Serves fixed pages; unknown URLs answer 404.
#[derive(Default)]
pub struct FakeFetcher {
    pub pages: HashMap<String, String>,
}

impl FakeFetcher {
    pub fn with_page(url: &str, html: &str) -> Arc<Self> {
        let mut pages = HashMap::new();
        pages.insert(url.to_string(), html.to_string());
        Arc::new(Self { pages })
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.pages.get(url).cloned().ok_or(FetchError::Status(404))
    }
}

pub fn enricher(fetcher: Arc<FakeFetcher>) -> Enricher {
    Enricher::new(fetcher)
}

pub struct CannedGenerator(pub &'static str);

#[async_trait]
impl TextGenerator for CannedGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
        Ok(self.0.to_string())
    }
}

/// A model that accepts the prompt and never answers.
pub struct StalledGenerator;

#[async_trait]
impl TextGenerator for StalledGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
        std::future::pending().await
    }
}
