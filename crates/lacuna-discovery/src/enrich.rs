//! Enrichment of a selected paper from its landing page.
//!
//! The page is fetched, bibliographic fields are extracted (arXiv abstract
//! pages by their markup, anything else through `citation_*` meta tags), and
//! an optional analysis step derives key concepts, methodology and theme from
//! the abstract. Analysis never fails the enrichment: on any problem the
//! derived fields stay empty.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lacuna_common::SandboxClient;
use lacuna_llm::{extract_json_object, LlmError, TextGenerator};
use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::FetchError;
use crate::models::{normalize_whitespace, truncate_chars, EnrichedPaperRecord, PaperRecord};
use crate::sources::arxiv::pdf_url_for;

pub const DEFAULT_THEMES: &[&str] = &["AI", "LLM Hallucinations", "Developer Workflows", "QA", "General"];
const FALLBACK_THEME: &str = "General";
const ANALYSIS_ABSTRACT_CHARS: usize = 1000;
const DEFAULT_ANALYSIS_TIMEOUT: Duration = Duration::from_secs(30);

lazy_static! {
    static ref ARXIV_TITLE: Selector = Selector::parse("h1.title").expect("valid selector");
    static ref ARXIV_ABSTRACT: Selector = Selector::parse("blockquote.abstract").expect("valid selector");
    static ref ARXIV_AUTHORS: Selector = Selector::parse("div.authors a").expect("valid selector");
    static ref META: Selector = Selector::parse("meta[content]").expect("valid selector");
    static ref HTML_TITLE: Selector = Selector::parse("title").expect("valid selector");
}

// ── Page fetching ─────────────────────────────────────────────────────────────

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Fetches pages through the sandboxed HTTP client.
pub struct HttpPageFetcher {
    client: SandboxClient,
}

impl HttpPageFetcher {
    pub fn new(timeout: Duration) -> Result<Self, lacuna_common::LacunaError> {
        Ok(Self { client: SandboxClient::with_timeout(timeout)? })
    }

    pub fn with_client(client: SandboxClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.client.get(url)?.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(resp.text().await?)
    }
}

// ── Enricher ──────────────────────────────────────────────────────────────────

pub struct Enricher {
    fetcher: Arc<dyn PageFetcher>,
    analyzer: Option<Arc<dyn TextGenerator>>,
    analysis_timeout: Duration,
    themes: Vec<String>,
}

impl Enricher {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            fetcher,
            analyzer: None,
            analysis_timeout: DEFAULT_ANALYSIS_TIMEOUT,
            themes: DEFAULT_THEMES.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn TextGenerator>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Upper bound on one analysis call; on elapse the derived fields stay empty.
    pub fn with_analysis_timeout(mut self, timeout: Duration) -> Self {
        self.analysis_timeout = timeout;
        self
    }

    /// Replaces the theme labels; an empty list keeps the defaults.
    pub fn with_themes(mut self, themes: Vec<String>) -> Self {
        if !themes.is_empty() {
            self.themes = themes;
        }
        self
    }

    /// Fetches and parses the page at `url`, then analyses it.
    #[instrument(skip(self))]
    pub async fn enrich(&self, url: &str) -> Result<EnrichedPaperRecord, FetchError> {
        let page_url = arxiv_abs_url(url).unwrap_or_else(|| url.to_string());
        let html = self.fetcher.fetch(&page_url).await?;
        let paper = parse_page(&page_url, &html)?;
        info!(title = %paper.title, source = %paper.source, "Fetched paper page");
        Ok(self.analyze(paper).await)
    }

    /// Adds the derived fields to an already known paper.
    pub async fn analyze(&self, paper: PaperRecord) -> EnrichedPaperRecord {
        let mut record = EnrichedPaperRecord::from_paper(paper);
        let Some(analyzer) = &self.analyzer else {
            return record;
        };
        if record.paper.abstract_text.is_empty() {
            debug!("No abstract to analyse");
            return record;
        }

        let prompt = analysis_prompt(&record.paper, &self.themes);
        let reply = tokio::time::timeout(self.analysis_timeout, analyzer.generate(&prompt))
            .await
            .unwrap_or(Err(LlmError::Timeout));
        let analysis = match reply {
            Ok(reply) => parse_analysis(&reply),
            Err(e) => Err(e.to_string()),
        };
        match analysis {
            Ok(a) => {
                record.key_concepts = a
                    .key_concepts
                    .into_iter()
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect();
                record.methodology = a.methodology.map(|m| m.trim().to_string()).filter(|m| !m.is_empty());
                record.theme = a.theme.and_then(|t| normalize_theme(&t, &self.themes));
            }
            Err(e) => warn!(error = %e, "Paper analysis failed; derived fields left empty"),
        }
        record
    }
}

// ── Analysis ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Analysis {
    #[serde(default)]
    key_concepts: Vec<String>,
    #[serde(default)]
    methodology: Option<String>,
    #[serde(default)]
    theme: Option<String>,
}

fn analysis_prompt(paper: &PaperRecord, themes: &[String]) -> String {
    format!(
        "Analyze this paper abstract and provide:\n\
         1. 3-5 key concepts\n\
         2. Research methodology (if mentioned)\n\
         3. Which theme it fits: {}\n\n\
         Title: {}\n\
         Abstract: {}\n\n\
         Respond in JSON format with keys: key_concepts (array), methodology, theme",
        themes.join(", "),
        paper.title,
        truncate_chars(&paper.abstract_text, ANALYSIS_ABSTRACT_CHARS),
    )
}

fn parse_analysis(reply: &str) -> Result<Analysis, String> {
    let json = extract_json_object(reply).ok_or_else(|| "no JSON object in reply".to_string())?;
    serde_json::from_str(json).map_err(|e| format!("bad analysis JSON: {e}"))
}

/// Maps a model-chosen theme onto a configured label: exact match ignoring
/// case, then containment, then the fallback label if it is configured.
fn normalize_theme(theme: &str, labels: &[String]) -> Option<String> {
    let wanted = theme.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    labels
        .iter()
        .find(|l| l.to_lowercase() == wanted)
        .or_else(|| {
            labels.iter().find(|l| {
                let l = l.to_lowercase();
                wanted.contains(&l) || l.contains(&wanted)
            })
        })
        .or_else(|| labels.iter().find(|l| l.as_str() == FALLBACK_THEME))
        .cloned()
}

// ── Page parsing ──────────────────────────────────────────────────────────────

/// `https://arxiv.org/pdf/2401.01234v1.pdf` → `https://arxiv.org/abs/2401.01234v1`.
/// `None` for anything that is not an arXiv PDF link.
fn arxiv_abs_url(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    if !is_arxiv(&parsed) {
        return None;
    }
    let id = parsed.path().strip_prefix("/pdf/")?;
    let id = id.strip_suffix(".pdf").unwrap_or(id).to_string();
    parsed.set_path(&format!("/abs/{id}"));
    Some(parsed.to_string())
}

fn is_arxiv(url: &Url) -> bool {
    url.host_str()
        .map_or(false, |h| h == "arxiv.org" || h.ends_with(".arxiv.org"))
}

/// Extracts a `PaperRecord` from a landing page.
pub fn parse_page(url: &str, html: &str) -> Result<PaperRecord, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::Parse(format!("{url}: {e}")))?;
    let doc = Html::parse_document(html);
    let paper = if is_arxiv(&parsed) {
        parse_arxiv_abs(url, &doc)
    } else {
        parse_citation_meta(&parsed, &doc)
    };
    paper.ok_or_else(|| FetchError::Parse(format!("no title found at {url}")))
}

fn element_text(el: ElementRef<'_>) -> String {
    normalize_whitespace(&el.text().collect::<String>())
}

fn strip_label<'a>(text: &'a str, label: &str) -> &'a str {
    text.strip_prefix(label).unwrap_or(text).trim()
}

fn parse_arxiv_abs(url: &str, doc: &Html) -> Option<PaperRecord> {
    let title = doc.select(&ARXIV_TITLE).next().map(element_text)?;
    let mut paper = PaperRecord::try_new(strip_label(&title, "Title:"), "arxiv")?;

    paper.abstract_text = doc
        .select(&ARXIV_ABSTRACT)
        .next()
        .map(element_text)
        .map(|a| strip_label(&a, "Abstract:").to_string())
        .unwrap_or_default();
    paper.authors = doc
        .select(&ARXIV_AUTHORS)
        .map(element_text)
        .filter(|a| !a.is_empty())
        .collect();
    paper.date = meta_values(doc, "citation_date")
        .into_iter()
        .next()
        .unwrap_or_default()
        .replace('/', "-");
    paper.url = url.to_string();
    paper.pdf_url = Some(pdf_url_for(url));
    Some(paper)
}

/// All `content` values of `<meta name=… >` / `<meta property=… >` tags with
/// the given key, in document order.
fn meta_values(doc: &Html, key: &str) -> Vec<String> {
    doc.select(&META)
        .filter(|m| {
            let v = m.value();
            v.attr("name").or_else(|| v.attr("property"))
                .map_or(false, |n| n.eq_ignore_ascii_case(key))
        })
        .filter_map(|m| m.value().attr("content"))
        .map(normalize_whitespace)
        .filter(|c| !c.is_empty())
        .collect()
}

fn first_meta(doc: &Html, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| meta_values(doc, k).into_iter().next())
}

fn parse_citation_meta(url: &Url, doc: &Html) -> Option<PaperRecord> {
    let title = first_meta(doc, &["citation_title", "dc.title", "og:title"])
        .or_else(|| doc.select(&HTML_TITLE).next().map(element_text))?;
    let host = url.host_str().unwrap_or("web").trim_start_matches("www.");
    let mut paper = PaperRecord::try_new(&title, host)?;

    paper.authors = meta_values(doc, "citation_author");
    if paper.authors.is_empty() {
        paper.authors = meta_values(doc, "dc.creator");
    }
    paper.abstract_text = first_meta(doc, &["citation_abstract", "dc.description", "description", "og:description"])
        .unwrap_or_default();
    paper.date = first_meta(doc, &["citation_publication_date", "citation_date", "citation_online_date", "dc.date"])
        .map(|d| d.replace('/', "-"))
        .unwrap_or_default();
    paper.url = url.to_string();
    paper.pdf_url = first_meta(doc, &["citation_pdf_url"]);
    Some(paper)
}
