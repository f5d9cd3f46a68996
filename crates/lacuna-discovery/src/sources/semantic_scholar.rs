//! Semantic Scholar Graph API client.
//!
//! Endpoint: https://api.semanticscholar.org/graph/v1/paper/search
//! Works without a key (shared rate limit); an optional key goes in `x-api-key`.

use async_trait::async_trait;
use lacuna_common::SandboxClient as Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::SourceError;
use crate::models::PaperRecord;
use super::{fetch_text, SourceAdapter, SourceSettings};

const S2_API_URL: &str = "https://api.semanticscholar.org/graph/v1";
const S2_FIELDS: &str = "title,authors,year,abstract,citationCount,url,openAccessPdf";
const SOURCE_ID: &str = "semantic_scholar";

pub struct SemanticScholarClient {
    client: Client,
    base: String,
    api_key: Option<String>,
}

impl SemanticScholarClient {
    pub fn new(settings: &SourceSettings) -> Result<Self, lacuna_common::LacunaError> {
        Ok(Self {
            client: settings.client()?,
            base: settings.base_or(S2_API_URL),
            api_key: settings.api_key.clone().filter(|k| !k.trim().is_empty()),
        })
    }
}

#[async_trait]
impl SourceAdapter for SemanticScholarClient {
    fn id(&self) -> &str { SOURCE_ID }

    #[instrument(skip(self))]
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<PaperRecord>, SourceError> {
        let url = format!("{}/paper/search", self.base);
        let limit = limit.to_string();
        let mut req = self.client
            .get(&url)?
            .query(&[("query", query), ("limit", limit.as_str()), ("fields", S2_FIELDS)]);
        if let Some(key) = &self.api_key {
            req = req.header("x-api-key", key);
        }

        let body = fetch_text(req).await?;
        let papers = parse_search_response(&body)?;
        debug!(count = papers.len(), "Semantic Scholar search returned papers");
        Ok(papers)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<PaperData>,
}

#[derive(Debug, Deserialize)]
struct PaperData {
    #[serde(rename = "paperId", default)]
    paper_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "abstract", default)]
    abstract_text: Option<String>,
    #[serde(default)]
    year: Option<i32>,
    #[serde(rename = "citationCount", default)]
    citation_count: Option<u64>,
    #[serde(default)]
    authors: Vec<AuthorData>,
    #[serde(default)]
    url: Option<String>,
    #[serde(rename = "openAccessPdf", default)]
    open_access_pdf: Option<OpenAccessPdf>,
}

#[derive(Debug, Deserialize)]
struct AuthorData {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAccessPdf {
    #[serde(default)]
    url: Option<String>,
}

impl PaperData {
    fn into_paper(self) -> Option<PaperRecord> {
        let mut paper = PaperRecord::try_new(self.title.as_deref()?, SOURCE_ID)?;
        paper.authors = self.authors.into_iter().filter_map(|a| a.name).collect();
        paper.date = self.year.map(|y| y.to_string()).unwrap_or_default();
        paper.abstract_text = self.abstract_text.unwrap_or_default();
        paper.url = match (self.url, self.paper_id) {
            (Some(url), _) if !url.is_empty() => url,
            (_, Some(id)) => format!("https://www.semanticscholar.org/paper/{id}"),
            _ => String::new(),
        };
        paper.pdf_url = self.open_access_pdf.and_then(|p| p.url).filter(|u| !u.is_empty());
        paper.relevance_score = self.citation_count.unwrap_or(0) as f64;
        Some(paper)
    }
}

fn parse_search_response(body: &str) -> Result<Vec<PaperRecord>, SourceError> {
    let resp: SearchResponse = serde_json::from_str(body)
        .map_err(|e| SourceError::Parse(format!("Semantic Scholar response: {e}")))?;
    Ok(resp.data.into_iter().filter_map(PaperData::into_paper).collect())
}
