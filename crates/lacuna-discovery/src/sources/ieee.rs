//! IEEE Xplore Metadata API client.
//!
//! Endpoint: https://ieeexploreapi.ieee.org/api/v1/search/articles
//! Requires an API key (`apikey` query parameter).

use async_trait::async_trait;
use lacuna_common::SandboxClient as Client;
use tracing::{debug, instrument};

use crate::error::SourceError;
use crate::models::PaperRecord;
use super::{fetch_json, SourceAdapter, SourceSettings};

const IEEE_API_URL: &str = "https://ieeexploreapi.ieee.org/api/v1";
const SOURCE_ID: &str = "ieee";

pub struct IeeeXploreClient {
    client: Client,
    base: String,
    api_key: String,
}

impl IeeeXploreClient {
    pub fn new(settings: &SourceSettings, api_key: String) -> Result<Self, lacuna_common::LacunaError> {
        Ok(Self {
            client: settings.client()?,
            base: settings.base_or(IEEE_API_URL),
            api_key,
        })
    }
}

#[async_trait]
impl SourceAdapter for IeeeXploreClient {
    fn id(&self) -> &str { SOURCE_ID }

    #[instrument(skip(self))]
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<PaperRecord>, SourceError> {
        let url = format!("{}/search/articles", self.base);
        let limit = limit.to_string();
        let req = self.client.get(&url)?.query(&[
            ("querytext", query),
            ("max_records", limit.as_str()),
            ("format", "json"),
            ("apikey", self.api_key.as_str()),
        ]);

        let resp = fetch_json(req).await?;
        let articles = resp["articles"].as_array().cloned().unwrap_or_default();
        debug!(count = articles.len(), "IEEE Xplore search returned articles");

        Ok(articles.iter().filter_map(article_to_paper).collect())
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────

fn article_to_paper(article: &serde_json::Value) -> Option<PaperRecord> {
    let mut paper = PaperRecord::try_new(article["title"].as_str()?, SOURCE_ID)?;

    paper.authors = article["authors"]["authors"]
        .as_array()
        .unwrap_or(&vec![])
        .iter()
        .filter_map(|a| a["full_name"].as_str().map(String::from))
        .collect();

    // publication_year comes back as a number or a string depending on the record
    paper.date = match &article["publication_year"] {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.clone(),
        _ => String::new(),
    };

    paper.abstract_text = article["abstract"].as_str().unwrap_or("").to_string();
    paper.url = article["html_url"]
        .as_str()
        .or_else(|| article["abstract_url"].as_str())
        .map(String::from)
        .or_else(|| article["doi"].as_str().map(|d| format!("https://doi.org/{d}")))
        .unwrap_or_default();
    paper.pdf_url = article["pdf_url"].as_str().map(String::from);
    paper.relevance_score = article["citing_paper_count"].as_f64().unwrap_or(0.0);
    Some(paper)
}
