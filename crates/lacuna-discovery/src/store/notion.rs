//! Notion database as knowledge store.
//!
//! API: https://api.notion.com/v1
//!   exists → POST /databases/{id}/query with a `Title` rich_text filter
//!   append → POST /pages with the database as parent

use async_trait::async_trait;
use chrono::Local;
use lacuna_common::SandboxClient as Client;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::error::StoreError;
use crate::models::{truncate_chars, EnrichedPaperRecord};
use super::{AppendMetadata, KnowledgeStore};

const NOTION_API_URL: &str = "https://api.notion.com/v1";
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";

const TITLE_CHARS: usize = 100;
const RICH_TEXT_CHARS: usize = 2000;
const GAP_NOTE_CHARS: usize = 200;
const RESEARCH_GAPS_NOTE: &str = "Gap-filling paper - review for insights";

pub struct NotionStore {
    client: Client,
    base: String,
    api_key: String,
    database_id: String,
    version: String,
}

impl NotionStore {
    pub fn new(
        api_key: impl Into<String>,
        database_id: impl Into<String>,
    ) -> Result<Self, lacuna_common::LacunaError> {
        Ok(Self {
            client: Client::new()?,
            base: NOTION_API_URL.to_string(),
            api_key: api_key.into(),
            database_id: database_id.into(),
            version: DEFAULT_NOTION_VERSION.to_string(),
        })
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Points the store at another API root, e.g. a local mock.
    pub fn with_base_url(mut self, base: &str) -> Result<Self, lacuna_common::LacunaError> {
        self.client.allow_url(base)?;
        self.base = base.trim_end_matches('/').to_string();
        Ok(self)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, StoreError> {
        let url = format!("{}/{path}", self.base);
        let resp = self.client
            .post(&url)?
            .bearer_auth(&self.api_key)
            .header("Notion-Version", &self.version)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(StoreError::Api { status: status.as_u16(), message });
        }
        resp.json::<Value>()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl KnowledgeStore for NotionStore {
    #[instrument(skip(self))]
    async fn exists(&self, title_prefix: &str) -> Result<bool, StoreError> {
        let body = exists_query(title_prefix);
        let resp = self.post(&format!("databases/{}/query", self.database_id), &body).await?;
        let hits = resp["results"]
            .as_array()
            .ok_or_else(|| StoreError::Malformed("query response without results".to_string()))?
            .len();
        debug!(hits, "Notion title lookup");
        Ok(hits > 0)
    }

    #[instrument(skip_all, fields(title = %record.paper.title))]
    async fn append(
        &self,
        record: &EnrichedPaperRecord,
        metadata: &AppendMetadata,
    ) -> Result<String, StoreError> {
        let notes = notes_text(metadata, &Local::now().format("%Y-%m-%d %H:%M").to_string());
        let body = json!({
            "parent": { "database_id": self.database_id },
            "properties": page_properties(record, metadata, &notes),
        });
        let resp = self.post("pages", &body).await?;
        resp["url"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| StoreError::Malformed("created page has no url".to_string()))
    }
}

fn exists_query(title_prefix: &str) -> Value {
    json!({
        "filter": {
            "property": "Title",
            "rich_text": { "contains": title_prefix }
        },
        "page_size": 1
    })
}

fn notes_text(metadata: &AppendMetadata, added_at: &str) -> String {
    format!(
        "Auto-added by the gap-filling pipeline\n\
         Source Paper: {}\n\
         Addressing Gaps: {}...\n\
         Added: {added_at}",
        metadata.original_title,
        truncate_chars(&metadata.gap_text, GAP_NOTE_CHARS),
    )
}

fn rich_text(content: &str) -> Value {
    json!({ "rich_text": [{ "text": { "content": truncate_chars(content, RICH_TEXT_CHARS) } }] })
}

fn page_properties(record: &EnrichedPaperRecord, metadata: &AppendMetadata, notes: &str) -> Value {
    let paper = &record.paper;
    let theme = record.theme.as_deref().unwrap_or(&metadata.theme);
    let summary = if record.summary.is_empty() { &paper.abstract_text } else { &record.summary };
    let link = paper.pdf_url.as_deref().unwrap_or(&paper.url);

    json!({
        "Title": { "title": [{ "text": { "content": truncate_chars(&paper.title, TITLE_CHARS) } }] },
        "Theme": { "select": { "name": theme } },
        "Status": { "select": { "name": metadata.status } },
        "Summary": rich_text(summary),
        "Notes": rich_text(notes),
        "Key Findings": rich_text(&record.key_concepts.join("\n")),
        "Research Gaps": rich_text(RESEARCH_GAPS_NOTE),
        "PDF Link": { "url": link },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaperRecord;

    fn record() -> EnrichedPaperRecord {
        let mut paper = PaperRecord::try_new(&"T".repeat(150), "arxiv").unwrap();
        paper.url = "http://arxiv.org/abs/2401.01234v1".to_string();
        paper.abstract_text = "abstract".to_string();
        let mut r = EnrichedPaperRecord::from_paper(paper);
        r.key_concepts = vec!["hallucination".to_string(), "code review".to_string()];
        r
    }

    #[test]
    fn test_exists_query_filters_on_title() {
        let q = exists_query("Detecting Hallucinations in LL");
        assert_eq!(q["filter"]["property"], "Title");
        assert_eq!(q["filter"]["rich_text"]["contains"], "Detecting Hallucinations in LL");
    }

    #[test]
    fn test_page_properties() {
        let meta = AppendMetadata::new("Original", "gap");
        let props = page_properties(&record(), &meta, "notes");

        let title = props["Title"]["title"][0]["text"]["content"].as_str().unwrap();
        assert_eq!(title.chars().count(), 100);
        assert_eq!(props["Theme"]["select"]["name"], "General");
        assert_eq!(props["Status"]["select"]["name"], "To Read");
        assert_eq!(props["Summary"]["rich_text"][0]["text"]["content"], "abstract");
        assert_eq!(props["Key Findings"]["rich_text"][0]["text"]["content"], "hallucination\ncode review");
        // no pdf url: falls back to the landing page
        assert_eq!(props["PDF Link"]["url"], "http://arxiv.org/abs/2401.01234v1");
    }

    #[test]
    fn test_record_theme_wins_over_default() {
        let mut r = record();
        r.theme = Some("QA".to_string());
        r.paper.pdf_url = Some("http://arxiv.org/pdf/2401.01234v1.pdf".to_string());
        let props = page_properties(&r, &AppendMetadata::new("o", "g"), "n");
        assert_eq!(props["Theme"]["select"]["name"], "QA");
        assert_eq!(props["PDF Link"]["url"], "http://arxiv.org/pdf/2401.01234v1.pdf");
    }

    #[test]
    fn test_notes_truncate_gap() {
        let meta = AppendMetadata::new("Original Paper", "g".repeat(300));
        let notes = notes_text(&meta, "2026-01-01 09:00");
        assert!(notes.contains("Source Paper: Original Paper"));
        assert!(notes.contains(&format!("Addressing Gaps: {}...", "g".repeat(200))));
        assert!(notes.ends_with("Added: 2026-01-01 09:00"));
    }

    #[tokio::test]
    #[ignore = "Hits the live Notion API; needs NOTION_API_KEY and NOTION_DATABASE_ID"]
    async fn test_live_exists() {
        let key = std::env::var("NOTION_API_KEY").unwrap();
        let db = std::env::var("NOTION_DATABASE_ID").unwrap();
        let store = NotionStore::new(key, db).unwrap();
        store.exists("Attention Is All You Need").await.unwrap();
    }
}
