//! CrossRef works search client.
//!
//! API: https://api.crossref.org/works?query=...
//! Polite pool: set User-Agent with mailto (see CrossRef etiquette)

use async_trait::async_trait;
use lacuna_common::SandboxClient as Client;
use tracing::{debug, instrument};

use crate::error::SourceError;
use crate::models::{normalize_whitespace, PaperRecord};
use super::{fetch_json, SourceAdapter, SourceSettings};

const CR_API_URL: &str = "https://api.crossref.org";
const CR_SELECT:  &str = "DOI,URL,title,abstract,author,published,issued,link,is-referenced-by-count";
const SOURCE_ID:  &str = "crossref";

pub struct CrossRefClient {
    client: Client,
    base: String,
    mailto: Option<String>,
}

impl CrossRefClient {
    pub fn new(settings: &SourceSettings) -> Result<Self, lacuna_common::LacunaError> {
        Ok(Self {
            client: settings.client()?,
            base: settings.base_or(CR_API_URL),
            // CrossRef has no keys; the configured value is the polite-pool contact
            mailto: settings.api_key.clone().filter(|m| m.contains('@')),
        })
    }
}

#[async_trait]
impl SourceAdapter for CrossRefClient {
    fn id(&self) -> &str { SOURCE_ID }

    #[instrument(skip(self))]
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<PaperRecord>, SourceError> {
        let url = format!("{}/works", self.base);
        let rows = limit.to_string();
        let mut params = vec![
            ("query", query),
            ("rows", rows.as_str()),
            ("select", CR_SELECT),
        ];
        if let Some(mailto) = &self.mailto {
            params.push(("mailto", mailto.as_str()));
        }

        let resp = fetch_json(self.client.get(&url)?.query(&params)).await?;
        let works = resp["message"]["items"].as_array().cloned().unwrap_or_default();
        debug!(n = works.len(), "CrossRef search results");

        Ok(works.iter().filter_map(work_to_paper).collect())
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────

fn work_to_paper(work: &serde_json::Value) -> Option<PaperRecord> {
    let title = work["title"]
        .as_array()
        .and_then(|t| t.first())
        .and_then(|t| t.as_str())?;
    let mut paper = PaperRecord::try_new(title, SOURCE_ID)?;

    paper.abstract_text = work["abstract"].as_str().map(strip_jats).unwrap_or_default();

    paper.authors = work["author"]
        .as_array()
        .unwrap_or(&vec![])
        .iter()
        .filter_map(|a| {
            let given  = a["given"].as_str().unwrap_or("").trim();
            let family = a["family"].as_str().unwrap_or("").trim();
            let name = match (given.is_empty(), family.is_empty()) {
                (_, true) => a["name"].as_str()?.trim().to_string(),
                (true, false) => family.to_string(),
                (false, false) => format!("{given} {family}"),
            };
            (!name.is_empty()).then_some(name)
        })
        .collect();

    paper.date = date_parts(&work["published"])
        .or_else(|| date_parts(&work["issued"]))
        .unwrap_or_default();

    let doi = work["DOI"].as_str();
    paper.url = work["URL"]
        .as_str()
        .map(String::from)
        .or_else(|| doi.map(|d| format!("https://doi.org/{d}")))
        .unwrap_or_default();

    paper.pdf_url = work["link"].as_array().and_then(|links| {
        links.iter()
            .find(|l| l["content-type"].as_str() == Some("application/pdf"))
            .and_then(|l| l["URL"].as_str())
            .map(String::from)
    });

    paper.relevance_score = work["is-referenced-by-count"].as_f64().unwrap_or(0.0);
    Some(paper)
}

/// `{"date-parts": [[2024, 6, 1]]}` → `2024-06-01`; shorter forms keep their precision.
fn date_parts(value: &serde_json::Value) -> Option<String> {
    let parts = value["date-parts"].as_array()?.first()?.as_array()?;
    let year = parts.first()?.as_u64()?;
    let rest: Vec<String> = parts[1..]
        .iter()
        .filter_map(|p| p.as_u64())
        .map(|p| format!("{p:02}"))
        .collect();
    Some(std::iter::once(year.to_string()).chain(rest).collect::<Vec<_>>().join("-"))
}

/// CrossRef returns JATS XML snippets in abstracts.
fn strip_jats(raw: &str) -> String {
    let cleaned = raw
        .replace("<jats:title>Abstract</jats:title>", "")
        .replace("<jats:p>", "").replace("</jats:p>", "\n")
        .replace("<jats:italic>", "").replace("</jats:italic>", "")
        .replace("<jats:bold>", "").replace("</jats:bold>", "")
        .replace("<jats:sub>", "").replace("</jats:sub>", "")
        .replace("<jats:sup>", "").replace("</jats:sup>", "");
    normalize_whitespace(&cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_to_paper_minimal() {
        let work = serde_json::json!({
            "DOI": "10.1000/test",
            "URL": "http://dx.doi.org/10.1000/test",
            "title": ["Test Paper Title"],
            "abstract": "<jats:p>Test abstract.</jats:p>",
            "author": [{ "given": "Jane", "family": "Doe" }, { "family": "Solo" }],
            "published": { "date-parts": [[2024, 6, 1]] },
            "is-referenced-by-count": 7
        });
        let p = work_to_paper(&work).unwrap();
        assert_eq!(p.title, "Test Paper Title");
        assert_eq!(p.abstract_text, "Test abstract.");
        assert_eq!(p.authors, vec!["Jane Doe", "Solo"]);
        assert_eq!(p.date, "2024-06-01");
        assert_eq!(p.url, "http://dx.doi.org/10.1000/test");
        assert_eq!(p.relevance_score, 7.0);
        assert_eq!(p.source, "crossref");
    }

    #[test]
    fn test_url_falls_back_to_doi_and_year_only_date() {
        let work = serde_json::json!({
            "DOI": "10.1000/xyz",
            "title": ["Year Only"],
            "issued": { "date-parts": [[2019]] },
            "link": [
                { "URL": "https://pub.example/x.xml", "content-type": "text/xml" },
                { "URL": "https://pub.example/x.pdf", "content-type": "application/pdf" }
            ]
        });
        let p = work_to_paper(&work).unwrap();
        assert_eq!(p.url, "https://doi.org/10.1000/xyz");
        assert_eq!(p.date, "2019");
        assert_eq!(p.pdf_url.as_deref(), Some("https://pub.example/x.pdf"));
    }

    #[test]
    fn test_untitled_work_is_skipped() {
        assert!(work_to_paper(&serde_json::json!({ "DOI": "10.1/x", "title": [] })).is_none());
    }

    #[test]
    fn test_jats_tag_stripping() {
        let raw = "<jats:p>Hello <jats:italic>world</jats:italic>.</jats:p>";
        assert_eq!(strip_jats(raw), "Hello world.");
    }
}
