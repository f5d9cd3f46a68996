//! Europe PMC REST API client.
//!
//! Endpoint: https://www.ebi.ac.uk/europepmc/webservices/rest/search

use async_trait::async_trait;
use lacuna_common::SandboxClient as Client;
use tracing::{debug, instrument};

use crate::error::SourceError;
use crate::models::{normalize_whitespace, PaperRecord};
use super::{fetch_json, SourceAdapter, SourceSettings};

const EPMC_API_URL: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest";
const SOURCE_ID: &str = "europepmc";

pub struct EuropePmcClient {
    client: Client,
    base: String,
}

impl EuropePmcClient {
    pub fn new(settings: &SourceSettings) -> Result<Self, lacuna_common::LacunaError> {
        Ok(Self {
            client: settings.client()?,
            base: settings.base_or(EPMC_API_URL),
        })
    }
}

#[async_trait]
impl SourceAdapter for EuropePmcClient {
    fn id(&self) -> &str { SOURCE_ID }

    #[instrument(skip(self))]
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<PaperRecord>, SourceError> {
        let url = format!("{}/search", self.base);
        let page_size = limit.to_string();
        let params = [
            ("query", query),
            ("resultType", "core"),
            ("pageSize", page_size.as_str()),
            ("format", "json"),
        ];

        let resp = fetch_json(self.client.get(&url)?.query(&params)).await?;
        let results = resp["resultList"]["result"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        debug!(count = results.len(), "Europe PMC search returned results");

        Ok(results.iter().filter_map(result_to_paper).collect())
    }
}

fn result_to_paper(r: &serde_json::Value) -> Option<PaperRecord> {
    let mut paper = PaperRecord::try_new(r["title"].as_str()?, SOURCE_ID)?;

    paper.authors = r["authorList"]["author"]
        .as_array()
        .unwrap_or(&vec![])
        .iter()
        .filter_map(|a| a["fullName"].as_str().map(String::from))
        .collect();

    // Fall back to the flat "Doe J, Roe R." string of lite results
    if paper.authors.is_empty() {
        if let Some(s) = r["authorString"].as_str() {
            paper.authors = s
                .trim_end_matches('.')
                .split(", ")
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(String::from)
                .collect();
        }
    }

    paper.date = r["firstPublicationDate"]
        .as_str()
        .or_else(|| r["pubYear"].as_str())
        .unwrap_or("")
        .to_string();
    paper.abstract_text = r["abstractText"]
        .as_str()
        .map(strip_markup)
        .unwrap_or_default();

    paper.url = match (r["doi"].as_str(), r["source"].as_str(), r["id"].as_str()) {
        (Some(doi), _, _) => format!("https://doi.org/{doi}"),
        (None, Some(src), Some(id)) => format!("https://europepmc.org/article/{src}/{id}"),
        _ => String::new(),
    };

    paper.pdf_url = r["fullTextUrlList"]["fullTextUrl"]
        .as_array()
        .and_then(|urls| {
            urls.iter()
                .find(|u| u["documentStyle"].as_str() == Some("pdf"))
                .and_then(|u| u["url"].as_str())
                .map(String::from)
        });

    paper.relevance_score = r["citedByCount"].as_f64().unwrap_or(0.0);
    Some(paper)
}

/// Europe PMC abstracts carry inline HTML (`<i>`, `<sup>`, `<h4>`).
fn strip_markup(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_tag = false;
    for c in raw.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    normalize_whitespace(&out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_to_paper() {
        let r = serde_json::json!({
            "id": "38000001",
            "source": "MED",
            "doi": "10.1000/epmc",
            "title": "Hallucination in Clinical Summaries.",
            "authorList": { "author": [{ "fullName": "Doe J" }, { "fullName": "Roe R" }] },
            "firstPublicationDate": "2023-11-20",
            "abstractText": "<h4>Background</h4>Models <i>hallucinate</i>.",
            "citedByCount": 5,
            "fullTextUrlList": { "fullTextUrl": [
                { "documentStyle": "html", "url": "https://europepmc.org/abstract/MED/38000001" },
                { "documentStyle": "pdf", "url": "https://europepmc.org/articles/PMC1/pdf" }
            ]}
        });
        let p = result_to_paper(&r).unwrap();
        assert_eq!(p.authors, vec!["Doe J", "Roe R"]);
        assert_eq!(p.date, "2023-11-20");
        assert_eq!(p.abstract_text, "Background Models hallucinate .");
        assert_eq!(p.url, "https://doi.org/10.1000/epmc");
        assert_eq!(p.pdf_url.as_deref(), Some("https://europepmc.org/articles/PMC1/pdf"));
        assert_eq!(p.relevance_score, 5.0);
    }

    #[test]
    fn test_lite_result_without_doi() {
        let r = serde_json::json!({
            "id": "PPR12",
            "source": "PPR",
            "title": "Preprint",
            "authorString": "Doe J, Roe R.",
            "pubYear": "2024"
        });
        let p = result_to_paper(&r).unwrap();
        assert_eq!(p.url, "https://europepmc.org/article/PPR/PPR12");
        assert_eq!(p.authors, vec!["Doe J", "Roe R"]);
        assert_eq!(p.date, "2024");
        assert!(p.pdf_url.is_none());
    }

    #[test]
    fn test_result_without_title_is_skipped() {
        assert!(result_to_paper(&serde_json::json!({ "id": "1" })).is_none());
    }
}
