//! arXiv API client.
//!
//! Endpoint: http://export.arxiv.org/api/query
//! Responses are Atom feeds; fields are read by local element name so the
//! `atom:`/`arxiv:` namespace prefixes do not matter.

use async_trait::async_trait;
use lacuna_common::SandboxClient as Client;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, instrument, warn};

use crate::error::SourceError;
use crate::models::{normalize_whitespace, truncate_chars, PaperRecord};
use super::{fetch_text, SourceAdapter, SourceSettings};

const ARXIV_API_URL: &str = "http://export.arxiv.org/api";
const SOURCE_ID: &str = "arxiv";

pub struct ArxivClient {
    client: Client,
    base: String,
}

impl ArxivClient {
    pub fn new(settings: &SourceSettings) -> Result<Self, lacuna_common::LacunaError> {
        Ok(Self {
            client: settings.client()?,
            base: settings.base_or(ARXIV_API_URL),
        })
    }
}

#[async_trait]
impl SourceAdapter for ArxivClient {
    fn id(&self) -> &str { SOURCE_ID }

    #[instrument(skip(self))]
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<PaperRecord>, SourceError> {
        let url = format!("{}/query", self.base);
        let params = [
            ("search_query", format!("all:{query}")),
            ("start", "0".to_string()),
            ("max_results", limit.to_string()),
            ("sortBy", "relevance".to_string()),
        ];

        let xml = fetch_text(self.client.get(&url)?.query(&params)).await?;
        let papers = parse_arxiv_feed(&xml)?;
        debug!(count = papers.len(), "arXiv search returned entries");
        Ok(papers)
    }
}

/// Field of an `<entry>` currently receiving text.
#[derive(Clone, Copy, PartialEq)]
enum Field {
    None,
    Id,
    Title,
    Summary,
    Published,
    AuthorName,
}

#[derive(Default)]
struct EntryAccum {
    id: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<String>,
    author_name: String,
    pdf_href: Option<String>,
}

impl EntryAccum {
    fn field_mut(&mut self, field: Field) -> Option<&mut String> {
        match field {
            Field::Id         => Some(&mut self.id),
            Field::Title      => Some(&mut self.title),
            Field::Summary    => Some(&mut self.summary),
            Field::Published  => Some(&mut self.published),
            Field::AuthorName => Some(&mut self.author_name),
            Field::None       => None,
        }
    }

    fn into_paper(self) -> Option<PaperRecord> {
        let url = self.id.trim().to_string();
        if url.is_empty() {
            return None;
        }
        let mut paper = PaperRecord::try_new(&self.title, SOURCE_ID)?;
        paper.pdf_url = Some(self.pdf_href.unwrap_or_else(|| pdf_url_for(&url)));
        paper.url = url;
        paper.abstract_text = normalize_whitespace(&self.summary);
        paper.date = truncate_chars(self.published.trim(), 10);
        paper.authors = self.authors;
        Some(paper)
    }
}

/// `http://arxiv.org/abs/2401.00001v1` → `http://arxiv.org/pdf/2401.00001v1.pdf`
pub(crate) fn pdf_url_for(abs_url: &str) -> String {
    format!("{}.pdf", abs_url.replace("/abs/", "/pdf/"))
}

fn pdf_link(e: &BytesStart<'_>) -> Option<String> {
    let mut title = None;
    let mut href = None;
    for attr in e.attributes().flatten() {
        let value = attr.unescape_value().ok()?.to_string();
        match attr.key.local_name().as_ref() {
            b"title" => title = Some(value),
            b"href"  => href = Some(value),
            _ => {}
        }
    }
    if title.as_deref() == Some("pdf") { href } else { None }
}

/// Parse an arXiv Atom feed into `PaperRecord`s, skipping entries without a
/// title or id.
pub fn parse_arxiv_feed(xml: &str) -> Result<Vec<PaperRecord>, SourceError> {
    let mut papers = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut current: Option<EntryAccum> = None;
    let mut field = Field::None;
    let mut in_author = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                match e.local_name().as_ref() {
                    b"entry" => current = Some(EntryAccum::default()),
                    b"author" if current.is_some() => {
                        in_author = true;
                        if let Some(entry) = current.as_mut() {
                            entry.author_name.clear();
                        }
                    }
                    b"name" if in_author      => field = Field::AuthorName,
                    b"id" if current.is_some() => field = Field::Id,
                    b"title" if current.is_some() => field = Field::Title,
                    b"summary" if current.is_some() => field = Field::Summary,
                    b"published" if current.is_some() => field = Field::Published,
                    b"link" => {
                        if let (Some(entry), Some(href)) = (current.as_mut(), pdf_link(e)) {
                            entry.pdf_href = Some(href);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"link" {
                    if let (Some(entry), Some(href)) = (current.as_mut(), pdf_link(e)) {
                        entry.pdf_href = Some(href);
                    }
                }
            }
            Ok(Event::Text(ref e)) => {
                if let Some(target) = current.as_mut().and_then(|entry| entry.field_mut(field)) {
                    let text = e
                        .unescape()
                        .map_err(|err| SourceError::Parse(format!("arXiv feed text: {err}")))?;
                    if !target.is_empty() {
                        target.push(' ');
                    }
                    target.push_str(&text);
                }
            }
            Ok(Event::End(ref e)) => {
                match e.local_name().as_ref() {
                    b"author" => {
                        if let Some(entry) = current.as_mut() {
                            let name = normalize_whitespace(&entry.author_name);
                            if !name.is_empty() {
                                entry.authors.push(name);
                            }
                        }
                        in_author = false;
                    }
                    b"entry" => {
                        if let Some(entry) = current.take() {
                            match entry.into_paper() {
                                Some(p) => papers.push(p),
                                None => warn!("Skipping arXiv entry without title or id"),
                            }
                        }
                    }
                    _ => {}
                }
                field = Field::None;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SourceError::Parse(format!("arXiv feed: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    Ok(papers)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title type="html">ArXiv Query: search_query=all:hallucination</title>
  <id>http://arxiv.org/api/abc</id>
  <entry>
    <id>http://arxiv.org/abs/2401.01234v1</id>
    <published>2024-01-03T18:59:59Z</published>
    <title>Detecting Hallucinations
      in LLM Code Review</title>
    <summary>  We study hallucinations &amp; their detection.
    </summary>
    <author><name>Ada Lovelace</name></author>
    <author><name>Alan Turing</name><arxiv:affiliation>Bletchley</arxiv:affiliation></author>
    <link href="http://arxiv.org/abs/2401.01234v1" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2401.01234v1" rel="related" type="application/pdf"/>
    <arxiv:primary_category term="cs.SE" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2402.00002v2</id>
    <published>2024-02-01T00:00:00Z</published>
    <title>Second Paper</title>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2402.00003v1</id>
    <title>   </title>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed_entries() {
        let papers = parse_arxiv_feed(FEED).unwrap();
        assert_eq!(papers.len(), 2);

        let p = &papers[0];
        assert_eq!(p.title, "Detecting Hallucinations in LLM Code Review");
        assert_eq!(p.abstract_text, "We study hallucinations & their detection.");
        assert_eq!(p.url, "http://arxiv.org/abs/2401.01234v1");
        assert_eq!(p.pdf_url.as_deref(), Some("http://arxiv.org/pdf/2401.01234v1"));
        assert_eq!(p.date, "2024-01-03");
        assert_eq!(p.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert_eq!(p.source, "arxiv");
        assert_eq!(p.relevance_score, 0.0);
    }

    #[test]
    fn test_feed_title_does_not_leak_into_entries() {
        let papers = parse_arxiv_feed(FEED).unwrap();
        assert!(papers.iter().all(|p| !p.title.starts_with("ArXiv Query")));
    }

    #[test]
    fn test_missing_pdf_link_is_derived_from_abs_url() {
        let papers = parse_arxiv_feed(FEED).unwrap();
        assert_eq!(
            papers[1].pdf_url.as_deref(),
            Some("http://arxiv.org/pdf/2402.00002v2.pdf")
        );
        assert!(papers[1].authors.is_empty());
        assert_eq!(papers[1].abstract_text, "");
    }

    #[test]
    fn test_empty_feed() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>none</title></feed>"#;
        assert!(parse_arxiv_feed(xml).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_feed_is_parse_error() {
        let xml = "<feed><entry><title>Broken</entry></feed>";
        assert!(matches!(parse_arxiv_feed(xml), Err(SourceError::Parse(_))));
    }

    #[tokio::test]
    #[ignore = "Hits the live arXiv API"]
    async fn test_live_search() {
        let client = ArxivClient::new(&SourceSettings::default()).unwrap();
        let papers = client.search("hallucination detection", 3).await.unwrap();
        assert!(!papers.is_empty());
    }
}
