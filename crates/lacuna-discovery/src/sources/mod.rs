//! Bibliographic source adapters.

pub mod arxiv;
pub mod crossref;
pub mod europepmc;
pub mod ieee;
pub mod semantic_scholar;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lacuna_common::SandboxClient;
use serde::{Deserialize, Serialize};

use crate::error::{DiscoveryError, SourceError};
use crate::models::PaperRecord;

/// Common interface for all bibliographic sources.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable identifier, used as the key of the per-source status report.
    fn id(&self) -> &str;

    /// Runs one query and returns normalized records in the source's own order.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<PaperRecord>, SourceError>;
}

/// Which concrete adapter to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Arxiv,
    SemanticScholar,
    Ieee,
    CrossRef,
    EuropePmc,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Arxiv,
        SourceKind::SemanticScholar,
        SourceKind::Ieee,
        SourceKind::CrossRef,
        SourceKind::EuropePmc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Arxiv           => "arxiv",
            SourceKind::SemanticScholar => "semantic_scholar",
            SourceKind::Ieee            => "ieee",
            SourceKind::CrossRef        => "crossref",
            SourceKind::EuropePmc       => "europepmc",
        }
    }
}

impl FromStr for SourceKind {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| DiscoveryError::UnknownSource(s.to_string()))
    }
}

/// Connection settings for one source.
#[derive(Debug, Clone, Default)]
pub struct SourceSettings {
    /// Overrides the adapter's public endpoint.
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// HTTP client timeout; the aggregator applies its own per-request bound too.
    pub timeout: Option<Duration>,
}

impl SourceSettings {
    /// Sandboxed client with this source's timeout and base URL host allowed.
    pub(crate) fn client(&self) -> Result<SandboxClient, lacuna_common::LacunaError> {
        let mut client = match self.timeout {
            Some(t) => SandboxClient::with_timeout(t)?,
            None    => SandboxClient::new()?,
        };
        if let Some(base) = &self.base_url {
            client.allow_url(base)?;
        }
        Ok(client)
    }

    pub(crate) fn base_or(&self, default: &str) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }
}

/// Builds the adapter for `kind`. Sources whose mandatory key is missing are a
/// configuration error.
pub fn build_adapter(
    kind: SourceKind,
    settings: &SourceSettings,
) -> Result<Arc<dyn SourceAdapter>, DiscoveryError> {
    let adapter: Arc<dyn SourceAdapter> = match kind {
        SourceKind::Arxiv           => Arc::new(arxiv::ArxivClient::new(settings)?),
        SourceKind::SemanticScholar => Arc::new(semantic_scholar::SemanticScholarClient::new(settings)?),
        SourceKind::Ieee => {
            let key = settings
                .api_key
                .clone()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| DiscoveryError::MissingApiKey(kind.as_str().to_string()))?;
            Arc::new(ieee::IeeeXploreClient::new(settings, key)?)
        }
        SourceKind::CrossRef        => Arc::new(crossref::CrossRefClient::new(settings)?),
        SourceKind::EuropePmc       => Arc::new(europepmc::EuropePmcClient::new(settings)?),
    };
    Ok(adapter)
}

/// Sends a request and returns the body text, mapping non-2xx to `SourceError::Status`.
pub(crate) async fn fetch_text(req: reqwest::RequestBuilder) -> Result<String, SourceError> {
    let resp = req.send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(SourceError::Status(status.as_u16()));
    }
    Ok(resp.text().await?)
}

/// Like `fetch_text`, decoding the body as JSON.
pub(crate) async fn fetch_json(req: reqwest::RequestBuilder) -> Result<serde_json::Value, SourceError> {
    let body = fetch_text(req).await?;
    serde_json::from_str(&body).map_err(|e| SourceError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_round_trips_through_str() {
        for kind in SourceKind::ALL {
            assert_eq!(kind.as_str().parse::<SourceKind>().unwrap(), kind);
        }
        assert!(matches!(
            "scopus".parse::<SourceKind>(),
            Err(DiscoveryError::UnknownSource(_))
        ));
    }

    #[test]
    fn test_ieee_without_key_is_config_error() {
        let err = build_adapter(SourceKind::Ieee, &SourceSettings::default()).err();
        assert!(matches!(err, Some(DiscoveryError::MissingApiKey(ref s)) if s == "ieee"));
    }

    #[test]
    fn test_build_adapter_uses_kind_id() {
        for kind in [SourceKind::Arxiv, SourceKind::SemanticScholar, SourceKind::CrossRef, SourceKind::EuropePmc] {
            let adapter = tokio_test::assert_ok!(build_adapter(kind, &SourceSettings::default()));
            assert_eq!(adapter.id(), kind.as_str());
        }
        let keyed = SourceSettings { api_key: Some("k".into()), ..Default::default() };
        let ieee = tokio_test::assert_ok!(build_adapter(SourceKind::Ieee, &keyed));
        assert_eq!(ieee.id(), "ieee");
    }

    #[test]
    fn test_base_or_trims_trailing_slash() {
        let s = SourceSettings { base_url: Some("http://localhost:8080/".into()), ..Default::default() };
        assert_eq!(s.base_or("https://x"), "http://localhost:8080");
        assert_eq!(SourceSettings::default().base_or("https://x/"), "https://x");
    }
}
