use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;
use crate::error::LacunaError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("lacuna/", env!("CARGO_PKG_VERSION"));

/// Default hosts every Lacuna component may reach: bibliographic APIs, the
/// publisher pages enrichment parses, the knowledge store and LLM providers.
const DEFAULT_DOMAINS: &[&str] = &[
    "export.arxiv.org",        // arXiv API
    "arxiv.org",               // arXiv abstract pages
    "api.semanticscholar.org", // Semantic Scholar
    "www.semanticscholar.org",
    "ieeexploreapi.ieee.org",  // IEEE Xplore API
    "ieeexplore.ieee.org",
    "api.crossref.org",        // CrossRef
    "doi.org",
    "www.ebi.ac.uk",           // Europe PMC
    "europepmc.org",
    "dl.acm.org",
    "link.springer.com",
    "openreview.net",
    "aclanthology.org",
    "api.notion.com",          // Knowledge store
    "api.anthropic.com",       // Anthropic LLMs
    "api.openai.com",          // OpenAI LLMs
    "localhost",               // Ollama local
    "127.0.0.1",
];

/// An HTTP client that only allows requests to approved domains.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl SandboxClient {
    /// Creates a client with the default allowlist and a 30s request timeout.
    pub fn new() -> Result<Self, LacunaError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Creates a client with the default allowlist and a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, LacunaError> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        let allowlist = DEFAULT_DOMAINS.iter().map(|d| d.to_string()).collect();
        Ok(Self { client, allowlist })
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_ascii_lowercase());
    }

    /// Appends the host of `url` to the allowlist, e.g. for a configured base URL.
    pub fn allow_url(&mut self, url: &str) -> Result<(), LacunaError> {
        let parsed = Url::parse(url).map_err(|e| LacunaError::InvalidUrl(format!("{url}: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| LacunaError::InvalidUrl(format!("{url}: no host")))?;
        self.allow_domain(host);
        Ok(())
    }

    /// Validates if a URL is permitted under the current sandbox policy.
    pub fn is_allowed(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else { return false };
        let Some(host) = parsed.host_str() else { return false };
        self.allowlist
            .iter()
            .any(|allowed| host == allowed || host.ends_with(&format!(".{allowed}")))
    }

    fn check(&self, url: &str) -> Result<(), LacunaError> {
        if self.is_allowed(url) {
            Ok(())
        } else {
            tracing::warn!(url, "Blocked request to domain outside the allowlist");
            Err(LacunaError::SecurityError(format!(
                "domain not in allowlist for URL {url}"
            )))
        }
    }

    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, LacunaError> {
        self.check(url)?;
        Ok(self.client.get(url))
    }

    pub fn post(&self, url: &str) -> Result<reqwest::RequestBuilder, LacunaError> {
        self.check(url)?;
        Ok(self.client.post(url))
    }
}
