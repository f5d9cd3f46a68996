//! Configuration loading for Lacuna.
//! Reads lacuna.toml from the current directory or the path in LACUNA_CONFIG.
//! Secrets left empty in the file are taken from the environment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_enabled_sources")]
    pub enabled: Vec<String>,
    #[serde(default = "default_per_source_limit")]
    pub per_source_limit: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_deadline")]
    pub deadline_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_sources(),
            per_source_limit: default_per_source_limit(),
            request_timeout_secs: default_request_timeout(),
            deadline_secs: default_deadline(),
        }
    }
}

fn default_enabled_sources() -> Vec<String> {
    vec!["arxiv".to_string(), "semantic_scholar".to_string()]
}
fn default_per_source_limit() -> usize { 3 }
fn default_request_timeout()  -> u64   { 20 }
fn default_deadline()         -> u64   { 45 }

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// none | anthropic | openai | openai_compatible | ollama
    #[serde(default = "default_llm_backend")]
    pub backend: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Delegate candidate ranking to the model.
    #[serde(default)]
    pub rerank: bool,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: default_llm_backend(),
            model: None,
            base_url: None,
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            rerank: false,
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_llm_backend() -> String { "none".to_string() }
fn default_max_tokens()  -> u32    { 300 }
fn default_temperature() -> f32    { 0.5 }
fn default_llm_timeout() -> u64    { 30 }

impl LlmConfig {
    pub fn model_or_default(&self) -> String {
        if let Some(m) = self.model.as_ref().filter(|m| !m.trim().is_empty()) {
            return m.clone();
        }
        match self.backend.as_str() {
            "anthropic" => "claude-3-5-haiku-latest",
            "openai"    => "gpt-4o-mini",
            _           => "llama3:8b",
        }
        .to_string()
    }

    /// Ollama and OpenAI-compatible servers default to a local endpoint.
    pub fn base_url_or_default(&self) -> String {
        self.base_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| match self.backend.as_str() {
                "ollama" => "http://localhost:11434".to_string(),
                _        => "http://localhost:8000".to_string(),
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub database_id: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_notion_version")]
    pub notion_version: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { database_id: None, api_key: None, notion_version: default_notion_version() }
    }
}

fn default_notion_version() -> String { "2022-06-28".to_string() }

impl StoreConfig {
    /// Both the database id and the key are needed to talk to Notion.
    pub fn credentials(&self) -> Option<(String, String)> {
        Some((self.api_key.clone()?, self.database_id.clone()?))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default = "default_themes")]
    pub themes: Vec<String>,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self { themes: default_themes(), fetch_timeout_secs: default_fetch_timeout() }
    }
}

fn default_themes() -> Vec<String> {
    lacuna_discovery::enrich::DEFAULT_THEMES.iter().map(|t| t.to_string()).collect()
}
fn default_fetch_timeout() -> u64 { 30 }


/// Environment variables consulted when a secret is missing from the file.
const SOURCE_KEY_VARS: &[(&str, &str)] = &[
    ("semantic_scholar", "SEMANTIC_SCHOLAR_API_KEY"),
    ("ieee", "IEEE_API_KEY"),
];

impl Config {
    /// Load configuration from lacuna.toml.
    /// Checks LACUNA_CONFIG env var first, then current directory. A missing
    /// default file yields the built-in defaults; a missing explicit path is an error.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let from_env = std::env::var("LACUNA_CONFIG").ok();
        let path = explicit
            .map(|p| p.to_string_lossy().into_owned())
            .or(from_env.clone())
            .unwrap_or_else(|| "lacuna.toml".to_string());

        let mut config = if Path::new(&path).exists() {
            let content = std::fs::read_to_string(&path)?;
            Self::from_toml(&content)?
        } else if explicit.is_some() || from_env.is_some() {
            anyhow::bail!(
                "Config file not found: {}\n\
                 Copy lacuna.example.toml to lacuna.toml and edit it.",
                path
            );
        } else {
            tracing::info!("No {path} found, using built-in defaults");
            Config::default()
        };

        config.apply_env(|var| std::env::var(var).ok());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Fills secrets the file left empty from `lookup` (the process
    /// environment outside of tests).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        for &(source, var) in SOURCE_KEY_VARS {
            let entry = self.sources.entry(source.to_string()).or_default();
            if is_blank(&entry.api_key) {
                if let Some(key) = lookup(var) {
                    entry.api_key = Some(key);
                }
            }
        }

        if is_blank(&self.llm.api_key) {
            let var = match self.llm.backend.as_str() {
                "anthropic" => Some("ANTHROPIC_API_KEY"),
                "openai" | "openai_compatible" => Some("OPENAI_API_KEY"),
                _ => None,
            };
            if let Some(key) = var.and_then(|v| lookup(v)) {
                self.llm.api_key = Some(key);
            }
        }

        if is_blank(&self.store.api_key) {
            self.store.api_key = lookup("NOTION_API_KEY");
        }
        if is_blank(&self.store.database_id) {
            self.store.database_id = lookup("NOTION_DATABASE_ID");
        }
    }

    pub fn source(&self, id: &str) -> SourceConfig {
        self.sources.get(id).cloned().unwrap_or_default()
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}
