//! LLM provider backends.
//!
//! Two wire shapes cover every supported provider:
//!   ChatCompletionsBackend: `/v1/chat/completions` (OpenAI, Ollama, LMStudio,
//!                           vLLM, OpenRouter and other compatible servers)
//!   AnthropicBackend:       Anthropic Messages API (claude-*)
//!
//! All requests go through `SandboxClient`, so every call is bounded by the
//! client's request timeout and limited to allowlisted hosts.

use async_trait::async_trait;
use lacuna_common::{LacunaError, SandboxClient};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),
    #[error("LLM request timed out")]
    Timeout,
    #[error("Sandbox rejected LLM endpoint: {0}")]
    Sandbox(#[from] LacunaError),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("API error [{status}]: {message}")]
    ApiError { status: u16, message: String },
    #[error("Unusable model output: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Http(e)
        }
    }
}

// ── Request / Response ────────────────────────────────────────────────────────

/// One single-turn completion: an optional system prompt and one user prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { system: None, prompt: prompt.into(), max_tokens: 300, temperature: 0.5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

// ── Trait ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError>;
    fn model_id(&self) -> &str;
}

/// Reads the body and turns 4xx/5xx into `ApiError`, keeping the provider's message.
async fn read_json(resp: reqwest::Response) -> Result<Value, LlmError> {
    let status = resp.status().as_u16();
    let text = resp.text().await?;
    let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
    if status >= 400 {
        let message = body["error"]["message"]
            .as_str()
            .or_else(|| body["message"].as_str())
            .map(str::to_string)
            .unwrap_or_else(|| text.chars().take(200).collect());
        return Err(LlmError::ApiError { status, message });
    }
    if body.is_null() {
        return Err(LlmError::Malformed(format!("non-JSON reply: {}", text.chars().take(200).collect::<String>())));
    }
    Ok(body)
}

fn token_count(v: &Value) -> u32 {
    v.as_u64().unwrap_or(0) as u32
}

// ── Chat completions (OpenAI and compatible servers) ─────────────────────────

pub struct ChatCompletionsBackend {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    client: SandboxClient,
}

impl ChatCompletionsBackend {
    /// The hosted OpenAI API.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>, client: SandboxClient) -> Self {
        Self {
            endpoint: OPENAI_CHAT_URL.to_string(),
            model: model.into(),
            api_key: Some(api_key.into()),
            client,
        }
    }

    /// Any server exposing `{base_url}/v1/chat/completions`. The base URL's
    /// host is added to the client's allowlist.
    pub fn compatible(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<String>,
        mut client: SandboxClient,
    ) -> Result<Self, LlmError> {
        client.allow_url(base_url)?;
        Ok(Self {
            endpoint: format!("{}/v1/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
            api_key,
            client,
        })
    }

    /// A local Ollama server through its OpenAI-compatible endpoint.
    pub fn ollama(base_url: &str, model: impl Into<String>, client: SandboxClient) -> Result<Self, LlmError> {
        Self::compatible(base_url, model, None, client)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn body(&self, req: &LlmRequest) -> Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &req.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": req.prompt}));
        json!({
            "model":       self.model,
            "messages":    messages,
            "max_tokens":  req.max_tokens,
            "temperature": req.temperature,
        })
    }

    fn parse(&self, json: &Value) -> LlmResponse {
        LlmResponse {
            content: json["choices"][0]["message"]["content"].as_str().unwrap_or("").to_string(),
            model: json["model"].as_str().unwrap_or(&self.model).to_string(),
            prompt_tokens: token_count(&json["usage"]["prompt_tokens"]),
            completion_tokens: token_count(&json["usage"]["completion_tokens"]),
        }
    }
}

#[async_trait]
impl LlmBackend for ChatCompletionsBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let mut builder = self.client.post(&self.endpoint)?.json(&self.body(&req));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let json = read_json(builder.send().await?).await?;
        Ok(self.parse(&json))
    }

    fn model_id(&self) -> &str { &self.model }
}

// ── Anthropic Messages API ────────────────────────────────────────────────────

pub struct AnthropicBackend {
    model: String,
    api_key: String,
    client: SandboxClient,
}

impl AnthropicBackend {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, client: SandboxClient) -> Self {
        Self { api_key: api_key.into(), model: model.into(), client }
    }

    fn body(&self, req: &LlmRequest) -> Value {
        // system prompt is a top-level field here
        let mut body = json!({
            "model":       self.model,
            "messages":    [{"role": "user", "content": req.prompt}],
            "max_tokens":  req.max_tokens,
            "temperature": req.temperature,
        });
        if let Some(system) = req.system.as_ref().filter(|s| !s.is_empty()) {
            body["system"] = Value::String(system.clone());
        }
        body
    }

    fn parse(&self, json: &Value) -> LlmResponse {
        let content = json["content"]
            .as_array()
            .into_iter()
            .flatten()
            .filter(|b| b["type"].as_str().map_or(true, |t| t == "text"))
            .filter_map(|b| b["text"].as_str())
            .collect::<Vec<_>>()
            .join("");
        LlmResponse {
            content,
            model: json["model"].as_str().unwrap_or(&self.model).to_string(),
            prompt_tokens: token_count(&json["usage"]["input_tokens"]),
            completion_tokens: token_count(&json["usage"]["output_tokens"]),
        }
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let resp = self
            .client
            .post(ANTHROPIC_MESSAGES_URL)?
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.body(&req))
            .send()
            .await?;
        let json = read_json(resp).await?;
        Ok(self.parse(&json))
    }

    fn model_id(&self) -> &str { &self.model }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn client() -> SandboxClient {
        SandboxClient::new().unwrap()
    }

    #[test]
    fn test_compatible_endpoint_and_allowlist() {
        let b = ChatCompletionsBackend::compatible("https://llm.internal.example/", "mistral", None, client()).unwrap();
        assert_eq!(b.endpoint(), "https://llm.internal.example/v1/chat/completions");
        assert_eq!(b.model_id(), "mistral");
        assert!(b.client.is_allowed(b.endpoint()));
    }

    #[test]
    fn test_compatible_rejects_bad_base_url() {
        let result = ChatCompletionsBackend::ollama("localhost:11434", "llama3:8b", client());
        assert!(matches!(result, Err(LlmError::Sandbox(_))));
    }

    #[test]
    fn test_chat_body_places_system_first() {
        let b = ChatCompletionsBackend::openai("sk-test", "gpt-4o-mini", client());
        let req = LlmRequest { system: Some("Be terse.".to_string()), ..LlmRequest::new("hi") };
        let body = b.body(&req);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["max_tokens"], 300);

        let body = b.body(&LlmRequest::new("hi"));
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_chat_parse_falls_back_to_configured_model() {
        let b = ChatCompletionsBackend::openai("sk-test", "llama3:8b", client());
        let json = json!({
            "choices": [{ "message": { "content": "query one\nquery two" } }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 7 }
        });
        let resp = b.parse(&json);
        assert_eq!(resp.content, "query one\nquery two");
        assert_eq!(resp.model, "llama3:8b");
        assert_eq!(resp.prompt_tokens, 12);
        assert_eq!(resp.completion_tokens, 7);
    }

    #[test]
    fn test_anthropic_body_and_text_blocks() {
        let b = AnthropicBackend::new("sk-ant-test", "claude-3-5-haiku-latest", client());
        let req = LlmRequest { system: Some("Rank papers.".to_string()), ..LlmRequest::new("1. A") };
        let body = b.body(&req);
        assert_eq!(body["system"], "Rank papers.");
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(b.body(&LlmRequest::new("x")).get("system").is_none());

        let reply = json!({
            "content": [{"type": "text", "text": "2, "}, {"type": "text", "text": "1"}],
            "usage": {"input_tokens": 40, "output_tokens": 3}
        });
        let resp = b.parse(&reply);
        assert_eq!(resp.content, "2, 1");
        assert_eq!(resp.model, "claude-3-5-haiku-latest");
        assert_eq!(resp.prompt_tokens, 40);
    }

    #[tokio::test]
    async fn test_stalled_server_times_out() {
        // Accepts connections but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = SandboxClient::with_timeout(Duration::from_millis(200)).unwrap();
        let backend = ChatCompletionsBackend::compatible(&format!("http://{addr}"), "m", None, client).unwrap();

        let started = Instant::now();
        let result = backend.complete(LlmRequest::new("hello")).await;
        assert!(matches!(result, Err(LlmError::Timeout)), "{result:?}");
        assert!(started.elapsed() < Duration::from_secs(5));
        server.abort();
    }
}
