//! Prompt-in / text-out generation capability.

use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::backend::{LlmBackend, LlmError, LlmRequest};

lazy_static! {
    static ref JSON_OBJECT: Regex = Regex::new(r"(?s)\{.*\}").expect("valid regex");
}

/// Best-effort text generation. Callers must always have a fallback.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Adapts any `LlmBackend` into a single-turn `TextGenerator` with a fixed
/// output budget and temperature.
pub struct BackendGenerator {
    backend: Arc<dyn LlmBackend>,
    max_tokens: u32,
    temperature: f32,
}

impl BackendGenerator {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend, max_tokens: 300, temperature: 0.5 }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model_id(&self) -> &str {
        self.backend.model_id()
    }
}

#[async_trait]
impl TextGenerator for BackendGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let req = LlmRequest {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            ..LlmRequest::new(prompt)
        };
        let resp = self.backend.complete(req).await?;
        debug!(
            model = %resp.model,
            prompt_tokens = resp.prompt_tokens,
            completion_tokens = resp.completion_tokens,
            "LLM generation finished"
        );

        let text = resp.content.trim();
        if text.is_empty() {
            return Err(LlmError::Malformed("empty completion".to_string()));
        }
        Ok(text.to_string())
    }
}

/// Returns the outermost `{...}` span of a model reply, if any. Models tend to
/// wrap JSON answers in prose or code fences.
pub fn extract_json_object(text: &str) -> Option<&str> {
    JSON_OBJECT.find(text).map(|m| m.as_str())
}
