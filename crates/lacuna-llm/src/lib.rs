//! lacuna-llm — LLM backend abstraction layer.
//!
//! `LlmBackend` is the provider-level chat interface; `TextGenerator` is the
//! narrow prompt-in/text-out capability the discovery pipeline consumes.

pub mod backend;
pub mod generator;

pub use backend::{AnthropicBackend, ChatCompletionsBackend, LlmBackend, LlmError, LlmRequest, LlmResponse};
pub use generator::{extract_json_object, BackendGenerator, TextGenerator};
