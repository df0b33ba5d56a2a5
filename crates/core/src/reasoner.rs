//! Reasoner trait: the abstraction over the natural-language reasoning backend.
//!
//! A Reasoner takes a fully rendered prompt and returns raw text. It has no
//! knowledge of stages, retries or validation; the pipeline owns all of that.
//!
//! Implementations: OpenAI-compatible chat completions (OpenRouter, OpenAI,
//! Gemini, Ollama) and scripted stand-ins for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ProviderError;
use crate::schema::Schema;

/// A single reasoning request for one attempt of one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningRequest {
    /// The stage issuing this request (e.g., "identity")
    pub stage: String,

    /// The rendered prompt
    pub prompt: String,

    /// The output schema the response will be validated against
    pub schema: Schema,

    /// 1-based attempt number
    pub attempt: u32,
}

/// Raw reasoning output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningResponse {
    /// The raw text produced by the backend
    pub content: String,

    /// Which model actually responded
    pub model: String,

    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ReasoningResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: String::new(),
            usage: None,
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Reasoner trait.
///
/// The orchestrator calls `infer()` without knowing which backend is behind
/// it, and bounds every call with its own timeout.
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// A human-readable name for this backend (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Produce raw text for a prompt.
    async fn infer(&self, request: ReasoningRequest) -> Result<ReasoningResponse, ProviderError>;
}
