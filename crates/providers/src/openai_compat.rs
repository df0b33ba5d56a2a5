//! OpenAI-compatible reasoner implementation.
//!
//! Works with: OpenAI, OpenRouter, Google Gemini (OpenAI endpoint), Ollama,
//! vLLM, and any OpenAI-compatible `/chat/completions` endpoint.
//!
//! Each reasoning request becomes one non-streaming chat completion with a
//! fixed system message and the rendered stage prompt as the user message.

use async_trait::async_trait;
use mediguard_core::error::ProviderError;
use mediguard_core::reasoner::{Reasoner, ReasoningRequest, ReasoningResponse, Usage};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// System message sent with every request.
pub const SYSTEM_PROMPT: &str = "You are MediGuard, a healthcare claims analyst. \
    Respond with ONLY a single raw JSON object matching the requested fields. \
    Do not wrap it in markdown or add any text outside the object.";

const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// A reasoner backed by an OpenAI-compatible chat completions API.
pub struct OpenAiCompatReasoner {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    json_mode: bool,
    client: reqwest::Client,
}

impl OpenAiCompatReasoner {
    /// Create a new OpenAI-compatible reasoner.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.0,
            max_tokens: None,
            json_mode: true,
            client,
        })
    }

    /// Create an OpenRouter reasoner (convenience constructor).
    pub fn openrouter(
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key, model)
    }

    /// Create an OpenAI reasoner (convenience constructor).
    pub fn openai(
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Self::new("openai", "https://api.openai.com/v1", api_key, model)
    }

    /// Create a Gemini reasoner via Google's OpenAI-compatible endpoint.
    pub fn gemini(
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Self::new(
            "gemini",
            "https://generativelanguage.googleapis.com/v1beta/openai",
            api_key,
            model,
        )
    }

    /// Create an Ollama reasoner (convenience constructor).
    pub fn ollama(base_url: Option<&str>, model: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
            model,
        )
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Toggle `response_format: json_object`; some endpoints reject it.
    pub fn with_json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Build the chat completions request body for a prompt.
    fn build_body(&self, prompt: &str) -> serde_json::Value {
        let messages = vec![
            ApiMessage {
                role: "system".into(),
                content: Some(SYSTEM_PROMPT.into()),
            },
            ApiMessage {
                role: "user".into(),
                content: Some(prompt.into()),
            },
        ];

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if self.json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        body
    }
}

/// Map a non-success HTTP status to a provider error.
fn status_error(status: u16, body: String) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited {
            retry_after_secs: 5,
        },
        401 | 403 => ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ),
        408 | 504 => ProviderError::Timeout(format!("upstream returned {status}")),
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

/// Extract the first choice's content from a completion response.
fn parse_response(api_response: ApiResponse) -> Result<ReasoningResponse, ProviderError> {
    let choice = api_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::ApiError {
            status_code: 200,
            message: "No choices in response".into(),
        })?;

    let usage = api_response.usage.map(|u| Usage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
    });

    Ok(ReasoningResponse {
        content: choice.message.content.unwrap_or_default(),
        model: api_response.model,
        usage,
    })
}

#[async_trait]
impl Reasoner for OpenAiCompatReasoner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn infer(&self, request: ReasoningRequest) -> Result<ReasoningResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(&request.prompt);

        debug!(
            provider = %self.name,
            model = %self.model,
            stage = %request.stage,
            attempt = request.attempt,
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(status_error(status, error_body));
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        parse_response(api_response)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_carries_system_and_user_messages() {
        let reasoner = OpenAiCompatReasoner::openrouter("sk-test", "google/gemini-2.5-flash-lite")
            .unwrap()
            .with_max_tokens(512);
        let body = reasoner.build_body("Assess patient p1");

        assert_eq!(body["model"], "google/gemini-2.5-flash-lite");
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Assess patient p1");
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn json_mode_can_be_disabled() {
        let reasoner = OpenAiCompatReasoner::ollama(None, "llama3.2")
            .unwrap()
            .with_json_mode(false);
        let body = reasoner.build_body("hi");
        assert!(body.get("response_format").is_none());
        assert!(body.get("max_tokens").is_none());
        assert_eq!(reasoner.base_url(), "http://localhost:11434/v1");
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let reasoner =
            OpenAiCompatReasoner::new("custom", "http://host:9000/v1/", "", "m").unwrap();
        assert_eq!(reasoner.base_url(), "http://host:9000/v1");
    }

    #[test]
    fn statuses_map_to_errors() {
        assert!(matches!(status_error(429, String::new()), ProviderError::RateLimited { .. }));
        assert!(matches!(status_error(401, String::new()), ProviderError::AuthenticationFailed(_)));
        assert!(status_error(504, String::new()).is_timeout());
        assert_eq!(
            status_error(500, "boom".into()),
            ProviderError::ApiError {
                status_code: 500,
                message: "boom".into()
            }
        );
    }

    #[test]
    fn response_content_and_usage_extracted() {
        let raw = r#"{
            "model": "gpt-4o-mini",
            "choices": [{"message": {"role": "assistant", "content": "{\"ok\": true}"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 4, "total_tokens": 14}
        }"#;
        let parsed = parse_response(serde_json::from_str(raw).unwrap()).unwrap();
        assert_eq!(parsed.content, "{\"ok\": true}");
        assert_eq!(parsed.model, "gpt-4o-mini");
        assert_eq!(parsed.usage.unwrap().total_tokens, 14);
    }

    #[test]
    fn empty_choices_is_api_error() {
        let raw = r#"{"model": "m", "choices": []}"#;
        let err = parse_response(serde_json::from_str(raw).unwrap()).unwrap_err();
        assert!(err.to_string().contains("No choices"));
    }
}
