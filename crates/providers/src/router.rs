//! Reasoner router: builds the configured reasoning backend.

use mediguard_config::ReasonerConfig;
use mediguard_core::error::ProviderError;
use mediguard_core::reasoner::Reasoner;
use std::sync::Arc;
use tracing::info;

use crate::openai_compat::OpenAiCompatReasoner;

/// Build the reasoner described by `[reasoner]`.
///
/// Every provider except `ollama` needs an API key. Providers without a
/// well-known base URL need `api_url`.
pub fn build_from_config(config: &ReasonerConfig) -> Result<Arc<dyn Reasoner>, ProviderError> {
    let provider = config.provider.as_str();

    let base_url = config
        .api_url
        .clone()
        .or_else(|| default_base_url(provider).map(String::from))
        .ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "no base URL known for provider '{provider}'; set reasoner.api_url"
            ))
        })?;

    let api_key = match (&config.api_key, provider) {
        (Some(key), _) => key.clone(),
        (None, "ollama") => "ollama".into(),
        (None, _) => {
            return Err(ProviderError::NotConfigured(format!(
                "no API key for provider '{provider}'; set MEDIGUARD_API_KEY or reasoner.api_key"
            )));
        }
    };

    let reasoner = OpenAiCompatReasoner::new(provider, base_url, api_key, &config.model)?
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens);

    info!(provider, model = %config.model, base_url = reasoner.base_url(), "Reasoner configured");
    Ok(Arc::new(reasoner))
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> Option<&'static str> {
    match provider_name {
        "openrouter" => Some("https://openrouter.ai/api/v1"),
        "openai" => Some("https://api.openai.com/v1"),
        "gemini" | "google" => Some("https://generativelanguage.googleapis.com/v1beta/openai"),
        "ollama" => Some("http://localhost:11434/v1"),
        "groq" => Some("https://api.groq.com/openai/v1"),
        "together" => Some("https://api.together.xyz/v1"),
        "vllm" => Some("http://localhost:8000/v1"),
        _ => None,
    }
}
