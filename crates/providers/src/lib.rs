//! LLM provider implementations for quill.
//!
//! Every backend speaks the OpenAI chat-completions dialect; the provider
//! name only selects a default base URL and whether a key is required.

pub mod openai_compat;

use std::sync::Arc;

use quill_config::ProviderConfig;
use quill_core::error::ProviderError;
use quill_core::provider::Provider;

pub use openai_compat::OpenAiCompatProvider;

/// Default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> Option<&'static str> {
    match provider_name {
        "openai" => Some("https://api.openai.com/v1"),
        "openrouter" => Some("https://openrouter.ai/api/v1"),
        "ollama" => Some("http://localhost:11434/v1"),
        "deepseek" => Some("https://api.deepseek.com/v1"),
        "groq" => Some("https://api.groq.com/openai/v1"),
        _ => None,
    }
}

/// Providers that run locally and accept any key.
fn needs_api_key(provider_name: &str) -> bool {
    provider_name != "ollama"
}

/// Build the configured provider.
///
/// An explicit `base_url` wins over the well-known one, which makes any
/// OpenAI-compatible endpoint usable under a custom name.
pub fn build_from_config(config: &ProviderConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let name = config.name.as_str();
    let base_url = match (config.base_url.as_deref(), default_base_url(name)) {
        (Some(url), _) => url,
        (None, Some(url)) => url,
        (None, None) => {
            return Err(ProviderError::NotConfigured(format!(
                "unknown provider '{name}': set provider.base_url"
            )));
        }
    };

    let api_key = match config.api_key.as_deref() {
        Some(key) => key,
        None if needs_api_key(name) => {
            return Err(ProviderError::NotConfigured(format!(
                "no API key for '{name}': set provider.api_key or QUILL_API_KEY"
            )));
        }
        None => name,
    };

    tracing::debug!(provider = name, base_url, model = %config.model, "Provider configured");
    Ok(Arc::new(OpenAiCompatProvider::new(name, base_url, api_key)?))
}
