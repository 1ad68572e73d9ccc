//! Provider selection from configuration.
//!
//! Picks the backend named in `llm.provider`. Without a credential the
//! process still starts: an [`UnconfiguredProvider`] answers every request
//! with `NotConfigured` so replies degrade to "service unavailable".

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use touchline_config::LlmConfig;
use touchline_core::error::ProviderError;
use touchline_core::provider::{Provider, ProviderRequest, ProviderResponse};
use tracing::{error, info, warn};

use crate::gemini::GeminiProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// Stand-in provider used when no credential is configured.
pub struct UnconfiguredProvider {
    name: String,
    reason: String,
}

impl UnconfiguredProvider {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Provider for UnconfiguredProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_configured(&self) -> bool {
        false
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::NotConfigured(self.reason.clone()))
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(false)
    }
}

/// Build the language-model provider described by `config`.
pub fn build_from_config(config: &LlmConfig) -> Arc<dyn Provider> {
    let timeout = Duration::from_secs(config.timeout_secs);

    let Some(api_key) = config.api_key.clone().filter(|k| !k.is_empty()) else {
        warn!(provider = %config.provider, "No language model API key configured; agent replies will report service unavailable");
        return Arc::new(UnconfiguredProvider::new(
            config.provider.clone(),
            "language model API key is not set",
        ));
    };

    let built: Result<Arc<dyn Provider>, ProviderError> = match config.provider.as_str() {
        "gemini" => GeminiProvider::new(api_key, timeout).map(|p| {
            let p = match &config.api_url {
                Some(url) => p.with_base_url(url),
                None => p,
            };
            Arc::new(p) as Arc<dyn Provider>
        }),
        other => {
            let base_url = config
                .api_url
                .clone()
                .unwrap_or_else(|| default_base_url(other));
            OpenAiCompatProvider::new(other, base_url, api_key, timeout)
                .map(|p| Arc::new(p) as Arc<dyn Provider>)
        }
    };
    let provider = match built {
        Ok(provider) => provider,
        Err(e) => {
            error!(provider = %config.provider, error = %e, "Language model client unavailable");
            return Arc::new(UnconfiguredProvider::new(config.provider.clone(), e.to_string()));
        }
    };

    info!(provider = %provider.name(), model = %config.model, "Language model provider ready");
    provider
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        _ => "https://api.openai.com/v1".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use touchline_core::message::Message;

    #[tokio::test]
    async fn missing_key_yields_unconfigured_provider() {
        let provider = build_from_config(&LlmConfig::default());
        assert!(!provider.is_configured());

        let err = provider
            .complete(ProviderRequest {
                model: "gemini-1.5-flash".into(),
                system: None,
                messages: vec![Message::user("hi")],
                temperature: 0.7,
                max_tokens: None,
                tools: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn gemini_selected_by_default() {
        let config = LlmConfig {
            api_key: Some("key".into()),
            ..LlmConfig::default()
        };
        let provider = build_from_config(&config);
        assert_eq!(provider.name(), "gemini");
        assert!(provider.is_configured());
    }

    #[test]
    fn other_names_use_openai_compat() {
        let config = LlmConfig {
            provider: "openrouter".into(),
            api_key: Some("key".into()),
            ..LlmConfig::default()
        };
        let provider = build_from_config(&config);
        assert_eq!(provider.name(), "openrouter");
    }

    #[test]
    fn well_known_base_urls() {
        assert!(default_base_url("openrouter").contains("openrouter.ai"));
        assert!(default_base_url("ollama").contains("11434"));
        assert!(default_base_url("unknown").contains("openai.com"));
    }
}
