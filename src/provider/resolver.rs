// src/provider/resolver.rs — Build the configured provider

use std::sync::Arc;

use super::ollama::OllamaProvider;
use super::openai_compat::OpenAICompatProvider;
use super::retry::{RetryConfig, RetryProvider};
use super::ModelProvider;
use crate::infra::config::{ModelConfig, RetryTomlConfig};
use crate::infra::errors::AnalystError;

/// A known OpenAI-compatible endpoint.
struct KnownProvider {
    id: &'static str,
    name: &'static str,
    base_url: &'static str,
    env_var: &'static str,
}

const KNOWN_PROVIDERS: &[KnownProvider] = &[
    KnownProvider {
        id: "groq",
        name: "Groq",
        base_url: "https://api.groq.com/openai/v1",
        env_var: "GROQ_API_KEY",
    },
    KnownProvider {
        id: "openai",
        name: "OpenAI",
        base_url: "https://api.openai.com/v1",
        env_var: "OPENAI_API_KEY",
    },
    KnownProvider {
        id: "deepseek",
        name: "DeepSeek",
        base_url: "https://api.deepseek.com/v1",
        env_var: "DEEPSEEK_API_KEY",
    },
    KnownProvider {
        id: "together",
        name: "Together",
        base_url: "https://api.together.xyz/v1",
        env_var: "TOGETHER_API_KEY",
    },
    KnownProvider {
        id: "openrouter",
        name: "OpenRouter",
        base_url: "https://openrouter.ai/api/v1",
        env_var: "OPENROUTER_API_KEY",
    },
];

/// Resolve the provider named in config, wrapped with retry.
pub fn resolve_provider(
    model: &ModelConfig,
    retry: &RetryTomlConfig,
) -> Result<Arc<dyn ModelProvider>, AnalystError> {
    resolve_with_env(model, retry, |name| std::env::var(name).ok())
}

/// Same as `resolve_provider` with an injectable environment lookup.
pub fn resolve_with_env(
    model: &ModelConfig,
    retry: &RetryTomlConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Arc<dyn ModelProvider>, AnalystError> {
    let inner: Arc<dyn ModelProvider> = if model.provider == "ollama" {
        let base_url = model.base_url.clone().or_else(|| env("OLLAMA_HOST"));
        Arc::new(OllamaProvider::new(base_url))
    } else if let Some(known) = KNOWN_PROVIDERS.iter().find(|p| p.id == model.provider) {
        let env_var = model.api_key_env.as_deref().unwrap_or(known.env_var);
        let api_key = env(env_var)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AnalystError::NoProvider {
                env_var: env_var.to_string(),
            })?;
        let base_url = model
            .base_url
            .clone()
            .unwrap_or_else(|| known.base_url.to_string());
        Arc::new(OpenAICompatProvider::new(
            known.id, known.name, api_key, base_url,
        ))
    } else {
        // Custom OpenAI-compatible endpoint: base_url is mandatory, key optional.
        let base_url = model.base_url.clone().ok_or_else(|| {
            AnalystError::Config(format!(
                "unknown provider '{}': set model.base_url for a custom endpoint",
                model.provider
            ))
        })?;
        let api_key = model
            .api_key_env
            .as_deref()
            .and_then(|name| env(name))
            .unwrap_or_default();
        Arc::new(OpenAICompatProvider::new(
            model.provider.clone(),
            model.provider.clone(),
            api_key,
            base_url,
        ))
    };

    tracing::debug!(provider = inner.id(), model = %model.model, "Provider resolved");
    Ok(Arc::new(RetryProvider::with_config(
        inner,
        RetryConfig::from(retry),
    )))
}
