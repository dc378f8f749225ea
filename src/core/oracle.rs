// src/core/oracle.rs — Template-in, text-out boundary to the language model

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::prompts::PromptLibrary;
use crate::infra::config::ModelConfig;
use crate::infra::errors::AnalystError;
use crate::provider::{ChatRequest, Message, ModelProvider};

/// Renders a named template with variables and returns the model's free text.
#[async_trait]
pub trait CodeOracle: Send + Sync {
    async fn invoke(&self, template: &str, vars: serde_json::Value) -> Result<String, AnalystError>;

    /// Verify templates resolve before a run starts.
    fn check_templates(&self, _names: &[&str]) -> Result<(), AnalystError> {
        Ok(())
    }
}

/// `CodeOracle` backed by a `ModelProvider` and a `PromptLibrary`.
pub struct ProviderOracle {
    provider: Arc<dyn ModelProvider>,
    library: PromptLibrary,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout: Duration,
}

impl ProviderOracle {
    pub fn new(provider: Arc<dyn ModelProvider>, library: PromptLibrary, model: String) -> Self {
        Self::from_config(provider, library, &ModelConfig {
            model,
            ..ModelConfig::default()
        })
    }

    pub fn from_config(
        provider: Arc<dyn ModelProvider>,
        library: PromptLibrary,
        config: &ModelConfig,
    ) -> Self {
        Self {
            provider,
            library,
            model: config.model.clone(),
            temperature: Some(config.temperature),
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl CodeOracle for ProviderOracle {
    async fn invoke(
        &self,
        template: &str,
        vars: serde_json::Value,
    ) -> Result<String, AnalystError> {
        let prompt = self.library.render(template, &vars)?;

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![Message::user(prompt)],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: None,
        };

        let response = tokio::time::timeout(self.timeout, self.provider.chat(request))
            .await
            .map_err(|_| AnalystError::OracleTimeout {
                template: template.to_string(),
                seconds: self.timeout.as_secs(),
            })??;

        tracing::debug!(
            template,
            provider = self.provider.id(),
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Oracle responded"
        );
        Ok(response.content)
    }

    fn check_templates(&self, names: &[&str]) -> Result<(), AnalystError> {
        self.library.check(names)
    }
}
