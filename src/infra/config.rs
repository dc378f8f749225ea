// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::infra::errors::AnalystError;
use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub prompts: PromptsConfig,

    #[serde(default)]
    pub retry: RetryTomlConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Provider id: groq, openai, deepseek, together, openrouter, ollama, or a custom id
    /// combined with `base_url`.
    pub provider: String,
    pub model: String,
    /// Overrides the provider's default endpoint.
    pub base_url: Option<String>,
    /// Environment variable holding the API key (defaults per provider).
    pub api_key_env: Option<String>,
    pub temperature: f32,
    pub timeout_seconds: u64,
    pub max_tokens: Option<u32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "groq".into(),
            model: "deepseek-r1-distill-llama-70b".into(),
            base_url: None,
            api_key_env: None,
            temperature: 0.2,
            timeout_seconds: 120,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Execution attempts per subtask before it is marked exhausted.
    pub max_retries: u32,
    /// Rows sampled from the dataset into the code-synthesis prompt.
    pub sample_rows: usize,
    /// Rows kept in a tabular result preview.
    pub preview_rows: usize,
    /// Rhai operation budget per script run.
    pub max_operations: u64,
    /// Wall-clock limit per script run.
    pub time_limit_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            sample_rows: 5,
            preview_rows: 5,
            max_operations: 5_000_000,
            time_limit_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// Directory of `{name}.txt` templates. Built-in templates are used when unset.
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryTomlConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryTomlConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 20_000,
        }
    }
}

impl Config {
    /// Load config from the default location, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AnalystError> {
        if self.execution.max_retries == 0 {
            return Err(AnalystError::Config(
                "execution.max_retries must be at least 1".into(),
            ));
        }
        if self.model.model.trim().is_empty() {
            return Err(AnalystError::Config("model.model must not be empty".into()));
        }
        Ok(())
    }

    /// Template directory: explicit config first, then `~/.analyst/prompts` if present.
    pub fn prompts_dir(&self) -> Option<PathBuf> {
        if let Some(ref dir) = self.prompts.dir {
            return Some(PathBuf::from(dir));
        }
        let default = paths::prompts_dir();
        default.is_dir().then_some(default)
    }
}
