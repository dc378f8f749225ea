// src/infra/errors.rs — Error types for the analyst pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalystError {
    // Oracle errors (retriable at the provider layer only)
    #[error("Provider '{provider}' error: {message}")]
    Provider {
        provider: String,
        message: String,
        retriable: bool,
    },

    #[error("Rate limited by '{provider}', retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Oracle call for template '{template}' timed out after {seconds}s")]
    OracleTimeout { template: String, seconds: u64 },

    // Configuration errors (fatal, abort the run before subtask work)
    #[error("No provider configured. Set {env_var} or pick another provider with --model.")]
    NoProvider { env_var: String },

    #[error("Prompt template '{name}' not found")]
    TemplateNotFound { name: String },

    #[error("Failed to load dataset {path}: {message}")]
    DatasetLoad { path: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    // Run-level errors
    #[error("Template render error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("Aggregation failed: {message}")]
    Aggregation { message: String },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Invalid run state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnalystError {
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            AnalystError::Provider {
                retriable: true,
                ..
            } | AnalystError::RateLimited { .. }
        )
    }

    /// Errors that abort a run before any subtask work begins.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            AnalystError::NoProvider { .. }
                | AnalystError::TemplateNotFound { .. }
                | AnalystError::DatasetLoad { .. }
                | AnalystError::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_classification() {
        let transient = AnalystError::Provider {
            provider: "groq".into(),
            message: "timeout".into(),
            retriable: true,
        };
        assert!(transient.is_retriable());
        assert!(AnalystError::RateLimited {
            provider: "groq".into(),
            retry_after_ms: 500
        }
        .is_retriable());
        assert!(!AnalystError::OracleTimeout {
            template: "executor_agent".into(),
            seconds: 30
        }
        .is_retriable());
    }

    #[test]
    fn test_config_classification() {
        assert!(AnalystError::TemplateNotFound {
            name: "subtask_generator".into()
        }
        .is_config());
        assert!(AnalystError::DatasetLoad {
            path: "missing.csv".into(),
            message: "No such file".into()
        }
        .is_config());
        assert!(!AnalystError::Aggregation {
            message: "boom".into()
        }
        .is_config());
        assert!(!AnalystError::Cancelled.is_config());
    }

    #[test]
    fn test_dataset_error_message() {
        let e = AnalystError::DatasetLoad {
            path: "data/sales.csv".into(),
            message: "No such file or directory".into(),
        };
        assert_eq!(
            e.to_string(),
            "Failed to load dataset data/sales.csv: No such file or directory"
        );
    }
}
