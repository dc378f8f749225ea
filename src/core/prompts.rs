// src/core/prompts.rs — Named prompt templates rendered with minijinja

use std::path::Path;

use minijinja::{Environment, UndefinedBehavior};

use crate::infra::errors::AnalystError;

pub const SUBTASK_GENERATOR: &str = "subtask_generator";
pub const EXECUTOR_AGENT: &str = "executor_agent";
pub const ANSWER_COMBINER: &str = "answer_combiner";
pub const CODE_REPAIR: &str = "code_repair";

/// Templates every run needs. `code_repair` is inline and always present.
pub const REQUIRED_TEMPLATES: &[&str] = &[SUBTASK_GENERATOR, EXECUTOR_AGENT, ANSWER_COMBINER];

const SUBTASK_GENERATOR_TEMPLATE: &str = include_str!("prompts/subtask_generator.txt");
const EXECUTOR_AGENT_TEMPLATE: &str = include_str!("prompts/executor_agent.txt");
const ANSWER_COMBINER_TEMPLATE: &str = include_str!("prompts/answer_combiner.txt");

const CODE_REPAIR_TEMPLATE: &str = r#"You are a Rhai expert. Fix this script that produced an error.

Original code:
```rhai
{{ code }}
```

Error message:
```
{{ error }}
```

Fixed code (return only the code):"#;

/// Compiled templates in a strict rendering environment.
pub struct PromptLibrary {
    env: Environment<'static>,
}

impl PromptLibrary {
    /// Compile every source. A syntax error is a configuration error.
    fn compile(sources: Vec<(String, String)>) -> Result<Self, AnalystError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        let repair = (CODE_REPAIR.to_string(), CODE_REPAIR_TEMPLATE.to_string());
        for (name, source) in sources.into_iter().chain(std::iter::once(repair)) {
            env.add_template_owned(name.clone(), source).map_err(|e| {
                AnalystError::Config(format!("prompt template '{name}' does not compile: {e}"))
            })?;
        }
        Ok(Self { env })
    }

    /// The templates compiled into the binary.
    pub fn builtin() -> Result<Self, AnalystError> {
        let sources = [
            (SUBTASK_GENERATOR, SUBTASK_GENERATOR_TEMPLATE),
            (EXECUTOR_AGENT, EXECUTOR_AGENT_TEMPLATE),
            (ANSWER_COMBINER, ANSWER_COMBINER_TEMPLATE),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self::compile(sources)
    }

    /// Load and compile `{name}.txt` for every required template in `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, AnalystError> {
        let mut sources = Vec::with_capacity(REQUIRED_TEMPLATES.len());
        for name in REQUIRED_TEMPLATES {
            let path = dir.join(format!("{name}.txt"));
            if !path.is_file() {
                return Err(AnalystError::TemplateNotFound {
                    name: path.display().to_string(),
                });
            }
            sources.push((name.to_string(), std::fs::read_to_string(&path)?));
        }
        let library = Self::compile(sources)?;
        tracing::debug!(dir = %dir.display(), "Prompt templates loaded");
        Ok(library)
    }

    pub fn has(&self, name: &str) -> bool {
        self.env.get_template(name).is_ok()
    }

    /// Fail with `TemplateNotFound` for the first missing name.
    pub fn check(&self, names: &[&str]) -> Result<(), AnalystError> {
        match names.iter().find(|n| !self.has(n)) {
            Some(missing) => Err(AnalystError::TemplateNotFound {
                name: missing.to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn render(&self, name: &str, vars: &serde_json::Value) -> Result<String, AnalystError> {
        let template = self
            .env
            .get_template(name)
            .map_err(|_| AnalystError::TemplateNotFound {
                name: name.to_string(),
            })?;
        Ok(template.render(vars)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_has_all_templates() {
        let lib = PromptLibrary::builtin().unwrap();
        assert!(lib.check(REQUIRED_TEMPLATES).is_ok());
        assert!(lib.has(CODE_REPAIR));
    }

    #[test]
    fn test_render_subtask_generator() {
        let lib = PromptLibrary::builtin().unwrap();
        let out = lib
            .render(SUBTASK_GENERATOR, &json!({"input": "Compare ridership by borough"}))
            .unwrap();
        assert!(out.contains("Request: Compare ridership by borough"));
    }

    #[test]
    fn test_render_repair_keeps_code() {
        let lib = PromptLibrary::builtin().unwrap();
        let out = lib
            .render(
                CODE_REPAIR,
                &json!({"code": "let result = df.sum(\"x\");", "error": "column 'x' not found"}),
            )
            .unwrap();
        assert!(out.contains("let result = df.sum(\"x\");"));
        assert!(out.contains("column 'x' not found"));
    }

    #[test]
    fn test_render_missing_variable_fails() {
        let lib = PromptLibrary::builtin().unwrap();
        assert!(matches!(
            lib.render(SUBTASK_GENERATOR, &json!({})),
            Err(AnalystError::Template(_))
        ));
    }

    #[test]
    fn test_render_unknown_template() {
        let lib = PromptLibrary::builtin().unwrap();
        let err = lib.render("chart_maker", &json!({})).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_from_dir_missing_template() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("subtask_generator.txt"), "{{ input }}").unwrap();
        let err = PromptLibrary::from_dir(dir.path()).err().unwrap();
        assert!(matches!(err, AnalystError::TemplateNotFound { .. }));
    }

    #[test]
    fn test_from_dir_complete() {
        let dir = tempfile::tempdir().unwrap();
        for name in REQUIRED_TEMPLATES {
            std::fs::write(dir.path().join(format!("{name}.txt")), "custom {{ input }}").unwrap();
        }
        let lib = PromptLibrary::from_dir(dir.path()).unwrap();
        let out = lib.render(SUBTASK_GENERATOR, &json!({"input": "x"})).unwrap();
        assert_eq!(out, "custom x");
        assert!(lib.has(CODE_REPAIR));
    }

    #[test]
    fn test_from_dir_rejects_broken_template() {
        let dir = tempfile::tempdir().unwrap();
        for name in REQUIRED_TEMPLATES {
            std::fs::write(dir.path().join(format!("{name}.txt")), "Request: {{ input ").unwrap();
        }
        let err = PromptLibrary::from_dir(dir.path()).err().unwrap();
        assert!(err.is_config());
        assert!(err.to_string().contains("does not compile"));
    }
}
