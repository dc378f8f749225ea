// src/core/runner.rs — Self-healing code loop for one subtask
//
// Synthesizing -> Executing <-> Repairing -> Succeeded | Exhausted
//
// Only execution faults are retried. A synthesis failure, or a failed repair
// call, ends the subtask immediately.

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::extract::{extract_code, repair_code};
use super::oracle::CodeOracle;
use super::prompts::{CODE_REPAIR, EXECUTOR_AGENT};
use super::types::SubtaskResult;
use crate::data::Table;
use crate::infra::config::ExecutionConfig;
use crate::sandbox::{ExecFault, SandboxExecutor, SandboxValue};

/// Reply text kept as the detail of a synthesis failure.
const REPLY_EXCERPT_CHARS: usize = 500;

/// Per-subtask execution settings.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Execution attempts before a subtask is exhausted.
    pub max_retries: u32,
    pub sample_rows: usize,
    pub preview_rows: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::from(&ExecutionConfig::default())
    }
}

impl From<&ExecutionConfig> for RunnerConfig {
    fn from(c: &ExecutionConfig) -> Self {
        Self {
            max_retries: c.max_retries.max(1),
            sample_rows: c.sample_rows,
            preview_rows: c.preview_rows,
        }
    }
}

#[derive(Debug)]
enum RunnerState {
    Synthesizing,
    Executing { code: String, retries: u32 },
    Repairing { code: String, retries: u32, fault: ExecFault },
    Succeeded(SubtaskResult),
    Exhausted(SubtaskResult),
}

/// Called before each repair with the attempt number and the fault being repaired.
pub type RepairHook<'a> = &'a (dyn Fn(u32, &ExecFault) + Send + Sync);

pub struct SubtaskRunner {
    oracle: Arc<dyn CodeOracle>,
    sandbox: Arc<dyn SandboxExecutor>,
    config: RunnerConfig,
    rng: Mutex<StdRng>,
}

impl SubtaskRunner {
    pub fn new(
        oracle: Arc<dyn CodeOracle>,
        sandbox: Arc<dyn SandboxExecutor>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            oracle,
            sandbox,
            config,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Fix the row-sampling seed so prompts are reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub async fn run(&self, subtask: &str, table: &Arc<Table>) -> SubtaskResult {
        self.run_with_hook(subtask, table, &|_: u32, _: &ExecFault| {}).await
    }

    /// Drive one subtask to a terminal state. Always returns exactly one result.
    pub async fn run_with_hook(
        &self,
        subtask: &str,
        table: &Arc<Table>,
        on_repair: RepairHook<'_>,
    ) -> SubtaskResult {
        let mut state = RunnerState::Synthesizing;
        loop {
            state = match state {
                RunnerState::Synthesizing => self.synthesize(subtask, table).await,
                RunnerState::Executing { code, retries } => {
                    self.execute(subtask, table, code, retries).await
                }
                RunnerState::Repairing {
                    code,
                    retries,
                    fault,
                } => {
                    on_repair(retries, &fault);
                    self.repair(subtask, code, retries, fault).await
                }
                RunnerState::Succeeded(result) | RunnerState::Exhausted(result) => return result,
            };
        }
    }

    async fn synthesize(&self, subtask: &str, table: &Table) -> RunnerState {
        let sample = {
            let mut rng = match self.rng.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            table.sample(self.config.sample_rows, &mut *rng)
        };
        let vars = serde_json::json!({
            "subtask": subtask,
            "columns": table.columns(),
            "preview": sample.to_records(),
        });

        let synthesis_failure = |error: String, detail: String| {
            tracing::warn!(subtask, "Code synthesis failed: {}", error);
            RunnerState::Exhausted(SubtaskResult::Failure {
                subtask: subtask.to_string(),
                last_code: None,
                error: format!("Error generating initial code: {error}"),
                detail,
                retries: 0,
            })
        };

        match self.oracle.invoke(EXECUTOR_AGENT, vars).await {
            Ok(reply) => match extract_code(&reply) {
                Some(code) => {
                    tracing::debug!(subtask, "Generated code:\n{}", code);
                    RunnerState::Executing { code, retries: 0 }
                }
                None => synthesis_failure(
                    "no code block in response".into(),
                    reply_excerpt(&reply),
                ),
            },
            Err(e) => synthesis_failure(e.to_string(), format!("{e:?}")),
        }
    }

    async fn execute(
        &self,
        subtask: &str,
        table: &Arc<Table>,
        code: String,
        retries: u32,
    ) -> RunnerState {
        match self.execute_in_sandbox(&code, table).await {
            Ok(value) => RunnerState::Succeeded(SubtaskResult::Success {
                subtask: subtask.to_string(),
                preview: value.preview(self.config.preview_rows),
                code,
                retries,
            }),
            Err(fault) => {
                let retries = retries + 1;
                tracing::debug!(subtask, attempt = retries, "Execution failed: {}", fault);
                if retries >= self.config.max_retries {
                    tracing::warn!(
                        subtask,
                        max_retries = self.config.max_retries,
                        "Failed after {} attempts. Last error: {}",
                        retries,
                        fault
                    );
                    RunnerState::Exhausted(exhausted(subtask, code, retries, &fault))
                } else {
                    RunnerState::Repairing {
                        code,
                        retries,
                        fault,
                    }
                }
            }
        }
    }

    async fn repair(
        &self,
        subtask: &str,
        code: String,
        retries: u32,
        fault: ExecFault,
    ) -> RunnerState {
        let vars = serde_json::json!({
            "code": code,
            "error": format!("{}\n{}", fault.message(), fault.detail()),
        });
        match self.oracle.invoke(CODE_REPAIR, vars).await {
            Ok(reply) => {
                let fixed = repair_code(&reply);
                tracing::info!(
                    subtask,
                    retry = retries,
                    max_retries = self.config.max_retries,
                    "Retrying with repaired code"
                );
                tracing::debug!("Repaired code:\n{}", fixed);
                RunnerState::Executing {
                    code: fixed,
                    retries,
                }
            }
            Err(e) => {
                // Report the execution fault, not the repair-call error.
                tracing::warn!(subtask, "Error while trying to fix code: {}", e);
                RunnerState::Exhausted(exhausted(subtask, code, retries, &fault))
            }
        }
    }

    async fn execute_in_sandbox(
        &self,
        code: &str,
        table: &Arc<Table>,
    ) -> Result<SandboxValue, ExecFault> {
        let sandbox = Arc::clone(&self.sandbox);
        let table = Arc::clone(table);
        let code = code.to_string();
        tokio::task::spawn_blocking(move || sandbox.execute(&code, &table))
            .await
            .unwrap_or_else(|e| {
                Err(ExecFault::Execution {
                    message: "Sandbox task aborted".into(),
                    detail: e.to_string(),
                })
            })
    }
}

fn exhausted(subtask: &str, code: String, retries: u32, fault: &ExecFault) -> SubtaskResult {
    SubtaskResult::Failure {
        subtask: subtask.to_string(),
        last_code: Some(code),
        error: fault.message(),
        detail: fault.detail().to_string(),
        retries,
    }
}

/// Leading characters of a reply that held no code block.
fn reply_excerpt(reply: &str) -> String {
    reply.trim().chars().take(REPLY_EXCERPT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::errors::AnalystError;
    use crate::sandbox::RhaiSandbox;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;

    /// Replies from a fixed queue per template and records every call.
    struct QueueOracle {
        replies: Mutex<VecDeque<Result<String, AnalystError>>>,
        calls: Mutex<Vec<(String, serde_json::Value)>>,
    }

    impl QueueOracle {
        fn new(replies: Vec<Result<String, AnalystError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn templates(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
        }
    }

    #[async_trait]
    impl CodeOracle for QueueOracle {
        async fn invoke(
            &self,
            template: &str,
            vars: serde_json::Value,
        ) -> Result<String, AnalystError> {
            self.calls.lock().unwrap().push((template.to_string(), vars));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    fn ok(code: &str) -> Result<String, AnalystError> {
        Ok(format!("```rhai\n{code}\n```"))
    }

    fn oracle_down() -> Result<String, AnalystError> {
        Err(AnalystError::Provider {
            provider: "mock".into(),
            message: "HTTP 500".into(),
            retriable: false,
        })
    }

    fn table() -> Arc<Table> {
        let rows = (1..=8).map(|i| vec![json!(i), json!(i * 10)]).collect();
        Arc::new(Table::new(vec!["id".into(), "riders".into()], rows).unwrap())
    }

    fn runner(oracle: Arc<QueueOracle>) -> SubtaskRunner {
        SubtaskRunner::new(oracle, Arc::new(RhaiSandbox::default()), RunnerConfig::default())
            .with_seed(7)
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let oracle = QueueOracle::new(vec![ok("result = df.sum(\"riders\");")]);
        let result = runner(oracle.clone()).run("Total riders", &table()).await;
        assert_eq!(
            result,
            SubtaskResult::Success {
                subtask: "Total riders".into(),
                code: "result = df.sum(\"riders\");".into(),
                preview: "360.0".into(),
                retries: 0,
            }
        );
        assert_eq!(oracle.templates(), vec![EXECUTOR_AGENT]);
    }

    #[tokio::test]
    async fn test_synthesis_prompt_carries_columns_and_sample() {
        let oracle = QueueOracle::new(vec![ok("result = 1;")]);
        runner(oracle.clone()).run("x", &table()).await;
        let calls = oracle.calls.lock().unwrap();
        let vars = &calls[0].1;
        assert_eq!(vars["subtask"], "x");
        assert_eq!(vars["columns"], json!(["id", "riders"]));
        assert_eq!(vars["preview"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_repair_then_success() {
        let oracle = QueueOracle::new(vec![
            ok("result = df.sum(\"ridership\");"),
            Ok("result = df.sum(\"riders\");".into()),
        ]);
        let result = runner(oracle.clone()).run("Total riders", &table()).await;
        assert!(result.is_success());
        assert_eq!(result.retries(), 1);
        assert_eq!(oracle.templates(), vec![EXECUTOR_AGENT, CODE_REPAIR]);

        let calls = oracle.calls.lock().unwrap();
        assert_eq!(calls[1].1["code"], "result = df.sum(\"ridership\");");
        assert!(calls[1].1["error"].as_str().unwrap().contains("ridership"));
    }

    #[tokio::test]
    async fn test_exhausts_retry_budget() {
        let mut replies = vec![ok("result = missing_fn();")];
        replies.extend((0..10).map(|i| ok(&format!("result = missing_fn_{i}();"))));
        let oracle = QueueOracle::new(replies);
        let result = runner(oracle.clone()).run("Broken", &table()).await;

        match result {
            SubtaskResult::Failure {
                retries,
                last_code,
                error,
                ..
            } => {
                assert_eq!(retries, 5);
                assert_eq!(last_code.as_deref(), Some("result = missing_fn_3();"));
                assert!(error.contains("missing_fn_3"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        // One synthesis call and four repairs for five executions.
        assert_eq!(oracle.templates().len(), 5);
    }

    #[tokio::test]
    async fn test_synthesis_failure_skips_execution() {
        let oracle = QueueOracle::new(vec![oracle_down()]);
        let result = runner(oracle.clone()).run("Anything", &table()).await;
        match result {
            SubtaskResult::Failure {
                retries,
                last_code,
                error,
                ..
            } => {
                assert_eq!(retries, 0);
                assert_eq!(last_code, None);
                assert!(error.starts_with("Error generating initial code:"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(oracle.templates().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_code_block_is_synthesis_failure() {
        let oracle = QueueOracle::new(vec![Ok("I would sum the riders column.".into())]);
        let result = runner(oracle).run("Total", &table()).await;
        assert!(!result.is_success());
        assert_eq!(result.retries(), 0);
    }

    #[tokio::test]
    async fn test_missing_code_block_detail_is_bounded() {
        let reply = format!("  {}", "é".repeat(800));
        let oracle = QueueOracle::new(vec![Ok(reply)]);
        match runner(oracle).run("Total", &table()).await {
            SubtaskResult::Failure { error, detail, .. } => {
                assert!(error.contains("no code block"));
                assert_eq!(detail.chars().count(), REPLY_EXCERPT_CHARS);
                assert!(detail.starts_with('é'));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_smaller_retry_budget_is_honored() {
        let oracle = QueueOracle::new(vec![
            ok("result = missing_fn();"),
            ok("result = missing_fn_again();"),
            ok("result = 1;"),
        ]);
        let config = RunnerConfig {
            max_retries: 2,
            ..RunnerConfig::default()
        };
        let runner = SubtaskRunner::new(oracle.clone(), Arc::new(RhaiSandbox::default()), config)
            .with_seed(7);
        match runner.run("Broken", &table()).await {
            SubtaskResult::Failure {
                retries, last_code, ..
            } => {
                assert_eq!(retries, 2);
                assert_eq!(last_code.as_deref(), Some("result = missing_fn_again();"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(oracle.templates(), vec![EXECUTOR_AGENT, CODE_REPAIR]);
    }

    #[tokio::test]
    async fn test_repair_call_failure_reports_execution_error() {
        let oracle = QueueOracle::new(vec![ok("result = df.mean(\"nope\");"), oracle_down()]);
        let result = runner(oracle).run("Mean", &table()).await;
        match result {
            SubtaskResult::Failure { retries, error, .. } => {
                assert_eq!(retries, 1);
                assert!(error.contains("nope"), "got: {error}");
                assert!(!error.contains("HTTP 500"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unbound_result_is_retried() {
        let oracle = QueueOracle::new(vec![ok("let x = 1;"), Ok("result = 1;".into())]);
        let result = runner(oracle).run("One", &table()).await;
        assert!(result.is_success());
        assert_eq!(result.retries(), 1);
    }

    #[tokio::test]
    async fn test_empty_table_result_is_success() {
        let oracle = QueueOracle::new(vec![ok("result = df.filter(|r| r.id > 100);")]);
        let result = runner(oracle).run("None", &table()).await;
        match result {
            SubtaskResult::Success { preview, .. } => assert_eq!(preview, "[]"),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_repair_hook_sees_each_attempt() {
        let oracle = QueueOracle::new(vec![
            ok("result = bad();"),
            ok("result = bad();"),
            ok("result = 2;"),
        ]);
        let attempts = Mutex::new(Vec::new());
        let hook = |attempt: u32, _: &ExecFault| attempts.lock().unwrap().push(attempt);
        let result = runner(oracle).run_with_hook("Two", &table(), &hook).await;
        assert_eq!(result.retries(), 2);
        assert_eq!(*attempts.lock().unwrap(), vec![1, 2]);
    }
}
