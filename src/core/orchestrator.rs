// src/core/orchestrator.rs — Run state machine
//
// GeneratingSubtasks -> RunningSubtask(0..n) -> Aggregating -> Done
//
// Each step consumes a RunState and returns the next one. Subtasks run one
// at a time, in order, and each appends exactly one result.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;

use super::aggregator::Aggregator;
use super::oracle::CodeOracle;
use super::prompts::REQUIRED_TEMPLATES;
use super::runner::{RunnerConfig, SubtaskRunner};
use super::subtasks::SubtaskSynthesizer;
use super::types::{Phase, ProgressEvent, RunOutcome, RunState};
use crate::data::{load_csv, Table};
use crate::infra::errors::AnalystError;
use crate::sandbox::{ExecFault, SandboxExecutor};

type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// Drives a request from decomposition through aggregation.
pub struct Orchestrator {
    oracle: Arc<dyn CodeOracle>,
    synthesizer: SubtaskSynthesizer,
    runner: SubtaskRunner,
    aggregator: Aggregator,
    /// Optional callback for real-time progress events.
    on_progress: Option<ProgressCallback>,
    cancel: Option<Arc<AtomicBool>>,
}

impl Orchestrator {
    pub fn new(
        oracle: Arc<dyn CodeOracle>,
        sandbox: Arc<dyn SandboxExecutor>,
        config: RunnerConfig,
    ) -> Self {
        Self::with_runner(
            oracle.clone(),
            SubtaskRunner::new(oracle, sandbox, config),
        )
    }

    /// Use a pre-built runner (e.g. one with a fixed sampling seed).
    pub fn with_runner(oracle: Arc<dyn CodeOracle>, runner: SubtaskRunner) -> Self {
        Self {
            synthesizer: SubtaskSynthesizer::new(oracle.clone()),
            aggregator: Aggregator::new(oracle.clone()),
            oracle,
            runner,
            on_progress: None,
            cancel: None,
        }
    }

    /// Set a progress callback for real-time output.
    pub fn with_progress(mut self, cb: impl Fn(ProgressEvent) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(cb));
        self
    }

    /// Share a flag that cancels the run at the next step boundary.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(ref cb) = self.on_progress {
            cb(event);
        }
    }

    fn check_cancelled(&self) -> Result<(), AnalystError> {
        match self.cancel {
            Some(ref flag) if flag.load(Ordering::SeqCst) => Err(AnalystError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Load the dataset, then run the request against it.
    pub async fn run(
        &self,
        request: &str,
        dataset_path: &Path,
    ) -> Result<RunOutcome, AnalystError> {
        let table = load_csv(dataset_path)?;
        tracing::info!(
            path = %dataset_path.display(),
            rows = table.len(),
            columns = table.columns().len(),
            "Dataset loaded"
        );
        self.run_with_table(request, table).await
    }

    pub async fn run_with_table(
        &self,
        request: &str,
        table: Table,
    ) -> Result<RunOutcome, AnalystError> {
        let mut state = self.start(request, table)?;
        tracing::info!(run_id = %state.run_id, "Run started");

        while !state.is_done() {
            state = self.step(state).await?;
        }

        self.emit(ProgressEvent::Complete {
            run_id: state.run_id.clone(),
        });
        Ok(finish(state))
    }

    /// Fresh state for a run. Fails if a required template is missing.
    pub fn start(&self, request: &str, table: Table) -> Result<RunState, AnalystError> {
        self.oracle.check_templates(REQUIRED_TEMPLATES)?;
        Ok(RunState::new(request, table))
    }

    /// Execute exactly one step and return the next state.
    pub async fn step(&self, state: RunState) -> Result<RunState, AnalystError> {
        self.check_cancelled()?;

        match state.phase {
            Phase::GeneratingSubtasks => {
                let plan = self.synthesizer.synthesize(&state.request).await;
                tracing::info!(count = plan.subtasks.len(), "Subtasks ready");
                self.emit(ProgressEvent::SubtasksReady {
                    subtasks: plan.subtasks.clone(),
                });
                Ok(state.with_subtasks(plan.subtasks, plan.status))
            }
            Phase::RunningSubtask(index) => {
                let total = state.subtasks.len();
                let subtask = state
                    .subtasks
                    .get(index)
                    .cloned()
                    .ok_or_else(|| {
                        AnalystError::InvalidState(format!(
                            "phase points at subtask {} of {}",
                            index + 1,
                            total
                        ))
                    })?;
                tracing::info!("Executing subtask [{}/{}]: {}", index + 1, total, subtask);
                self.emit(ProgressEvent::SubtaskStart {
                    index,
                    total,
                    subtask: subtask.clone(),
                });

                let on_repair = |attempt: u32, fault: &ExecFault| {
                    self.emit(ProgressEvent::SubtaskRepair {
                        index,
                        attempt,
                        error: fault.message(),
                    });
                };
                let result = self
                    .runner
                    .run_with_hook(&subtask, &state.dataset, &on_repair)
                    .await;

                // Nothing is committed for a subtask that finished after cancellation.
                self.check_cancelled()?;

                self.emit(ProgressEvent::SubtaskComplete {
                    index,
                    success: result.is_success(),
                    retries: result.retries(),
                });
                Ok(state.with_result(result))
            }
            Phase::Aggregating => {
                self.emit(ProgressEvent::Aggregating {
                    results: state.results.len(),
                });
                let summary = self.aggregator.aggregate(&state.results).await?;
                Ok(state.with_summary(summary))
            }
            Phase::Done => Ok(state),
        }
    }
}

fn finish(state: RunState) -> RunOutcome {
    RunOutcome {
        run_id: state.run_id,
        request: state.request,
        subtasks: state.subtasks,
        subtask_status: state.subtask_status,
        summary: state.summary.unwrap_or_default(),
        results: state.results,
        started_at: state.started_at,
        finished_at: Utc::now(),
    }
}
