// src/core/types.rs — Core domain types

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::subtasks::PlanStatus;
use crate::data::Table;

/// The outcome of one subtask, keyed by the subtask text it resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubtaskResult {
    Success {
        subtask: String,
        code: String,
        preview: String,
        retries: u32,
    },
    Failure {
        subtask: String,
        /// Most recent code attempt; `None` when synthesis failed before any run.
        last_code: Option<String>,
        error: String,
        detail: String,
        retries: u32,
    },
}

impl SubtaskResult {
    pub fn subtask(&self) -> &str {
        match self {
            SubtaskResult::Success { subtask, .. } | SubtaskResult::Failure { subtask, .. } => {
                subtask
            }
        }
    }

    pub fn retries(&self) -> u32 {
        match self {
            SubtaskResult::Success { retries, .. } | SubtaskResult::Failure { retries, .. } => {
                *retries
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SubtaskResult::Success { .. })
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            SubtaskResult::Success { code, .. } => Some(code),
            SubtaskResult::Failure { last_code, .. } => last_code.as_deref(),
        }
    }
}

/// Where a run is in the orchestration graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "index", rename_all = "snake_case")]
pub enum Phase {
    GeneratingSubtasks,
    RunningSubtask(usize),
    Aggregating,
    Done,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::GeneratingSubtasks => write!(f, "generating subtasks"),
            Phase::RunningSubtask(i) => write!(f, "running subtask {}", i + 1),
            Phase::Aggregating => write!(f, "aggregating"),
            Phase::Done => write!(f, "done"),
        }
    }
}

/// The record threaded through every orchestration step. Each step consumes
/// one state and returns the next; nothing is shared between runs.
#[derive(Debug, Clone)]
pub struct RunState {
    pub run_id: String,
    pub request: String,
    pub dataset: Arc<Table>,
    pub subtasks: Vec<String>,
    pub subtask_status: Option<PlanStatus>,
    /// Count of subtasks fully processed. Always equals `results.len()`.
    pub cursor: usize,
    pub results: Vec<SubtaskResult>,
    pub summary: Option<String>,
    pub phase: Phase,
    pub started_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(request: impl Into<String>, dataset: Table) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            request: request.into(),
            dataset: Arc::new(dataset),
            subtasks: Vec::new(),
            subtask_status: None,
            cursor: 0,
            results: Vec::new(),
            summary: None,
            phase: Phase::GeneratingSubtasks,
            started_at: Utc::now(),
        }
    }

    /// Set the subtask list. Only valid once, from `GeneratingSubtasks`.
    pub fn with_subtasks(self, subtasks: Vec<String>, status: PlanStatus) -> Self {
        debug_assert!(self.subtask_status.is_none(), "subtasks set twice");
        let next = Self {
            subtasks,
            subtask_status: Some(status),
            ..self
        };
        next.advanced()
    }

    /// Append the result for the subtask under the cursor and move past it.
    pub fn with_result(mut self, result: SubtaskResult) -> Self {
        debug_assert_eq!(self.results.len(), self.cursor);
        debug_assert_eq!(Some(result.subtask()), self.current_subtask());
        self.results.push(result);
        self.cursor += 1;
        self.advanced()
    }

    pub fn with_summary(self, summary: String) -> Self {
        debug_assert!(self.summary.is_none(), "summary set twice");
        Self {
            summary: Some(summary),
            phase: Phase::Done,
            ..self
        }
    }

    pub fn current_subtask(&self) -> Option<&str> {
        self.subtasks.get(self.cursor).map(String::as_str)
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    fn advanced(self) -> Self {
        let phase = next_phase(&self);
        Self { phase, ..self }
    }
}

/// The phase that follows the work already recorded in `state`.
pub fn next_phase(state: &RunState) -> Phase {
    if state.summary.is_some() {
        Phase::Done
    } else if state.subtask_status.is_none() {
        Phase::GeneratingSubtasks
    } else if state.cursor < state.subtasks.len() {
        Phase::RunningSubtask(state.cursor)
    } else {
        Phase::Aggregating
    }
}

/// Progress notifications emitted while a run advances.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    SubtasksReady {
        subtasks: Vec<String>,
    },
    SubtaskStart {
        index: usize,
        total: usize,
        subtask: String,
    },
    SubtaskRepair {
        index: usize,
        attempt: u32,
        error: String,
    },
    SubtaskComplete {
        index: usize,
        success: bool,
        retries: u32,
    },
    Aggregating {
        results: usize,
    },
    Complete {
        run_id: String,
    },
}

/// What a finished run returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: String,
    pub request: String,
    pub subtasks: Vec<String>,
    pub subtask_status: Option<PlanStatus>,
    pub summary: String,
    pub results: Vec<SubtaskResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::subtasks::ParseStrategy;

    fn success(subtask: &str) -> SubtaskResult {
        SubtaskResult::Success {
            subtask: subtask.into(),
            code: "result = 1;".into(),
            preview: "1".into(),
            retries: 0,
        }
    }

    #[test]
    fn test_new_state_generates_subtasks() {
        let state = RunState::new("q", Table::default());
        assert_eq!(state.phase, Phase::GeneratingSubtasks);
        assert_eq!(next_phase(&state), Phase::GeneratingSubtasks);
    }

    #[test]
    fn test_empty_subtasks_go_to_aggregating() {
        let state =
            RunState::new("", Table::default()).with_subtasks(vec![], PlanStatus::EmptyRequest);
        assert_eq!(state.phase, Phase::Aggregating);
    }

    #[test]
    fn test_cursor_advances_through_subtasks() {
        let state = RunState::new("q", Table::default()).with_subtasks(
            vec!["a".into(), "b".into()],
            PlanStatus::Parsed(ParseStrategy::Numbered),
        );
        assert_eq!(state.phase, Phase::RunningSubtask(0));

        let state = state.with_result(success("a"));
        assert_eq!(state.cursor, 1);
        assert_eq!(state.phase, Phase::RunningSubtask(1));
        assert_eq!(state.current_subtask(), Some("b"));

        let state = state.with_result(success("b"));
        assert_eq!(state.phase, Phase::Aggregating);
        assert_eq!(state.results.len(), state.cursor);

        let state = state.with_summary("done".into());
        assert!(state.is_done());
    }

    #[test]
    fn test_result_accessors() {
        let failure = SubtaskResult::Failure {
            subtask: "x".into(),
            last_code: None,
            error: "boom".into(),
            detail: String::new(),
            retries: 0,
        };
        assert_eq!(failure.subtask(), "x");
        assert_eq!(failure.code(), None);
        assert!(!failure.is_success());
        assert_eq!(success("y").code(), Some("result = 1;"));
    }

    #[test]
    fn test_result_serializes_with_status_tag() {
        let json = serde_json::to_value(success("a")).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["subtask"], "a");
    }
}
