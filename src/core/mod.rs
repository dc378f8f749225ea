// src/core/mod.rs — Subtask execution pipeline

pub mod aggregator;
pub mod extract;
pub mod oracle;
pub mod orchestrator;
pub mod prompts;
pub mod runner;
pub mod subtasks;
pub mod types;

pub use aggregator::{Aggregator, NO_SUBTASKS_SUMMARY};
pub use oracle::{CodeOracle, ProviderOracle};
pub use orchestrator::Orchestrator;
pub use prompts::PromptLibrary;
pub use runner::{RunnerConfig, SubtaskRunner};
pub use subtasks::{PlanStatus, SubtaskPlan, SubtaskSynthesizer};
pub use types::{next_phase, Phase, ProgressEvent, RunOutcome, RunState, SubtaskResult};
