// src/core/aggregator.rs — Fold subtask results into one summary

use std::sync::Arc;

use super::oracle::CodeOracle;
use super::prompts::ANSWER_COMBINER;
use super::types::SubtaskResult;
use crate::infra::errors::AnalystError;

/// Summary used when there is nothing to aggregate. No oracle call is made.
pub const NO_SUBTASKS_SUMMARY: &str = "No subtasks were completed.";

pub struct Aggregator {
    oracle: Arc<dyn CodeOracle>,
}

impl Aggregator {
    pub fn new(oracle: Arc<dyn CodeOracle>) -> Self {
        Self { oracle }
    }

    /// One oracle call, no retry. Any failure is fatal to the run.
    pub async fn aggregate(&self, results: &[SubtaskResult]) -> Result<String, AnalystError> {
        if results.is_empty() {
            return Ok(NO_SUBTASKS_SUMMARY.to_string());
        }

        let vars = serde_json::json!({ "subtask_outputs": render_results(results) });
        let summary = self
            .oracle
            .invoke(ANSWER_COMBINER, vars)
            .await
            .map_err(|e| AnalystError::Aggregation {
                message: e.to_string(),
            })?;
        Ok(summary.trim().to_string())
    }
}

/// Numbered blocks, one per result, in subtask order.
pub fn render_results(results: &[SubtaskResult]) -> String {
    let mut block = String::new();
    for (i, result) in results.iter().enumerate() {
        block.push_str(&format!("\n{}. {}\n", i + 1, result.subtask()));
        match result {
            SubtaskResult::Success { preview, .. } => {
                block.push_str(&format!("   Output: {preview}\n"));
            }
            SubtaskResult::Failure { error, .. } => {
                block.push_str(&format!("   Error: {error}\n"));
            }
        }
    }
    block
}
