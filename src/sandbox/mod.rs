// src/sandbox/mod.rs — Scoped execution of synthesized analysis scripts
//
// A sandbox run sees a private copy of the dataset and reports exactly one
// named output binding. Faults are values, never panics.

pub mod rhai_host;
pub mod table_api;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::Table;

pub use rhai_host::{RhaiSandbox, SandboxLimits};

/// Name the dataset copy is bound to inside the script scope.
pub const TABLE_BINDING: &str = "df";
/// Name of the tabular-library namespace inside the script scope.
pub const TABLE_NAMESPACE: &str = "tbl";
/// Name the script must assign its answer to.
pub const OUTPUT_BINDING: &str = "result";

/// Why a sandbox run produced no usable output.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecFault {
    #[error("No result variable found.")]
    NoResultBound,

    #[error("{message}")]
    Execution { message: String, detail: String },
}

impl ExecFault {
    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn detail(&self) -> &str {
        match self {
            ExecFault::NoResultBound => "",
            ExecFault::Execution { detail, .. } => detail,
        }
    }
}

/// The value a script bound to `result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum SandboxValue {
    Table(Table),
    Scalar(serde_json::Value),
}

impl SandboxValue {
    /// Bounded rendering: first `rows` records for tables, the plain string form otherwise.
    pub fn preview(&self, rows: usize) -> String {
        match self {
            SandboxValue::Table(t) => serde_json::to_string(&t.head(rows).to_records())
                .unwrap_or_else(|_| format!("<table {}x{}>", t.len(), t.columns().len())),
            SandboxValue::Scalar(serde_json::Value::String(s)) => s.clone(),
            SandboxValue::Scalar(v) => v.to_string(),
        }
    }
}

/// Runs code against a table in an isolated scope.
pub trait SandboxExecutor: Send + Sync {
    /// `table` is never mutated; implementations execute against their own copy.
    fn execute(&self, code: &str, table: &Table) -> Result<SandboxValue, ExecFault>;
}
