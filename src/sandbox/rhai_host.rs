// src/sandbox/rhai_host.rs — Rhai-backed sandbox
//
// Scripts run in a fresh interpreter per execution with no I/O. The host
// exposes the dataset copy (`df`), the table namespace (`tbl`) and nothing else.

use std::time::{Duration, Instant};

use rhai::{Dynamic, Engine, EvalAltResult, Scope};

use super::table_api;
use super::{ExecFault, SandboxExecutor, SandboxValue, OUTPUT_BINDING, TABLE_BINDING};
use crate::data::Table;
use crate::infra::config::ExecutionConfig;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Resource limits applied to every script run.
#[derive(Debug, Clone)]
pub struct SandboxLimits {
    pub max_operations: u64,
    pub time_limit: Duration,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self::from(&ExecutionConfig::default())
    }
}

impl From<&ExecutionConfig> for SandboxLimits {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            max_operations: config.max_operations,
            time_limit: Duration::from_millis(config.time_limit_ms),
            max_string_size: 4 * 1_048_576,
            max_array_size: 1_000_000,
            max_map_size: 100_000,
        }
    }
}

// ---------------------------------------------------------------------------
// RhaiSandbox
// ---------------------------------------------------------------------------

pub struct RhaiSandbox {
    limits: SandboxLimits,
}

impl RhaiSandbox {
    pub fn new(limits: SandboxLimits) -> Self {
        Self { limits }
    }
}

impl Default for RhaiSandbox {
    fn default() -> Self {
        Self::new(SandboxLimits::default())
    }
}

impl SandboxExecutor for RhaiSandbox {
    fn execute(&self, code: &str, table: &Table) -> Result<SandboxValue, ExecFault> {
        let engine = create_sandbox_engine(&self.limits);

        let ast = engine.compile(code).map_err(|e| ExecFault::Execution {
            message: format!("Syntax error: {}", e),
            detail: format!("{:?}", e),
        })?;

        let mut scope = Scope::new();
        scope.push(TABLE_BINDING, table.clone());
        scope.push_dynamic(OUTPUT_BINDING, Dynamic::UNIT);

        engine
            .run_ast_with_scope(&mut scope, &ast)
            .map_err(|e| fault_from_eval(&e))?;

        let output = scope
            .get_value::<Dynamic>(OUTPUT_BINDING)
            .filter(|d| !d.is_unit())
            .ok_or(ExecFault::NoResultBound)?;

        if let Some(t) = output.clone().try_cast::<Table>() {
            return Ok(SandboxValue::Table(t));
        }
        dynamic_to_json(&output)
            .map(SandboxValue::Scalar)
            .map_err(|message| ExecFault::Execution {
                detail: format!("result has type {}", output.type_name()),
                message,
            })
    }
}

fn fault_from_eval(err: &EvalAltResult) -> ExecFault {
    let message = match err {
        EvalAltResult::ErrorTooManyOperations(_) => "Operation limit exceeded".to_string(),
        EvalAltResult::ErrorTerminated(_, _) => "Execution time limit exceeded".to_string(),
        other => other.to_string(),
    };
    ExecFault::Execution {
        message,
        detail: format!("{:?} at {}", err, err.position()),
    }
}

// ---------------------------------------------------------------------------
// Engine factory
// ---------------------------------------------------------------------------

/// Create a Rhai engine with limits applied and the table API registered.
///
/// Rhai has no built-in I/O; `print`/`debug` are routed to tracing.
pub fn create_sandbox_engine(limits: &SandboxLimits) -> Engine {
    let mut engine = Engine::new();

    engine.set_max_expr_depths(64, 32);
    engine.set_max_operations(limits.max_operations);
    engine.set_max_string_size(limits.max_string_size);
    engine.set_max_array_size(limits.max_array_size);
    engine.set_max_map_size(limits.max_map_size);
    engine.disable_symbol("eval");

    let started = Instant::now();
    let time_limit = limits.time_limit;
    engine.on_progress(move |_ops| {
        if started.elapsed() > time_limit {
            Some(Dynamic::from("timeout"))
        } else {
            None
        }
    });

    engine.on_print(|msg| tracing::debug!(target: "sandbox", "{}", msg));
    engine.on_debug(|msg, _src, pos| tracing::debug!(target: "sandbox", "{} @ {}", msg, pos));

    table_api::register(&mut engine);
    engine
}

// ---------------------------------------------------------------------------
// Value conversion
// ---------------------------------------------------------------------------

/// Convert a serde_json::Value to a Rhai Dynamic.
pub fn json_to_dynamic(value: &serde_json::Value) -> Dynamic {
    match value {
        serde_json::Value::Null => Dynamic::UNIT,
        serde_json::Value::Bool(b) => Dynamic::from(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Dynamic::from(i)
            } else if let Some(f) = n.as_f64() {
                Dynamic::from(f)
            } else {
                Dynamic::UNIT
            }
        }
        serde_json::Value::String(s) => Dynamic::from(s.clone()),
        serde_json::Value::Array(arr) => {
            let rhai_arr: Vec<Dynamic> = arr.iter().map(json_to_dynamic).collect();
            Dynamic::from(rhai_arr)
        }
        serde_json::Value::Object(obj) => {
            let mut map = rhai::Map::new();
            for (k, v) in obj {
                map.insert(k.clone().into(), json_to_dynamic(v));
            }
            Dynamic::from(map)
        }
    }
}

/// Convert a Rhai Dynamic back to JSON. Tables become arrays of records.
pub fn dynamic_to_json(value: &Dynamic) -> Result<serde_json::Value, String> {
    if value.is_unit() {
        return Ok(serde_json::Value::Null);
    }
    if let Ok(b) = value.as_bool() {
        return Ok(serde_json::Value::Bool(b));
    }
    if let Ok(i) = value.as_int() {
        return Ok(serde_json::Value::from(i));
    }
    if let Ok(f) = value.as_float() {
        return Ok(serde_json::Value::from(f));
    }
    if let Ok(c) = value.as_char() {
        return Ok(serde_json::Value::String(c.to_string()));
    }
    if let Ok(s) = value.clone().into_string() {
        return Ok(serde_json::Value::String(s));
    }
    if let Some(arr) = value.clone().try_cast::<rhai::Array>() {
        return arr
            .iter()
            .map(dynamic_to_json)
            .collect::<Result<Vec<_>, _>>()
            .map(serde_json::Value::Array);
    }
    if let Some(map) = value.clone().try_cast::<rhai::Map>() {
        let mut obj = serde_json::Map::new();
        for (k, v) in map {
            obj.insert(k.to_string(), dynamic_to_json(&v)?);
        }
        return Ok(serde_json::Value::Object(obj));
    }
    if let Some(t) = value.clone().try_cast::<Table>() {
        return Ok(serde_json::Value::Array(
            t.to_records()
                .into_iter()
                .map(serde_json::Value::Object)
                .collect(),
        ));
    }
    Err(format!(
        "result of type '{}' cannot be represented",
        value.type_name()
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
