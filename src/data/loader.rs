// src/data/loader.rs — CSV dataset loading

use std::io::Read;
use std::path::Path;

use serde_json::Value;

use super::table::Table;
use crate::infra::errors::AnalystError;

/// Load a CSV file with a header row. Every call returns a freshly owned table.
pub fn load_csv(path: &Path) -> Result<Table, AnalystError> {
    let fail = |message: String| AnalystError::DatasetLoad {
        path: path.display().to_string(),
        message,
    };

    let file = std::fs::File::open(path).map_err(|e| fail(e.to_string()))?;
    let table = read_csv(file).map_err(fail)?;

    tracing::debug!(
        path = %path.display(),
        rows = table.len(),
        columns = table.columns().len(),
        "Dataset loaded"
    );
    Ok(table)
}

/// Parse CSV from any reader. Errors are returned as display strings.
pub fn read_csv<R: Read>(reader: R) -> Result<Table, String> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| e.to_string())?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err("dataset has no header row".into());
    }

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| e.to_string())?;
        rows.push(record.iter().map(parse_cell).collect());
    }

    Table::new(headers, rows).map_err(|e| e.to_string())
}

/// Infer a cell's type: empty → null, then integer, float, boolean, string.
pub fn parse_cell(raw: &str) -> Value {
    let s = raw.trim();
    if s.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        if f.is_finite() {
            return Value::from(f);
        }
    }
    match s {
        "true" | "True" | "TRUE" => Value::Bool(true),
        "false" | "False" | "FALSE" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}
