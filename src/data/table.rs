// src/data/table.rs — In-memory table used as the analysis dataset
//
// Cells are JSON scalars. A table is cheap to clone relative to a run and is
// always handed to scripts by value, so the loaded dataset is never mutated.

use std::cmp::Ordering;
use std::str::FromStr;

use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub type Record = Map<String, Value>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    #[error("column '{0}' not found")]
    UnknownColumn(String),

    #[error("column '{column}' holds a non-numeric value: {value}")]
    NotNumeric { column: String, value: String },

    #[error("column '{0}' has no numeric values")]
    EmptyColumn(String),

    #[error("row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("unknown aggregate '{0}' (expected sum, mean, count, min or max)")]
    UnknownAggregate(String),
}

/// Aggregation applied per group by `Table::group_by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Sum,
    Mean,
    Count,
    Min,
    Max,
}

impl FromStr for Aggregate {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(Self::Sum),
            "mean" | "avg" => Ok(Self::Mean),
            "count" => Ok(Self::Count),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            other => Err(TableError::UnknownAggregate(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Build a table, checking every row has one cell per column.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self, TableError> {
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(TableError::RaggedRow {
                    row: i,
                    expected: columns.len(),
                    found: row.len(),
                });
            }
        }
        Ok(Self { columns, rows })
    }

    pub fn empty(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build from records. Columns follow first-seen key order; missing keys become null.
    pub fn from_records(records: &[Record]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        let rows = records
            .iter()
            .map(|r| {
                columns
                    .iter()
                    .map(|c| r.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Result<usize, TableError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))
    }

    pub fn column(&self, name: &str) -> Result<Vec<Value>, TableError> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(|r| r[idx].clone()).collect())
    }

    pub fn record(&self, i: usize) -> Option<Record> {
        self.rows.get(i).map(|row| self.to_record(row))
    }

    pub fn to_records(&self) -> Vec<Record> {
        self.rows.iter().map(|row| self.to_record(row)).collect()
    }

    fn to_record(&self, row: &[Value]) -> Record {
        self.columns
            .iter()
            .cloned()
            .zip(row.iter().cloned())
            .collect()
    }

    fn with_rows(&self, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: self.columns.clone(),
            rows,
        }
    }

    pub fn head(&self, n: usize) -> Self {
        self.with_rows(self.rows.iter().take(n).cloned().collect())
    }

    pub fn tail(&self, n: usize) -> Self {
        let skip = self.rows.len().saturating_sub(n);
        self.with_rows(self.rows[skip..].to_vec())
    }

    /// Random rows without replacement, in table order. Whole table if smaller than `n`.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Self {
        if n >= self.rows.len() {
            return self.clone();
        }
        let mut picked = index::sample(rng, self.rows.len(), n).into_vec();
        picked.sort_unstable();
        self.with_rows(picked.into_iter().map(|i| self.rows[i].clone()).collect())
    }

    pub fn select(&self, names: &[String]) -> Result<Self, TableError> {
        let idx = names
            .iter()
            .map(|n| self.column_index(n))
            .collect::<Result<Vec<_>, _>>()?;
        let rows = self
            .rows
            .iter()
            .map(|row| idx.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(Self {
            columns: names.to_vec(),
            rows,
        })
    }

    /// Stable sort on one column; nulls sort first ascending.
    pub fn sort_by(&self, name: &str, ascending: bool) -> Result<Self, TableError> {
        let idx = self.column_index(name)?;
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| {
            let ord = compare_values(&a[idx], &b[idx]);
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        });
        Ok(self.with_rows(rows))
    }

    /// Keep rows for which `keep` returns true. The predicate sees each row as a record.
    pub fn filter_rows<E>(
        &self,
        mut keep: impl FnMut(Record) -> Result<bool, E>,
    ) -> Result<Self, E> {
        let mut rows = Vec::new();
        for row in &self.rows {
            if keep(self.to_record(row))? {
                rows.push(row.clone());
            }
        }
        Ok(self.with_rows(rows))
    }

    /// Add (or replace) a column computed per row.
    pub fn with_column<E>(
        &self,
        name: &str,
        mut compute: impl FnMut(Record) -> Result<Value, E>,
    ) -> Result<Self, E> {
        let existing = self.columns.iter().position(|c| c == name);
        let mut columns = self.columns.clone();
        if existing.is_none() {
            columns.push(name.to_string());
        }
        let mut rows = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let value = compute(self.to_record(row))?;
            let mut row = row.clone();
            match existing {
                Some(i) => row[i] = value,
                None => row.push(value),
            }
            rows.push(row);
        }
        Ok(Self { columns, rows })
    }

    /// Non-null values of a column as numbers. Any non-numeric, non-null cell is an error.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>, TableError> {
        let idx = self.column_index(name)?;
        let mut out = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            match &row[idx] {
                Value::Null => {}
                v => out.push(as_number(v).ok_or_else(|| TableError::NotNumeric {
                    column: name.to_string(),
                    value: v.to_string(),
                })?),
            }
        }
        Ok(out)
    }

    pub fn sum(&self, name: &str) -> Result<f64, TableError> {
        Ok(self.numeric_column(name)?.iter().sum())
    }

    pub fn mean(&self, name: &str) -> Result<f64, TableError> {
        let values = self.numeric_column(name)?;
        if values.is_empty() {
            return Err(TableError::EmptyColumn(name.to_string()));
        }
        Ok(values.iter().sum::<f64>() / values.len() as f64)
    }

    pub fn min(&self, name: &str) -> Result<f64, TableError> {
        self.numeric_column(name)?
            .into_iter()
            .reduce(f64::min)
            .ok_or_else(|| TableError::EmptyColumn(name.to_string()))
    }

    pub fn max(&self, name: &str) -> Result<f64, TableError> {
        self.numeric_column(name)?
            .into_iter()
            .reduce(f64::max)
            .ok_or_else(|| TableError::EmptyColumn(name.to_string()))
    }

    /// Count of non-null cells in a column.
    pub fn count(&self, name: &str) -> Result<usize, TableError> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().filter(|r| !r[idx].is_null()).count())
    }

    /// Distinct values in first-seen order.
    pub fn unique(&self, name: &str) -> Result<Vec<Value>, TableError> {
        let mut seen: Vec<Value> = Vec::new();
        for value in self.column(name)? {
            if !seen.contains(&value) {
                seen.push(value);
            }
        }
        Ok(seen)
    }

    /// Two-column table `[name, "count"]`, most frequent first.
    pub fn value_counts(&self, name: &str) -> Result<Self, TableError> {
        let mut counts: Vec<(Value, i64)> = Vec::new();
        for value in self.column(name)? {
            match counts.iter_mut().find(|(v, _)| *v == value) {
                Some((_, n)) => *n += 1,
                None => counts.push((value, 1)),
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(Self {
            columns: vec![name.to_string(), "count".to_string()],
            rows: counts
                .into_iter()
                .map(|(v, n)| vec![v, Value::from(n)])
                .collect(),
        })
    }

    /// Two-column table `[key, value]` aggregating `value` per distinct `key`, groups in
    /// first-seen order.
    pub fn group_by(&self, key: &str, value: &str, agg: Aggregate) -> Result<Self, TableError> {
        let key_idx = self.column_index(key)?;
        let value_idx = self.column_index(value)?;

        let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
        for row in &self.rows {
            let k = &row[key_idx];
            match groups.iter_mut().find(|(g, _)| g == k) {
                Some((_, members)) => members.push(row[value_idx].clone()),
                None => groups.push((k.clone(), vec![row[value_idx].clone()])),
            }
        }

        let mut rows = Vec::with_capacity(groups.len());
        for (k, members) in groups {
            let present: Vec<&Value> = members.iter().filter(|v| !v.is_null()).collect();
            let cell = if agg == Aggregate::Count {
                Value::from(present.len() as i64)
            } else {
                let nums = present
                    .iter()
                    .map(|v| {
                        as_number(v).ok_or_else(|| TableError::NotNumeric {
                            column: value.to_string(),
                            value: v.to_string(),
                        })
                    })
                    .collect::<Result<Vec<f64>, _>>()?;
                match agg {
                    Aggregate::Sum => Value::from(nums.iter().sum::<f64>()),
                    Aggregate::Mean if nums.is_empty() => Value::Null,
                    Aggregate::Mean => Value::from(nums.iter().sum::<f64>() / nums.len() as f64),
                    Aggregate::Min => {
                        nums.into_iter().reduce(f64::min).map_or(Value::Null, Value::from)
                    }
                    Aggregate::Max => {
                        nums.into_iter().reduce(f64::max).map_or(Value::Null, Value::from)
                    }
                    Aggregate::Count => unreachable!("handled above"),
                }
            };
            rows.push(vec![k, cell]);
        }

        Ok(Self {
            columns: vec![key.to_string(), value.to_string()],
            rows,
        })
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Total order over cells: null < bool < number < string < everything else.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn sales() -> Table {
        Table::new(
            vec!["region".into(), "units".into(), "price".into()],
            vec![
                vec![json!("north"), json!(10), json!(2.5)],
                vec![json!("south"), json!(4), json!(3.0)],
                vec![json!("north"), json!(6), Value::Null],
                vec![json!("east"), json!(1), json!(9.0)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_ragged_rows() {
        let err = Table::new(vec!["a".into(), "b".into()], vec![vec![json!(1)]]).unwrap_err();
        assert_eq!(
            err,
            TableError::RaggedRow {
                row: 0,
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn test_head_and_tail() {
        let t = sales();
        assert_eq!(t.head(2).len(), 2);
        assert_eq!(t.head(10).len(), 4);
        assert_eq!(t.tail(1).column("region").unwrap(), vec![json!("east")]);
        assert_eq!(t.tail(0).len(), 0);
    }

    #[test]
    fn test_sample_without_replacement() {
        let t = sales();
        let mut rng = StdRng::seed_from_u64(7);
        let s = t.sample(3, &mut rng);
        assert_eq!(s.len(), 3);
        let mut rows = s.rows().to_vec();
        rows.dedup();
        assert_eq!(rows.len(), 3);
        assert!(s.rows().iter().all(|r| t.rows().contains(r)));
    }

    #[test]
    fn test_sample_larger_than_table_returns_all() {
        let t = sales();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(t.sample(5, &mut rng), t);
    }

    #[test]
    fn test_records_round_trip_preserves_column_order() {
        let t = sales();
        let back = Table::from_records(&t.to_records());
        assert_eq!(back.columns(), t.columns());
        assert_eq!(back, t);
    }

    #[test]
    fn test_from_records_fills_missing_with_null() {
        let a: Record = serde_json::from_value(json!({"x": 1})).unwrap();
        let b: Record = serde_json::from_value(json!({"y": 2})).unwrap();
        let t = Table::from_records(&[a, b]);
        assert_eq!(t.columns(), &["x".to_string(), "y".to_string()]);
        assert_eq!(t.rows()[1], vec![Value::Null, json!(2)]);
    }

    #[test]
    fn test_aggregates_skip_nulls() {
        let t = sales();
        assert_eq!(t.sum("units").unwrap(), 21.0);
        assert_eq!(t.mean("price").unwrap(), 14.5 / 3.0);
        assert_eq!(t.min("price").unwrap(), 2.5);
        assert_eq!(t.max("units").unwrap(), 10.0);
        assert_eq!(t.count("price").unwrap(), 3);
    }

    #[test]
    fn test_non_numeric_aggregate_fails() {
        let err = sales().sum("region").unwrap_err();
        assert!(matches!(err, TableError::NotNumeric { .. }));
    }

    #[test]
    fn test_unknown_column() {
        assert_eq!(
            sales().column("revenue").unwrap_err(),
            TableError::UnknownColumn("revenue".into())
        );
    }

    #[test]
    fn test_group_by_sum_first_seen_order() {
        let g = sales().group_by("region", "units", Aggregate::Sum).unwrap();
        assert_eq!(
            g.rows(),
            &[
                vec![json!("north"), json!(16.0)],
                vec![json!("south"), json!(4.0)],
                vec![json!("east"), json!(1.0)],
            ]
        );
    }

    #[test]
    fn test_group_by_count_ignores_nulls() {
        let g = sales().group_by("region", "price", Aggregate::Count).unwrap();
        assert_eq!(g.rows()[0], vec![json!("north"), json!(1)]);
    }

    #[test]
    fn test_value_counts_most_frequent_first() {
        let v = sales().value_counts("region").unwrap();
        assert_eq!(v.columns(), &["region".to_string(), "count".to_string()]);
        assert_eq!(v.rows()[0], vec![json!("north"), json!(2)]);
    }

    #[test]
    fn test_sort_descending() {
        let s = sales().sort_by("units", false).unwrap();
        assert_eq!(
            s.column("units").unwrap(),
            vec![json!(10), json!(6), json!(4), json!(1)]
        );
    }

    #[test]
    fn test_filter_and_with_column() {
        let t = sales();
        let north = t
            .filter_rows(|r| Ok::<_, ()>(r["region"] == json!("north")))
            .unwrap();
        assert_eq!(north.len(), 2);

        let doubled = t
            .with_column("double", |r| {
                Ok::<_, ()>(json!(r["units"].as_i64().unwrap_or(0) * 2))
            })
            .unwrap();
        assert_eq!(doubled.columns().len(), 4);
        assert_eq!(doubled.column("double").unwrap()[0], json!(20));
    }

    #[test]
    fn test_aggregate_parse() {
        assert_eq!("SUM".parse::<Aggregate>().unwrap(), Aggregate::Sum);
        assert_eq!("avg".parse::<Aggregate>().unwrap(), Aggregate::Mean);
        assert!("median".parse::<Aggregate>().is_err());
    }
}
