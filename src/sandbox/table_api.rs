// src/sandbox/table_api.rs — Table type and `tbl` namespace exposed to scripts
//
// Every method returns a new table; scripts cannot reach the host's copy.

use rhai::plugin::*;
use rhai::{Array, Dynamic, Engine, EvalAltResult, FnPtr, Map, NativeCallContext};

use super::rhai_host::{dynamic_to_json, json_to_dynamic};
use super::TABLE_NAMESPACE;
use crate::data::{Aggregate, Record, Table};

type RhaiResult<T> = Result<T, Box<EvalAltResult>>;

fn runtime_err(e: impl std::fmt::Display) -> Box<EvalAltResult> {
    e.to_string().into()
}

fn clamp_count(n: i64) -> usize {
    n.max(0) as usize
}

fn record_to_map(record: &Record) -> Map {
    record
        .iter()
        .map(|(k, v)| (k.as_str().into(), json_to_dynamic(v)))
        .collect()
}

fn map_to_record(map: &Map) -> RhaiResult<Record> {
    map.iter()
        .map(|(k, v)| Ok((k.to_string(), dynamic_to_json(v).map_err(runtime_err)?)))
        .collect()
}

fn string_list(items: &Array) -> RhaiResult<Vec<String>> {
    items
        .iter()
        .map(|d| {
            d.clone()
                .into_string()
                .map_err(|t| runtime_err(format!("expected column name string, got {}", t)))
        })
        .collect()
}

#[export_module]
mod tbl_namespace {
    use super::*;

    /// `tbl::from_rows([#{a: 1}, #{a: 2}])`
    #[rhai_fn(return_raw)]
    pub fn from_rows(rows: Array) -> Result<Table, Box<EvalAltResult>> {
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let map = row
                .try_cast::<Map>()
                .ok_or_else(|| runtime_err("tbl::from_rows expects an array of object maps"))?;
            records.push(map_to_record(&map)?);
        }
        Ok(Table::from_records(&records))
    }

    /// `tbl::empty(["a", "b"])`
    #[rhai_fn(return_raw)]
    pub fn empty(columns: Array) -> Result<Table, Box<EvalAltResult>> {
        Ok(Table::empty(string_list(&columns)?))
    }
}

/// Register the `Table` type, its methods and the `tbl` namespace.
pub fn register(engine: &mut Engine) {
    engine.register_type_with_name::<Table>("Table");

    engine.register_fn("columns", |t: &mut Table| -> Array {
        t.columns().iter().map(|c| Dynamic::from(c.clone())).collect()
    });
    engine.register_fn("len", |t: &mut Table| t.len() as i64);
    engine.register_fn("is_empty", |t: &mut Table| t.is_empty());
    engine.register_fn("head", |t: &mut Table| t.head(5));
    engine.register_fn("head", |t: &mut Table, n: i64| t.head(clamp_count(n)));
    engine.register_fn("tail", |t: &mut Table| t.tail(5));
    engine.register_fn("tail", |t: &mut Table, n: i64| t.tail(clamp_count(n)));
    engine.register_fn("to_string", |t: &mut Table| {
        format!("<Table {} rows x {} columns>", t.len(), t.columns().len())
    });

    engine.register_fn("column", |t: &mut Table, name: &str| -> RhaiResult<Array> {
        let values = t.column(name).map_err(runtime_err)?;
        Ok(values.iter().map(json_to_dynamic).collect())
    });
    engine.register_fn("rows", |t: &mut Table| -> Array {
        t.to_records()
            .iter()
            .map(|r| Dynamic::from(record_to_map(r)))
            .collect()
    });
    engine.register_fn("row", |t: &mut Table, i: i64| -> RhaiResult<Map> {
        let record = usize::try_from(i)
            .ok()
            .and_then(|i| t.record(i))
            .ok_or_else(|| runtime_err(format!("row {} out of range (len {})", i, t.len())))?;
        Ok(record_to_map(&record))
    });
    engine.register_fn("select", |t: &mut Table, names: Array| -> RhaiResult<Table> {
        t.select(&string_list(&names)?).map_err(runtime_err)
    });

    engine.register_fn(
        "filter",
        |ctx: NativeCallContext, t: &mut Table, f: FnPtr| -> RhaiResult<Table> {
            t.filter_rows(|r| f.call_within_context::<bool>(&ctx, (record_to_map(&r),)))
        },
    );
    engine.register_fn(
        "with_column",
        |ctx: NativeCallContext, t: &mut Table, name: &str, f: FnPtr| -> RhaiResult<Table> {
            t.with_column(name, |r| {
                let value: Dynamic = f.call_within_context(&ctx, (record_to_map(&r),))?;
                dynamic_to_json(&value).map_err(runtime_err)
            })
        },
    );

    engine.register_fn("sort_by", |t: &mut Table, col: &str| -> RhaiResult<Table> {
        t.sort_by(col, true).map_err(runtime_err)
    });
    engine.register_fn(
        "sort_by",
        |t: &mut Table, col: &str, ascending: bool| -> RhaiResult<Table> {
            t.sort_by(col, ascending).map_err(runtime_err)
        },
    );

    engine.register_fn("sum", |t: &mut Table, col: &str| -> RhaiResult<f64> {
        t.sum(col).map_err(runtime_err)
    });
    engine.register_fn("mean", |t: &mut Table, col: &str| -> RhaiResult<f64> {
        t.mean(col).map_err(runtime_err)
    });
    engine.register_fn("min", |t: &mut Table, col: &str| -> RhaiResult<f64> {
        t.min(col).map_err(runtime_err)
    });
    engine.register_fn("max", |t: &mut Table, col: &str| -> RhaiResult<f64> {
        t.max(col).map_err(runtime_err)
    });
    engine.register_fn("count", |t: &mut Table, col: &str| -> RhaiResult<i64> {
        t.count(col).map(|n| n as i64).map_err(runtime_err)
    });
    engine.register_fn("unique", |t: &mut Table, col: &str| -> RhaiResult<Array> {
        let values = t.unique(col).map_err(runtime_err)?;
        Ok(values.iter().map(json_to_dynamic).collect())
    });
    engine.register_fn("value_counts", |t: &mut Table, col: &str| -> RhaiResult<Table> {
        t.value_counts(col).map_err(runtime_err)
    });
    engine.register_fn(
        "group_by",
        |t: &mut Table, key: &str, value: &str, agg: &str| -> RhaiResult<Table> {
            let agg: Aggregate = agg.parse().map_err(runtime_err)?;
            t.group_by(key, value, agg).map_err(runtime_err)
        },
    );

    engine.register_static_module(TABLE_NAMESPACE, exported_module!(tbl_namespace).into());
}
