//! Mapping raw rows onto caller types

use crate::error::Result;
use crate::models::{StatementResult, Value};
use serde::de::DeserializeOwned;
use serde_json::Map;

impl StatementResult {
    /// Deserialize every row into `T`.
    ///
    /// A single column row maps to its value; wider rows map to an object
    /// keyed by column name. REST formatted nodes and relationships are
    /// reduced to their `data` properties.
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<Vec<T>> {
        let StatementResult { columns, rows } = self;
        rows.into_iter()
            .map(|row| Ok(serde_json::from_value(shape_row(&columns, row))?))
            .collect()
    }
}

fn shape_row(columns: &[String], mut row: Vec<Value>) -> Value {
    if row.len() == 1 && columns.len() <= 1 {
        return unwrap_rest(row.remove(0));
    }
    let object: Map<String, Value> = columns
        .iter()
        .cloned()
        .zip(row.into_iter().map(unwrap_rest))
        .collect();
    Value::Object(object)
}

/// `{"self": ..., "data": {...}}` -> `{...}`
fn unwrap_rest(value: Value) -> Value {
    match value {
        Value::Object(mut object) if object.contains_key("self") && object.contains_key("data") => {
            object.remove("data").unwrap_or(Value::Null)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(unwrap_rest).collect()),
        other => other,
    }
}
