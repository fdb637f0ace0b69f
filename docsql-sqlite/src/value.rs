//! Conversions between [`DbValue`] and SQLite values.

use docsql_core::value::DbValue;
use rusqlite::types::{Value, ValueRef};
use serde_json::{Number, Value as JsonValue};

/// Converts a bound parameter. Booleans become `1`/`0`, matching what
/// `json_extract` returns for JSON `true`/`false`. A list that was not
/// expanded by the translator is bound as a JSON array.
pub(crate) fn to_sql(value: &DbValue) -> Value {
    match value {
        DbValue::Null => Value::Null,
        DbValue::Bool(value) => Value::Integer(*value as i64),
        DbValue::Integer(value) => Value::Integer(*value),
        DbValue::Real(value) => Value::Real(*value),
        DbValue::Text(value) => Value::Text(value.clone()),
        DbValue::List(_) => Value::Text(to_json(value).to_string()),
    }
}

pub(crate) fn from_sql(value: ValueRef<'_>) -> DbValue {
    match value {
        ValueRef::Null => DbValue::Null,
        ValueRef::Integer(value) => DbValue::Integer(value),
        ValueRef::Real(value) => DbValue::Real(value),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            DbValue::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn to_json(value: &DbValue) -> JsonValue {
    match value {
        DbValue::Null => JsonValue::Null,
        DbValue::Bool(value) => JsonValue::Bool(*value),
        DbValue::Integer(value) => JsonValue::from(*value),
        DbValue::Real(value) => Number::from_f64(*value)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        DbValue::Text(value) => JsonValue::String(value.clone()),
        DbValue::List(values) => JsonValue::Array(values.iter().map(to_json).collect()),
    }
}
