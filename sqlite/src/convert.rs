//! Conversion between [`Value`] and SQLite values.
//!
//! Outbound, lists and maps are stored as compact JSON text and booleans
//! as `0`/`1`. Inbound, storage classes map one-to-one onto the scalar
//! variants; stored JSON stays text.

use dyntable_core::{Record, Value};
use rusqlite::Row;
use rusqlite::types::ValueRef;

/// Owned SQLite value, as bound to statements and reported to tracers.
pub type SqlValue = rusqlite::types::Value;

/// Converts a value to the form bound to a statement parameter.
pub(crate) fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Blob(bytes) => SqlValue::Blob(bytes.clone()),
        Value::List(_) | Value::Map(_) => SqlValue::Text(value.to_json().to_string()),
    }
}

/// Converts many values at once.
pub(crate) fn to_sql_all<'a, I>(values: I) -> Vec<SqlValue>
where
    I: IntoIterator<Item = &'a Value>,
{
    values.into_iter().map(to_sql).collect()
}

pub(crate) fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    }
}

/// Reads a whole result row into a record keyed by `columns`.
pub(crate) fn row_to_record(row: &Row<'_>, columns: &[String]) -> rusqlite::Result<Record> {
    let mut record = Record::with_capacity(columns.len());
    for (i, name) in columns.iter().enumerate() {
        record.insert(name.clone(), from_sql(row.get_ref(i)?));
    }
    Ok(record)
}
