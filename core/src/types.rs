//! Column storage types.
//!
//! SQLite stores values dynamically but assigns every declared column an
//! *affinity*. This module defines the four affinities this crate creates
//! columns with and the mapping from arbitrary declared type text back to
//! one of them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::ValueKind;

/// Storage type of a column.
///
/// # Examples
///
/// ```
/// use dyntable_core::ColumnType;
///
/// assert_eq!(ColumnType::Integer.sql_name(false), "INTEGER");
/// assert_eq!(ColumnType::Float.sql_name(true), "REAL");
/// assert_eq!(ColumnType::from_declared("VARCHAR(255)"), ColumnType::Text);
/// assert_eq!(ColumnType::from_declared("BIGINT"), ColumnType::Integer);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    #[default]
    Text,
    Blob,
}

impl ColumnType {
    /// Returns the type name used in `CREATE TABLE`.
    ///
    /// STRICT tables only accept `INTEGER`, `REAL`, `TEXT`, `BLOB` and `ANY`,
    /// so floats are declared `REAL` there and `FLOAT` elsewhere.
    pub fn sql_name(self, strict: bool) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Float if strict => "REAL",
            ColumnType::Float => "FLOAT",
            ColumnType::Text => "TEXT",
            ColumnType::Blob => "BLOB",
        }
    }

    /// Maps a declared column type to its affinity.
    ///
    /// Follows SQLite's affinity rules: `INT` anywhere gives integer,
    /// `CHAR`/`CLOB`/`TEXT` gives text, `BLOB` or an empty declaration
    /// gives blob, `REAL`/`FLOA`/`DOUB` gives float. Everything else has
    /// NUMERIC affinity, which is reported as float.
    pub fn from_declared(declared: &str) -> ColumnType {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("INT") {
            ColumnType::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            ColumnType::Text
        } else if upper.contains("BLOB") || upper.trim().is_empty() {
            ColumnType::Blob
        } else {
            ColumnType::Float
        }
    }

    /// Type used for a column whose only observed kind is `kind`.
    ///
    /// Returns `None` for [`ValueKind::Null`], which carries no type signal.
    pub fn for_kind(kind: ValueKind) -> Option<ColumnType> {
        match kind {
            ValueKind::Null => None,
            ValueKind::Bool | ValueKind::Integer => Some(ColumnType::Integer),
            ValueKind::Float => Some(ColumnType::Float),
            ValueKind::Text | ValueKind::List | ValueKind::Map => Some(ColumnType::Text),
            ValueKind::Blob => Some(ColumnType::Blob),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affinity_rules() {
        assert_eq!(ColumnType::from_declared("INTEGER"), ColumnType::Integer);
        assert_eq!(ColumnType::from_declared("tinyint"), ColumnType::Integer);
        assert_eq!(ColumnType::from_declared("NVARCHAR(10)"), ColumnType::Text);
        assert_eq!(ColumnType::from_declared("CLOB"), ColumnType::Text);
        assert_eq!(ColumnType::from_declared(""), ColumnType::Blob);
        assert_eq!(ColumnType::from_declared("DOUBLE PRECISION"), ColumnType::Float);
        assert_eq!(ColumnType::from_declared("FLOAT"), ColumnType::Float);
        assert_eq!(ColumnType::from_declared("NUMERIC"), ColumnType::Float);
    }

    #[test]
    fn test_serde_lowercase_names() {
        let json = serde_json::to_string(&ColumnType::Float).unwrap();
        assert_eq!(json, "\"float\"");
        let back: ColumnType = serde_json::from_str("\"blob\"").unwrap();
        assert_eq!(back, ColumnType::Blob);
    }
}
