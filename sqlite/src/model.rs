//! Catalog projections returned by introspection.
//!
//! None of these are cached: every value is read from the live catalog
//! when requested.

use dyntable_core::{ColumnType, SqlDefault};
use serde::Serialize;

/// One row of `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub cid: i64,
    pub name: String,
    /// Declared type text, possibly empty.
    pub declared_type: String,
    pub not_null: bool,
    /// Raw default SQL text, as stored in the catalog.
    pub default_value: Option<String>,
    /// 1-based position in the primary key, `0` if not part of it.
    pub pk: i64,
}

impl Column {
    /// The affinity of the declared type.
    pub fn column_type(&self) -> ColumnType {
        ColumnType::from_declared(&self.declared_type)
    }

    /// The default value, classified. Unparseable text is kept as an
    /// expression.
    pub fn default(&self) -> Option<SqlDefault> {
        self.default_value
            .as_deref()
            .map(|text| SqlDefault::parse(text).unwrap_or_else(|_| SqlDefault::expression(text)))
    }

    pub fn is_pk(&self) -> bool {
        self.pk > 0
    }
}

/// A foreign key constraint on a single column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
    pub other_table: String,
    pub other_column: String,
}

/// A caller-side foreign key request. Missing parts are guessed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ForeignKeySpec {
    pub column: String,
    pub other_table: Option<String>,
    pub other_column: Option<String>,
}

impl ForeignKeySpec {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ..Self::default()
        }
    }

    pub fn references(mut self, other_table: impl Into<String>) -> Self {
        self.other_table = Some(other_table.into());
        self
    }

    pub fn on(mut self, other_column: impl Into<String>) -> Self {
        self.other_column = Some(other_column.into());
        self
    }
}

impl From<ForeignKey> for ForeignKeySpec {
    fn from(fk: ForeignKey) -> Self {
        ForeignKeySpec::new(fk.column)
            .references(fk.other_table)
            .on(fk.other_column)
    }
}

impl From<&str> for ForeignKeySpec {
    fn from(column: &str) -> Self {
        ForeignKeySpec::new(column)
    }
}

impl From<(&str, &str)> for ForeignKeySpec {
    fn from((column, other_table): (&str, &str)) -> Self {
        ForeignKeySpec::new(column).references(other_table)
    }
}

impl From<(&str, &str, &str)> for ForeignKeySpec {
    fn from((column, other_table, other_column): (&str, &str, &str)) -> Self {
        ForeignKeySpec::new(column).references(other_table).on(other_column)
    }
}

/// An index, from `PRAGMA index_list` and `PRAGMA index_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Index {
    pub seq: i64,
    pub name: String,
    pub unique: bool,
    /// `c` (CREATE INDEX), `u` (UNIQUE constraint) or `pk`.
    pub origin: String,
    pub partial: bool,
    pub columns: Vec<String>,
}

/// One column of an index, from `PRAGMA index_xinfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XIndexColumn {
    pub seqno: i64,
    pub cid: i64,
    /// `None` for the rowid or an expression.
    pub name: Option<String>,
    pub desc: bool,
    pub collation: String,
    /// `false` for the auxiliary columns stored after the key.
    pub key: bool,
}

/// An index with full per-column detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XIndex {
    pub name: String,
    pub columns: Vec<XIndexColumn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trigger {
    pub name: String,
    pub table: String,
    pub sql: String,
}

/// A column to index, optionally descending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexColumn {
    pub name: String,
    pub desc: bool,
}

impl IndexColumn {
    pub fn desc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            desc: true,
        }
    }
}

impl From<&str> for IndexColumn {
    fn from(name: &str) -> Self {
        Self {
            name: name.to_string(),
            desc: false,
        }
    }
}

impl From<String> for IndexColumn {
    fn from(name: String) -> Self {
        Self { name, desc: false }
    }
}
