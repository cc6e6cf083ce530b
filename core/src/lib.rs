//! Engine-independent building blocks for dynamically-typed SQLite tables.
//!
//! This crate holds everything that does not need a database connection:
//!
//! - [`Value`] and [`Record`]: the closed value model records are made of.
//! - [`suggest_column_types`] / [`TypeTracker`]: column type inference
//!   over heterogeneous records.
//! - [`SqlDefault`], [`table_options`], [`VirtualTableDef`]: classifiers
//!   for schema text reported by the SQLite catalog.
//! - [`naming`]: the names generated for auxiliary tables, triggers and
//!   indexes.
//! - [`hash_record`]: deterministic record hashes for synthesized keys.
//! - [`RowNormalizer`]: header + positional rows input.
//!
//! # Example
//!
//! ```
//! use dyntable_core::*;
//!
//! let records = vec![
//!     record! { "id" => 1, "name" => "Cleo", "age" => 4 },
//!     record! { "id" => 2, "name" => "Pancakes", "weight" => 12.5 },
//! ];
//!
//! let types = suggest_column_types(&records);
//! assert_eq!(types[0], ("id".to_string(), ColumnType::Integer));
//! assert_eq!(types[3], ("weight".to_string(), ColumnType::Float));
//! ```

mod error;
mod hash;
mod infer;
pub mod naming;
mod record;
mod rows;
mod schema_text;
mod types;
mod value;

pub use error::{CoreError, Result};
pub use hash::hash_record;
pub use infer::{TypeTracker, apply_column_order, suggest_column_types, type_for_kinds};
pub use record::Record;
pub use rows::{InputRow, RowNormalizer};
pub use schema_text::{
    SqlDefault, TableOptions, VirtualTableDef, quote_identifier, quote_literal, table_options,
    unquote_identifier,
};
pub use types::ColumnType;
pub use value::{Value, ValueKind};
