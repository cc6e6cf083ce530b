//! Schema-inferring record store over SQLite.
//!
//! Tables are created and widened on demand from the records written to
//! them, and reshaped with copy-and-swap transforms when `ALTER TABLE`
//! cannot express a change. Every piece of schema information is read from
//! the live catalog; nothing is cached client-side.
//!
//! # Architecture
//!
//! A [`Database`] owns one connection. [`Table`] and [`View`] are cheap
//! name handles borrowed from it, and their operations are split across
//! modules:
//!
//! - **`introspect`**: columns, keys, indexes, triggers, counts
//! - **`create`**: `CREATE TABLE`, `ADD COLUMN`, foreign keys, indexes
//! - **`insert`**: batched insert and upsert with type inference
//! - **`transform`**: copy-and-swap table rewrites
//! - **`fts`**: FTS4/FTS5 indexes, sync triggers and search
//! - **`relations`**: lookup tables, many-to-many links, extraction
//! - **`counts`**: trigger-maintained row counts
//!
//! Every statement runs through [`Database::execute`] or
//! [`Database::query`], which log it at `debug` level under the
//! `dyntable::sql` target and pass it to the optional [`Tracer`].
//!
//! # Quick start
//!
//! ```
//! use dyntable_core::{record, ColumnType, Value};
//! use dyntable_sqlite::{Database, InsertOptions, TransformOptions};
//!
//! let db = Database::open_in_memory().unwrap();
//! let dogs = db.table("dogs");
//! dogs.insert_all(
//!     vec![
//!         record! { "id" => 1, "name" => "Cleo", "age" => "4" },
//!         record! { "id" => 2, "name" => "Pancakes", "age" => "2" },
//!     ],
//!     &InsertOptions::new().pk(["id"]),
//! )
//! .unwrap();
//!
//! dogs.transform(&TransformOptions {
//!     types: [("age".to_string(), ColumnType::Integer)].into(),
//!     ..Default::default()
//! })
//! .unwrap();
//! assert_eq!(dogs.get(1).unwrap().get("age"), Some(&Value::Integer(4)));
//! ```
//!
//! # Configuration
//!
//! Connection settings come from a [`DatabaseConfig`], optionally loaded
//! from YAML:
//!
//! ```no_run
//! use dyntable_sqlite::Database;
//!
//! let db = Database::builder()
//!     .config_file("dyntable.yaml")
//!     .unwrap()
//!     .open("data.db")
//!     .unwrap();
//! ```

mod config;
mod convert;
mod counts;
mod create;
mod database;
mod error;
mod fts;
mod hooks;
mod insert;
mod introspect;
mod model;
mod relations;
mod table;
mod transform;
mod view;

pub use config::{DatabaseConfig, FtsVersion, JournalMode};
pub use convert::SqlValue;
pub use create::{AddColumnOptions, CreateOptions, IndexOptions};
pub use database::{Database, DatabaseBuilder, Tracer};
pub use error::{Result, SqliteError};
pub use fts::{FtsOptions, SearchOptions, escape_fts_query};
pub use hooks::{ConnectionHook, HookRegistry, RANK_BM25_HOOK, rank_bm25, register_rank_bm25};
pub use insert::InsertOptions;
pub use model::{Column, ForeignKey, ForeignKeySpec, Index, IndexColumn, Trigger, XIndex, XIndexColumn};
pub use relations::{ExtractOptions, LookupOptions, M2mOptions, M2mTarget};
pub use table::{RowsQuery, Table, UpdateOptions};
pub use transform::TransformOptions;
pub use view::View;
