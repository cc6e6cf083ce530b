//! Error types for SQLite table operations.
//!
//! Provides a unified error type covering engine failures, schema
//! validation, relationship resolution and configuration loading.
//! Validation variants are raised before any SQL runs.

use thiserror::Error;

/// Errors that can occur while working with a [`Database`](crate::Database).
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite engine failure, with the engine's message preserved.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// A table (or FTS table) that should not exist already does.
    #[error("table already exists: {0}")]
    TableExists(String),

    /// The named table does not exist.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// The named view does not exist.
    #[error("view not found: {0}")]
    ViewNotFound(String),

    /// A schema change was rejected: conflicting options, duplicate
    /// foreign keys, unknown referenced columns, failed integrity checks.
    #[error("alter error: {0}")]
    AlterError(String),

    /// An upsert was requested but no primary key could be determined.
    #[error("primary key required: {0}")]
    PrimaryKeyRequired(String),

    /// One or more column names are unknown or collide.
    #[error("invalid columns: {0}")]
    InvalidColumns(String),

    /// No single table could be chosen for a foreign key or m2m link.
    #[error("no obvious table: {0}")]
    NoObviousTable(String),

    /// No row matched the given primary key.
    #[error("not found: {0}")]
    NotFound(String),

    /// A header + rows input stream was malformed.
    #[error("row error: {0}")]
    RowError(#[from] dyntable_core::CoreError),

    /// A caller-supplied argument is unusable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Failed to serialize a value to JSON.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Failed to parse or write a YAML configuration file.
    #[error("config error: {0}")]
    ConfigError(#[from] serde_yaml::Error),

    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Convenience alias for results with [`SqliteError`].
pub type Result<T> = std::result::Result<T, SqliteError>;
