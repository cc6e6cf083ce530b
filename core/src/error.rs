//! Error types for record normalization and schema text parsing.

use thiserror::Error;

/// Errors raised by the engine-independent layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// A header row contained something other than a string.
    #[error("column headers must be strings, found {0} at position {1}")]
    NonStringColumnName(String, usize),

    /// Header+rows input was mixed with mapping-shaped records.
    #[error("cannot mix header-defined rows with record rows (row {0})")]
    MixedRowFormats(usize),

    /// A positional row had more values than the header has columns.
    #[error("row {row} has {found} values but the header only names {expected} columns")]
    TooManyValues {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// Schema text could not be classified.
    #[error("invalid SQL text: {0}")]
    InvalidSql(String),
}

/// Convenience alias for results with [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;
