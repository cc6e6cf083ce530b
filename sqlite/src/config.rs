//! Connection configuration.
//!
//! A [`DatabaseConfig`] is applied by the
//! [`DatabaseBuilder`](crate::DatabaseBuilder) right after the connection is
//! opened. It can be kept in a YAML file:
//!
//! ```yaml
//! foreign_keys: true
//! journal_mode: wal
//! busy_timeout_ms: 5000
//! use_counts_table: true
//! batch_size: 500
//! fts_version: fts4
//! ```

use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// SQLite journal modes this layer knows how to switch between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    Wal,
    Delete,
}

impl JournalMode {
    pub fn as_sql(self) -> &'static str {
        match self {
            JournalMode::Wal => "wal",
            JournalMode::Delete => "delete",
        }
    }
}

/// Full-text search engine versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FtsVersion {
    Fts4,
    #[default]
    Fts5,
}

impl FtsVersion {
    /// Module name used in `CREATE VIRTUAL TABLE ... USING`.
    pub fn module(self) -> &'static str {
        match self {
            FtsVersion::Fts4 => "FTS4",
            FtsVersion::Fts5 => "FTS5",
        }
    }

    /// Parses a module name case-insensitively.
    pub fn from_module(module: &str) -> Option<Self> {
        match module.to_ascii_lowercase().as_str() {
            "fts4" => Some(FtsVersion::Fts4),
            "fts5" => Some(FtsVersion::Fts5),
            _ => None,
        }
    }
}

/// Settings applied to every connection opened through the builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Run `PRAGMA foreign_keys = ON`.
    pub foreign_keys: bool,
    /// Run `PRAGMA recursive_triggers = ON` so `INSERT OR REPLACE` fires
    /// delete triggers.
    pub recursive_triggers: bool,
    /// Journal mode to switch to, if any.
    pub journal_mode: Option<JournalMode>,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: Option<u64>,
    /// Install counts-cache triggers on tables created by this layer.
    pub use_counts_table: bool,
    /// Create new tables as `STRICT` unless told otherwise.
    pub strict: bool,
    /// Default number of records per insert chunk.
    pub batch_size: usize,
    /// Default FTS engine for `enable_fts`.
    pub fts_version: FtsVersion,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            foreign_keys: true,
            recursive_triggers: true,
            journal_mode: None,
            busy_timeout_ms: None,
            use_counts_table: false,
            strict: false,
            batch_size: 100,
            fts_version: FtsVersion::Fts5,
        }
    }
}

impl DatabaseConfig {
    /// Loads a configuration from a YAML file. Missing keys take their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::IoError`](crate::SqliteError::IoError) if the
    /// file cannot be read, or
    /// [`SqliteError::ConfigError`](crate::SqliteError::ConfigError) if it is
    /// not valid YAML for this type.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns an I/O or serialization error if writing fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }
}
