//! Full-text search management.
//!
//! Each base table has at most one external-content FTS table,
//! `<table>_fts`, optionally kept in sync by three triggers. FTS5 triggers
//! use the `'delete'` command; FTS4 has no such command for external
//! content tables, so its delete and update triggers fire `BEFORE` the
//! change while the old row is still readable.

use std::sync::LazyLock;

use dyntable_core::{Record, Value, naming, quote_identifier};
use regex::Regex;
use rusqlite::ErrorCode;
use tracing::{debug, info, warn};

use crate::config::FtsVersion;
use crate::convert::{self, SqlValue};
use crate::error::{Result, SqliteError};
use crate::table::Table;

/// Options for [`Table::enable_fts`].
#[derive(Debug, Clone, Default)]
pub struct FtsOptions {
    /// `None` uses the configured default.
    pub fts_version: Option<FtsVersion>,
    pub create_triggers: bool,
    /// Tokenizer, e.g. `porter`.
    pub tokenize: Option<String>,
    /// Replace an existing FTS table whose configuration differs.
    pub replace: bool,
}

/// Options for [`Table::search`].
///
/// # Examples
///
/// ```
/// use dyntable_sqlite::SearchOptions;
///
/// let options = SearchOptions::new()
///     .columns(["title"])
///     .filter("year > :year", [("year", 2000)])
///     .limit(5);
/// assert_eq!(options.where_args[0].0, "year");
/// ```
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Columns to return; all columns when empty.
    pub columns: Vec<String>,
    /// Filter on the base table, using `:name` parameters.
    pub where_clause: Option<String>,
    /// Values for the `:name` parameters in `where_clause`. The name
    /// `query` is reserved.
    pub where_args: Vec<(String, Value)>,
    /// Ordering; by rank when `None`.
    pub order_by: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// Escape the query with [`escape_fts_query`] first.
    pub quote: bool,
    /// Add a `rank` column to the results.
    pub include_rank: bool,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter<I, K, V>(mut self, where_clause: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.where_clause = Some(where_clause.into());
        self.where_args = args.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn quote(mut self) -> Self {
        self.quote = true;
        self
    }

    pub fn include_rank(mut self) -> Self {
        self.include_rank = true;
        self
    }
}

/// Makes arbitrary user input safe to use as an FTS query.
///
/// An unbalanced `"` is closed, and every bare token is wrapped in double
/// quotes so operators like `AND` or `*` are matched literally.
///
/// # Examples
///
/// ```
/// use dyntable_sqlite::escape_fts_query;
///
/// assert_eq!(escape_fts_query("cat AND dog"), r#""cat" "AND" "dog""#);
/// assert_eq!(escape_fts_query(r#"say "hello world"#), r#""say" "hello world""#);
/// ```
pub fn escape_fts_query(query: &str) -> String {
    // SAFETY: compile-time constant, covered by tests.
    static TOKEN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"\s+|(".*?")"#).expect("static regex must compile"));

    let mut query = query.to_string();
    if query.matches('"').count() % 2 == 1 {
        query.push('"');
    }

    let mut bits: Vec<&str> = Vec::new();
    let mut last = 0;
    for caps in TOKEN_RE.captures_iter(&query) {
        let Some(whole) = caps.get(0) else { continue };
        bits.push(&query[last..whole.start()]);
        if let Some(phrase) = caps.get(1) {
            bits.push(phrase.as_str());
        }
        last = whole.end();
    }
    bits.push(&query[last..]);

    bits.into_iter()
        .filter(|bit| !bit.is_empty() && *bit != "\"\"")
        .map(|bit| {
            if bit.starts_with('"') {
                bit.to_string()
            } else {
                format!("\"{bit}\"")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn prefixed(prefix: &str, columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| format!("{prefix}.{}", quote_identifier(c)))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Table<'_> {
    fn fts_quoted(&self) -> String {
        quote_identifier(&naming::fts_table_name(self.name()))
    }

    /// The detected FTS table and its version.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::TableNotFound`] naming `<table>_fts` when the
    /// table has no FTS index.
    fn require_fts(&self) -> Result<(String, FtsVersion)> {
        let def = self
            .detect_fts_def()?
            .ok_or_else(|| SqliteError::TableNotFound(naming::fts_table_name(self.name())))?;
        let version = FtsVersion::from_module(&def.module).ok_or_else(|| {
            SqliteError::InvalidArgument(format!("unsupported full-text module: {}", def.module))
        })?;
        Ok((def.name, version))
    }

    /// Creates `<table>_fts` over `columns` and indexes the current rows.
    ///
    /// With `create_triggers`, later writes to the table are mirrored
    /// into the index. With `replace`, an existing index is dropped and
    /// recreated unless its version, columns, tokenizer and trigger
    /// presence already match, in which case nothing runs.
    ///
    /// # Errors
    ///
    /// - [`SqliteError::TableNotFound`] if the table does not exist.
    /// - [`SqliteError::InvalidColumns`] if a column is unknown.
    /// - [`SqliteError::TableExists`] if an FTS table exists and `replace`
    ///   is not set.
    ///
    /// # Examples
    ///
    /// ```
    /// use dyntable_sqlite::{Database, FtsOptions, SearchOptions};
    ///
    /// let db = Database::open_in_memory().unwrap();
    /// db.execute_script(
    ///     "CREATE TABLE docs (title TEXT, body TEXT);
    ///      INSERT INTO docs VALUES ('Rust', 'ownership and borrowing'), ('Go', 'goroutines');",
    /// )
    /// .unwrap();
    /// let docs = db.table("docs");
    /// docs.enable_fts(&["title", "body"], &FtsOptions { create_triggers: true, ..Default::default() })
    ///     .unwrap();
    /// let hits = docs.search("borrowing", &SearchOptions::new().columns(["title"])).unwrap();
    /// assert_eq!(hits.len(), 1);
    /// ```
    pub fn enable_fts<S: AsRef<str>>(&self, columns: &[S], options: &FtsOptions) -> Result<&Self> {
        self.require_exists()?;
        let columns: Vec<String> = columns.iter().map(|c| c.as_ref().to_string()).collect();
        let known = self.column_names()?;
        let unknown: Vec<&str> = columns
            .iter()
            .filter(|c| !known.contains(c))
            .map(String::as_str)
            .collect();
        if columns.is_empty() || !unknown.is_empty() {
            return Err(SqliteError::InvalidColumns(format!(
                "cannot index columns [{}] of {}",
                unknown.join(", "),
                self.name()
            )));
        }
        let version = options.fts_version.unwrap_or(self.db().config().fts_version);
        let fts_name = naming::fts_table_name(self.name());

        if let Some(existing) = self.detect_fts_def()? {
            if !options.replace {
                return Err(SqliteError::TableExists(existing.name));
            }
            let same = existing.name == fts_name
                && FtsVersion::from_module(&existing.module) == Some(version)
                && existing.columns() == columns
                && existing.option("tokenize") == options.tokenize
                && self.has_fts_triggers()? == options.create_triggers;
            if same {
                debug!(table = %self.name(), "FTS configuration unchanged");
                return Ok(self);
            }
            self.disable_fts()?;
        }

        let create = self.fts_create_sql(&fts_name, &columns, version, options.tokenize.as_deref());

        self.db().transaction(|db| {
            db.execute(&create, &[])?;
            self.populate_fts(&columns)?;
            if options.create_triggers {
                for sql in self.fts_triggers_sql(&fts_name, &columns, version) {
                    db.execute(&sql, &[])?;
                }
            }
            Ok(())
        })?;
        info!(
            table = %self.name(),
            fts = %fts_name,
            version = version.module(),
            triggers = options.create_triggers,
            "Enabled full-text search"
        );
        Ok(self)
    }

    /// `CREATE VIRTUAL TABLE` for an external-content index over `columns`.
    pub(crate) fn fts_create_sql(
        &self,
        fts_name: &str,
        columns: &[String],
        version: FtsVersion,
        tokenize: Option<&str>,
    ) -> String {
        let mut args = vec![column_list(columns)];
        if let Some(tokenize) = tokenize {
            args.push(format!("tokenize='{}'", tokenize.replace('\'', "''")));
        }
        args.push(format!("content={}", self.quoted()));
        format!(
            "CREATE VIRTUAL TABLE {} USING {} (\n    {}\n)",
            quote_identifier(fts_name),
            version.module(),
            args.join(",\n    ")
        )
    }

    pub(crate) fn has_fts_triggers(&self) -> Result<bool> {
        let names: Vec<String> = self.triggers()?.into_iter().map(|t| t.name).collect();
        Ok(naming::fts_trigger_names(self.name())
            .iter()
            .all(|wanted| names.contains(wanted)))
    }

    /// The insert, delete and update triggers mirroring writes into
    /// `fts_name`, one statement each.
    pub(crate) fn fts_triggers_sql(&self, fts_name: &str, columns: &[String], version: FtsVersion) -> [String; 3] {
        let [ai, ad, au] = naming::fts_trigger_names(self.name());
        let (ai, ad, au) = (quote_identifier(&ai), quote_identifier(&ad), quote_identifier(&au));
        let table = self.quoted();
        let fts = quote_identifier(fts_name);
        let cols = column_list(columns);
        let new_values = prefixed("new", columns);
        let old_values = prefixed("old", columns);
        let insert_new = format!("INSERT INTO {fts} (rowid, {cols}) VALUES (new.rowid, {new_values});");

        match version {
            FtsVersion::Fts5 => {
                let delete_old =
                    format!("INSERT INTO {fts} ({fts}, rowid, {cols}) VALUES ('delete', old.rowid, {old_values});");
                [
                    format!("CREATE TRIGGER {ai} AFTER INSERT ON {table} BEGIN\n  {insert_new}\nEND;"),
                    format!("CREATE TRIGGER {ad} AFTER DELETE ON {table} BEGIN\n  {delete_old}\nEND;"),
                    format!("CREATE TRIGGER {au} AFTER UPDATE ON {table} BEGIN\n  {delete_old}\n  {insert_new}\nEND;"),
                ]
            }
            FtsVersion::Fts4 => {
                let delete_old = format!("DELETE FROM {fts} WHERE docid = old.rowid;");
                [
                    format!("CREATE TRIGGER {ai} AFTER INSERT ON {table} BEGIN\n  {insert_new}\nEND;"),
                    format!("CREATE TRIGGER {ad} BEFORE DELETE ON {table} BEGIN\n  {delete_old}\nEND;"),
                    format!("CREATE TRIGGER {au} BEFORE UPDATE ON {table} BEGIN\n  {delete_old}\n  {insert_new}\nEND;"),
                ]
            }
        }
    }

    /// Copies `columns` of every row into the FTS table.
    pub fn populate_fts<S: AsRef<str>>(&self, columns: &[S]) -> Result<&Self> {
        let columns: Vec<String> = columns.iter().map(|c| c.as_ref().to_string()).collect();
        let cols = column_list(&columns);
        let sql = format!(
            "INSERT INTO {} (rowid, {cols}) SELECT rowid, {cols} FROM {}",
            self.fts_quoted(),
            self.quoted()
        );
        let rows = self.db().execute(&sql, &[])?;
        debug!(table = %self.name(), rows, "Populated FTS index");
        Ok(self)
    }

    fn fts_command(&self, command: &str) -> Result<()> {
        let (fts_name, _) = self.require_fts()?;
        let fts = quote_identifier(&fts_name);
        self.db().execute(
            &format!("INSERT INTO {fts} ({fts}) VALUES ('{command}')"),
            &[],
        )?;
        Ok(())
    }

    /// Rebuilds the FTS index from the base table.
    pub fn rebuild_fts(&self) -> Result<&Self> {
        self.fts_command("rebuild")?;
        info!(table = %self.name(), "Rebuilt FTS index");
        Ok(self)
    }

    /// Merges the FTS index b-trees.
    pub fn optimize(&self) -> Result<&Self> {
        self.fts_command("optimize")?;
        debug!(table = %self.name(), "Optimized FTS index");
        Ok(self)
    }

    /// Runs the engine's integrity check on the FTS index. Returns `false`
    /// if the index is out of step with its content.
    pub fn fts_integrity_check(&self) -> Result<bool> {
        match self.fts_command("integrity-check") {
            Ok(()) => Ok(true),
            Err(SqliteError::DatabaseError(rusqlite::Error::SqliteFailure(err, message)))
                if err.code == ErrorCode::DatabaseCorrupt =>
            {
                warn!(table = %self.name(), message = ?message, "FTS integrity check failed");
                Ok(false)
            }
            Err(other) => Err(other),
        }
    }

    /// Drops the FTS table and its triggers. The base table is untouched.
    pub fn disable_fts(&self) -> Result<&Self> {
        let fts_name = self.detect_fts()?;
        self.db().transaction(|db| {
            if let Some(fts_name) = &fts_name {
                db.execute(&format!("DROP TABLE IF EXISTS {}", quote_identifier(fts_name)), &[])?;
            }
            for trigger in naming::fts_trigger_names(self.name()) {
                db.execute(&format!("DROP TRIGGER IF EXISTS {}", quote_identifier(&trigger)), &[])?;
            }
            Ok(())
        })?;
        info!(table = %self.name(), "Disabled full-text search");
        Ok(self)
    }

    /// The SQL [`search`](Self::search) runs. The query is bound as
    /// `:query`.
    pub fn search_sql(&self, options: &SearchOptions) -> Result<String> {
        let (fts_name, version) = self.require_fts()?;
        let fts = quote_identifier(&fts_name);
        let columns = if options.columns.is_empty() {
            self.column_names()?
        } else {
            options.columns.clone()
        };
        let rank = match version {
            FtsVersion::Fts5 => format!("{fts}.rank"),
            FtsVersion::Fts4 => format!("rank_bm25(matchinfo({fts}, 'pcnalx'))"),
        };

        let mut select = prefixed("\"original\"", &columns);
        if options.include_rank {
            select.push_str(&format!(", {rank} AS \"rank\""));
        }
        let where_clause = options
            .where_clause
            .as_ref()
            .map(|w| format!(" WHERE {w}"))
            .unwrap_or_default();
        let order_by = options.order_by.clone().unwrap_or(rank);

        let mut sql = format!(
            "WITH \"original\" AS (\n    SELECT rowid AS \"rowid\", {cols} FROM {table}{where_clause}\n)\n\
             SELECT {select}\n\
             FROM \"original\"\n    JOIN {fts} ON \"original\".\"rowid\" = {fts}.rowid\n\
             WHERE {fts} MATCH :query\n\
             ORDER BY {order_by}",
            cols = column_list(&columns),
            table = self.quoted(),
        );
        match (options.limit, options.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!("\nLIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!("\nLIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!("\nLIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }
        Ok(sql)
    }

    /// Runs a full-text query, best matches first unless `order_by` says
    /// otherwise.
    ///
    /// # Errors
    ///
    /// - [`SqliteError::TableNotFound`] if the table has no FTS index.
    /// - [`SqliteError::InvalidArgument`] if `where_args` uses the
    ///   reserved name `query`.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<Record>> {
        let mut params: Vec<(String, SqlValue)> = Vec::with_capacity(options.where_args.len() + 1);
        for (name, value) in &options.where_args {
            let name = name.trim_start_matches(':');
            if name == "query" {
                return Err(SqliteError::InvalidArgument(
                    "'query' is a reserved parameter name".into(),
                ));
            }
            params.push((format!(":{name}"), convert::to_sql(value)));
        }
        let query = if options.quote {
            escape_fts_query(query)
        } else {
            query.to_string()
        };
        params.push((":query".to_string(), SqlValue::Text(query)));
        let sql = self.search_sql(options)?;
        self.db().query_named(&sql, &params)
    }
}
