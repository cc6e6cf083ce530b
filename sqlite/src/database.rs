//! Connection ownership, statement execution and transactions.
//!
//! Every statement any component issues goes through [`Database::execute`],
//! [`Database::query`] or one of their crate-internal siblings, so the
//! tracer and the `dyntable::sql` log target see all of them.

use std::cell::RefCell;
use std::path::Path;
use std::time::Duration;

use dyntable_core::{Record, naming, quote_identifier};
use rusqlite::types::FromSql;
use rusqlite::{Connection, Row, ToSql, params_from_iter};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::convert::{self, SqlValue};
use crate::error::Result;
use crate::hooks::HookRegistry;
use crate::table::Table;
use crate::view::View;

/// Callback receiving each statement and its bound parameters before it
/// executes.
pub type Tracer = Box<dyn Fn(&str, &[SqlValue]) + Send>;

/// A SQLite database treated as a set of dynamically-typed tables.
///
/// Owns a single connection. All methods take `&self`; the type is `Send`
/// but not `Sync`.
///
/// # Examples
///
/// ```
/// use dyntable_sqlite::Database;
/// use dyntable_core::record;
///
/// let db = Database::open_in_memory().unwrap();
/// db.table("dogs")
///     .insert(record! { "id" => 1, "name" => "Cleo" }, &Default::default())
///     .unwrap();
/// assert_eq!(db.table_names().unwrap(), vec!["dogs"]);
/// ```
pub struct Database {
    conn: Connection,
    config: DatabaseConfig,
    tracer: RefCell<Option<Tracer>>,
}

impl Database {
    /// Opens (creating if needed) a database file with the default
    /// configuration and built-in hooks.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::DatabaseError`](crate::SqliteError::DatabaseError)
    /// if the file cannot be opened or configured.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        DatabaseBuilder::new().open(path)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        DatabaseBuilder::new().open_in_memory()
    }

    /// Wraps an existing connection, applying the default configuration.
    pub fn new(conn: Connection) -> Result<Self> {
        DatabaseBuilder::new().connect(conn)
    }

    /// Returns a new [`DatabaseBuilder`].
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// The underlying connection. Statements run on it directly bypass the
    /// tracer.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// Returns a handle to a table, which need not exist yet.
    pub fn table(&self, name: impl Into<String>) -> Table<'_> {
        Table::new(self, name)
    }

    /// Returns a handle to a view, which need not exist yet.
    pub fn view(&self, name: impl Into<String>) -> View<'_> {
        View::new(self, name)
    }

    /// Installs or removes the statement tracer.
    ///
    /// The tracer must not call `set_tracer` or `with_tracer` itself.
    pub fn set_tracer(&self, tracer: Option<Tracer>) {
        self.tracer.replace(tracer);
    }

    /// Runs `f` with `tracer` installed, restoring the previous tracer
    /// afterwards.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::{Arc, Mutex};
    /// use dyntable_sqlite::Database;
    ///
    /// let db = Database::open_in_memory().unwrap();
    /// let seen = Arc::new(Mutex::new(Vec::new()));
    /// let sink = Arc::clone(&seen);
    /// db.with_tracer(move |sql, _| sink.lock().unwrap().push(sql.to_string()), || {
    ///     db.execute("CREATE TABLE t (id INTEGER)", &[]).unwrap();
    /// });
    /// assert_eq!(seen.lock().unwrap().as_slice(), ["CREATE TABLE t (id INTEGER)"]);
    /// ```
    pub fn with_tracer<R, T, F>(&self, tracer: T, f: F) -> R
    where
        T: Fn(&str, &[SqlValue]) + Send + 'static,
        F: FnOnce() -> R,
    {
        let previous = self.tracer.replace(Some(Box::new(tracer)));
        let result = f();
        self.tracer.replace(previous);
        result
    }

    fn trace(&self, sql: &str, params: &[SqlValue]) {
        debug!(target: "dyntable::sql", %sql, params = params.len(), "Executing statement");
        if let Some(tracer) = self.tracer.borrow().as_ref() {
            tracer(sql, params);
        }
    }

    /// Executes one statement with positional parameters, returning the
    /// number of changed rows.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::DatabaseError`](crate::SqliteError::DatabaseError)
    /// on any engine failure.
    pub fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<usize> {
        self.trace(sql, params);
        Ok(self.conn.execute(sql, params_from_iter(params.iter()))?)
    }

    /// Executes a parameterless script, possibly several statements.
    pub fn execute_script(&self, sql: &str) -> Result<()> {
        self.trace(sql, &[]);
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// Runs a query and returns every row as a record keyed by result
    /// column name.
    pub fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Record>> {
        self.trace(sql, params);
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| convert::row_to_record(row, &columns))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Like [`query`](Self::query) with `:name` parameters.
    pub(crate) fn query_named(&self, sql: &str, params: &[(String, SqlValue)]) -> Result<Vec<Record>> {
        let values: Vec<SqlValue> = params.iter().map(|(_, v)| v.clone()).collect();
        self.trace(sql, &values);
        let named: Vec<(&str, &dyn ToSql)> = params
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect();
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let rows = stmt
            .query_map(named.as_slice(), |row| convert::row_to_record(row, &columns))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub(crate) fn query_map<T, F>(&self, sql: &str, params: &[SqlValue], f: F) -> Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.trace(sql, params);
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), f)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// First column of the first row, if any.
    pub(crate) fn query_scalar<T: FromSql>(&self, sql: &str, params: &[SqlValue]) -> Result<Option<T>> {
        let mut values = self.query_map(sql, params, |row| row.get::<_, T>(0))?;
        Ok(if values.is_empty() { None } else { Some(values.swap_remove(0)) })
    }

    pub fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    /// Returns `true` if no transaction is open.
    pub fn is_autocommit(&self) -> bool {
        self.conn.is_autocommit()
    }

    /// Returns `true` if the linked SQLite supports `STRICT` tables.
    pub fn supports_strict(&self) -> bool {
        rusqlite::version_number() >= 3_037_000
    }

    /// Returns the current `PRAGMA foreign_keys` setting.
    pub fn foreign_keys_enabled(&self) -> Result<bool> {
        Ok(self.query_scalar::<i64>("PRAGMA foreign_keys", &[])?.unwrap_or(0) != 0)
    }

    /// Runs `f` inside a transaction.
    ///
    /// Opens `BEGIN` when no transaction is active, otherwise a uniquely
    /// named `SAVEPOINT`, so calls nest. Commits (or releases) on `Ok`;
    /// rolls back on `Err` and when unwinding.
    ///
    /// # Examples
    ///
    /// ```
    /// use dyntable_sqlite::{Database, SqliteError};
    ///
    /// let db = Database::open_in_memory().unwrap();
    /// db.execute("CREATE TABLE t (id INTEGER)", &[]).unwrap();
    /// let result: Result<(), SqliteError> = db.transaction(|db| {
    ///     db.execute("INSERT INTO t VALUES (1)", &[])?;
    ///     Err(SqliteError::InvalidArgument("stop".into()))
    /// });
    /// assert!(result.is_err());
    /// assert_eq!(db.table("t").count().unwrap(), 0);
    /// ```
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T>,
    {
        if self.conn.is_autocommit() {
            self.trace("BEGIN", &[]);
            let tx = self.conn.unchecked_transaction()?;
            let value = f(self)?;
            self.trace("COMMIT", &[]);
            tx.commit()?;
            Ok(value)
        } else {
            let savepoint = Savepoint::begin(self)?;
            let value = f(self)?;
            savepoint.release()?;
            Ok(value)
        }
    }

    /// Runs `ANALYZE`, optionally limited to one table or index.
    pub fn analyze(&self, name: Option<&str>) -> Result<()> {
        match name {
            Some(name) => self.execute(&format!("ANALYZE {}", quote_identifier(name)), &[])?,
            None => self.execute("ANALYZE", &[])?,
        };
        Ok(())
    }

    pub fn vacuum(&self) -> Result<()> {
        self.execute("VACUUM", &[])?;
        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.conn.path())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

struct Savepoint<'a> {
    db: &'a Database,
    name: String,
    released: bool,
}

impl<'a> Savepoint<'a> {
    fn begin(db: &'a Database) -> Result<Self> {
        let name = format!("dyntable_{}", naming::unique_suffix());
        db.execute_script(&format!("SAVEPOINT {}", quote_identifier(&name)))?;
        Ok(Self {
            db,
            name,
            released: false,
        })
    }

    fn release(mut self) -> Result<()> {
        self.released = true;
        self.db
            .execute_script(&format!("RELEASE {}", quote_identifier(&self.name)))
    }
}

impl Drop for Savepoint<'_> {
    fn drop(&mut self) {
        if !self.released {
            let name = quote_identifier(&self.name);
            let _ = self
                .db
                .execute_script(&format!("ROLLBACK TO {name}; RELEASE {name}"));
        }
    }
}

/// Builder for a configured [`Database`].
///
/// # Example
///
/// ```
/// use dyntable_sqlite::{Database, DatabaseConfig, HookRegistry};
///
/// let db = Database::builder()
///     .config(DatabaseConfig { use_counts_table: true, ..Default::default() })
///     .hooks(HookRegistry::with_builtins())
///     .open_in_memory()
///     .unwrap();
/// assert!(db.config().use_counts_table);
/// ```
pub struct DatabaseBuilder {
    config: DatabaseConfig,
    hooks: HookRegistry,
    tracer: Option<Tracer>,
}

impl DatabaseBuilder {
    /// Default configuration, built-in hooks, no tracer.
    pub fn new() -> Self {
        Self {
            config: DatabaseConfig::default(),
            hooks: HookRegistry::with_builtins(),
            tracer: None,
        }
    }

    pub fn config(mut self, config: DatabaseConfig) -> Self {
        self.config = config;
        self
    }

    /// Loads the configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an I/O or config error if the file cannot be loaded.
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        self.config = DatabaseConfig::load(path)?;
        Ok(self)
    }

    /// Replaces the hook registry.
    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    /// Adds one hook to the registry.
    pub fn hook<F>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&Connection) -> rusqlite::Result<()> + Send + 'static,
    {
        self.hooks.register(name, hook);
        self
    }

    pub fn tracer<T>(mut self, tracer: T) -> Self
    where
        T: Fn(&str, &[SqlValue]) + Send + 'static,
    {
        self.tracer = Some(Box::new(tracer));
        self
    }

    pub fn open(self, path: impl AsRef<Path>) -> Result<Database> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening database");
        let conn = Connection::open(path)?;
        self.connect(conn)
    }

    pub fn open_in_memory(self) -> Result<Database> {
        let conn = Connection::open_in_memory()?;
        self.connect(conn)
    }

    /// Configures an existing connection and runs the hooks.
    pub fn connect(self, conn: Connection) -> Result<Database> {
        let db = Database {
            conn,
            config: self.config,
            tracer: RefCell::new(self.tracer),
        };
        db.apply_config()?;
        self.hooks.run(&db.conn)?;
        Ok(db)
    }
}

impl Default for DatabaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    fn apply_config(&self) -> Result<()> {
        let config = &self.config;
        if let Some(ms) = config.busy_timeout_ms {
            self.conn.busy_timeout(Duration::from_millis(ms))?;
        }
        let on_off = |flag: bool| if flag { "ON" } else { "OFF" };
        self.execute_script(&format!("PRAGMA foreign_keys = {};", on_off(config.foreign_keys)))?;
        self.execute_script(&format!(
            "PRAGMA recursive_triggers = {};",
            on_off(config.recursive_triggers)
        ))?;
        if let Some(mode) = config.journal_mode {
            let sql = format!("PRAGMA journal_mode = {}", mode.as_sql());
            let applied = self.query_scalar::<String>(&sql, &[])?;
            debug!(requested = mode.as_sql(), applied = ?applied, "Set journal mode");
        }
        Ok(())
    }

    /// Returns the current journal mode, lowercased.
    pub fn journal_mode(&self) -> Result<String> {
        Ok(self
            .query_scalar::<String>("PRAGMA journal_mode", &[])?
            .unwrap_or_default()
            .to_ascii_lowercase())
    }
}
