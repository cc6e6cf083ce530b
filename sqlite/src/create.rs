//! Table creation and in-place schema changes.
//!
//! Covers `CREATE TABLE` generation, `ALTER TABLE ... ADD COLUMN`, foreign
//! key resolution, index creation and the small DDL helpers (drop,
//! duplicate, rename). Changes SQLite cannot express with `ALTER TABLE`
//! are delegated to the transform engine.

use std::collections::HashMap;

use dyntable_core::{
    ColumnType, Record, SqlDefault, Value, apply_column_order, naming, quote_identifier,
    suggest_column_types,
};
use tracing::{debug, info};

use crate::database::Database;
use crate::error::{Result, SqliteError};
use crate::model::{ForeignKey, ForeignKeySpec, IndexColumn};
use crate::table::Table;
use crate::transform::TransformOptions;

/// Options for [`Table::create`].
///
/// # Examples
///
/// ```
/// use dyntable_core::{ColumnType, Value};
/// use dyntable_sqlite::{CreateOptions, Database};
///
/// let db = Database::open_in_memory().unwrap();
/// db.table("authors")
///     .create(&[("id", ColumnType::Integer), ("name", ColumnType::Text)], &CreateOptions::new().pk(["id"]))
///     .unwrap();
/// db.table("books")
///     .create(
///         &[("id", ColumnType::Integer), ("title", ColumnType::Text), ("author_id", ColumnType::Integer)],
///         &CreateOptions::new()
///             .pk(["id"])
///             .not_null(["title"])
///             .default_value("title", Value::from("untitled"))
///             .foreign_key(("author_id", "authors", "id")),
///     )
///     .unwrap();
/// assert_eq!(db.table("books").foreign_keys().unwrap()[0].other_table, "authors");
/// ```
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Primary key columns; `None` creates a rowid table.
    pub pk: Option<Vec<String>>,
    pub foreign_keys: Vec<ForeignKeySpec>,
    pub column_order: Vec<String>,
    pub not_null: Vec<String>,
    pub defaults: HashMap<String, SqlDefault>,
    /// Adds a `TEXT` primary key column holding a content hash.
    pub hash_id: Option<String>,
    /// Column to lookup table; the column becomes an `INTEGER` reference
    /// to `<lookup>.id`.
    pub extracts: HashMap<String, String>,
    pub if_not_exists: bool,
    pub ignore: bool,
    pub replace: bool,
    /// Reconcile an existing table with the requested shape.
    pub transform: bool,
    /// `None` follows the database configuration.
    pub strict: Option<bool>,
}

impl CreateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pk<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pk = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn not_null<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.not_null.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn default_value(mut self, column: impl Into<String>, default: impl Into<SqlDefault>) -> Self {
        self.defaults.insert(column.into(), default.into());
        self
    }

    pub fn foreign_key(mut self, spec: impl Into<ForeignKeySpec>) -> Self {
        self.foreign_keys.push(spec.into());
        self
    }

    pub fn column_order<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.column_order = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn hash_id(mut self, column: impl Into<String>) -> Self {
        self.hash_id = Some(column.into());
        self
    }

    pub fn extract(mut self, column: impl Into<String>, lookup_table: impl Into<String>) -> Self {
        self.extracts.insert(column.into(), lookup_table.into());
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    pub fn ignore(mut self) -> Self {
        self.ignore = true;
        self
    }

    pub fn replace(mut self) -> Self {
        self.replace = true;
        self
    }

    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    pub fn transform(mut self) -> Self {
        self.transform = true;
        self
    }
}

/// Options for [`Table::add_column`].
#[derive(Debug, Clone, Default)]
pub struct AddColumnOptions {
    /// Table the new column references.
    pub fk: Option<String>,
    /// Referenced column; defaults to the other table's primary key.
    pub fk_col: Option<String>,
    /// Adds `NOT NULL DEFAULT <value>`.
    pub not_null_default: Option<Value>,
}

/// Options for [`Table::create_index`].
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Defaults to `idx_<table>_<columns>`.
    pub name: Option<String>,
    pub unique: bool,
    pub if_not_exists: bool,
    /// Append `_2`, `_3`, ... while the name is taken.
    pub find_unique_name: bool,
    /// Run `ANALYZE` on the new index.
    pub analyze: bool,
}

/// One column of a table definition about to be rendered.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ColumnDef {
    pub name: String,
    pub declared: String,
    pub not_null: bool,
    pub default: Option<SqlDefault>,
}

/// A full `CREATE TABLE` definition.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    /// Empty for a rowid table.
    pub pk: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    pub strict: bool,
    pub without_rowid: bool,
}

const STRICT_TYPES: [&str; 6] = ["INT", "INTEGER", "REAL", "TEXT", "BLOB", "ANY"];

impl TableDef {
    fn declared_type(&self, column: &ColumnDef) -> String {
        if self.strict && !STRICT_TYPES.contains(&column.declared.to_ascii_uppercase().as_str()) {
            return ColumnType::from_declared(&column.declared).sql_name(true).to_string();
        }
        column.declared.clone()
    }

    /// Returns `true` if the table keeps an implicit rowid.
    pub fn has_rowid(&self) -> bool {
        !self.without_rowid
    }

    pub fn uses_rowid(&self) -> bool {
        self.pk.is_empty()
    }

    pub fn to_sql(&self) -> String {
        let single_pk = match self.pk.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        };
        let mut lines = Vec::with_capacity(self.columns.len() + 1);
        for column in &self.columns {
            let mut line = format!("   {}", quote_identifier(&column.name));
            let declared = self.declared_type(column);
            if !declared.is_empty() {
                line.push(' ');
                line.push_str(&declared);
            }
            if single_pk == Some(column.name.as_str()) {
                line.push_str(" PRIMARY KEY");
            }
            if column.not_null {
                line.push_str(" NOT NULL");
            }
            if let Some(default) = &column.default {
                line.push_str(" DEFAULT ");
                line.push_str(&default.to_sql());
            }
            for fk in self.foreign_keys.iter().filter(|fk| fk.column == column.name) {
                line.push_str(&format!(
                    " REFERENCES {}({})",
                    quote_identifier(&fk.other_table),
                    quote_identifier(&fk.other_column)
                ));
            }
            lines.push(line);
        }
        if self.pk.len() > 1 {
            let pk = self.pk.iter().map(|c| quote_identifier(c)).collect::<Vec<_>>().join(", ");
            lines.push(format!("   PRIMARY KEY ({pk})"));
        }

        let mut sql = format!("CREATE TABLE {} (\n{}\n)", quote_identifier(&self.name), lines.join(",\n"));
        let mut options = Vec::new();
        if self.without_rowid && !self.pk.is_empty() {
            options.push("WITHOUT ROWID");
        }
        if self.strict {
            options.push("STRICT");
        }
        if !options.is_empty() {
            sql.push(' ');
            sql.push_str(&options.join(", "));
        }
        sql
    }
}

impl Database {
    /// Renames a table.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::TableNotFound`] if `old` does not exist.
    pub fn rename_table(&self, old: &str, new: &str) -> Result<()> {
        self.table(old).require_exists()?;
        self.execute(
            &format!("ALTER TABLE {} RENAME TO {}", quote_identifier(old), quote_identifier(new)),
            &[],
        )?;
        info!(from = old, to = new, "Renamed table");
        Ok(())
    }

    /// Adds several foreign keys, validating all of them before touching
    /// any table. Keys that already exist are skipped; each affected table
    /// is rebuilt once.
    pub fn add_foreign_keys<T: AsRef<str>>(&self, specs: &[(T, ForeignKeySpec)]) -> Result<()> {
        let mut per_table: Vec<(String, Vec<ForeignKey>)> = Vec::new();
        for (table_name, spec) in specs {
            let table = self.table(table_name.as_ref());
            table.require_exists()?;
            let fk = table.resolve_foreign_key(spec)?;
            if table.foreign_keys()?.iter().any(|existing| *existing == fk) {
                debug!(table = %fk.table, column = %fk.column, "Foreign key already present");
                continue;
            }
            match per_table.iter_mut().find(|(name, _)| *name == fk.table) {
                Some((_, fks)) => fks.push(fk),
                None => per_table.push((fk.table.clone(), vec![fk])),
            }
        }
        for (table_name, fks) in per_table {
            self.table(table_name).transform(&TransformOptions {
                add_foreign_keys: fks.into_iter().map(Into::into).collect(),
                ..Default::default()
            })?;
        }
        Ok(())
    }

    /// Creates an index on every foreign key column that is not already
    /// the sole column of an index.
    pub fn index_foreign_keys(&self) -> Result<()> {
        for table in self.tables()? {
            let indexed: Vec<String> = table
                .indexes()?
                .into_iter()
                .filter(|index| index.columns.len() == 1)
                .flat_map(|index| index.columns)
                .collect();
            for fk in table.foreign_keys()? {
                if !indexed.contains(&fk.column) {
                    table.create_index(
                        &[IndexColumn::from(fk.column.as_str())],
                        &IndexOptions {
                            find_unique_name: true,
                            ..Default::default()
                        },
                    )?;
                }
            }
        }
        Ok(())
    }
}

impl<'a> Table<'a> {
    /// Creates the table.
    ///
    /// If the table exists: `ignore` or `if_not_exists` do nothing,
    /// `replace` drops and recreates it, `transform` reconciles it with the
    /// requested shape.
    ///
    /// # Errors
    ///
    /// - [`SqliteError::AlterError`] if both `replace` and `ignore` are set,
    ///   or a foreign key names an unknown column.
    /// - [`SqliteError::TableExists`] if the table exists and none of the
    ///   options above apply.
    pub fn create<S: AsRef<str>>(&self, columns: &[(S, ColumnType)], options: &CreateOptions) -> Result<&Self> {
        if options.replace && options.ignore {
            return Err(SqliteError::AlterError(
                "use either replace or ignore, not both".into(),
            ));
        }
        let columns: Vec<(String, ColumnType)> = columns
            .iter()
            .map(|(name, column_type)| (name.as_ref().to_string(), *column_type))
            .collect();

        if self.exists()? {
            if options.ignore || options.if_not_exists {
                return Ok(self);
            }
            if options.transform {
                return self.reconcile(&columns, options);
            }
            if !options.replace {
                return Err(SqliteError::TableExists(self.name().to_string()));
            }
        }

        let def = self.build_def(columns, options)?;
        let sql = def.to_sql();
        self.db().transaction(|db| {
            if options.replace && self.exists()? {
                db.execute(&format!("DROP TABLE {}", self.quoted()), &[])?;
            }
            db.execute(&sql, &[])
        })?;
        info!(table = %self.name(), columns = def.columns.len(), "Created table");

        if self.db().config().use_counts_table {
            self.enable_counts()?;
        }
        Ok(self)
    }

    fn build_def(&self, mut columns: Vec<(String, ColumnType)>, options: &CreateOptions) -> Result<TableDef> {
        let mut pk = options.pk.clone().unwrap_or_default();
        if let Some(hash_id) = &options.hash_id {
            pk = vec![hash_id.clone()];
            if !columns.iter().any(|(name, _)| name == hash_id) {
                columns.insert(0, (hash_id.clone(), ColumnType::Text));
            }
        }
        for (i, pk_column) in pk.iter().enumerate() {
            if !columns.iter().any(|(name, _)| name == pk_column) {
                columns.insert(i, (pk_column.clone(), ColumnType::Integer));
            }
        }

        let mut foreign_keys = Vec::new();
        for (column, lookup_table) in &options.extracts {
            if let Some(slot) = columns.iter_mut().find(|(name, _)| name == column) {
                slot.1 = ColumnType::Integer;
            }
            foreign_keys.push(ForeignKey {
                table: self.name().to_string(),
                column: column.clone(),
                other_table: lookup_table.clone(),
                other_column: "id".to_string(),
            });
        }
        for spec in &options.foreign_keys {
            if !columns.iter().any(|(name, _)| *name == spec.column) {
                return Err(SqliteError::AlterError(format!("no such column: {}", spec.column)));
            }
            foreign_keys.push(self.resolve_reference(spec, &pk)?);
        }
        foreign_keys.sort();
        foreign_keys.dedup();

        let strict = options.strict.unwrap_or(self.db().config().strict) && self.db().supports_strict();
        let columns = apply_column_order(columns, &options.column_order)
            .into_iter()
            .map(|(name, column_type)| ColumnDef {
                not_null: options.not_null.contains(&name),
                default: options.defaults.get(&name).cloned(),
                declared: column_type.sql_name(strict).to_string(),
                name,
            })
            .collect();

        Ok(TableDef {
            name: self.name().to_string(),
            columns,
            pk,
            foreign_keys,
            strict,
            without_rowid: false,
        })
    }

    /// Brings an existing table in line with a `create(.., transform)`
    /// request, running a transform only when something differs.
    fn reconcile(&self, columns: &[(String, ColumnType)], options: &CreateOptions) -> Result<&Self> {
        let existing = self.columns_dict()?;
        let mut should_transform = false;

        for (name, column_type) in columns {
            if !existing.iter().any(|(existing_name, _)| existing_name == name) {
                self.add_column(name, Some(*column_type), &AddColumnOptions::default())?;
                should_transform = true;
            }
        }
        let drop: Vec<String> = existing
            .iter()
            .filter(|(name, _)| !columns.iter().any(|(wanted, _)| wanted == name))
            .map(|(name, _)| name.clone())
            .collect();
        should_transform |= !drop.is_empty();
        should_transform |= columns.iter().any(|(name, column_type)| {
            existing
                .iter()
                .any(|(existing_name, existing_type)| existing_name == name && existing_type != column_type)
        });

        let current_order: Vec<&String> = existing.iter().map(|(name, _)| name).collect();
        if !options.column_order.is_empty()
            && current_order.iter().take(options.column_order.len()).copied().ne(options.column_order.iter())
        {
            should_transform = true;
        }

        let desired_pk = options.pk.clone().or_else(|| options.hash_id.clone().map(|h| vec![h]));
        if let Some(desired_pk) = &desired_pk {
            should_transform |= self.pks()? != *desired_pk;
        }

        let current_not_null: Vec<String> = self
            .columns()?
            .into_iter()
            .filter(|c| c.not_null)
            .map(|c| c.name)
            .collect();
        let mut desired_not_null = options.not_null.clone();
        desired_not_null.sort();
        let mut sorted_current = current_not_null.clone();
        sorted_current.sort();
        should_transform |= sorted_current != desired_not_null;

        if !options.defaults.is_empty() {
            let current_defaults: HashMap<String, SqlDefault> = self.default_values()?.into_iter().collect();
            should_transform |= current_defaults != options.defaults;
        }

        if !should_transform {
            debug!(table = %self.name(), "Table already matches requested shape");
            return Ok(self);
        }

        let mut not_null: HashMap<String, bool> =
            current_not_null.into_iter().map(|name| (name, false)).collect();
        for name in &options.not_null {
            not_null.insert(name.clone(), true);
        }
        self.transform(&TransformOptions {
            types: columns.iter().cloned().collect(),
            drop,
            pk: desired_pk,
            not_null,
            defaults: options
                .defaults
                .iter()
                .map(|(name, default)| (name.clone(), Some(default.clone())))
                .collect(),
            column_order: options.column_order.clone(),
            ..Default::default()
        })?;
        Ok(self)
    }

    /// Guesses the table a column refers to: the column name itself, then
    /// without an `_id` suffix, then pluralized with `s`. Matching is
    /// case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::NoObviousTable`] when nothing matches.
    pub fn guess_foreign_table(&self, column: &str) -> Result<String> {
        let column = column.to_lowercase();
        let mut possibilities = vec![column.clone()];
        if let Some(without_id) = column.strip_suffix("_id") {
            possibilities.push(without_id.to_string());
            if !without_id.ends_with('s') {
                possibilities.push(format!("{without_id}s"));
            }
        } else if !column.ends_with('s') {
            possibilities.push(format!("{column}s"));
        }
        let existing = self.db().table_names()?;
        possibilities
            .iter()
            .find_map(|wanted| existing.iter().find(|name| name.to_lowercase() == *wanted))
            .cloned()
            .ok_or_else(|| SqliteError::NoObviousTable(format!("no table found that matches {column}")))
    }

    /// Fills in the referenced table and column of `spec`. `own_pk` is used
    /// for references to this table itself before it exists.
    pub(crate) fn resolve_reference(&self, spec: &ForeignKeySpec, own_pk: &[String]) -> Result<ForeignKey> {
        let other_table = match &spec.other_table {
            Some(other_table) => other_table.clone(),
            None => self.guess_foreign_table(&spec.column)?,
        };
        let other_column = match &spec.other_column {
            Some(other_column) => other_column.clone(),
            None if other_table == self.name() && !self.exists()? => match own_pk {
                [] => "rowid".to_string(),
                [only] => only.clone(),
                _ => {
                    return Err(SqliteError::AlterError(format!(
                        "could not detect single primary key for table '{other_table}'"
                    )));
                }
            },
            None => self.db().table(other_table.as_str()).single_pk()?,
        };
        Ok(ForeignKey {
            table: self.name().to_string(),
            column: spec.column.clone(),
            other_table,
            other_column,
        })
    }

    /// The lone primary key column, or `rowid` for rowid tables.
    fn single_pk(&self) -> Result<String> {
        self.require_exists()
            .map_err(|_| SqliteError::AlterError(format!("table '{}' does not exist", self.name())))?;
        let mut pks = self.pks()?;
        if pks.len() != 1 {
            return Err(SqliteError::AlterError(format!(
                "could not detect single primary key for table '{}'",
                self.name()
            )));
        }
        Ok(pks.remove(0))
    }

    /// Resolves and validates a foreign key from this existing table.
    pub(crate) fn resolve_foreign_key(&self, spec: &ForeignKeySpec) -> Result<ForeignKey> {
        if !self.column_names()?.contains(&spec.column) {
            return Err(SqliteError::AlterError(format!("no such column: {}", spec.column)));
        }
        let fk = self.resolve_reference(spec, &[])?;
        let other = self.db().table(fk.other_table.as_str());
        if !other.exists()? {
            return Err(SqliteError::AlterError(format!("no such table: {}", fk.other_table)));
        }
        if fk.other_column != "rowid" && !other.column_names()?.contains(&fk.other_column) {
            return Err(SqliteError::AlterError(format!(
                "no such column: {}.{}",
                fk.other_table, fk.other_column
            )));
        }
        Ok(fk)
    }

    /// Adds a column with `ALTER TABLE ... ADD COLUMN`.
    ///
    /// With `fk`, the column takes the referenced column's type and a
    /// `REFERENCES` clause. SQLite refuses a `REFERENCES` column with a
    /// non-null default, so in that case the foreign key is added
    /// afterwards by a transform.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::AlterError`] if the column exists or the
    /// referenced table or column does not.
    pub fn add_column(&self, name: &str, column_type: Option<ColumnType>, options: &AddColumnOptions) -> Result<&Self> {
        self.require_exists()?;
        let columns = self.columns()?;
        if columns.iter().any(|c| c.name.eq_ignore_ascii_case(name)) {
            return Err(SqliteError::AlterError(format!("column already exists: {name}")));
        }
        let strict = self.strict()?;
        let mut declared = column_type.unwrap_or_default().sql_name(strict).to_string();

        let reference = match &options.fk {
            Some(other_table) => {
                let other = self.db().table(other_table.as_str());
                if !other.exists()? {
                    return Err(SqliteError::AlterError(format!("table '{other_table}' does not exist")));
                }
                let other_columns = other.columns()?;
                let other_column = match &options.fk_col {
                    Some(fk_col) => other_columns
                        .iter()
                        .find(|c| c.name == *fk_col)
                        .ok_or_else(|| {
                            SqliteError::AlterError(format!("table '{other_table}' has no column {fk_col}"))
                        })?
                        .clone(),
                    None => match other_columns.iter().filter(|c| c.is_pk()).min_by_key(|c| c.pk) {
                        Some(pk) => pk.clone(),
                        None => crate::model::Column {
                            cid: -1,
                            name: "rowid".into(),
                            declared_type: "INTEGER".into(),
                            not_null: false,
                            default_value: None,
                            pk: 1,
                        },
                    },
                };
                if !other_column.declared_type.is_empty() {
                    declared = other_column.declared_type.clone();
                }
                Some((other_table.clone(), other_column.name))
            }
            None => None,
        };

        let mut sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {declared}",
            self.quoted(),
            quote_identifier(name)
        );
        if let Some(default) = &options.not_null_default {
            sql.push_str(&format!(" NOT NULL DEFAULT {}", SqlDefault::from_value(default).to_sql()));
        }
        let deferred = match &reference {
            Some((other_table, other_column)) if options.not_null_default.is_none() => {
                sql.push_str(&format!(
                    " REFERENCES {}({})",
                    quote_identifier(other_table),
                    quote_identifier(other_column)
                ));
                None
            }
            other => other.clone(),
        };
        self.db().execute(&sql, &[])?;
        info!(table = %self.name(), column = name, "Added column");

        if let Some((other_table, other_column)) = deferred {
            self.add_foreign_key(name, Some(&other_table), Some(&other_column), false)?;
        }
        Ok(self)
    }

    /// Adds a foreign key by rebuilding the table.
    ///
    /// `other_table` defaults to [`guess_foreign_table`](Self::guess_foreign_table),
    /// `other_column` to the other table's single primary key.
    ///
    /// # Errors
    ///
    /// - [`SqliteError::AlterError`] if the column, other table or other
    ///   column does not exist, the other table has a compound key, or the
    ///   foreign key already exists and `ignore` is not set.
    /// - [`SqliteError::NoObviousTable`] if the other table cannot be
    ///   guessed.
    pub fn add_foreign_key(
        &self,
        column: &str,
        other_table: Option<&str>,
        other_column: Option<&str>,
        ignore: bool,
    ) -> Result<&Self> {
        self.require_exists()?;
        let spec = ForeignKeySpec {
            column: column.to_string(),
            other_table: other_table.map(String::from),
            other_column: other_column.map(String::from),
        };
        let fk = self.resolve_foreign_key(&spec)?;
        let duplicate = self
            .foreign_keys()?
            .iter()
            .any(|existing| existing.column == fk.column && existing.other_table == fk.other_table);
        if duplicate {
            if ignore {
                return Ok(self);
            }
            return Err(SqliteError::AlterError(format!(
                "foreign key already exists for {} => {}.{}",
                fk.column, fk.other_table, fk.other_column
            )));
        }
        self.transform(&TransformOptions {
            add_foreign_keys: vec![fk.into()],
            ..Default::default()
        })?;
        Ok(self)
    }

    /// Creates an index over `columns`.
    ///
    /// # Examples
    ///
    /// ```
    /// use dyntable_sqlite::{Database, IndexColumn, IndexOptions};
    ///
    /// let db = Database::open_in_memory().unwrap();
    /// db.execute_script("CREATE TABLE dogs (name TEXT, age INTEGER)").unwrap();
    /// let dogs = db.table("dogs");
    /// dogs.create_index(&["name".into(), IndexColumn::desc("age")], &IndexOptions::default()).unwrap();
    /// dogs.create_index(&["name".into()], &IndexOptions { find_unique_name: true, ..Default::default() }).unwrap();
    /// let names: Vec<String> = dogs.indexes().unwrap().into_iter().map(|i| i.name).collect();
    /// assert!(names.contains(&"idx_dogs_name_age".to_string()));
    /// assert!(names.contains(&"idx_dogs_name".to_string()));
    /// ```
    pub fn create_index(&self, columns: &[IndexColumn], options: &IndexOptions) -> Result<&Self> {
        if columns.is_empty() {
            return Err(SqliteError::InvalidColumns("an index needs at least one column".into()));
        }
        let base_name = options.name.clone().unwrap_or_else(|| {
            let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
            naming::index_name(self.name(), &names)
        });
        let mut index_name = base_name.clone();
        if options.find_unique_name {
            let mut suffix = 2;
            while self.db().object_exists("index", &index_name)? {
                index_name = format!("{base_name}_{suffix}");
                suffix += 1;
            }
        }
        let columns_sql = columns
            .iter()
            .map(|c| {
                let quoted = quote_identifier(&c.name);
                if c.desc { format!("{quoted} DESC") } else { quoted }
            })
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "CREATE {unique}INDEX {if_not_exists}{name} ON {table} ({columns_sql})",
            unique = if options.unique { "UNIQUE " } else { "" },
            if_not_exists = if options.if_not_exists { "IF NOT EXISTS " } else { "" },
            name = quote_identifier(&index_name),
            table = self.quoted(),
        );
        self.db().execute(&sql, &[])?;
        info!(table = %self.name(), index = %index_name, "Created index");
        if options.analyze {
            self.db().analyze(Some(&index_name))?;
        }
        Ok(self)
    }

    /// Drops the table. With `ignore`, a missing table is not an error.
    pub fn drop(&self, ignore: bool) -> Result<()> {
        if !self.exists()? {
            if ignore {
                return Ok(());
            }
            return Err(SqliteError::TableNotFound(self.name().to_string()));
        }
        self.db().execute(&format!("DROP TABLE {}", self.quoted()), &[])?;
        info!(table = %self.name(), "Dropped table");
        Ok(())
    }

    /// Copies the table, including its keys, constraints and rows, to
    /// `new_name`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::TableNotFound`] for a missing table and
    /// [`SqliteError::TableExists`] if `new_name` is taken.
    pub fn duplicate(&self, new_name: &str) -> Result<Table<'a>> {
        self.require_exists()?;
        let target = self.db().table(new_name);
        if target.exists()? {
            return Err(SqliteError::TableExists(new_name.to_string()));
        }
        let mut def = self.current_def()?;
        def.name = new_name.to_string();
        for fk in &mut def.foreign_keys {
            fk.table = new_name.to_string();
        }
        let columns = def
            .columns
            .iter()
            .map(|c| quote_identifier(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        self.db().transaction(|db| {
            db.execute(&def.to_sql(), &[])?;
            db.execute(
                &format!(
                    "INSERT INTO {} ({columns}) SELECT {columns} FROM {}",
                    quote_identifier(new_name),
                    self.quoted()
                ),
                &[],
            )
        })?;
        info!(table = %self.name(), copy = new_name, "Duplicated table");
        Ok(target)
    }

    /// Adds any columns that appear in `records` but not in the table,
    /// with inferred types. Names are compared case-insensitively.
    pub fn add_missing_columns(&self, records: &[Record]) -> Result<&Self> {
        let existing: Vec<String> = self.column_names()?.iter().map(|c| c.to_lowercase()).collect();
        for (name, column_type) in suggest_column_types(records) {
            if !existing.contains(&name.to_lowercase()) {
                self.add_column(&name, Some(column_type), &AddColumnOptions::default())?;
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dyntable_core::record;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_create_sql_shape() {
        let def = TableDef {
            name: "books".into(),
            columns: vec![
                ColumnDef {
                    name: "isbn".into(),
                    declared: "TEXT".into(),
                    not_null: true,
                    default: None,
                },
                ColumnDef {
                    name: "edition".into(),
                    declared: "INTEGER".into(),
                    not_null: false,
                    default: Some(SqlDefault::Number("1".into())),
                },
                ColumnDef {
                    name: "author_id".into(),
                    declared: "INTEGER".into(),
                    not_null: false,
                    default: None,
                },
            ],
            pk: vec!["isbn".into(), "edition".into()],
            foreign_keys: vec![ForeignKey {
                table: "books".into(),
                column: "author_id".into(),
                other_table: "authors".into(),
                other_column: "id".into(),
            }],
            strict: true,
            without_rowid: false,
        };
        assert_eq!(
            def.to_sql(),
            "CREATE TABLE \"books\" (\n   \"isbn\" TEXT NOT NULL,\n   \"edition\" INTEGER DEFAULT 1,\n   \
             \"author_id\" INTEGER REFERENCES \"authors\"(\"id\"),\n   PRIMARY KEY (\"isbn\", \"edition\")\n) STRICT"
        );
    }

    #[test]
    fn test_create_conflicting_options() {
        let db = db();
        let err = db
            .table("t")
            .create(&[("id", ColumnType::Integer)], &CreateOptions::new().ignore().replace())
            .unwrap_err();
        assert!(matches!(err, SqliteError::AlterError(_)));
        assert!(!db.table("t").exists().unwrap());
    }

    #[test]
    fn test_create_existing_table() {
        let db = db();
        let table = db.table("t");
        table.create(&[("id", ColumnType::Integer)], &CreateOptions::new()).unwrap();
        assert!(matches!(
            table.create(&[("id", ColumnType::Integer)], &CreateOptions::new()),
            Err(SqliteError::TableExists(_))
        ));
        table.create(&[("x", ColumnType::Text)], &CreateOptions::new().ignore()).unwrap();
        assert_eq!(table.column_names().unwrap(), vec!["id"]);
        table.create(&[("x", ColumnType::Text)], &CreateOptions::new().replace()).unwrap();
        assert_eq!(table.column_names().unwrap(), vec!["x"]);
    }

    #[test]
    fn test_missing_pk_is_added_as_integer() {
        let db = db();
        let table = db.table("t");
        table.create(&[("name", ColumnType::Text)], &CreateOptions::new().pk(["id"])).unwrap();
        assert_eq!(
            table.columns_dict().unwrap(),
            vec![("id".into(), ColumnType::Integer), ("name".into(), ColumnType::Text)]
        );
        assert_eq!(table.pks().unwrap(), vec!["id"]);
    }

    #[test]
    fn test_create_transform_reconciles() {
        let db = db();
        let table = db.table("t");
        table
            .create(
                &[("id", ColumnType::Integer), ("name", ColumnType::Text), ("age", ColumnType::Text)],
                &CreateOptions::new().pk(["id"]),
            )
            .unwrap();
        table
            .create(
                &[("id", ColumnType::Integer), ("name", ColumnType::Text), ("weight", ColumnType::Float)],
                &CreateOptions::new().pk(["id"]).not_null(["name"]).transform(),
            )
            .unwrap();
        assert_eq!(
            table.columns_dict().unwrap(),
            vec![
                ("id".into(), ColumnType::Integer),
                ("name".into(), ColumnType::Text),
                ("weight".into(), ColumnType::Float)
            ]
        );
        assert!(table.columns().unwrap()[1].not_null);
    }

    #[test]
    fn test_create_strict_uses_real() {
        let db = db();
        let table = db.table("t");
        table.create(&[("score", ColumnType::Float)], &CreateOptions::new().strict(true)).unwrap();
        assert!(table.strict().unwrap());
        assert_eq!(table.columns().unwrap()[0].declared_type, "REAL");
    }

    #[test]
    fn test_guess_foreign_table() {
        let db = db();
        db.execute_script("CREATE TABLE Authors (id INTEGER PRIMARY KEY); CREATE TABLE species (id INTEGER PRIMARY KEY)")
            .unwrap();
        let table = db.table("books");
        assert_eq!(table.guess_foreign_table("author_id").unwrap(), "Authors");
        assert_eq!(table.guess_foreign_table("species").unwrap(), "species");
        assert!(matches!(
            table.guess_foreign_table("publisher_id"),
            Err(SqliteError::NoObviousTable(_))
        ));
    }

    #[test]
    fn test_add_column_with_fk() {
        let db = db();
        db.execute_script(
            "CREATE TABLE authors (id INTEGER PRIMARY KEY);
             CREATE TABLE books (id INTEGER PRIMARY KEY);",
        )
        .unwrap();
        let books = db.table("books");
        books
            .add_column("author_id", None, &AddColumnOptions { fk: Some("authors".into()), ..Default::default() })
            .unwrap();
        assert_eq!(books.foreign_keys().unwrap()[0].other_column, "id");
        assert_eq!(books.columns_dict().unwrap()[1].1, ColumnType::Integer);

        books
            .add_column(
                "editor_id",
                None,
                &AddColumnOptions {
                    fk: Some("authors".into()),
                    not_null_default: Some(Value::from(0)),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(books.foreign_keys().unwrap().len(), 2);
        assert!(matches!(
            books.add_column("author_id", None, &AddColumnOptions::default()),
            Err(SqliteError::AlterError(_))
        ));
    }

    #[test]
    fn test_add_foreign_key_validation() {
        let db = db();
        db.execute_script(
            "CREATE TABLE authors (id INTEGER PRIMARY KEY);
             CREATE TABLE pairs (a INTEGER, b INTEGER, PRIMARY KEY (a, b));
             CREATE TABLE books (id INTEGER PRIMARY KEY, author_id INTEGER, pair_id INTEGER);",
        )
        .unwrap();
        let books = db.table("books");
        assert!(matches!(
            books.add_foreign_key("nope", Some("authors"), None, false),
            Err(SqliteError::AlterError(_))
        ));
        assert!(matches!(
            books.add_foreign_key("author_id", Some("nope"), None, false),
            Err(SqliteError::AlterError(_))
        ));
        assert!(matches!(
            books.add_foreign_key("pair_id", Some("pairs"), None, false),
            Err(SqliteError::AlterError(_))
        ));
        books.add_foreign_key("author_id", None, None, false).unwrap();
        assert!(matches!(
            books.add_foreign_key("author_id", Some("authors"), None, false),
            Err(SqliteError::AlterError(_))
        ));
        books.add_foreign_key("author_id", Some("authors"), None, true).unwrap();
        assert_eq!(books.foreign_keys().unwrap().len(), 1);
    }

    #[test]
    fn test_add_foreign_keys_and_index_them() {
        let db = db();
        db.execute_script(
            "CREATE TABLE authors (id INTEGER PRIMARY KEY);
             CREATE TABLE books (id INTEGER PRIMARY KEY, author_id INTEGER, editor_id INTEGER);",
        )
        .unwrap();
        db.add_foreign_keys(&[
            ("books", ForeignKeySpec::from(("author_id", "authors"))),
            ("books", ForeignKeySpec::from(("editor_id", "authors", "id"))),
        ])
        .unwrap();
        assert_eq!(db.table("books").foreign_keys().unwrap().len(), 2);

        db.index_foreign_keys().unwrap();
        let indexed: Vec<Vec<String>> = db
            .table("books")
            .indexes()
            .unwrap()
            .into_iter()
            .map(|i| i.columns)
            .collect();
        assert!(indexed.contains(&vec!["author_id".to_string()]));
        assert!(indexed.contains(&vec!["editor_id".to_string()]));
    }

    #[test]
    fn test_duplicate_keeps_constraints() {
        let db = db();
        db.execute_script("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT NOT NULL); INSERT INTO t VALUES (1, 'a');")
            .unwrap();
        let copy = db.table("t").duplicate("t2").unwrap();
        assert_eq!(copy.pks().unwrap(), vec!["id"]);
        assert!(copy.columns().unwrap()[1].not_null);
        assert_eq!(copy.count().unwrap(), 1);
        assert!(matches!(db.table("t").duplicate("t2"), Err(SqliteError::TableExists(_))));
    }

    #[test]
    fn test_add_missing_columns_and_rename() {
        let db = db();
        db.execute_script("CREATE TABLE t (Name TEXT)").unwrap();
        db.table("t")
            .add_missing_columns(&[record! { "name" => "a", "age" => 3 }])
            .unwrap();
        assert_eq!(db.table("t").column_names().unwrap(), vec!["Name", "age"]);

        db.rename_table("t", "people").unwrap();
        assert_eq!(db.table_names().unwrap(), vec!["people"]);
        assert!(matches!(db.rename_table("t", "x"), Err(SqliteError::TableNotFound(_))));
    }

    #[test]
    fn test_drop() {
        let db = db();
        db.execute_script("CREATE TABLE t (id INTEGER)").unwrap();
        db.table("t").drop(false).unwrap();
        db.table("t").drop(true).unwrap();
        assert!(matches!(db.table("t").drop(false), Err(SqliteError::TableNotFound(_))));
    }
}
