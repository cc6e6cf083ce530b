//! Copy-and-swap table rewrites.
//!
//! SQLite's `ALTER TABLE` cannot change types, drop constraints or alter
//! primary keys, so a transform builds the desired table under a scratch
//! name, copies the rows across, drops the original and renames the copy
//! into place. Indexes and triggers are recreated afterwards; a trigger
//! naming a renamed or dropped column is refused, except the FTS triggers,
//! which are regenerated along with the FTS table.
//!
//! A crash between the `DROP` and the final `RENAME` (outside a journaled
//! transaction) leaves only the scratch table behind; there is no
//! automatic recovery.

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use dyntable_core::{ColumnType, SqlDefault, apply_column_order, naming, quote_identifier, table_options};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::FtsVersion;
use crate::create::{ColumnDef, TableDef};
use crate::database::Database;
use crate::error::{Result, SqliteError};
use crate::model::{Column, ForeignKeySpec};
use crate::table::Table;

/// Options for [`Table::transform`].
///
/// Column names in `types`, `rename`, `drop`, `not_null`, `defaults` and
/// `drop_foreign_keys` refer to the current table. `column_order`, `pk`
/// and `add_foreign_keys` accept either old or new names.
///
/// # Examples
///
/// ```
/// use dyntable_core::ColumnType;
/// use dyntable_sqlite::{Database, TransformOptions};
///
/// let db = Database::open_in_memory().unwrap();
/// db.execute_script("CREATE TABLE dogs (id INTEGER PRIMARY KEY, name TEXT, age TEXT)").unwrap();
/// let dogs = db.table("dogs");
/// dogs.transform(&TransformOptions {
///     types: [("age".to_string(), ColumnType::Integer)].into(),
///     rename: [("age".to_string(), "dog_age".to_string())].into(),
///     ..Default::default()
/// })
/// .unwrap();
/// assert_eq!(dogs.columns_dict().unwrap()[2], ("dog_age".to_string(), ColumnType::Integer));
/// ```
#[derive(Debug, Clone, Default)]
pub struct TransformOptions {
    pub types: HashMap<String, ColumnType>,
    pub rename: HashMap<String, String>,
    pub drop: Vec<String>,
    /// `None` keeps the key, `Some(vec![])` makes a rowid table.
    pub pk: Option<Vec<String>>,
    pub not_null: HashMap<String, bool>,
    /// `None` removes a default.
    pub defaults: HashMap<String, Option<SqlDefault>>,
    /// Columns whose foreign keys are removed.
    pub drop_foreign_keys: Vec<String>,
    pub add_foreign_keys: Vec<ForeignKeySpec>,
    pub column_order: Vec<String>,
    /// Keep the original table under this name instead of dropping it.
    pub keep_table: Option<String>,
    /// `None` keeps the table's current setting.
    pub strict: Option<bool>,
}

impl<'a> Table<'a> {
    /// The table's current definition, read from the catalog.
    pub(crate) fn current_def(&self) -> Result<TableDef> {
        let options = table_options(&self.schema()?);
        let columns = self.columns()?;
        let mut pk_columns: Vec<&Column> = columns.iter().filter(|c| c.is_pk()).collect();
        pk_columns.sort_by_key(|c| c.pk);
        let pk = pk_columns.into_iter().map(|c| c.name.clone()).collect();
        Ok(TableDef {
            name: self.name().to_string(),
            columns: columns
                .iter()
                .map(|c| ColumnDef {
                    name: c.name.clone(),
                    declared: c.declared_type.clone(),
                    not_null: c.not_null,
                    default: c.default(),
                })
                .collect(),
            pk,
            foreign_keys: self.foreign_keys()?,
            strict: options.strict,
            without_rowid: options.without_rowid,
        })
    }

    fn validate_transform(&self, current: &TableDef, options: &TransformOptions) -> Result<()> {
        let has_column = |name: &str| current.columns.iter().any(|c| c.name == name);
        let mut unknown: Vec<&str> = options
            .types
            .keys()
            .chain(options.rename.keys())
            .chain(options.drop.iter())
            .chain(options.not_null.keys())
            .chain(options.defaults.keys())
            .chain(options.drop_foreign_keys.iter())
            .map(String::as_str)
            .filter(|name| !has_column(name))
            .collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            unknown.dedup();
            return Err(SqliteError::InvalidColumns(format!(
                "{} not in table {}",
                unknown.join(", "),
                self.name()
            )));
        }

        let mut targets: Vec<String> = Vec::new();
        for (old, new) in &options.rename {
            let lowered = new.to_lowercase();
            if targets.contains(&lowered) {
                return Err(SqliteError::InvalidColumns(format!(
                    "more than one column renamed to {new}"
                )));
            }
            targets.push(lowered);
            let collides = current.columns.iter().any(|c| {
                c.name.eq_ignore_ascii_case(new)
                    && c.name != *old
                    && !options.rename.contains_key(&c.name)
                    && !options.drop.contains(&c.name)
            });
            if collides {
                return Err(SqliteError::InvalidColumns(format!(
                    "cannot rename {old} to {new}: column already exists"
                )));
            }
        }

        for column in &options.drop_foreign_keys {
            if !current.foreign_keys.iter().any(|fk| fk.column == *column) {
                return Err(SqliteError::AlterError(format!(
                    "no foreign key on column {column} of table {}",
                    self.name()
                )));
            }
        }
        Ok(())
    }

    fn transformed_def(&self, current: &TableDef, options: &TransformOptions) -> Result<TableDef> {
        let new_name = |old: &str| options.rename.get(old).cloned().unwrap_or_else(|| old.to_string());
        let strict = options.strict.unwrap_or(current.strict) && self.db().supports_strict();

        let columns: Vec<(String, ColumnDef)> = current
            .columns
            .iter()
            .filter(|c| !options.drop.contains(&c.name))
            .map(|c| {
                let mut def = c.clone();
                if let Some(column_type) = options.types.get(&c.name) {
                    def.declared = column_type.sql_name(strict).to_string();
                }
                if let Some(not_null) = options.not_null.get(&c.name) {
                    def.not_null = *not_null;
                }
                if let Some(default) = options.defaults.get(&c.name) {
                    def.default = default.clone();
                }
                def.name = new_name(&c.name);
                (def.name.clone(), def)
            })
            .collect();
        let order: Vec<String> = options.column_order.iter().map(|name| new_name(name)).collect();
        let columns: Vec<ColumnDef> = apply_column_order(columns, &order)
            .into_iter()
            .map(|(_, def)| def)
            .collect();
        let has_new_column = |name: &str| columns.iter().any(|c| c.name == name);

        let pk: Vec<String> = match &options.pk {
            None => current
                .pk
                .iter()
                .filter(|name| !options.drop.contains(name))
                .map(|name| new_name(name))
                .collect(),
            Some(requested) => {
                let pk: Vec<String> = requested.iter().map(|name| new_name(name)).collect();
                if let Some(missing) = pk.iter().find(|name| !has_new_column(name)) {
                    return Err(SqliteError::InvalidColumns(format!(
                        "primary key column {missing} is not in the transformed table"
                    )));
                }
                pk
            }
        };

        let mut foreign_keys: Vec<_> = current
            .foreign_keys
            .iter()
            .filter(|fk| !options.drop_foreign_keys.contains(&fk.column) && !options.drop.contains(&fk.column))
            .cloned()
            .map(|mut fk| {
                if fk.other_table == self.name() {
                    fk.other_column = new_name(&fk.other_column);
                }
                fk.column = new_name(&fk.column);
                fk
            })
            .collect();
        for spec in &options.add_foreign_keys {
            let spec = ForeignKeySpec {
                column: new_name(&spec.column),
                ..spec.clone()
            };
            if !has_new_column(&spec.column) {
                return Err(SqliteError::AlterError(format!("no such column: {}", spec.column)));
            }
            foreign_keys.push(self.resolve_reference(&spec, &pk)?);
        }
        foreign_keys.sort();
        foreign_keys.dedup();

        Ok(TableDef {
            name: naming::transform_table_name(self.name(), &naming::unique_suffix()),
            without_rowid: current.without_rowid && !pk.is_empty(),
            columns,
            pk,
            foreign_keys,
            strict,
        })
    }

    /// Returns the statements [`transform`](Self::transform) would run,
    /// without running them.
    ///
    /// The first four are always, in order: `CREATE TABLE` for the scratch
    /// table, `INSERT INTO ... SELECT` copying the rows, `DROP TABLE` (or
    /// `ALTER TABLE ... RENAME` with `keep_table`) for the original, and
    /// `ALTER TABLE ... RENAME` moving the scratch table into place. Index
    /// and trigger recreation follows.
    ///
    /// # Errors
    ///
    /// - [`SqliteError::TableNotFound`] for a missing table.
    /// - [`SqliteError::InvalidColumns`] for unknown or colliding columns.
    /// - [`SqliteError::AlterError`] when a dropped foreign key does not
    ///   exist or an added one cannot be resolved.
    pub fn transform_sql(&self, options: &TransformOptions) -> Result<Vec<String>> {
        self.require_exists()?;
        let current = self.current_def()?;
        self.validate_transform(&current, options)?;
        let new_def = self.transformed_def(&current, options)?;

        let new_name = |old: &str| options.rename.get(old).cloned().unwrap_or_else(|| old.to_string());
        let mut old_columns: Vec<String> = Vec::new();
        let mut new_columns: Vec<String> = Vec::new();
        if current.uses_rowid() && current.has_rowid() && new_def.uses_rowid() {
            old_columns.push(quote_identifier("rowid"));
            new_columns.push(quote_identifier("rowid"));
        }
        for column in current.columns.iter().filter(|c| !options.drop.contains(&c.name)) {
            old_columns.push(quote_identifier(&column.name));
            new_columns.push(quote_identifier(&new_name(&column.name)));
        }

        let scratch = quote_identifier(&new_def.name);
        let mut statements = vec![
            format!("{};", new_def.to_sql()),
            format!(
                "INSERT INTO {scratch} ({}) SELECT {} FROM {};",
                new_columns.join(", "),
                old_columns.join(", "),
                self.quoted()
            ),
            match &options.keep_table {
                Some(keep) => format!("ALTER TABLE {} RENAME TO {};", self.quoted(), quote_identifier(keep)),
                None => format!("DROP TABLE {};", self.quoted()),
            },
            format!("ALTER TABLE {scratch} RENAME TO {};", self.quoted()),
        ];
        statements.extend(self.index_statements(options)?);
        statements.extend(self.trigger_statements(options)?);
        Ok(statements)
    }

    /// Recreates the table's triggers and, when indexed columns are
    /// renamed, its FTS table.
    ///
    /// FTS triggers are regenerated against the new column names. Any
    /// other trigger whose body names a renamed or dropped column is
    /// refused, since its stored SQL would fail on the next write.
    fn trigger_statements(&self, options: &TransformOptions) -> Result<Vec<String>> {
        let touched: BTreeSet<String> = options
            .rename
            .keys()
            .chain(&options.drop)
            .map(|name| name.to_lowercase())
            .collect();
        let mut statements = Vec::new();
        let mut regenerated: Vec<String> = Vec::new();

        if let Some(def) = self.detect_fts_def()? {
            let columns = def.columns();
            if let Some(dropped) = columns.iter().find(|c| options.drop.contains(*c)) {
                return Err(SqliteError::AlterError(format!(
                    "column {dropped} is indexed by {}; disable full-text search before dropping it",
                    def.name
                )));
            }
            if columns.iter().any(|c| options.rename.contains_key(c)) {
                let version = FtsVersion::from_module(&def.module).ok_or_else(|| {
                    SqliteError::InvalidArgument(format!("unsupported full-text module: {}", def.module))
                })?;
                let mapped: Vec<String> = columns
                    .iter()
                    .map(|c| options.rename.get(c).cloned().unwrap_or_else(|| c.clone()))
                    .collect();
                let fts = quote_identifier(&def.name);
                statements.push(format!("DROP TABLE {fts};"));
                statements.push(format!(
                    "{};",
                    self.fts_create_sql(&def.name, &mapped, version, def.option("tokenize").as_deref())
                ));
                statements.push(format!("INSERT INTO {fts} ({fts}) VALUES ('rebuild');"));
                if self.has_fts_triggers()? {
                    for (name, sql) in naming::fts_trigger_names(self.name())
                        .into_iter()
                        .zip(self.fts_triggers_sql(&def.name, &mapped, version))
                    {
                        if options.keep_table.is_some() {
                            statements.push(format!("DROP TRIGGER IF EXISTS {};", quote_identifier(&name)));
                        }
                        statements.push(sql);
                        regenerated.push(name);
                    }
                }
                debug!(table = %self.name(), fts = %def.name, "Regenerating FTS index for renamed columns");
            }
        }

        for trigger in self.triggers()? {
            if regenerated.contains(&trigger.name) {
                continue;
            }
            if let Some(column) = referenced_identifiers(&trigger.sql)
                .into_iter()
                .find(|ident| touched.contains(ident))
            {
                return Err(SqliteError::AlterError(format!(
                    "trigger {} references column {column}, which this transform renames or drops",
                    trigger.name
                )));
            }
            if options.keep_table.is_some() {
                statements.push(format!("DROP TRIGGER IF EXISTS {};", quote_identifier(&trigger.name)));
            }
            statements.push(format!("{};", trigger.sql));
        }
        Ok(statements)
    }

    fn index_statements(&self, options: &TransformOptions) -> Result<Vec<String>> {
        let xindexes = self.xindexes()?;
        let mut statements = Vec::new();
        for index in self.indexes()? {
            if index.origin == "pk" {
                continue;
            }
            let key_columns: Vec<_> = xindexes
                .iter()
                .find(|x| x.name == index.name)
                .map(|x| x.columns.iter().filter(|c| c.key).cloned().collect())
                .unwrap_or_default();

            let drop_existing = options.keep_table.is_some() && index.origin == "c";
            let has_expression = key_columns.iter().any(|c| c.name.is_none());
            if index.partial || has_expression {
                match self.db().stored_sql(&index.name)? {
                    Some(sql) if options.rename.is_empty() && options.drop.is_empty() => {
                        if drop_existing {
                            statements.push(format!("DROP INDEX IF EXISTS {};", quote_identifier(&index.name)));
                        }
                        statements.push(format!("{sql};"));
                    }
                    _ => warn!(
                        table = %self.name(),
                        index = %index.name,
                        "Skipping partial or expression index that columns changes may affect"
                    ),
                }
                continue;
            }

            let names: Vec<&str> = key_columns.iter().filter_map(|c| c.name.as_deref()).collect();
            if let Some(dropped) = names.iter().find(|name| options.drop.iter().any(|d| d == *name)) {
                warn!(
                    table = %self.name(),
                    index = %index.name,
                    column = %dropped,
                    "Skipping index on dropped column"
                );
                continue;
            }

            let renamed: Vec<String> = names
                .iter()
                .map(|name| options.rename.get(*name).cloned().unwrap_or_else(|| name.to_string()))
                .collect();
            let columns_sql = key_columns
                .iter()
                .zip(&renamed)
                .map(|(column, name)| {
                    let mut sql = quote_identifier(name);
                    if !column.collation.eq_ignore_ascii_case("BINARY") {
                        sql.push_str(&format!(" COLLATE {}", column.collation));
                    }
                    if column.desc {
                        sql.push_str(" DESC");
                    }
                    sql
                })
                .collect::<Vec<_>>()
                .join(", ");
            let name = if index.origin == "c" {
                index.name.clone()
            } else {
                naming::index_name(self.name(), &renamed)
            };
            if drop_existing {
                statements.push(format!("DROP INDEX IF EXISTS {};", quote_identifier(&name)));
            }
            statements.push(format!(
                "CREATE {}INDEX {} ON {} ({columns_sql});",
                if index.unique { "UNIQUE " } else { "" },
                quote_identifier(&name),
                self.quoted()
            ));
        }
        Ok(statements)
    }

    /// Rewrites the table through the copy-and-swap sequence of
    /// [`transform_sql`](Self::transform_sql), in one transaction.
    ///
    /// When foreign keys are enforced and no transaction is open, they are
    /// switched off for the rewrite and `PRAGMA foreign_key_check` runs
    /// before commit, over this table and the tables referencing it.
    ///
    /// # Errors
    ///
    /// As [`transform_sql`](Self::transform_sql); additionally
    /// [`SqliteError::AlterError`] if the rewrite leaves foreign key
    /// violations, in which case nothing is changed.
    pub fn transform(&self, options: &TransformOptions) -> Result<&Self> {
        let statements = self.transform_sql(options)?;
        self.db().rewrite_table(self.name(), |db| {
            for sql in &statements {
                db.execute(sql, &[])?;
            }
            Ok(())
        })?;
        info!(table = %self.name(), statements = statements.len(), "Transformed table");
        Ok(self)
    }
}

impl Database {
    /// Runs `f` in a transaction set up for rebuilding `table`.
    ///
    /// Foreign key enforcement is suspended when it is on and no
    /// transaction is open, `legacy_alter_table` is enabled so renames
    /// leave dependent SQL untouched, and both pragmas are restored
    /// afterwards whatever the outcome.
    pub(crate) fn rewrite_table<T, F>(&self, table: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T>,
    {
        let enforce_fks = self.foreign_keys_enabled()?;
        let toggle_fks = enforce_fks && self.is_autocommit();
        let legacy_alter = self.query_scalar::<i64>("PRAGMA legacy_alter_table", &[])?.unwrap_or(0) != 0;
        if toggle_fks {
            self.execute_script("PRAGMA foreign_keys = OFF")?;
        }
        if !legacy_alter {
            self.execute_script("PRAGMA legacy_alter_table = ON")?;
        }

        let result = self.transaction(|db| {
            let value = f(db)?;
            if enforce_fks {
                db.check_foreign_keys(table)?;
            }
            Ok(value)
        });

        let restore_legacy = if legacy_alter {
            Ok(())
        } else {
            self.execute_script("PRAGMA legacy_alter_table = OFF")
        };
        let restore_fks = if toggle_fks {
            self.execute_script("PRAGMA foreign_keys = ON")
        } else {
            Ok(())
        };
        let value = result?;
        restore_legacy?;
        restore_fks?;
        Ok(value)
    }

    /// Fails if `table`, or any table whose foreign keys point at it,
    /// holds rows violating a foreign key.
    fn check_foreign_keys(&self, table: &str) -> Result<()> {
        let mut checked = vec![table.to_string()];
        for name in self.table_names()? {
            if name.eq_ignore_ascii_case(table) {
                continue;
            }
            let references = self
                .table(name.as_str())
                .foreign_keys()?
                .iter()
                .any(|fk| fk.other_table.eq_ignore_ascii_case(table));
            if references {
                checked.push(name);
            }
        }

        let mut violations = BTreeSet::new();
        for name in &checked {
            let sql = format!("PRAGMA foreign_key_check({})", quote_identifier(name));
            violations.extend(self.query_map(&sql, &[], |row| row.get::<_, String>(0))?);
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(SqliteError::AlterError(format!(
                "transform of {table} would violate foreign keys in: {}",
                violations.into_iter().collect::<Vec<_>>().join(", ")
            )))
        }
    }
}

/// Lowercased identifiers appearing in `sql`, quoted or bare, skipping
/// string literals. Keywords come back too; callers match against
/// column names.
fn referenced_identifiers(sql: &str) -> BTreeSet<String> {
    // SAFETY: compile-time constant, covered by tests.
    static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"'(?:[^']|'')*'|"((?:[^"]|"")*)"|\[([^\]]*)\]|`((?:[^`]|``)*)`|([A-Za-z_][A-Za-z0-9_$]*)"#)
            .expect("static regex must compile")
    });
    TOKEN
        .captures_iter(sql)
        .filter_map(|caps| {
            if let Some(m) = caps.get(1) {
                Some(m.as_str().replace("\"\"", "\""))
            } else if let Some(m) = caps.get(2) {
                Some(m.as_str().to_string())
            } else if let Some(m) = caps.get(3) {
                Some(m.as_str().replace("``", "`"))
            } else {
                caps.get(4).map(|m| m.as_str().to_string())
            }
        })
        .map(|ident| ident.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ForeignKey;
    use dyntable_core::Value;

    fn dogs(db: &Database) -> Table<'_> {
        db.execute_script(
            "CREATE TABLE dogs (id INTEGER PRIMARY KEY, name TEXT, age TEXT);
             INSERT INTO dogs VALUES (1, 'Cleo', '5'), (2, 'Pancakes', '4');",
        )
        .unwrap();
        db.table("dogs")
    }

    fn opts() -> TransformOptions {
        TransformOptions::default()
    }

    #[test]
    fn test_statement_order() {
        let db = Database::open_in_memory().unwrap();
        let dogs = dogs(&db);
        let sql = dogs
            .transform_sql(&TransformOptions {
                rename: [("age".to_string(), "dog_age".to_string())].into(),
                ..opts()
            })
            .unwrap();
        assert_eq!(sql.len(), 4);
        assert!(sql[0].starts_with("CREATE TABLE \"dogs_new_"));
        let scratch = sql[0]["CREATE TABLE ".len()..].split(' ').next().unwrap().to_string();
        assert_eq!(
            sql[1],
            format!(
                "INSERT INTO {scratch} (\"id\", \"name\", \"dog_age\") SELECT \"id\", \"name\", \"age\" FROM \"dogs\";"
            )
        );
        assert_eq!(sql[2], "DROP TABLE \"dogs\";");
        assert_eq!(sql[3], format!("ALTER TABLE {scratch} RENAME TO \"dogs\";"));
    }

    #[test]
    fn test_rowid_copied_for_rowid_tables() {
        let db = Database::open_in_memory().unwrap();
        db.execute_script("CREATE TABLE notes (body TEXT); INSERT INTO notes VALUES ('a'), ('b'); DELETE FROM notes WHERE body = 'a';")
            .unwrap();
        let notes = db.table("notes");
        let sql = notes.transform_sql(&opts()).unwrap();
        assert!(sql[1].contains("(\"rowid\", \"body\") SELECT \"rowid\", \"body\""));
        notes.transform(&opts()).unwrap();
        let rowid: i64 = db.query_scalar("SELECT rowid FROM notes", &[]).unwrap().unwrap();
        assert_eq!(rowid, 2);
    }

    #[test]
    fn test_rename_and_type_change_keep_data() {
        let db = Database::open_in_memory().unwrap();
        let dogs = dogs(&db);
        dogs.transform(&TransformOptions {
            types: [("age".to_string(), ColumnType::Integer)].into(),
            rename: [("age".to_string(), "dog_age".to_string())].into(),
            ..opts()
        })
        .unwrap();
        assert_eq!(dogs.get(1).unwrap().get("dog_age"), Some(&Value::Integer(5)));
        assert_eq!(dogs.pks().unwrap(), vec!["id"]);
    }

    #[test]
    fn test_drop_reorder_and_pk_change() {
        let db = Database::open_in_memory().unwrap();
        let dogs = dogs(&db);
        dogs.transform(&TransformOptions {
            drop: vec!["age".into()],
            column_order: vec!["name".into()],
            pk: Some(vec!["name".into()]),
            ..opts()
        })
        .unwrap();
        assert_eq!(dogs.column_names().unwrap(), vec!["name", "id"]);
        assert_eq!(dogs.pks().unwrap(), vec!["name"]);

        dogs.transform(&TransformOptions {
            pk: Some(vec![]),
            ..opts()
        })
        .unwrap();
        assert!(dogs.use_rowid().unwrap());
    }

    #[test]
    fn test_not_null_and_defaults() {
        let db = Database::open_in_memory().unwrap();
        let dogs = dogs(&db);
        dogs.transform(&TransformOptions {
            not_null: [("name".to_string(), true)].into(),
            defaults: [("age".to_string(), Some(SqlDefault::Text("'1'".into())))].into(),
            ..opts()
        })
        .unwrap();
        let columns = dogs.columns().unwrap();
        assert!(columns[1].not_null);
        assert_eq!(columns[2].default_value.as_deref(), Some("'1'"));

        dogs.transform(&TransformOptions {
            defaults: [("age".to_string(), None)].into(),
            ..opts()
        })
        .unwrap();
        assert_eq!(dogs.columns().unwrap()[2].default_value, None);
    }

    #[test]
    fn test_validation_runs_before_sql() {
        let db = Database::open_in_memory().unwrap();
        let dogs = dogs(&db);
        let before = dogs.schema().unwrap();
        assert!(matches!(
            dogs.transform(&TransformOptions {
                drop: vec!["nope".into()],
                ..opts()
            }),
            Err(SqliteError::InvalidColumns(_))
        ));
        assert!(matches!(
            dogs.transform(&TransformOptions {
                rename: [("age".to_string(), "name".to_string())].into(),
                ..opts()
            }),
            Err(SqliteError::InvalidColumns(_))
        ));
        assert!(matches!(
            dogs.transform(&TransformOptions {
                drop_foreign_keys: vec!["age".into()],
                ..opts()
            }),
            Err(SqliteError::AlterError(_))
        ));
        assert!(matches!(
            dogs.transform(&TransformOptions {
                drop: vec!["id".into()],
                pk: Some(vec!["id".into()]),
                ..opts()
            }),
            Err(SqliteError::InvalidColumns(_))
        ));
        assert!(matches!(
            db.table("missing").transform(&opts()),
            Err(SqliteError::TableNotFound(_))
        ));
        assert_eq!(dogs.schema().unwrap(), before);
        assert_eq!(db.table_names().unwrap(), vec!["dogs"]);
    }

    #[test]
    fn test_swapping_names_is_allowed() {
        let db = Database::open_in_memory().unwrap();
        let dogs = dogs(&db);
        dogs.transform(&TransformOptions {
            rename: [
                ("name".to_string(), "age".to_string()),
                ("age".to_string(), "name".to_string()),
            ]
            .into(),
            ..opts()
        })
        .unwrap();
        assert_eq!(dogs.get(1).unwrap().get("age"), Some(&Value::from("Cleo")));
    }

    #[test]
    fn test_foreign_keys_added_and_dropped() {
        let db = Database::open_in_memory().unwrap();
        db.execute_script(
            "CREATE TABLE owners (id INTEGER PRIMARY KEY);
             INSERT INTO owners VALUES (1);
             CREATE TABLE pets (id INTEGER PRIMARY KEY, owner_id INTEGER);
             INSERT INTO pets VALUES (1, 1);",
        )
        .unwrap();
        let pets = db.table("pets");
        pets.transform(&TransformOptions {
            add_foreign_keys: vec![("owner_id", "owners").into()],
            ..opts()
        })
        .unwrap();
        assert_eq!(
            pets.foreign_keys().unwrap(),
            vec![ForeignKey {
                table: "pets".into(),
                column: "owner_id".into(),
                other_table: "owners".into(),
                other_column: "id".into(),
            }]
        );
        pets.transform(&TransformOptions {
            drop_foreign_keys: vec!["owner_id".into()],
            ..opts()
        })
        .unwrap();
        assert!(pets.foreign_keys().unwrap().is_empty());
        assert!(db.foreign_keys_enabled().unwrap());
    }

    #[test]
    fn test_foreign_key_violation_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        db.execute_script(
            "CREATE TABLE owners (id INTEGER PRIMARY KEY);
             CREATE TABLE pets (id INTEGER PRIMARY KEY, owner_id INTEGER);
             INSERT INTO pets VALUES (1, 99);",
        )
        .unwrap();
        let pets = db.table("pets");
        let err = pets
            .transform(&TransformOptions {
                add_foreign_keys: vec![("owner_id", "owners").into()],
                ..opts()
            })
            .unwrap_err();
        assert!(matches!(err, SqliteError::AlterError(_)));
        assert!(pets.foreign_keys().unwrap().is_empty());
        assert_eq!(db.table_names().unwrap(), vec!["owners", "pets"]);
        assert!(db.foreign_keys_enabled().unwrap());
    }

    #[test]
    fn test_unrelated_violation_does_not_block() {
        let db = Database::open_in_memory().unwrap();
        db.execute_script(
            "CREATE TABLE owners (id INTEGER PRIMARY KEY);
             CREATE TABLE pets (id INTEGER PRIMARY KEY, owner_id INTEGER REFERENCES owners(id));
             CREATE TABLE trees (id INTEGER PRIMARY KEY, name TEXT, height INTEGER);
             PRAGMA foreign_keys = OFF;
             INSERT INTO pets VALUES (1, 99);
             PRAGMA foreign_keys = ON;",
        )
        .unwrap();
        let trees = db.table("trees");
        trees
            .transform(&TransformOptions {
                drop: vec!["name".into()],
                ..opts()
            })
            .unwrap();
        assert_eq!(trees.column_names().unwrap(), vec!["id", "height"]);

        let err = db
            .table("owners")
            .transform(&TransformOptions {
                types: [("id".to_string(), ColumnType::Integer)].into(),
                ..opts()
            })
            .unwrap_err();
        assert!(matches!(err, SqliteError::AlterError(msg) if msg.contains("pets")));
    }

    #[test]
    fn test_indexes_and_triggers_recreated() {
        let db = Database::open_in_memory().unwrap();
        let dogs = dogs(&db);
        db.execute_script(
            "CREATE INDEX idx_dogs_name ON dogs (name DESC);
             CREATE INDEX idx_dogs_age ON dogs (age);
             CREATE TABLE log (msg TEXT);
             CREATE TRIGGER dogs_log AFTER INSERT ON dogs BEGIN INSERT INTO log VALUES (new.id); END;",
        )
        .unwrap();
        dogs.transform(&TransformOptions {
            rename: [("name".to_string(), "title".to_string())].into(),
            drop: vec!["age".into()],
            ..opts()
        })
        .unwrap();
        let indexes = dogs.indexes().unwrap();
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].columns, vec!["title"]);
        assert_eq!(dogs.triggers().unwrap()[0].name, "dogs_log");

        db.execute("INSERT INTO dogs (id, title) VALUES (3, 'Rex')", &[]).unwrap();
        let logged: Option<String> = db.query_scalar("SELECT msg FROM log", &[]).unwrap();
        assert_eq!(logged.as_deref(), Some("3"));
    }

    #[test]
    fn test_trigger_on_changed_column_is_refused() {
        let db = Database::open_in_memory().unwrap();
        let dogs = dogs(&db);
        db.execute_script(
            "CREATE TABLE log (msg TEXT);
             CREATE TRIGGER dogs_age AFTER INSERT ON dogs BEGIN INSERT INTO log VALUES (new.age); END;
             CREATE TRIGGER dogs_name AFTER UPDATE OF \"Name\" ON dogs BEGIN SELECT 'age'; END;",
        )
        .unwrap();
        let before = dogs.schema().unwrap();

        let err = dogs
            .transform(&TransformOptions {
                drop: vec!["age".into()],
                ..opts()
            })
            .unwrap_err();
        assert!(matches!(&err, SqliteError::AlterError(msg) if msg.contains("dogs_age")));
        assert!(matches!(
            dogs.transform_sql(&TransformOptions {
                rename: [("name".to_string(), "title".to_string())].into(),
                ..opts()
            }),
            Err(SqliteError::AlterError(msg)) if msg.contains("dogs_name")
        ));

        assert_eq!(dogs.schema().unwrap(), before);
        assert_eq!(db.table_names().unwrap(), vec!["dogs", "log"]);
        db.execute("INSERT INTO dogs (id, name, age) VALUES (3, 'Rex', '2')", &[]).unwrap();
        assert_eq!(db.table("log").count().unwrap(), 1);
    }

    #[test]
    fn test_fts_index_follows_renamed_column() {
        use crate::fts::{FtsOptions, SearchOptions};

        let db = Database::open_in_memory().unwrap();
        db.execute_script(
            "CREATE TABLE docs (id INTEGER PRIMARY KEY, title TEXT, body TEXT);
             INSERT INTO docs VALUES (1, 'ownership', 'borrowing rules');",
        )
        .unwrap();
        let docs = db.table("docs");
        docs.enable_fts(
            &["title", "body"],
            &FtsOptions {
                create_triggers: true,
                tokenize: Some("porter".into()),
                ..Default::default()
            },
        )
        .unwrap();

        docs.transform(&TransformOptions {
            rename: [("title".to_string(), "heading".to_string())].into(),
            ..opts()
        })
        .unwrap();

        let def = docs.detect_fts_def().unwrap().unwrap();
        assert_eq!(def.columns(), vec!["heading", "body"]);
        assert_eq!(def.option("tokenize").as_deref(), Some("porter"));
        assert!(docs.has_fts_triggers().unwrap());

        db.execute("INSERT INTO docs (id, heading, body) VALUES (2, 'lifetimes', 'scopes')", &[])
            .unwrap();
        db.execute("UPDATE docs SET body = 'moves' WHERE id = 1", &[]).unwrap();
        let hits = docs.search("lifetimes", &SearchOptions::new()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(docs.search("ownership", &SearchOptions::new()).unwrap().len(), 1);
        assert!(docs.search("borrowing", &SearchOptions::new()).unwrap().is_empty());
        db.execute("INSERT INTO docs_fts (docs_fts) VALUES ('integrity-check')", &[])
            .unwrap();
    }

    #[test]
    fn test_dropping_fts_column_is_refused() {
        use crate::fts::FtsOptions;

        let db = Database::open_in_memory().unwrap();
        db.execute_script("CREATE TABLE docs (id INTEGER PRIMARY KEY, title TEXT, body TEXT)")
            .unwrap();
        let docs = db.table("docs");
        docs.enable_fts(&["title"], &FtsOptions::default()).unwrap();
        assert!(matches!(
            docs.transform(&TransformOptions {
                drop: vec!["title".into()],
                ..opts()
            }),
            Err(SqliteError::AlterError(_))
        ));
        docs.transform(&TransformOptions {
            drop: vec!["body".into()],
            ..opts()
        })
        .unwrap();
        assert_eq!(docs.column_names().unwrap(), vec!["id", "title"]);
    }

    #[test]
    fn test_referenced_identifiers_skip_literals() {
        let found = referenced_identifiers(
            r#"CREATE TRIGGER t AFTER INSERT ON "My Table" BEGIN INSERT INTO log VALUES ('age', new.[Full Name], new.`x``y`); END"#,
        );
        assert!(found.contains("my table"));
        assert!(found.contains("full name"));
        assert!(found.contains("x`y"));
        assert!(found.contains("new"));
        assert!(!found.contains("age"));
    }

    #[test]
    fn test_keep_table() {
        let db = Database::open_in_memory().unwrap();
        let dogs = dogs(&db);
        db.execute_script("CREATE INDEX idx_dogs_name ON dogs (name)").unwrap();
        dogs.transform(&TransformOptions {
            drop: vec!["age".into()],
            keep_table: Some("dogs_backup".into()),
            ..opts()
        })
        .unwrap();
        assert_eq!(db.table("dogs_backup").column_names().unwrap(), vec!["id", "name", "age"]);
        assert_eq!(dogs.column_names().unwrap(), vec!["id", "name"]);
        assert_eq!(dogs.indexes().unwrap()[0].name, "idx_dogs_name");
    }

    #[test]
    fn test_transform_inside_open_transaction() {
        let db = Database::open_in_memory().unwrap();
        let dogs = dogs(&db);
        db.transaction(|_| {
            dogs.transform(&TransformOptions {
                drop: vec!["age".into()],
                ..opts()
            })?;
            Ok(())
        })
        .unwrap();
        assert_eq!(dogs.column_names().unwrap(), vec!["id", "name"]);
    }
}
