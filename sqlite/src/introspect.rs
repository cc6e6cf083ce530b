//! Read-only catalog queries.
//!
//! Nothing is cached: each call re-reads `sqlite_master` or the relevant
//! `PRAGMA`, so results always reflect the live schema.

use dyntable_core::{ColumnType, SqlDefault, Value, VirtualTableDef, naming, quote_identifier, table_options};

use crate::config::FtsVersion;
use crate::convert::{self, SqlValue};
use crate::database::Database;
use crate::error::{Result, SqliteError};
use crate::model::{Column, ForeignKey, Index, Trigger, XIndex, XIndexColumn};
use crate::table::Table;
use crate::view::View;

impl Database {
    fn names_of_type(&self, kind: &str) -> Result<Vec<String>> {
        self.query_map(
            "SELECT name FROM sqlite_master WHERE type = ? AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'",
            &[SqlValue::Text(kind.to_string())],
            |row| row.get(0),
        )
    }

    /// Names of all tables in catalog order, excluding SQLite's internal
    /// `sqlite_*` tables.
    pub fn table_names(&self) -> Result<Vec<String>> {
        self.names_of_type("table")
    }

    /// Parsed definitions of every virtual table, in catalog order.
    pub fn virtual_tables(&self) -> Result<Vec<VirtualTableDef>> {
        let sqls: Vec<String> = self.query_map(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND sql LIKE 'CREATE VIRTUAL TABLE%'",
            &[],
            |row| row.get(0),
        )?;
        Ok(sqls.iter().filter_map(|sql| VirtualTableDef::parse(sql)).collect())
    }

    fn fts_table_names(&self, version: FtsVersion) -> Result<Vec<String>> {
        Ok(self
            .virtual_tables()?
            .into_iter()
            .filter(|def| FtsVersion::from_module(&def.module) == Some(version))
            .map(|def| def.name)
            .collect())
    }

    /// Names of FTS4 virtual tables.
    pub fn table_names_fts4(&self) -> Result<Vec<String>> {
        self.fts_table_names(FtsVersion::Fts4)
    }

    /// Names of FTS5 virtual tables.
    pub fn table_names_fts5(&self) -> Result<Vec<String>> {
        self.fts_table_names(FtsVersion::Fts5)
    }

    pub fn view_names(&self) -> Result<Vec<String>> {
        self.names_of_type("view")
    }

    pub fn tables(&self) -> Result<Vec<Table<'_>>> {
        Ok(self.table_names()?.into_iter().map(|name| self.table(name)).collect())
    }

    pub fn views(&self) -> Result<Vec<View<'_>>> {
        Ok(self.view_names()?.into_iter().map(|name| self.view(name)).collect())
    }

    /// Every trigger in the database.
    pub fn triggers(&self) -> Result<Vec<Trigger>> {
        self.query_map(
            "SELECT name, tbl_name, sql FROM sqlite_master WHERE type = 'trigger'",
            &[],
            |row| {
                Ok(Trigger {
                    name: row.get(0)?,
                    table: row.get(1)?,
                    sql: row.get(2)?,
                })
            },
        )
    }

    /// The full schema: every stored `CREATE` statement, each terminated
    /// with `;`, one per line.
    pub fn schema(&self) -> Result<String> {
        let sqls: Vec<String> = self.query_map(
            "SELECT sql FROM sqlite_master WHERE sql IS NOT NULL",
            &[],
            |row| row.get(0),
        )?;
        Ok(sqls.iter().map(|sql| format!("{sql};")).collect::<Vec<_>>().join("\n"))
    }

    pub(crate) fn object_exists(&self, kind: &str, name: &str) -> Result<bool> {
        Ok(self
            .query_scalar::<i64>(
                "SELECT 1 FROM sqlite_master WHERE type = ? AND name = ? COLLATE NOCASE",
                &[SqlValue::Text(kind.to_string()), SqlValue::Text(name.to_string())],
            )?
            .is_some())
    }

    pub(crate) fn stored_sql(&self, name: &str) -> Result<Option<String>> {
        self.query_scalar::<String>(
            "SELECT sql FROM sqlite_master WHERE name = ?",
            &[SqlValue::Text(name.to_string())],
        )
    }

    pub(crate) fn table_info(&self, name: &str) -> Result<Vec<Column>> {
        self.query_map(&format!("PRAGMA table_info({})", quote_identifier(name)), &[], |row| {
            Ok(Column {
                cid: row.get(0)?,
                name: row.get(1)?,
                declared_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                not_null: row.get::<_, i64>(3)? != 0,
                default_value: row.get(4)?,
                pk: row.get(5)?,
            })
        })
    }
}

impl Table<'_> {
    pub fn exists(&self) -> Result<bool> {
        self.db().object_exists("table", self.name())
    }

    pub(crate) fn require_exists(&self) -> Result<()> {
        if self.exists()? {
            Ok(())
        } else {
            Err(SqliteError::TableNotFound(self.name().to_string()))
        }
    }

    /// Columns in catalog order. Empty for a missing table.
    pub fn columns(&self) -> Result<Vec<Column>> {
        self.db().table_info(self.name())
    }

    /// Column names paired with their type affinity, in catalog order.
    pub fn columns_dict(&self) -> Result<Vec<(String, ColumnType)>> {
        Ok(self
            .columns()?
            .into_iter()
            .map(|c| {
                let column_type = c.column_type();
                (c.name, column_type)
            })
            .collect())
    }

    pub(crate) fn column_names(&self) -> Result<Vec<String>> {
        Ok(self.columns()?.into_iter().map(|c| c.name).collect())
    }

    /// Primary key columns in key order, or `["rowid"]` for rowid tables.
    pub fn pks(&self) -> Result<Vec<String>> {
        let mut pk_columns: Vec<Column> = self.columns()?.into_iter().filter(Column::is_pk).collect();
        if pk_columns.is_empty() {
            return Ok(vec!["rowid".to_string()]);
        }
        pk_columns.sort_by_key(|c| c.pk);
        Ok(pk_columns.into_iter().map(|c| c.name).collect())
    }

    /// Returns `true` if the table has no declared primary key.
    pub fn use_rowid(&self) -> Result<bool> {
        Ok(!self.columns()?.iter().any(Column::is_pk))
    }

    /// Foreign keys, sorted by column then referenced table.
    pub fn foreign_keys(&self) -> Result<Vec<ForeignKey>> {
        let raw: Vec<(String, String, Option<String>)> = self.db().query_map(
            &format!("PRAGMA foreign_key_list({})", self.quoted()),
            &[],
            |row| Ok((row.get(2)?, row.get(3)?, row.get(4)?)),
        )?;
        let mut keys = Vec::with_capacity(raw.len());
        for (other_table, column, other_column) in raw {
            let other_column = match other_column {
                Some(other_column) => other_column,
                None => self
                    .db()
                    .table(other_table.as_str())
                    .pks()?
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| "rowid".to_string()),
            };
            keys.push(ForeignKey {
                table: self.name().to_string(),
                column,
                other_table,
                other_column,
            });
        }
        keys.sort_by(|a, b| (&a.column, &a.other_table).cmp(&(&b.column, &b.other_table)));
        Ok(keys)
    }

    pub fn indexes(&self) -> Result<Vec<Index>> {
        let listed: Vec<(i64, String, bool, String, bool)> = self.db().query_map(
            &format!("PRAGMA index_list({})", self.quoted()),
            &[],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get::<_, i64>(2)? != 0,
                    row.get(3)?,
                    row.get::<_, i64>(4)? != 0,
                ))
            },
        )?;
        let mut indexes = Vec::with_capacity(listed.len());
        for (seq, name, unique, origin, partial) in listed {
            let columns: Vec<Option<String>> = self.db().query_map(
                &format!("PRAGMA index_info({})", quote_identifier(&name)),
                &[],
                |row| row.get(2),
            )?;
            indexes.push(Index {
                seq,
                name,
                unique,
                origin,
                partial,
                columns: columns.into_iter().flatten().collect(),
            });
        }
        Ok(indexes)
    }

    /// Indexes with `PRAGMA index_xinfo` detail, including auxiliary
    /// columns.
    pub fn xindexes(&self) -> Result<Vec<XIndex>> {
        let names: Vec<String> = self.db().query_map(
            &format!("PRAGMA index_list({})", self.quoted()),
            &[],
            |row| row.get(1),
        )?;
        let mut indexes = Vec::with_capacity(names.len());
        for name in names {
            let columns = self.db().query_map(
                &format!("PRAGMA index_xinfo({})", quote_identifier(&name)),
                &[],
                |row| {
                    Ok(XIndexColumn {
                        seqno: row.get(0)?,
                        cid: row.get(1)?,
                        name: row.get(2)?,
                        desc: row.get::<_, i64>(3)? != 0,
                        collation: row.get(4)?,
                        key: row.get::<_, i64>(5)? != 0,
                    })
                },
            )?;
            indexes.push(XIndex { name, columns });
        }
        Ok(indexes)
    }

    pub fn triggers(&self) -> Result<Vec<Trigger>> {
        self.db().query_map(
            "SELECT name, tbl_name, sql FROM sqlite_master WHERE type = 'trigger' AND tbl_name = ?",
            &[SqlValue::Text(self.name().to_string())],
            |row| {
                Ok(Trigger {
                    name: row.get(0)?,
                    table: row.get(1)?,
                    sql: row.get(2)?,
                })
            },
        )
    }

    /// The stored `CREATE TABLE` statement.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::TableNotFound`] for a missing table.
    pub fn schema(&self) -> Result<String> {
        self.db()
            .stored_sql(self.name())?
            .ok_or_else(|| SqliteError::TableNotFound(self.name().to_string()))
    }

    /// Returns `true` for a `STRICT` table.
    pub fn strict(&self) -> Result<bool> {
        Ok(self
            .db()
            .stored_sql(self.name())?
            .is_some_and(|sql| table_options(&sql).strict))
    }

    /// Columns that declare a default, with the default classified.
    pub fn default_values(&self) -> Result<Vec<(String, SqlDefault)>> {
        Ok(self
            .columns()?
            .into_iter()
            .filter_map(|c| {
                let default = c.default()?;
                Some((c.name, default))
            })
            .collect())
    }

    /// Number of rows. Uses the counts cache when its triggers are
    /// installed and it holds an entry for this table.
    pub fn count(&self) -> Result<i64> {
        if self.has_counts_triggers()? {
            if let Some(cached) = self.db().cached_count(self.name())? {
                return Ok(cached);
            }
        }
        self.count_where(None, &[])
    }

    /// Number of rows matching `where_clause`.
    pub fn count_where(&self, where_clause: Option<&str>, args: &[Value]) -> Result<i64> {
        let mut sql = format!("SELECT COUNT(*) FROM {}", self.quoted());
        if let Some(where_clause) = where_clause {
            sql.push_str(&format!(" WHERE {where_clause}"));
        }
        Ok(self
            .db()
            .query_scalar::<i64>(&sql, &convert::to_sql_all(args))?
            .unwrap_or(0))
    }

    /// Name of the FTS table indexing this one: `<table>_fts` if it is an
    /// FTS virtual table, otherwise the first FTS table whose `content`
    /// option names this table exactly.
    pub fn detect_fts(&self) -> Result<Option<String>> {
        Ok(self.detect_fts_def()?.map(|def| def.name))
    }

    pub(crate) fn detect_fts_def(&self) -> Result<Option<VirtualTableDef>> {
        let candidate = naming::fts_table_name(self.name());
        let mut defs: Vec<VirtualTableDef> =
            self.db().virtual_tables()?.into_iter().filter(VirtualTableDef::is_fts).collect();
        if let Some(pos) = defs.iter().position(|def| def.name == candidate) {
            return Ok(Some(defs.swap_remove(pos)));
        }
        Ok(defs
            .into_iter()
            .find(|def| def.option("content").as_deref() == Some(self.name())))
    }

    /// Engine version of the detected FTS table, if any.
    pub fn fts_version(&self) -> Result<Option<FtsVersion>> {
        Ok(self
            .detect_fts_def()?
            .and_then(|def| FtsVersion::from_module(&def.module)))
    }
}
