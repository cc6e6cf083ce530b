//! Trigger-maintained row counts.
//!
//! `_counts` holds one row per tracked table; an insert trigger and a
//! delete trigger on each tracked table keep it current, so
//! [`Table::count`] can skip the full scan.

use std::collections::BTreeMap;

use dyntable_core::naming::{self, COUNTS_TABLE};
use dyntable_core::{quote_identifier, quote_literal};
use tracing::info;

use crate::convert::SqlValue;
use crate::database::Database;
use crate::error::Result;
use crate::table::Table;

impl Database {
    fn ensure_counts_table(&self) -> Result<()> {
        self.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (\"table\" TEXT PRIMARY KEY, \"count\" INTEGER DEFAULT 0)",
                quote_identifier(COUNTS_TABLE)
            ),
            &[],
        )?;
        Ok(())
    }

    /// Tables eligible for counting: ordinary user tables, excluding
    /// virtual tables, their shadow tables and `_counts` itself.
    fn countable_tables(&self) -> Result<Vec<String>> {
        let virtual_names: Vec<String> = self.virtual_tables()?.into_iter().map(|def| def.name).collect();
        Ok(self
            .table_names()?
            .into_iter()
            .filter(|name| name != COUNTS_TABLE)
            .filter(|name| {
                !virtual_names
                    .iter()
                    .any(|v| name == v || name.starts_with(&format!("{v}_")))
            })
            .collect())
    }

    /// Installs counts triggers on every eligible table.
    pub fn enable_counts(&self) -> Result<()> {
        for name in self.countable_tables()? {
            self.table(name).enable_counts()?;
        }
        Ok(())
    }

    /// Cached counts, optionally limited to `tables`. Empty when the
    /// counts table does not exist.
    pub fn cached_counts(&self, tables: Option<&[&str]>) -> Result<BTreeMap<String, i64>> {
        if !self.object_exists("table", COUNTS_TABLE)? {
            return Ok(BTreeMap::new());
        }
        let rows: Vec<(String, i64)> = self.query_map(
            &format!("SELECT \"table\", \"count\" FROM {}", quote_identifier(COUNTS_TABLE)),
            &[],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(rows
            .into_iter()
            .filter(|(table, _)| tables.is_none_or(|wanted| wanted.contains(&table.as_str())))
            .collect())
    }

    pub(crate) fn cached_count(&self, table: &str) -> Result<Option<i64>> {
        if !self.object_exists("table", COUNTS_TABLE)? {
            return Ok(None);
        }
        self.query_scalar(
            &format!(
                "SELECT \"count\" FROM {} WHERE \"table\" = ?",
                quote_identifier(COUNTS_TABLE)
            ),
            &[SqlValue::Text(table.to_string())],
        )
    }

    /// Recomputes the cached count of every table that has counts
    /// triggers.
    pub fn reset_counts(&self) -> Result<()> {
        let mut tracked = Vec::new();
        for name in self.countable_tables()? {
            if self.table(name.as_str()).has_counts_triggers()? {
                tracked.push(name);
            }
        }
        self.ensure_counts_table()?;
        self.transaction(|db| {
            db.execute(&format!("DELETE FROM {}", quote_identifier(COUNTS_TABLE)), &[])?;
            for name in &tracked {
                db.table(name.as_str()).store_current_count()?;
            }
            Ok(())
        })?;
        info!(tables = tracked.len(), "Reset cached counts");
        Ok(())
    }
}

impl Table<'_> {
    /// Installs the counts triggers and seeds the cached count.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::TableNotFound`](crate::SqliteError::TableNotFound)
    /// for a missing table.
    pub fn enable_counts(&self) -> Result<&Self> {
        self.require_exists()?;
        self.db().ensure_counts_table()?;
        let [insert_trigger, delete_trigger] = naming::counts_trigger_names(self.name());
        let counts = quote_identifier(COUNTS_TABLE);
        let literal = quote_literal(self.name());
        let trigger = |name: &str, event: &str, delta: &str| {
            format!(
                "CREATE TRIGGER IF NOT EXISTS {name} AFTER {event} ON {table}\n\
                 BEGIN\n    \
                 INSERT OR REPLACE INTO {counts}\n    \
                 VALUES ({literal}, COALESCE((SELECT \"count\" FROM {counts} WHERE \"table\" = {literal}), 0) {delta});\n\
                 END",
                name = quote_identifier(name),
                table = self.quoted(),
            )
        };
        self.db().transaction(|db| {
            db.execute(&trigger(&insert_trigger, "INSERT", "+ 1"), &[])?;
            db.execute(&trigger(&delete_trigger, "DELETE", "- 1"), &[])?;
            self.store_current_count()
        })?;
        info!(table = %self.name(), "Enabled counts cache");
        Ok(self)
    }

    fn store_current_count(&self) -> Result<()> {
        self.db().execute(
            &format!(
                "INSERT OR REPLACE INTO {} (\"table\", \"count\") VALUES (?, (SELECT COUNT(*) FROM {}))",
                quote_identifier(COUNTS_TABLE),
                self.quoted()
            ),
            &[SqlValue::Text(self.name().to_string())],
        )?;
        Ok(())
    }

    /// Returns `true` if both counts triggers exist on this table.
    pub fn has_counts_triggers(&self) -> Result<bool> {
        let names: Vec<String> = self.triggers()?.into_iter().map(|t| t.name).collect();
        Ok(naming::counts_trigger_names(self.name())
            .iter()
            .all(|wanted| names.contains(wanted)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_table() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.execute_script("CREATE TABLE t (id INTEGER PRIMARY KEY); INSERT INTO t VALUES (1), (2);")
            .unwrap();
        db
    }

    #[test]
    fn test_enable_counts_tracks_inserts_and_deletes() {
        let db = db_with_table();
        let table = db.table("t");
        table.enable_counts().unwrap();
        assert!(table.has_counts_triggers().unwrap());
        assert_eq!(db.cached_counts(None).unwrap().get("t"), Some(&2));

        db.execute_script("INSERT INTO t VALUES (3); DELETE FROM t WHERE id = 1;").unwrap();
        db.execute_script("INSERT INTO t VALUES (4)").unwrap();
        assert_eq!(table.count().unwrap(), 3);
    }

    #[test]
    fn test_count_falls_back_without_triggers() {
        let db = db_with_table();
        assert!(!db.table("t").has_counts_triggers().unwrap());
        assert!(db.cached_counts(None).unwrap().is_empty());
        assert_eq!(db.table("t").count().unwrap(), 2);
    }

    #[test]
    fn test_reset_counts_repairs_drift() {
        let db = db_with_table();
        db.enable_counts().unwrap();
        db.execute_script("UPDATE _counts SET count = 100").unwrap();
        assert_eq!(db.table("t").count().unwrap(), 100);
        db.reset_counts().unwrap();
        assert_eq!(db.table("t").count().unwrap(), 2);
        assert_eq!(db.cached_counts(Some(&["t"])).unwrap().len(), 1);
    }

    #[test]
    fn test_reset_counts_skips_partially_tracked_tables() {
        let db = db_with_table();
        db.execute_script("CREATE TABLE u (id INTEGER PRIMARY KEY)").unwrap();
        db.table("t").enable_counts().unwrap();
        db.table("u").enable_counts().unwrap();
        db.execute(&format!("DROP TRIGGER \"{}\"", naming::counts_trigger_names("u")[0]), &[])
            .unwrap();
        db.reset_counts().unwrap();
        let counts = db.cached_counts(None).unwrap();
        assert_eq!(counts.get("t"), Some(&2));
        assert_eq!(counts.get("u"), None);
    }
}
