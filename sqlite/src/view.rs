//! Views.

use dyntable_core::{Record, quote_identifier};
use tracing::info;

use crate::convert;
use crate::database::Database;
use crate::error::{Result, SqliteError};
use crate::model::Column;
use crate::table::RowsQuery;

/// A handle on one view, which need not exist yet.
pub struct View<'a> {
    db: &'a Database,
    name: String,
}

impl<'a> View<'a> {
    pub(crate) fn new(db: &'a Database, name: impl Into<String>) -> Self {
        Self {
            db,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exists(&self) -> Result<bool> {
        self.db.object_exists("view", &self.name)
    }

    fn require_exists(&self) -> Result<()> {
        if self.exists()? {
            Ok(())
        } else {
            Err(SqliteError::ViewNotFound(self.name.clone()))
        }
    }

    pub fn columns(&self) -> Result<Vec<Column>> {
        self.require_exists()?;
        self.db.table_info(&self.name)
    }

    pub fn count(&self) -> Result<i64> {
        self.require_exists()?;
        Ok(self
            .db
            .query_scalar::<i64>(&format!("SELECT COUNT(*) FROM {}", quote_identifier(&self.name)), &[])?
            .unwrap_or(0))
    }

    pub fn rows(&self) -> Result<Vec<Record>> {
        self.rows_where(&RowsQuery::default())
    }

    pub fn rows_where(&self, query: &RowsQuery) -> Result<Vec<Record>> {
        self.require_exists()?;
        let sql = query.to_sql(&quote_identifier(&self.name));
        self.db.query(&sql, &convert::to_sql_all(&query.args))
    }

    /// The stored `CREATE VIEW` statement.
    pub fn schema(&self) -> Result<String> {
        self.require_exists()?;
        self.db
            .stored_sql(&self.name)?
            .ok_or_else(|| SqliteError::ViewNotFound(self.name.clone()))
    }

    /// Drops the view. With `ignore`, a missing view is not an error.
    pub fn drop(&self, ignore: bool) -> Result<()> {
        if !self.exists()? {
            if ignore {
                return Ok(());
            }
            return Err(SqliteError::ViewNotFound(self.name.clone()));
        }
        self.db
            .execute(&format!("DROP VIEW {}", quote_identifier(&self.name)), &[])?;
        info!(view = %self.name, "Dropped view");
        Ok(())
    }
}

impl std::fmt::Debug for View<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View").field("name", &self.name).finish()
    }
}

impl Database {
    /// Creates a view over `sql`.
    ///
    /// If the view exists, `ignore` leaves it alone and `replace` drops
    /// and recreates it.
    ///
    /// # Errors
    ///
    /// - [`SqliteError::AlterError`] if both `ignore` and `replace` are set.
    /// - [`SqliteError::TableExists`] if the view exists and neither
    ///   option is set.
    ///
    /// # Examples
    ///
    /// ```
    /// use dyntable_sqlite::Database;
    ///
    /// let db = Database::open_in_memory().unwrap();
    /// db.execute_script("CREATE TABLE dogs (name TEXT, age INTEGER); INSERT INTO dogs VALUES ('Cleo', 4);")
    ///     .unwrap();
    /// let old = db.create_view("old_dogs", "SELECT * FROM dogs WHERE age > 3", false, false).unwrap();
    /// assert_eq!(old.count().unwrap(), 1);
    /// ```
    pub fn create_view(&self, name: &str, sql: &str, ignore: bool, replace: bool) -> Result<View<'_>> {
        if ignore && replace {
            return Err(SqliteError::AlterError("use either replace or ignore, not both".into()));
        }
        let view = self.view(name);
        if view.exists()? {
            if ignore {
                return Ok(view);
            }
            if !replace {
                return Err(SqliteError::TableExists(name.to_string()));
            }
        }
        self.transaction(|db| {
            if replace {
                db.execute(&format!("DROP VIEW IF EXISTS {}", quote_identifier(name)), &[])?;
            }
            db.execute(&format!("CREATE VIEW {} AS {sql}", quote_identifier(name)), &[])
        })?;
        info!(view = name, "Created view");
        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dyntable_core::{Value, record};

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.execute_script(
            "CREATE TABLE dogs (name TEXT, age INTEGER);
             INSERT INTO dogs VALUES ('Cleo', 4), ('Pancakes', 2), ('Pepper', 7);",
        )
        .unwrap();
        db
    }

    #[test]
    fn test_create_and_read_view() {
        let db = db();
        let view = db
            .create_view("old", "SELECT name FROM dogs WHERE age > 3", false, false)
            .unwrap();
        assert!(view.exists().unwrap());
        assert_eq!(db.view_names().unwrap(), ["old"]);
        assert_eq!(view.count().unwrap(), 2);
        assert_eq!(view.columns().unwrap()[0].name, "name");
        assert_eq!(
            view.rows_where(&RowsQuery::new().order_by("name DESC").limit(1)).unwrap(),
            vec![record! { "name" => "Pepper" }]
        );
        assert!(view.schema().unwrap().starts_with("CREATE VIEW"));
        assert_eq!(view.rows().unwrap().len(), 2);
    }

    #[test]
    fn test_existing_view_options() {
        let db = db();
        db.create_view("v", "SELECT 1 AS one", false, false).unwrap();
        assert!(matches!(
            db.create_view("v", "SELECT 2 AS two", false, false),
            Err(SqliteError::TableExists(_))
        ));
        db.create_view("v", "SELECT 2 AS two", true, false).unwrap();
        assert_eq!(db.view("v").rows().unwrap(), vec![record! { "one" => 1 }]);
        db.create_view("v", "SELECT 2 AS two", false, true).unwrap();
        assert_eq!(db.view("v").rows().unwrap()[0].get("two"), Some(&Value::Integer(2)));
        assert!(matches!(
            db.create_view("v", "SELECT 3", true, true),
            Err(SqliteError::AlterError(_))
        ));
    }

    #[test]
    fn test_missing_view() {
        let db = db();
        let view = db.view("nope");
        assert!(!view.exists().unwrap());
        assert!(matches!(view.count(), Err(SqliteError::ViewNotFound(_))));
        assert!(matches!(view.schema(), Err(SqliteError::ViewNotFound(_))));
        assert!(matches!(view.drop(false), Err(SqliteError::ViewNotFound(_))));
        view.drop(true).unwrap();
        db.create_view("tmp", "SELECT 1", false, false).unwrap().drop(false).unwrap();
        assert!(db.view_names().unwrap().is_empty());
    }
}
