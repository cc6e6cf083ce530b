//! Table handles and row access.
//!
//! A [`Table`] is a name bound to a [`Database`]; it holds no catalog
//! state of its own. Introspection, creation, writing, transforms, FTS and
//! relationships are implemented in their own modules as further `impl`
//! blocks on this type.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use dyntable_core::{Record, Value, quote_identifier};
use tracing::debug;

use crate::convert::{self, SqlValue};
use crate::database::Database;
use crate::error::{Result, SqliteError};

/// A handle on one table, which need not exist yet.
pub struct Table<'a> {
    db: &'a Database,
    name: String,
    last_rowid: Cell<Option<i64>>,
    last_pk: RefCell<Option<Value>>,
}

impl<'a> Table<'a> {
    pub(crate) fn new(db: &'a Database, name: impl Into<String>) -> Self {
        Self {
            db,
            name: name.into(),
            last_rowid: Cell::new(None),
            last_pk: RefCell::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn db(&self) -> &'a Database {
        self.db
    }

    /// Rowid of the last single-record write through this handle.
    pub fn last_rowid(&self) -> Option<i64> {
        self.last_rowid.get()
    }

    /// Primary key of the last single-record write through this handle:
    /// the pk value, a [`Value::List`] for compound keys, or the rowid.
    pub fn last_pk(&self) -> Option<Value> {
        self.last_pk.borrow().clone()
    }

    pub(crate) fn set_last(&self, rowid: Option<i64>, pk: Option<Value>) {
        self.last_rowid.set(rowid);
        self.last_pk.replace(pk);
    }

    pub(crate) fn quoted(&self) -> String {
        quote_identifier(&self.name)
    }

    /// Builds `"a" = ? AND "b" = ?` for a primary key value.
    pub(crate) fn pk_clause(&self, pk: &Value) -> Result<(String, Vec<SqlValue>)> {
        let pks = self.pks()?;
        let values: Vec<Value> = match pk {
            Value::List(items) => items.clone(),
            other => vec![other.clone()],
        };
        if values.len() != pks.len() {
            return Err(SqliteError::NotFound(format!(
                "{}: expected {} primary key value(s), got {}",
                self.name,
                pks.len(),
                values.len()
            )));
        }
        let clause = pks
            .iter()
            .map(|pk| format!("{} = ?", quote_identifier(pk)))
            .collect::<Vec<_>>()
            .join(" AND ");
        Ok((clause, convert::to_sql_all(&values)))
    }

    /// Fetches one row by primary key (or rowid for rowid tables).
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::NotFound`] if no row matches or the number of
    /// key values does not match the primary key.
    pub fn get(&self, pk: impl Into<Value>) -> Result<Record> {
        let pk = pk.into();
        let (clause, params) = self.pk_clause(&pk)?;
        let sql = format!("SELECT * FROM {} WHERE {clause}", self.quoted());
        self.db
            .query(&sql, &params)?
            .into_iter()
            .next()
            .ok_or_else(|| SqliteError::NotFound(format!("{}: no row with primary key {pk}", self.name)))
    }

    /// Every row, in storage order.
    pub fn rows(&self) -> Result<Vec<Record>> {
        self.rows_where(&RowsQuery::default())
    }

    /// Rows matching a query. Missing tables yield no rows.
    pub fn rows_where(&self, query: &RowsQuery) -> Result<Vec<Record>> {
        if !self.exists()? {
            return Ok(Vec::new());
        }
        let sql = query.to_sql(&self.quoted());
        self.db.query(&sql, &convert::to_sql_all(&query.args))
    }

    /// Rows paired with their primary key. Rowid tables select the rowid
    /// alongside the columns and key on it.
    pub fn pks_and_rows_where(&self, query: &RowsQuery) -> Result<Vec<(Value, Record)>> {
        if !self.exists()? {
            return Ok(Vec::new());
        }
        let mut column_names: Vec<String> = self.columns()?.into_iter().map(|c| c.name).collect();
        let pks = self.pks()?;
        if self.use_rowid()? {
            column_names.insert(0, "rowid".to_string());
        }
        let select = column_names
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let query = RowsQuery {
            select: Some(select),
            ..query.clone()
        };
        let rows = self.rows_where(&query)?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let mut key: Vec<Value> = pks
                    .iter()
                    .map(|pk| row.get(pk).cloned().unwrap_or_default())
                    .collect();
                let key = if key.len() == 1 { key.remove(0) } else { Value::List(key) };
                (key, row)
            })
            .collect())
    }

    /// Updates one row by primary key.
    ///
    /// With `alter`, columns missing from the table are added first.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::NotFound`] if the row does not exist.
    pub fn update(&self, pk: impl Into<Value>, updates: Record, options: UpdateOptions) -> Result<&Self> {
        let pk = pk.into();
        self.get(pk.clone())?;
        if !updates.is_empty() {
            if options.alter {
                self.add_missing_columns(std::slice::from_ref(&updates))?;
            }
            let assignments = updates
                .keys()
                .map(|column| {
                    let placeholder = options.conversions.get(column).map_or("?", String::as_str);
                    format!("{} = {placeholder}", quote_identifier(column))
                })
                .collect::<Vec<_>>()
                .join(", ");
            let (clause, pk_params) = self.pk_clause(&pk)?;
            let mut params = convert::to_sql_all(updates.values());
            params.extend(pk_params);
            let sql = format!("UPDATE {} SET {assignments} WHERE {clause}", self.quoted());
            let changed = self.db.execute(&sql, &params)?;
            debug!(table = %self.name, changed, "Updated row");
        }
        self.set_last(None, Some(pk));
        Ok(self)
    }

    /// Deletes one row by primary key.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::NotFound`] if the row does not exist.
    pub fn delete(&self, pk: impl Into<Value>) -> Result<&Self> {
        let pk = pk.into();
        self.get(pk.clone())?;
        let (clause, params) = self.pk_clause(&pk)?;
        self.db
            .execute(&format!("DELETE FROM {} WHERE {clause}", self.quoted()), &params)?;
        Ok(self)
    }

    /// Deletes every row matching `where_clause` (all rows when `None`).
    /// A missing table is a no-op.
    pub fn delete_where(&self, where_clause: Option<&str>, args: &[Value], analyze: bool) -> Result<&Self> {
        if !self.exists()? {
            return Ok(self);
        }
        let mut sql = format!("DELETE FROM {}", self.quoted());
        if let Some(where_clause) = where_clause {
            sql.push_str(&format!(" WHERE {where_clause}"));
        }
        self.db.execute(&sql, &convert::to_sql_all(args))?;
        if analyze {
            self.db.analyze(Some(&self.name))?;
        }
        Ok(self)
    }
}

impl std::fmt::Debug for Table<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table").field("name", &self.name).finish()
    }
}

/// Options for [`Table::update`].
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub alter: bool,
    /// Column to SQL expression containing `?`, e.g. `upper(?)`.
    pub conversions: HashMap<String, String>,
}

/// A `SELECT` over one table or view.
///
/// # Examples
///
/// ```
/// use dyntable_sqlite::RowsQuery;
///
/// let query = RowsQuery::new()
///     .filter("age > ?", [3])
///     .order_by("name")
///     .limit(10);
/// assert_eq!(
///     query.to_sql("\"dogs\""),
///     "SELECT * FROM \"dogs\" WHERE age > ? ORDER BY name LIMIT 10"
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowsQuery {
    pub where_clause: Option<String>,
    pub args: Vec<Value>,
    pub order_by: Option<String>,
    /// Select list, `*` when `None`.
    pub select: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl RowsQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter<I, V>(mut self, where_clause: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.where_clause = Some(where_clause.into());
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn select(mut self, select: impl Into<String>) -> Self {
        self.select = Some(select.into());
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

    /// Renders the statement against an already-quoted source name.
    pub fn to_sql(&self, source: &str) -> String {
        let mut sql = format!("SELECT {} FROM {source}", self.select.as_deref().unwrap_or("*"));
        if let Some(where_clause) = &self.where_clause {
            sql.push_str(&format!(" WHERE {where_clause}"));
        }
        if let Some(order_by) = &self.order_by {
            sql.push_str(&format!(" ORDER BY {order_by}"));
        }
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dyntable_core::record;

    fn dogs(db: &Database) -> Table<'_> {
        db.execute_script(
            "CREATE TABLE dogs (id INTEGER PRIMARY KEY, name TEXT, age INTEGER);
             INSERT INTO dogs VALUES (1, 'Cleo', 4), (2, 'Pancakes', 2), (3, 'Pepper', 7);",
        )
        .unwrap();
        db.table("dogs")
    }

    #[test]
    fn test_offset_without_limit() {
        assert_eq!(RowsQuery::new().offset(2).to_sql("t"), "SELECT * FROM t LIMIT -1 OFFSET 2");
    }

    #[test]
    fn test_get_and_not_found() {
        let db = Database::open_in_memory().unwrap();
        let table = dogs(&db);
        assert_eq!(table.get(1).unwrap().get("name"), Some(&Value::from("Cleo")));
        assert!(matches!(table.get(99), Err(SqliteError::NotFound(_))));
        assert!(matches!(
            table.get(vec![Value::from(1), Value::from(2)]),
            Err(SqliteError::NotFound(_))
        ));
    }

    #[test]
    fn test_rows_where() {
        let db = Database::open_in_memory().unwrap();
        let table = dogs(&db);
        let rows = table
            .rows_where(&RowsQuery::new().filter("age > ?", [3]).order_by("age DESC").select("name"))
            .unwrap();
        assert_eq!(rows, vec![record! { "name" => "Pepper" }, record! { "name" => "Cleo" }]);
        assert!(db.table("missing").rows().unwrap().is_empty());
    }

    #[test]
    fn test_pks_and_rows_where_on_rowid_table() {
        let db = Database::open_in_memory().unwrap();
        db.execute_script("CREATE TABLE notes (body TEXT); INSERT INTO notes VALUES ('a'), ('b');")
            .unwrap();
        let pairs = db.table("notes").pks_and_rows_where(&RowsQuery::default()).unwrap();
        assert_eq!(pairs[1].0, Value::Integer(2));
        assert_eq!(pairs[1].1, record! { "rowid" => 2, "body" => "b" });
    }

    #[test]
    fn test_update_and_delete() {
        let db = Database::open_in_memory().unwrap();
        let table = dogs(&db);
        let mut conversions = HashMap::new();
        conversions.insert("name".to_string(), "upper(?)".to_string());
        table
            .update(
                1,
                record! { "name" => "cleo", "color" => "black" },
                UpdateOptions {
                    alter: true,
                    conversions,
                },
            )
            .unwrap();
        let row = table.get(1).unwrap();
        assert_eq!(row.get("name"), Some(&Value::from("CLEO")));
        assert_eq!(row.get("color"), Some(&Value::from("black")));
        assert_eq!(table.last_pk(), Some(Value::Integer(1)));

        assert!(matches!(
            table.update(42, record! { "age" => 1 }, UpdateOptions::default()),
            Err(SqliteError::NotFound(_))
        ));

        table.delete(2).unwrap();
        assert!(matches!(table.delete(2), Err(SqliteError::NotFound(_))));
        table.delete_where(Some("age > ?"), &[Value::from(5)], false).unwrap();
        assert_eq!(table.count().unwrap(), 1);
    }
}
