//! Record writing: insert, upsert and header + rows input.
//!
//! Writes create the table on first use, inferring column types from the
//! first chunk of records. Input is consumed lazily, one chunk at a time,
//! and each chunk runs in its own transaction (or savepoint when the
//! caller already has a transaction open).

use std::collections::HashMap;

use dyntable_core::{
    ColumnType, InputRow, Record, RowNormalizer, SqlDefault, Value, hash_record, quote_identifier, record,
    suggest_column_types, table_options,
};
use tracing::debug;

use crate::convert::{self, SqlValue};
use crate::create::CreateOptions;
use crate::error::{Result, SqliteError};
use crate::model::ForeignKeySpec;
use crate::relations::LookupOptions;
use crate::table::Table;

/// SQLite's default limit on bound parameters per statement.
const SQLITE_MAX_VARS: usize = 999;

/// Options for [`Table::insert_all`] and [`Table::upsert_all`].
///
/// The table-shaping options (`pk`, `foreign_keys`, `column_order`,
/// `not_null`, `defaults`, `columns`, `strict`) only apply when the write
/// creates the table.
#[derive(Debug, Clone, Default)]
pub struct InsertOptions {
    pub pk: Option<Vec<String>>,
    pub foreign_keys: Vec<ForeignKeySpec>,
    pub column_order: Vec<String>,
    pub not_null: Vec<String>,
    pub defaults: HashMap<String, SqlDefault>,
    /// Records per statement; the configured default when `None`.
    pub batch_size: Option<usize>,
    /// Column holding a SHA-256 hash of each record, used as the primary
    /// key.
    pub hash_id: Option<String>,
    /// Fields that take part in the hash. Implies `hash_id = "id"` when
    /// `hash_id` is unset.
    pub hash_id_columns: Option<Vec<String>>,
    /// Add missing columns instead of failing.
    pub alter: bool,
    /// `INSERT OR IGNORE`.
    pub ignore: bool,
    /// `INSERT OR REPLACE`.
    pub replace: bool,
    /// Delete existing rows before writing.
    pub truncate: bool,
    /// Column to lookup table; values are replaced by lookup ids.
    pub extracts: HashMap<String, String>,
    /// Column to SQL expression with a single `?`, e.g. `upper(?)`.
    pub conversions: HashMap<String, String>,
    /// Column type overrides for inference.
    pub columns: HashMap<String, ColumnType>,
    pub strict: Option<bool>,
    /// Run `ANALYZE` on the table afterwards.
    pub analyze: bool,
}

impl InsertOptions {
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

    pub fn hash_id(mut self, column: impl Into<String>) -> Self {
        self.hash_id = Some(column.into());
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn alter(mut self) -> Self {
        self.alter = true;
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

    pub fn truncate(mut self) -> Self {
        self.truncate = true;
        self
    }

    pub fn extract(mut self, column: impl Into<String>, lookup_table: impl Into<String>) -> Self {
        self.extracts.insert(column.into(), lookup_table.into());
        self
    }

    pub fn conversion(mut self, column: impl Into<String>, expression: impl Into<String>) -> Self {
        self.conversions.insert(column.into(), expression.into());
        self
    }

    pub fn column_type(mut self, column: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.insert(column.into(), column_type);
        self
    }

    pub fn foreign_key(mut self, spec: impl Into<ForeignKeySpec>) -> Self {
        self.foreign_keys.push(spec.into());
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

    fn hash_id_column(&self) -> Option<String> {
        self.hash_id
            .clone()
            .or_else(|| self.hash_id_columns.as_ref().map(|_| "id".to_string()))
    }

    fn placeholder(&self, column: &str) -> &str {
        self.conversions.get(column).map_or("?", String::as_str)
    }
}

impl<'a> Table<'a> {
    /// Inserts one record. See [`insert_all`](Self::insert_all).
    pub fn insert(&self, record: Record, options: &InsertOptions) -> Result<&Self> {
        self.insert_all(std::iter::once(record), options)
    }

    /// Inserts records, creating the table and missing columns as needed.
    ///
    /// # Errors
    ///
    /// - [`SqliteError::AlterError`] if both `replace` and `ignore` are set.
    /// - [`SqliteError::InvalidColumns`] if a record has a field the table
    ///   lacks and `alter` is not set. Chunks written before the failing
    ///   one stay committed.
    ///
    /// # Examples
    ///
    /// ```
    /// use dyntable_core::{record, Value};
    /// use dyntable_sqlite::{Database, InsertOptions};
    ///
    /// let db = Database::open_in_memory().unwrap();
    /// let dogs = db.table("dogs");
    /// dogs.insert_all(
    ///     vec![
    ///         record! { "id" => 1, "name" => "Cleo" },
    ///         record! { "id" => 2, "name" => "Pancakes", "age" => 3 },
    ///     ],
    ///     &InsertOptions::new().pk(["id"]),
    /// )
    /// .unwrap();
    /// assert_eq!(dogs.count().unwrap(), 2);
    /// assert_eq!(dogs.get(2).unwrap().get("age"), Some(&Value::Integer(3)));
    /// ```
    pub fn insert_all<I>(&self, records: I, options: &InsertOptions) -> Result<&Self>
    where
        I: IntoIterator<Item = Record>,
    {
        self.write_records(records.into_iter().map(Ok), options, false)
    }

    /// Upserts one record. See [`upsert_all`](Self::upsert_all).
    pub fn upsert(&self, record: Record, options: &InsertOptions) -> Result<&Self> {
        self.upsert_all(std::iter::once(record), options)
    }

    /// Inserts records, updating the supplied columns of rows whose primary
    /// key already exists. Columns a record does not mention keep their
    /// stored values.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::PrimaryKeyRequired`] when no primary key is
    /// given and the table does not already have one.
    pub fn upsert_all<I>(&self, records: I, options: &InsertOptions) -> Result<&Self>
    where
        I: IntoIterator<Item = Record>,
    {
        self.write_records(records.into_iter().map(Ok), options, true)
    }

    /// Inserts header + rows input: the first [`InputRow::Values`] item
    /// names the columns of the positional rows that follow.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::RowError`] for a malformed stream, after
    /// writing the chunks that preceded the bad row.
    pub fn insert_rows<I>(&self, rows: I, options: &InsertOptions) -> Result<&Self>
    where
        I: IntoIterator<Item = InputRow>,
    {
        let records = RowNormalizer::new(rows).map(|row| row.map_err(SqliteError::from));
        self.write_records(records, options, false)
    }

    fn write_records<I>(&self, records: I, options: &InsertOptions, upsert: bool) -> Result<&Self>
    where
        I: Iterator<Item = Result<Record>>,
    {
        if options.replace && options.ignore {
            return Err(SqliteError::AlterError(
                "use either replace or ignore, not both".into(),
            ));
        }
        if let Some((column, expression)) = options
            .conversions
            .iter()
            .find(|(_, expression)| expression.matches('?').count() != 1)
        {
            return Err(SqliteError::InvalidArgument(format!(
                "conversion for {column} must contain exactly one '?': {expression}"
            )));
        }
        let mut records = records;
        let first = match records.next() {
            Some(first) => first?,
            None => return Ok(self),
        };
        let hash_id = options.hash_id_column();
        let width = first.len() + usize::from(hash_id.as_ref().is_some_and(|h| !first.contains_key(h)));
        let batch_size = options
            .batch_size
            .unwrap_or(self.db().config().batch_size)
            .min(SQLITE_MAX_VARS / width.max(1))
            .max(1);

        let upsert_pks = if upsert {
            Some(self.upsert_pks(options, hash_id.as_deref())?)
        } else {
            None
        };
        if options.truncate && self.exists()? {
            self.db().execute(&format!("DELETE FROM {}", self.quoted()), &[])?;
        }

        let mut records = std::iter::once(Ok(first)).chain(records);
        let mut columns: Vec<String> = Vec::new();
        let mut written = 0usize;
        let mut last: Option<(Record, usize)> = None;
        loop {
            let mut chunk = Vec::with_capacity(batch_size);
            for record in records.by_ref().take(batch_size) {
                chunk.push(self.prepare_record(record?, options, hash_id.as_deref())?);
            }
            if chunk.is_empty() {
                break;
            }
            if !self.exists()? {
                self.create_for(&chunk, options, hash_id.as_deref())?;
            }
            for record in &chunk {
                for key in record.keys() {
                    if !columns.iter().any(|c| c == key) {
                        columns.push(key.to_string());
                    }
                }
            }
            self.ensure_columns(&columns, &chunk, options.alter)?;

            let changed = self.db().transaction(|_| match &upsert_pks {
                Some(pks) => chunk
                    .iter()
                    .map(|record| self.upsert_record(record, pks, options))
                    .sum::<Result<usize>>(),
                None => self.insert_chunk(&columns, &chunk, options),
            })?;
            written += chunk.len();
            debug!(table = %self.name(), records = chunk.len(), changed, "Wrote chunk");
            last = if written == 1 { chunk.pop().map(|record| (record, changed)) } else { None };
        }

        if let Some((record, changed)) = last {
            self.record_last(&record, options, hash_id.as_deref(), upsert, changed)?;
        }
        if options.analyze {
            self.db().analyze(Some(self.name()))?;
        }
        Ok(self)
    }

    /// Applies the hash id and extracts to one record.
    fn prepare_record(&self, record: Record, options: &InsertOptions, hash_id: Option<&str>) -> Result<Record> {
        let mut record = match hash_id {
            Some(hash_id) => {
                let hash = hash_record(&record, options.hash_id_columns.as_deref());
                let mut hashed = Record::with_capacity(record.len() + 1);
                hashed.insert(hash_id, hash);
                for (key, value) in record.iter().filter(|(key, _)| key != hash_id) {
                    hashed.insert(key.clone(), value.clone());
                }
                hashed
            }
            None => record,
        };
        for (column, lookup_table) in &options.extracts {
            let Some(value) = record.get(column).filter(|v| !v.is_null()).cloned() else {
                continue;
            };
            let id = self
                .db()
                .table(lookup_table.as_str())
                .lookup(record! { "value" => value }, &LookupOptions::default())?;
            record.insert(column.clone(), id);
        }
        Ok(record)
    }

    fn create_for(&self, chunk: &[Record], options: &InsertOptions, hash_id: Option<&str>) -> Result<()> {
        let mut types = suggest_column_types(chunk);
        for (name, column_type) in types.iter_mut() {
            if let Some(forced) = options.columns.get(name) {
                *column_type = *forced;
            }
        }
        for (name, forced) in &options.columns {
            if !types.iter().any(|(existing, _)| existing == name) {
                types.push((name.clone(), *forced));
            }
        }
        if types.is_empty() && options.pk.is_none() && hash_id.is_none() {
            return Err(SqliteError::InvalidColumns(format!(
                "cannot create {} without any columns",
                self.name()
            )));
        }
        let create = CreateOptions {
            pk: options.pk.clone(),
            foreign_keys: options.foreign_keys.clone(),
            column_order: options.column_order.clone(),
            not_null: options.not_null.clone(),
            defaults: options.defaults.clone(),
            hash_id: hash_id.map(String::from),
            extracts: options.extracts.clone(),
            strict: options.strict,
            ..Default::default()
        };
        self.create(&types, &create)?;
        Ok(())
    }

    fn ensure_columns(&self, columns: &[String], chunk: &[Record], alter: bool) -> Result<()> {
        let existing: Vec<String> = self.column_names()?.iter().map(|c| c.to_lowercase()).collect();
        let missing: Vec<&str> = columns
            .iter()
            .filter(|c| !existing.contains(&c.to_lowercase()))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        if !alter {
            return Err(SqliteError::InvalidColumns(format!(
                "table {} has no column(s) {}",
                self.name(),
                missing.join(", ")
            )));
        }
        self.add_missing_columns(chunk)?;
        Ok(())
    }

    fn insert_chunk(&self, columns: &[String], chunk: &[Record], options: &InsertOptions) -> Result<usize> {
        let verb = if options.replace {
            "INSERT OR REPLACE"
        } else if options.ignore {
            "INSERT OR IGNORE"
        } else {
            "INSERT"
        };
        if columns.is_empty() {
            let sql = format!("{verb} INTO {} DEFAULT VALUES", self.quoted());
            return chunk.iter().map(|_| self.db().execute(&sql, &[])).sum();
        }
        let row = format!(
            "({})",
            columns
                .iter()
                .map(|c| options.placeholder(c))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let sql = format!(
            "{verb} INTO {} ({}) VALUES {}",
            self.quoted(),
            columns
                .iter()
                .map(|c| quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", "),
            vec![row; chunk.len()].join(", ")
        );
        let params: Vec<SqlValue> = chunk
            .iter()
            .flat_map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(c).map_or(SqlValue::Null, convert::to_sql))
            })
            .collect();
        self.db().execute(&sql, &params)
    }

    fn upsert_pks(&self, options: &InsertOptions, hash_id: Option<&str>) -> Result<Vec<String>> {
        if let Some(pk) = &options.pk {
            return Ok(pk.clone());
        }
        if let Some(hash_id) = hash_id {
            return Ok(vec![hash_id.to_string()]);
        }
        if self.exists()? && !self.use_rowid()? {
            return self.pks();
        }
        Err(SqliteError::PrimaryKeyRequired(format!(
            "upsert into {} needs a primary key",
            self.name()
        )))
    }

    fn upsert_record(&self, record: &Record, pks: &[String], options: &InsertOptions) -> Result<usize> {
        if record.is_empty() {
            return Ok(0);
        }
        let columns: Vec<&str> = record.keys().collect();
        let updates: Vec<String> = columns
            .iter()
            .filter(|c| !pks.iter().any(|pk| pk == *c))
            .map(|c| {
                let quoted = quote_identifier(c);
                format!("{quoted} = excluded.{quoted}")
            })
            .collect();
        let action = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {action}",
            self.quoted(),
            columns.iter().map(|c| quote_identifier(c)).collect::<Vec<_>>().join(", "),
            columns.iter().map(|c| options.placeholder(c)).collect::<Vec<_>>().join(", "),
            pks.iter().map(|pk| quote_identifier(pk)).collect::<Vec<_>>().join(", "),
        );
        self.db().execute(&sql, &convert::to_sql_all(record.values()))
    }

    /// Sets `last_rowid` and `last_pk` after a single-record write.
    fn record_last(
        &self,
        record: &Record,
        options: &InsertOptions,
        hash_id: Option<&str>,
        upsert: bool,
        changed: usize,
    ) -> Result<()> {
        let pks = match (&options.pk, hash_id) {
            (Some(pk), _) => pk.clone(),
            (None, Some(hash_id)) => vec![hash_id.to_string()],
            (None, None) => self.pks()?,
        };
        let has_rowid = !table_options(&self.schema()?).without_rowid;
        let inserted_rowid = (!upsert && changed > 0).then(|| self.db().last_insert_rowid());

        if pks.len() == 1 && pks[0] == "rowid" {
            self.set_last(inserted_rowid, inserted_rowid.map(Value::Integer));
            return Ok(());
        }

        let supplied: Option<Vec<Value>> = pks.iter().map(|pk| record.get(pk).cloned()).collect();
        let pk_value = match supplied {
            Some(mut values) if values.len() == 1 => Some(values.remove(0)),
            Some(values) => Some(Value::List(values)),
            None => match (inserted_rowid, pks.as_slice()) {
                (Some(rowid), [only]) if has_rowid => self
                    .db()
                    .query(
                        &format!("SELECT {} FROM {} WHERE rowid = ?", quote_identifier(only), self.quoted()),
                        &[SqlValue::Integer(rowid)],
                    )?
                    .into_iter()
                    .next()
                    .and_then(|row| row.values().next().cloned()),
                _ => None,
            },
        };
        let rowid = match (&inserted_rowid, &pk_value) {
            (Some(rowid), _) => Some(*rowid),
            (None, Some(pk)) if has_rowid => {
                let (clause, params) = self.pk_clause(pk)?;
                self.db().query_scalar::<i64>(
                    &format!("SELECT rowid FROM {} WHERE {clause}", self.quoted()),
                    &params,
                )?
            }
            _ => None,
        };
        self.set_last(rowid, pk_value);
        Ok(())
    }
}
