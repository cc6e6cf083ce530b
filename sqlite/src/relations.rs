//! Lookup tables, many-to-many links and column extraction.

use std::collections::HashMap;

use dyntable_core::{ColumnType, Record, SqlDefault, Value, naming, quote_identifier, record};
use tracing::info;

use crate::convert;
use crate::create::{CreateOptions, IndexOptions};
use crate::database::Database;
use crate::error::{Result, SqliteError};
use crate::insert::InsertOptions;
use crate::model::{ForeignKeySpec, IndexColumn};
use crate::table::Table;
use crate::transform::TransformOptions;

/// Options for [`Table::lookup`]. The shaping options apply when the
/// lookup creates the table.
#[derive(Debug, Clone, Default)]
pub struct LookupOptions {
    /// Stored with a newly inserted row; not part of the key.
    pub extra_values: Record,
    /// Defaults to `id`.
    pub pk: Option<String>,
    pub columns: HashMap<String, ColumnType>,
    pub not_null: Vec<String>,
    pub defaults: HashMap<String, SqlDefault>,
    pub foreign_keys: Vec<ForeignKeySpec>,
    pub strict: Option<bool>,
}

/// The other side of a many-to-many link.
#[derive(Debug, Clone, PartialEq)]
pub enum M2mTarget {
    /// Rows inserted (or replaced) in the other table.
    Records(Vec<Record>),
    /// Key values found or created with [`Table::lookup`].
    Lookup(Record),
}

impl From<Record> for M2mTarget {
    fn from(record: Record) -> Self {
        M2mTarget::Records(vec![record])
    }
}

impl From<Vec<Record>> for M2mTarget {
    fn from(records: Vec<Record>) -> Self {
        M2mTarget::Records(records)
    }
}

/// Options for [`Table::m2m`].
#[derive(Debug, Clone, Default)]
pub struct M2mOptions {
    /// Primary key of the other table; defaults to `id`.
    pub pk: Option<String>,
    /// Junction table; detected or named from both tables when `None`.
    pub m2m_table: Option<String>,
    /// Add missing columns to the other table.
    pub alter: bool,
}

/// Options for [`Table::extract`].
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Lookup table; defaults to the extracted column names joined by `_`.
    pub table: Option<String>,
    /// Defaults to `<lookup table>_id`.
    pub fk_column: Option<String>,
    /// Column names to use in the lookup table.
    pub rename: HashMap<String, String>,
}

impl Database {
    /// Tables with foreign keys to both `a` and `b`.
    pub fn m2m_table_candidates(&self, a: &str, b: &str) -> Result<Vec<String>> {
        let mut candidates = Vec::new();
        for table in self.tables()? {
            if table.name() == a || table.name() == b {
                continue;
            }
            let targets: Vec<String> = table.foreign_keys()?.into_iter().map(|fk| fk.other_table).collect();
            if targets.iter().any(|t| t == a) && targets.iter().any(|t| t == b) {
                candidates.push(table.name().to_string());
            }
        }
        Ok(candidates)
    }
}

impl<'a> Table<'a> {
    /// Returns the primary key of the row whose key columns equal
    /// `values`, inserting it first if needed.
    ///
    /// The table is created on first use with a unique index over the key
    /// columns. Nulls match nulls. `extra_values` are only written when a
    /// row is inserted.
    ///
    /// # Errors
    ///
    /// - [`SqliteError::InvalidArgument`] if `values` is empty.
    /// - [`SqliteError::DatabaseError`] if an existing table holds
    ///   duplicate keys, so the unique index cannot be created.
    ///
    /// # Examples
    ///
    /// ```
    /// use dyntable_core::{record, Value};
    /// use dyntable_sqlite::{Database, LookupOptions};
    ///
    /// let db = Database::open_in_memory().unwrap();
    /// let species = db.table("species");
    /// let oak = species.lookup(record! { "name" => "Oak" }, &LookupOptions::default()).unwrap();
    /// let palm = species.lookup(record! { "name" => "Palm" }, &LookupOptions::default()).unwrap();
    /// assert_eq!(species.lookup(record! { "name" => "Oak" }, &LookupOptions::default()).unwrap(), oak);
    /// assert_eq!(palm, Value::Integer(2));
    /// ```
    pub fn lookup(&self, values: Record, options: &LookupOptions) -> Result<Value> {
        if values.is_empty() {
            return Err(SqliteError::InvalidArgument("lookup needs at least one value".into()));
        }
        let keys: Vec<String> = values.keys().map(String::from).collect();
        let pk = options.pk.clone().unwrap_or_else(|| "id".to_string());

        if self.exists()? {
            let mut combined = values.clone();
            combined.extend_from(&options.extra_values);
            self.add_missing_columns(std::slice::from_ref(&combined))?;
            self.ensure_unique_index(&keys)?;

            let pk = match self.pks()?.as_slice() {
                [only] => only.clone(),
                _ => pk,
            };
            let clause = keys
                .iter()
                .map(|k| format!("{} IS ?", quote_identifier(k)))
                .collect::<Vec<_>>()
                .join(" AND ");
            let sql = format!(
                "SELECT {} FROM {} WHERE {clause}",
                quote_identifier(&pk),
                self.quoted()
            );
            let found = self
                .db()
                .query(&sql, &convert::to_sql_all(values.values()))?
                .into_iter()
                .next()
                .and_then(|row| row.values().next().cloned());
            if let Some(found) = found {
                return Ok(found);
            }
            let mut row = values;
            row.extend_from(&options.extra_values);
            self.insert(row, &InsertOptions::new().pk([pk]))?;
        } else {
            let mut row = values;
            row.extend_from(&options.extra_values);
            let insert = InsertOptions {
                pk: Some(vec![pk]),
                columns: options.columns.clone(),
                not_null: options.not_null.clone(),
                defaults: options.defaults.clone(),
                foreign_keys: options.foreign_keys.clone(),
                strict: options.strict,
                ..Default::default()
            };
            self.insert(row, &insert)?;
            self.ensure_unique_index(&keys)?;
        }
        self.last_pk()
            .ok_or_else(|| SqliteError::NotFound(format!("{}: lookup row was not written", self.name())))
    }

    fn ensure_unique_index(&self, keys: &[String]) -> Result<()> {
        let mut wanted = keys.to_vec();
        wanted.sort();
        let present = self.indexes()?.into_iter().any(|index| {
            let mut columns = index.columns;
            columns.sort();
            index.unique && columns == wanted
        });
        if !present {
            let columns: Vec<IndexColumn> = keys.iter().map(|k| IndexColumn::from(k.as_str())).collect();
            self.create_index(
                &columns,
                &IndexOptions {
                    unique: true,
                    find_unique_name: true,
                    ..Default::default()
                },
            )?;
        }
        Ok(())
    }

    /// Links the row last written through this handle to rows of
    /// `other_table` via a junction table.
    ///
    /// The junction table has columns `<this>_id` and `<other>_id`, a
    /// compound primary key over both and foreign keys to each side whose
    /// key is a real column.
    ///
    /// # Errors
    ///
    /// - [`SqliteError::InvalidArgument`] if nothing was written through
    ///   this handle yet.
    /// - [`SqliteError::NoObviousTable`] if several tables already link
    ///   the two and `m2m_table` is not given.
    ///
    /// # Examples
    ///
    /// ```
    /// use dyntable_core::record;
    /// use dyntable_sqlite::{Database, InsertOptions, M2mOptions};
    ///
    /// let db = Database::open_in_memory().unwrap();
    /// let dogs = db.table("dogs");
    /// dogs.insert(record! { "id" => 1, "name" => "Cleo" }, &InsertOptions::new().pk(["id"]))
    ///     .unwrap()
    ///     .m2m("humans", record! { "id" => 1, "name" => "Natalie" }.into(), &M2mOptions::default())
    ///     .unwrap();
    /// assert_eq!(db.table("dogs_humans").count().unwrap(), 1);
    /// ```
    pub fn m2m(&self, other_table: &str, target: M2mTarget, options: &M2mOptions) -> Result<&Self> {
        let our_id = self.last_pk().ok_or_else(|| {
            SqliteError::InvalidArgument(format!(
                "m2m on {} needs a row written through this handle first",
                self.name()
            ))
        })?;
        if matches!(our_id, Value::List(_)) {
            return Err(SqliteError::InvalidArgument(format!(
                "m2m on {} does not support compound primary keys",
                self.name()
            )));
        }

        let junction_name = match &options.m2m_table {
            Some(name) => name.clone(),
            None => {
                let mut candidates = self.db().m2m_table_candidates(self.name(), other_table)?;
                match candidates.len() {
                    0 => naming::m2m_table_name(self.name(), other_table),
                    1 => candidates.remove(0),
                    _ => {
                        return Err(SqliteError::NoObviousTable(format!(
                            "several tables link {} and {}: {}",
                            self.name(),
                            other_table,
                            candidates.join(", ")
                        )));
                    }
                }
            }
        };

        let other = self.db().table(other_table);
        let other_ids: Vec<Value> = match target {
            M2mTarget::Records(records) => {
                let insert = InsertOptions {
                    pk: Some(vec![options.pk.clone().unwrap_or_else(|| "id".to_string())]),
                    replace: true,
                    alter: options.alter,
                    ..Default::default()
                };
                let mut ids = Vec::with_capacity(records.len());
                for record in records {
                    other.insert(record, &insert)?;
                    if let Some(id) = other.last_pk() {
                        ids.push(id);
                    }
                }
                ids
            }
            M2mTarget::Lookup(values) => vec![other.lookup(values, &LookupOptions::default())?],
        };

        let our_column = naming::foreign_key_column(self.name());
        let other_column = naming::foreign_key_column(other_table);
        let mut foreign_keys = Vec::new();
        for (column, table) in [(&our_column, self), (&other_column, &other)] {
            if let Some(pk) = table.single_column_pk()? {
                foreign_keys.push(ForeignKeySpec::new(column.as_str()).references(table.name()).on(pk));
            }
        }
        let junction = self.db().table(junction_name.as_str());
        let insert = InsertOptions {
            pk: Some(vec![our_column.clone(), other_column.clone()]),
            foreign_keys,
            replace: true,
            ..Default::default()
        };
        let links: Vec<Record> = other_ids
            .into_iter()
            .map(|id| record! { our_column.as_str() => our_id.clone(), other_column.as_str() => id })
            .collect();
        junction.insert_all(links, &insert)?;
        Ok(self)
    }

    /// The table's primary key if it is a single real column.
    fn single_column_pk(&self) -> Result<Option<String>> {
        if !self.exists()? || self.use_rowid()? {
            return Ok(None);
        }
        let mut pks = self.pks()?;
        Ok(if pks.len() == 1 { Some(pks.remove(0)) } else { None })
    }

    /// Moves `columns` into a lookup table, replacing them with a single
    /// foreign key column in the same position.
    ///
    /// Distinct combinations with at least one non-null value become lookup
    /// rows; rows whose extracted values are all null get a null key. The
    /// whole sequence runs in one transaction.
    ///
    /// # Errors
    ///
    /// - [`SqliteError::InvalidColumns`] if a column does not exist, or an
    ///   existing lookup table lacks a matching column.
    /// - [`SqliteError::TableNotFound`] if the table does not exist.
    /// - [`SqliteError::AlterError`] if the underlying transform fails, in
    ///   which case neither table is changed.
    ///
    /// # Examples
    ///
    /// ```
    /// use dyntable_sqlite::{Database, ExtractOptions};
    ///
    /// let db = Database::open_in_memory().unwrap();
    /// db.execute_script(
    ///     "CREATE TABLE trees (id INTEGER PRIMARY KEY, name TEXT, species TEXT);
    ///      INSERT INTO trees VALUES (1, 'a', 'Oak'), (2, 'b', 'Palm'), (3, 'c', 'Oak');",
    /// )
    /// .unwrap();
    /// db.table("trees").extract(&["species"], &ExtractOptions::default()).unwrap();
    /// assert_eq!(db.table("species").count().unwrap(), 2);
    /// let columns: Vec<String> = db.table("trees").columns().unwrap().into_iter().map(|c| c.name).collect();
    /// assert_eq!(columns, ["id", "name", "species_id"]);
    /// ```
    pub fn extract<S: AsRef<str>>(&self, columns: &[S], options: &ExtractOptions) -> Result<&Self> {
        self.require_exists()?;
        let columns: Vec<String> = columns.iter().map(|c| c.as_ref().to_string()).collect();
        let types = self.columns_dict()?;
        let unknown: Vec<&str> = columns
            .iter()
            .filter(|c| !types.iter().any(|(name, _)| name == *c))
            .map(String::as_str)
            .collect();
        if columns.is_empty() || !unknown.is_empty() {
            return Err(SqliteError::InvalidColumns(format!(
                "cannot extract [{}] from {}",
                unknown.join(", "),
                self.name()
            )));
        }

        let lookup_name = options.table.clone().unwrap_or_else(|| columns.join("_"));
        let fk_column = options
            .fk_column
            .clone()
            .unwrap_or_else(|| naming::foreign_key_column(&lookup_name));
        let renamed = |column: &String| options.rename.get(column).cloned().unwrap_or_else(|| column.clone());
        let lookup_columns: Vec<(String, ColumnType)> = columns
            .iter()
            .filter_map(|c| {
                types
                    .iter()
                    .find(|(name, _)| name == c)
                    .map(|(_, column_type)| (renamed(c), *column_type))
            })
            .collect();

        let lookup = self.db().table(lookup_name.as_str());
        let lookup_exists = lookup.exists()?;
        if lookup_exists {
            let existing = lookup.columns_dict()?;
            let missing: Vec<&str> = lookup_columns
                .iter()
                .filter(|wanted| !existing.contains(wanted))
                .map(|(name, _)| name.as_str())
                .collect();
            if !missing.is_empty() {
                return Err(SqliteError::InvalidColumns(format!(
                    "lookup table {lookup_name} has no matching column(s) {}",
                    missing.join(", ")
                )));
            }
        }

        self.db().rewrite_table(self.name(), |db| {
            if !lookup_exists {
                let mut definition = vec![("id".to_string(), ColumnType::Integer)];
                definition.extend(lookup_columns.iter().cloned());
                lookup.create(&definition, &CreateOptions::new().pk(["id"]))?;
            }
            let lookup_names: Vec<String> = lookup_columns.into_iter().map(|(name, _)| name).collect();
            lookup.create_index(
                &lookup_names.iter().map(|c| IndexColumn::from(c.as_str())).collect::<Vec<_>>(),
                &IndexOptions {
                    unique: true,
                    if_not_exists: true,
                    ..Default::default()
                },
            )?;

            let any_non_null = columns
                .iter()
                .map(|c| format!("{} IS NOT NULL", quote_identifier(c)))
                .collect::<Vec<_>>()
                .join(" OR ");
            db.execute(
                &format!(
                    "INSERT OR IGNORE INTO {} ({}) SELECT DISTINCT {} FROM {} WHERE {any_non_null}",
                    lookup.quoted(),
                    lookup_names.iter().map(|c| quote_identifier(c)).collect::<Vec<_>>().join(", "),
                    columns.iter().map(|c| quote_identifier(c)).collect::<Vec<_>>().join(", "),
                    self.quoted()
                ),
                &[],
            )?;

            let scratch = format!("{fk_column}_{}", naming::unique_suffix());
            self.add_column(&scratch, Some(ColumnType::Integer), &Default::default())?;
            let matches = columns
                .iter()
                .zip(&lookup_names)
                .map(|(column, lookup_column)| {
                    format!(
                        "{}.{} IS {}.{}",
                        self.quoted(),
                        quote_identifier(column),
                        lookup.quoted(),
                        quote_identifier(lookup_column)
                    )
                })
                .collect::<Vec<_>>()
                .join(" AND ");
            db.execute(
                &format!(
                    "UPDATE {} SET {} = (SELECT \"id\" FROM {} WHERE {matches})",
                    self.quoted(),
                    quote_identifier(&scratch),
                    lookup.quoted()
                ),
                &[],
            )?;

            let mut column_order: Vec<String> = Vec::new();
            for column in self.column_names()? {
                if columns.contains(&column) {
                    if !column_order.contains(&scratch) {
                        column_order.push(scratch.clone());
                    }
                } else if column != scratch {
                    column_order.push(column);
                }
            }
            self.transform(&TransformOptions {
                drop: columns.clone(),
                rename: [(scratch.clone(), fk_column.clone())].into(),
                column_order,
                add_foreign_keys: vec![ForeignKeySpec::new(fk_column.as_str()).references(lookup_name.as_str()).on("id")],
                ..Default::default()
            })?;
            Ok(())
        })?;
        info!(
            table = %self.name(),
            lookup = %lookup_name,
            fk_column = %fk_column,
            "Extracted columns"
        );
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ForeignKey;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_lookup_is_idempotent_and_creates_unique_index() {
        let db = db();
        let species = db.table("species");
        let options = LookupOptions {
            extra_values: record! { "first_seen" => 2001 },
            ..Default::default()
        };
        let oak = species.lookup(record! { "name" => "Oak" }, &options).unwrap();
        let again = species
            .lookup(
                record! { "name" => "Oak" },
                &LookupOptions {
                    extra_values: record! { "first_seen" => 1999 },
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(oak, again);
        assert_eq!(species.count().unwrap(), 1);
        assert_eq!(species.get(oak).unwrap().get("first_seen"), Some(&Value::Integer(2001)));
        assert!(
            species
                .indexes()
                .unwrap()
                .iter()
                .any(|index| index.unique && index.columns == ["name"])
        );
    }

    #[test]
    fn test_lookup_matches_nulls() {
        let db = db();
        let places = db.table("places");
        let key = || record! { "city" => "Paris", "region" => Value::Null };
        let first = places.lookup(key(), &LookupOptions::default()).unwrap();
        let second = places.lookup(key(), &LookupOptions::default()).unwrap();
        assert_eq!(first, second);
        assert_eq!(places.count().unwrap(), 1);
    }

    #[test]
    fn test_lookup_on_existing_table_with_duplicates_fails() {
        let db = db();
        db.execute_script(
            "CREATE TABLE tags (id INTEGER PRIMARY KEY, name TEXT);
             INSERT INTO tags (name) VALUES ('a'), ('a');",
        )
        .unwrap();
        assert!(matches!(
            db.table("tags").lookup(record! { "name" => "a" }, &LookupOptions::default()),
            Err(SqliteError::DatabaseError(_))
        ));
        assert!(matches!(
            db.table("tags").lookup(Record::new(), &LookupOptions::default()),
            Err(SqliteError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_m2m_records_and_lookup() {
        let db = db();
        let dogs = db.table("dogs");
        dogs.insert(record! { "id" => 1, "name" => "Cleo" }, &InsertOptions::new().pk(["id"]))
            .unwrap()
            .m2m(
                "humans",
                M2mTarget::Records(vec![
                    record! { "id" => 1, "name" => "Natalie" },
                    record! { "id" => 2, "name" => "Simon" },
                ]),
                &M2mOptions::default(),
            )
            .unwrap()
            .m2m("tags", M2mTarget::Lookup(record! { "tag" => "good" }), &M2mOptions::default())
            .unwrap();

        let junction = db.table("dogs_humans");
        assert_eq!(junction.pks().unwrap(), ["dogs_id", "humans_id"]);
        assert_eq!(junction.count().unwrap(), 2);
        assert_eq!(
            junction.foreign_keys().unwrap(),
            vec![
                ForeignKey {
                    table: "dogs_humans".into(),
                    column: "dogs_id".into(),
                    other_table: "dogs".into(),
                    other_column: "id".into(),
                },
                ForeignKey {
                    table: "dogs_humans".into(),
                    column: "humans_id".into(),
                    other_table: "humans".into(),
                    other_column: "id".into(),
                },
            ]
        );
        assert_eq!(db.table("dogs_tags").count().unwrap(), 1);
        assert_eq!(db.m2m_table_candidates("dogs", "humans").unwrap(), ["dogs_humans"]);

        dogs.m2m("humans", record! { "id" => 1, "name" => "Natalie" }.into(), &M2mOptions::default())
            .unwrap();
        assert_eq!(junction.count().unwrap(), 2);
    }

    #[test]
    fn test_m2m_errors() {
        let db = db();
        let dogs = db.table("dogs");
        assert!(matches!(
            dogs.m2m("humans", M2mTarget::Records(vec![]), &M2mOptions::default()),
            Err(SqliteError::InvalidArgument(_))
        ));

        db.execute_script(
            "CREATE TABLE dogs (id INTEGER PRIMARY KEY);
             CREATE TABLE humans (id INTEGER PRIMARY KEY);
             CREATE TABLE pets (dog INTEGER REFERENCES dogs(id), human INTEGER REFERENCES humans(id));
             CREATE TABLE owners (d INTEGER REFERENCES dogs(id), h INTEGER REFERENCES humans(id));",
        )
        .unwrap();
        dogs.insert(record! { "id" => 1 }, &InsertOptions::default()).unwrap();
        assert!(matches!(
            dogs.m2m("humans", record! { "id" => 1 }.into(), &M2mOptions::default()),
            Err(SqliteError::NoObviousTable(_))
        ));
        dogs.m2m(
            "humans",
            record! { "id" => 1 }.into(),
            &M2mOptions {
                m2m_table: Some("dogs_humans".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(db.table("dogs_humans").count().unwrap(), 1);
    }

    #[test]
    fn test_extract_species() {
        let db = db();
        db.execute_script(
            "CREATE TABLE trees (id INTEGER PRIMARY KEY, name TEXT, species TEXT, height INTEGER);
             CREATE INDEX idx_trees_name ON trees (name);
             INSERT INTO trees VALUES
                (1, 'a', 'Oak', 3), (2, 'b', 'Palm', 5), (3, 'c', 'Oak', 2), (4, 'd', NULL, 1);",
        )
        .unwrap();
        let trees = db.table("trees");
        trees.extract(&["species"], &ExtractOptions::default()).unwrap();

        let columns: Vec<String> = trees.columns().unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(columns, ["id", "name", "species_id", "height"]);
        assert_eq!(
            db.table("species").rows().unwrap(),
            vec![record! { "id" => 1, "species" => "Oak" }, record! { "id" => 2, "species" => "Palm" }]
        );
        assert_eq!(trees.get(3).unwrap().get("species_id"), Some(&Value::Integer(1)));
        assert_eq!(trees.get(4).unwrap().get("species_id"), Some(&Value::Null));
        assert_eq!(trees.foreign_keys().unwrap()[0].other_table, "species");
        assert!(trees.indexes().unwrap().iter().any(|i| i.name == "idx_trees_name"));
    }

    #[test]
    fn test_extract_multiple_columns_with_rename() {
        let db = db();
        db.execute_script(
            "CREATE TABLE sightings (id INTEGER PRIMARY KEY, common TEXT, latin TEXT);
             INSERT INTO sightings VALUES (1, 'Oak', 'Quercus'), (2, 'Oak', 'Quercus'), (3, 'Palm', 'Arecaceae');",
        )
        .unwrap();
        let sightings = db.table("sightings");
        sightings
            .extract(
                &["common", "latin"],
                &ExtractOptions {
                    table: Some("species".into()),
                    fk_column: Some("species".into()),
                    rename: [("common".to_string(), "name".to_string())].into(),
                },
            )
            .unwrap();
        let species = db.table("species");
        assert_eq!(species.column_names().unwrap(), ["id", "name", "latin"]);
        assert_eq!(species.count().unwrap(), 2);
        assert_eq!(sightings.column_names().unwrap(), ["id", "species"]);
        assert_eq!(sightings.get(2).unwrap().get("species"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_failed_extract_leaves_table_untouched() {
        let db = db();
        db.execute_script(
            "CREATE TABLE trees (id INTEGER PRIMARY KEY, name TEXT, species TEXT);
             INSERT INTO trees VALUES (1, 'a', 'Oak'), (2, 'b', 'Palm');
             CREATE TABLE notes (id INTEGER PRIMARY KEY, tree_id INTEGER REFERENCES trees(id));
             PRAGMA foreign_keys = OFF;
             INSERT INTO notes VALUES (1, 99);
             PRAGMA foreign_keys = ON;",
        )
        .unwrap();
        let trees = db.table("trees");
        let before = trees.schema().unwrap();

        let err = trees.extract(&["species"], &ExtractOptions::default()).unwrap_err();
        assert!(matches!(err, SqliteError::AlterError(msg) if msg.contains("notes")));
        assert_eq!(trees.schema().unwrap(), before);
        assert_eq!(trees.column_names().unwrap(), ["id", "name", "species"]);
        assert_eq!(db.table_names().unwrap(), vec!["trees", "notes"]);
        assert!(db.foreign_keys_enabled().unwrap());

        db.execute_script(
            "DELETE FROM notes;
             CREATE TABLE log (msg TEXT);
             CREATE TRIGGER trees_log AFTER INSERT ON trees BEGIN INSERT INTO log VALUES (new.species); END;",
        )
        .unwrap();
        assert!(matches!(
            trees.extract(&["species"], &ExtractOptions::default()),
            Err(SqliteError::AlterError(_))
        ));
        assert_eq!(trees.column_names().unwrap(), ["id", "name", "species"]);
        assert!(!db.table("species").exists().unwrap());
    }

    #[test]
    fn test_extract_validates() {
        let db = db();
        db.execute_script(
            "CREATE TABLE trees (id INTEGER PRIMARY KEY, species TEXT);
             CREATE TABLE species (id INTEGER PRIMARY KEY, label TEXT);",
        )
        .unwrap();
        let trees = db.table("trees");
        assert!(matches!(
            trees.extract(&["missing"], &ExtractOptions::default()),
            Err(SqliteError::InvalidColumns(_))
        ));
        assert!(matches!(
            trees.extract(&["species"], &ExtractOptions::default()),
            Err(SqliteError::InvalidColumns(_))
        ));
        assert!(matches!(
            db.table("nope").extract(&["a"], &ExtractOptions::default()),
            Err(SqliteError::TableNotFound(_))
        ));
    }
}
