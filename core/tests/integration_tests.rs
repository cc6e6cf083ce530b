//! Integration tests for the dyntable-core crate.

use dyntable_core::{
    ColumnType, CoreError, InputRow, Record, RowNormalizer, SqlDefault, TypeTracker, Value,
    VirtualTableDef, apply_column_order, hash_record, naming, record, suggest_column_types,
    table_options,
};

#[test]
fn test_inference_widens_as_kinds_accumulate() {
    let mut tracker = TypeTracker::new();
    tracker.observe(&record! { "n" => 1 });
    tracker.observe(&record! { "n" => true });
    assert_eq!(tracker.types(), vec![("n".to_string(), ColumnType::Integer)]);

    tracker.observe(&record! { "n" => 2.5 });
    assert_eq!(tracker.types(), vec![("n".to_string(), ColumnType::Float)]);

    tracker.observe(&record! { "n" => "three" });
    assert_eq!(tracker.types(), vec![("n".to_string(), ColumnType::Text)]);
}

#[test]
fn test_inference_over_heterogeneous_batch() {
    let records = vec![
        record! { "id" => 1, "photo" => vec![0u8, 1, 2], "tags" => vec![Value::from("a")] },
        record! { "id" => 2, "photo" => "inline", "missing" => Value::Null },
        record! { "id" => 3, "meta" => record! { "k" => 1 } },
    ];
    let types = suggest_column_types(&records);
    assert_eq!(
        types,
        vec![
            ("id".to_string(), ColumnType::Integer),
            ("photo".to_string(), ColumnType::Blob),
            ("tags".to_string(), ColumnType::Text),
            ("missing".to_string(), ColumnType::Text),
            ("meta".to_string(), ColumnType::Text),
        ]
    );

    let ordered = apply_column_order(types, &["meta".to_string(), "id".to_string()]);
    let names: Vec<&str> = ordered.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, ["meta", "id", "photo", "tags", "missing"]);
}

#[test]
fn test_null_only_field_uses_fallback() {
    let mut tracker = TypeTracker::new().with_fallback(ColumnType::Blob);
    tracker.observe(&record! { "empty" => Value::Null });
    assert_eq!(tracker.types(), vec![("empty".to_string(), ColumnType::Blob)]);
}

#[test]
fn test_header_rows_become_records() {
    let rows = vec![
        InputRow::Values(vec!["id".into(), "name".into(), "age".into()]),
        InputRow::Values(vec![1.into(), "Cleo".into(), 4.into()]),
        InputRow::Values(vec![2.into(), "Pancakes".into()]),
    ];
    let records: Vec<Record> = RowNormalizer::new(rows).collect::<Result<_, _>>().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].keys().collect::<Vec<_>>(), ["id", "name", "age"]);
    assert_eq!(records[1].get("age"), Some(&Value::Null));
}

#[test]
fn test_malformed_row_streams() {
    let bad_header = vec![InputRow::Values(vec![Value::from(1)])];
    let err = RowNormalizer::new(bad_header).next().unwrap().unwrap_err();
    assert!(matches!(err, CoreError::NonStringColumnName(_, 0)));

    let too_long = vec![
        InputRow::Values(vec!["a".into()]),
        InputRow::Values(vec![1.into(), 2.into()]),
    ];
    let err = RowNormalizer::new(too_long).next().unwrap().unwrap_err();
    assert!(matches!(err, CoreError::TooManyValues { expected: 1, found: 2, .. }));

    let mixed = vec![
        InputRow::Values(vec!["a".into()]),
        InputRow::Record(record! { "a" => 1 }),
    ];
    let results: Vec<_> = RowNormalizer::new(mixed).collect();
    assert!(matches!(results.last(), Some(Err(CoreError::MixedRowFormats(1)))));
}

#[test]
fn test_hash_ids_are_stable_and_scoped() {
    let a = record! { "name" => "Cleo", "age" => 4 };
    let b = record! { "age" => 4, "name" => "Cleo" };
    let hash = hash_record(&a, None);
    assert_eq!(hash, hash_record(&b, None));
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

    let older = record! { "name" => "Cleo", "age" => 5 };
    assert_ne!(hash, hash_record(&older, None));
    let scope = ["name".to_string()];
    assert_eq!(hash_record(&a, Some(&scope)), hash_record(&older, Some(&scope)));
}

#[test]
fn test_catalog_text_classification() {
    assert_eq!(SqlDefault::parse("'hello'").unwrap(), SqlDefault::from(Value::from("hello")));
    assert!(SqlDefault::parse("NULL").unwrap().is_null());
    assert_eq!(SqlDefault::parse("CURRENT_TIMESTAMP").unwrap(), SqlDefault::keyword("CURRENT_TIMESTAMP"));

    let options = table_options("CREATE TABLE t (id INTEGER PRIMARY KEY) STRICT, WITHOUT ROWID");
    assert!(options.strict);
    assert!(options.without_rowid);

    let def = VirtualTableDef::parse(r#"CREATE VIRTUAL TABLE "demo_fts" USING fts4 (body, content="demo")"#)
        .unwrap();
    assert!(def.is_fts());
    assert_eq!(def.option("content").as_deref(), Some("demo"));
    assert_ne!(def.option("content").as_deref(), Some("demo2"));
}

#[test]
fn test_generated_names_are_reserved() {
    let tables = ["dogs", "docs"];
    assert!(naming::is_reserved_table_name(&naming::fts_table_name("dogs"), &tables));
    assert!(naming::is_reserved_table_name(naming::COUNTS_TABLE, &tables));
    assert!(naming::is_reserved_table_name(
        &naming::transform_table_name("docs", &naming::unique_suffix()),
        &tables
    ));
    assert!(!naming::is_reserved_table_name("dogs", &tables));
    assert_eq!(naming::m2m_table_name("tags", "dogs"), "dogs_tags");
    assert_eq!(naming::index_name("dogs", &["name", "age"]), "idx_dogs_name_age");
}
