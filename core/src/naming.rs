//! Names this crate generates inside a user's database.
//!
//! Every auxiliary object (FTS tables and triggers, the counts cache,
//! transform scratch tables, default index and junction table names) is
//! named by one of these functions, so callers and tests can predict them
//! and avoid collisions with their own tables.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Name of the table holding cached row counts.
pub const COUNTS_TABLE: &str = "_counts";

static SUFFIX_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Full-text shadow table for `table`.
pub fn fts_table_name(table: &str) -> String {
    format!("{table}_fts")
}

/// FTS synchronization trigger names: after-insert, delete and update.
pub fn fts_trigger_names(table: &str) -> [String; 3] {
    [
        format!("{table}_ai"),
        format!("{table}_ad"),
        format!("{table}_au"),
    ]
}

/// Counts-cache trigger names: insert and delete.
pub fn counts_trigger_names(table: &str) -> [String; 2] {
    [
        format!("{table}_counts_insert"),
        format!("{table}_counts_delete"),
    ]
}

/// Scratch table used while a transform rebuilds `table`.
pub fn transform_table_name(table: &str, suffix: &str) -> String {
    format!("{table}_new_{suffix}")
}

/// Default index name: `idx_<table>_<col1>_<col2>...`.
pub fn index_name<S: AsRef<str>>(table: &str, columns: &[S]) -> String {
    let mut name = format!("idx_{}", table.replace(' ', "_"));
    for column in columns {
        name.push('_');
        name.push_str(&column.as_ref().replace(' ', "_"));
    }
    name
}

/// Default junction table for a many-to-many relationship: both names
/// sorted and joined with `_`.
pub fn m2m_table_name(a: &str, b: &str) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    format!("{first}_{second}")
}

/// Column referencing `table` from a junction or extracted table.
pub fn foreign_key_column(table: &str) -> String {
    format!("{table}_id")
}

/// Returns a short hex suffix that is unique within this process and
/// unlikely to repeat across processes.
pub fn unique_suffix() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64 ^ d.as_secs())
        .unwrap_or(0);
    let count = SUFFIX_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mixed = nanos.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ count.rotate_left(40);
    format!("{:012x}", mixed & 0xFFFF_FFFF_FFFF)
}

/// Returns `true` if `name` is one of the generated names: the counts
/// table, a transform scratch table, or an FTS shadow table of some
/// other table in `existing_tables`.
pub fn is_reserved_table_name<S: AsRef<str>>(name: &str, existing_tables: &[S]) -> bool {
    if name == COUNTS_TABLE {
        return true;
    }
    existing_tables.iter().map(AsRef::as_ref).any(|table| {
        table != name && (name == fts_table_name(table) || name.starts_with(&format!("{table}_new_")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_names() {
        assert_eq!(fts_table_name("docs"), "docs_fts");
        assert_eq!(fts_trigger_names("docs"), ["docs_ai", "docs_ad", "docs_au"]);
        assert_eq!(counts_trigger_names("t"), ["t_counts_insert", "t_counts_delete"]);
        assert_eq!(transform_table_name("dogs", "abc"), "dogs_new_abc");
        assert_eq!(index_name("dogs", &["name", "age"]), "idx_dogs_name_age");
        assert_eq!(m2m_table_name("tags", "dogs"), "dogs_tags");
        assert_eq!(foreign_key_column("species"), "species_id");
    }

    #[test]
    fn test_unique_suffix_does_not_repeat() {
        let a = unique_suffix();
        let b = unique_suffix();
        assert_eq!(a.len(), 12);
        assert_ne!(a, b);
    }

    #[test]
    fn test_reserved_names() {
        let tables = ["docs", "docs_fts"];
        assert!(is_reserved_table_name("_counts", &tables));
        assert!(is_reserved_table_name("docs_fts", &tables));
        assert!(is_reserved_table_name("docs_new_0123", &tables));
        assert!(!is_reserved_table_name("docs", &tables));
        assert!(!is_reserved_table_name("other", &tables));
    }
}
