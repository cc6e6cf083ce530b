//! Column type inference over heterogeneous records.
//!
//! For every field the set of distinct [`ValueKind`]s seen across a batch is
//! collected (nulls carry no signal and are ignored), then reduced to the
//! narrowest [`ColumnType`] able to hold every observed value:
//!
//! | observed kinds            | type    |
//! |---------------------------|---------|
//! | exactly one               | that kind's type (list/map → text) |
//! | ⊆ {integer, bool}         | integer |
//! | ⊆ {integer, bool, float}  | float   |
//! | ⊆ {blob, text}            | blob    |
//! | anything else             | text    |

use std::collections::BTreeSet;

use crate::record::Record;
use crate::types::ColumnType;
use crate::value::ValueKind;

/// Incrementally accumulates observed kinds per field.
///
/// Useful when records are streamed and only a sample should be inspected.
///
/// # Examples
///
/// ```
/// use dyntable_core::{record, ColumnType, TypeTracker};
///
/// let mut tracker = TypeTracker::new();
/// tracker.observe(&record! { "id" => 1, "score" => 3 });
/// tracker.observe(&record! { "id" => 2, "score" => 4.5 });
///
/// assert_eq!(
///     tracker.types(),
///     vec![("id".to_string(), ColumnType::Integer), ("score".to_string(), ColumnType::Float)]
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct TypeTracker {
    fields: Vec<(String, BTreeSet<ValueKind>)>,
    fallback: ColumnType,
}

impl TypeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the type used for fields that were only ever null.
    pub fn with_fallback(mut self, fallback: ColumnType) -> Self {
        self.fallback = fallback;
        self
    }

    /// Records the kinds of every field in `record`.
    pub fn observe(&mut self, record: &Record) {
        for (key, value) in record {
            let idx = match self.fields.iter().position(|(k, _)| k == key) {
                Some(idx) => idx,
                None => {
                    self.fields.push((key.clone(), BTreeSet::new()));
                    self.fields.len() - 1
                }
            };
            if !value.is_null() {
                self.fields[idx].1.insert(value.kind());
            }
        }
    }

    /// Field names in first-seen order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Inferred types in first-seen field order.
    pub fn types(&self) -> Vec<(String, ColumnType)> {
        self.fields
            .iter()
            .map(|(name, kinds)| (name.clone(), type_for_kinds(kinds).unwrap_or(self.fallback)))
            .collect()
    }
}

/// Reduces a set of observed kinds to a column type.
///
/// Returns `None` when the set is empty (or only holds null).
pub fn type_for_kinds(kinds: &BTreeSet<ValueKind>) -> Option<ColumnType> {
    use ValueKind::*;

    let kinds: BTreeSet<ValueKind> = kinds.iter().copied().filter(|k| *k != Null).collect();
    if kinds.is_empty() {
        return None;
    }
    if kinds.len() == 1 {
        return kinds.iter().next().copied().and_then(ColumnType::for_kind);
    }
    let within = |allowed: &[ValueKind]| kinds.iter().all(|k| allowed.contains(k));
    let ty = if within(&[Integer, Bool]) {
        ColumnType::Integer
    } else if within(&[Integer, Bool, Float]) {
        ColumnType::Float
    } else if within(&[Blob, Text]) {
        ColumnType::Blob
    } else {
        ColumnType::Text
    };
    Some(ty)
}

/// Infers a type for every field across `records`.
///
/// Fields are returned in first-seen order; fields that were only ever null
/// are typed as text.
pub fn suggest_column_types<'a, I>(records: I) -> Vec<(String, ColumnType)>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut tracker = TypeTracker::new();
    for record in records {
        tracker.observe(record);
    }
    tracker.types()
}

/// Reorders `columns` so that names listed in `order` come first, in that
/// order; the remaining columns keep their relative order. Unknown names in
/// `order` are ignored.
pub fn apply_column_order<T>(columns: Vec<(String, T)>, order: &[String]) -> Vec<(String, T)> {
    if order.is_empty() {
        return columns;
    }
    let mut remaining: Vec<Option<(String, T)>> = columns.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(remaining.len());
    for wanted in order {
        if let Some(slot) = remaining
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|(name, _)| name == wanted))
        {
            ordered.extend(slot.take());
        }
    }
    ordered.extend(remaining.into_iter().flatten());
    ordered
}
