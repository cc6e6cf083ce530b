//! Insertion-ordered field mappings.

use std::slice;

use crate::value::Value;

/// An ordered mapping of field name to [`Value`].
///
/// Field order is the order in which keys were first inserted; replacing
/// the value of an existing key keeps its position. Lookups are linear,
/// which is fine for the row widths SQLite allows.
///
/// # Examples
///
/// ```
/// use dyntable_core::{record, Record, Value};
///
/// let mut dog = record! { "id" => 1, "name" => "Cleo" };
/// dog.insert("age", 4);
/// dog.insert("name", "Pancakes");
///
/// assert_eq!(dog.keys().collect::<Vec<_>>(), ["id", "name", "age"]);
/// assert_eq!(dog.get("name"), Some(&Value::from("Pancakes")));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Inserts or replaces a field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Removes a field, preserving the order of the remaining ones.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> slice::Iter<'_, (String, Value)> {
        self.entries.iter()
    }

    /// Copies every field of `other` into `self`, replacing existing keys.
    pub fn extend_from(&mut self, other: &Record) {
        for (k, v) in other.iter() {
            self.insert(k.clone(), v.clone());
        }
    }

    /// Converts the record to a JSON object, keeping field order.
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Record {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        map.into_iter().map(|(k, v)| (k, Value::from(v))).collect()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = &'a (String, Value);
    type IntoIter = slice::Iter<'a, (String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Builds a [`Record`] from `key => value` pairs.
///
/// ```
/// use dyntable_core::record;
///
/// let r = record! { "id" => 1, "name" => "Cleo", "age" => 4 };
/// assert_eq!(r.len(), 3);
/// ```
#[macro_export]
macro_rules! record {
    () => {
        $crate::Record::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut record = $crate::Record::new();
        $(record.insert($key, $crate::Value::from($value));)+
        record
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    #[test]
    fn test_insert_keeps_first_position() {
        let mut r = record! { "a" => 1, "b" => 2 };
        assert_eq!(r.insert("a", 10), Some(Value::Integer(1)));
        assert_eq!(r.keys().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(r.get("a"), Some(&Value::Integer(10)));
    }

    #[test]
    fn test_remove_preserves_order() {
        let mut r = record! { "a" => 1, "b" => 2, "c" => 3 };
        r.remove("b");
        assert_eq!(r.keys().collect::<Vec<_>>(), ["a", "c"]);
        assert!(r.remove("missing").is_none());
    }

    #[test]
    fn test_to_json_keeps_field_order() {
        let r = record! { "z" => 1, "a" => "x" };
        assert_eq!(r.to_json().to_string(), r#"{"z":1,"a":"x"}"#);
    }
}
