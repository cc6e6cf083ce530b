//! Deterministic content hashes for records.
//!
//! Used to synthesize primary keys (`hash_id`) so that inserting the same
//! logical row twice targets the same key.

use sha2::{Digest, Sha256};

use crate::record::Record;
use crate::value::Value;

/// Computes the SHA-256 hex digest of a record's canonical JSON form.
///
/// The canonical form is compact JSON with object keys sorted at every
/// level, so field order does not affect the hash. When `keys` is given,
/// only those fields take part.
///
/// # Examples
///
/// ```
/// use dyntable_core::{hash_record, record};
///
/// let a = record! { "name" => "Cleo", "age" => 4 };
/// let b = record! { "age" => 4, "name" => "Cleo" };
/// assert_eq!(hash_record(&a, None), hash_record(&b, None));
///
/// let c = record! { "name" => "Cleo", "age" => 5 };
/// assert_eq!(hash_record(&a, Some(&["name".to_string()])), hash_record(&c, Some(&["name".to_string()])));
/// ```
pub fn hash_record(record: &Record, keys: Option<&[String]>) -> String {
    let mut fields: Vec<(&str, &Value)> = record
        .iter()
        .filter(|(k, _)| keys.is_none_or(|keys| keys.iter().any(|wanted| wanted == k)))
        .map(|(k, v)| (k.as_str(), v))
        .collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));

    let object: serde_json::Map<String, serde_json::Value> = fields
        .into_iter()
        .map(|(k, v)| (k.to_string(), canonical_json(v)))
        .collect();
    let canonical = serde_json::Value::Object(object).to_string();

    let hash = Sha256::digest(canonical.as_bytes());
    format!("{:x}", hash)
}

fn canonical_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Map(record) => {
            let mut entries: Vec<(&String, &Value)> = record.iter().map(|(k, v)| (k, v)).collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            serde_json::Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonical_json(v)))
                    .collect(),
            )
        }
        Value::List(items) => serde_json::Value::Array(items.iter().map(canonical_json).collect()),
        other => other.to_json(),
    }
}
