//! Fingerprints of resolved dictionaries
//!
//! Validation reports carry the SHA-256 of the resolved schema map so a report
//! can be traced back to the exact dictionary it was produced against.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 over canonical JSON (object keys sorted at every level)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaFingerprint(String);

impl SchemaFingerprint {
    /// Fingerprint a JSON value; key order does not affect the result
    pub fn of_json(value: &Value) -> Self {
        let canonical = canonicalize(value);
        let hash = Sha256::digest(canonical.to_string().as_bytes());
        Self(format!("{:x}", hash))
    }

    /// Fingerprint a sequence of `(id, schema)` entries
    pub fn of_entries<'a>(entries: impl IntoIterator<Item = (&'a String, &'a Value)>) -> Self {
        let map: Map<String, Value> = entries
            .into_iter()
            .map(|(id, schema)| (id.clone(), schema.clone()))
            .collect();
        Self::of_json(&Value::Object(map))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for SchemaFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            Value::Object(
                keys.into_iter()
                    .map(|k| (k.clone(), canonicalize(&map[k])))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_matter() {
        let a = json!({"b": 1, "a": {"y": [1, 2], "x": null}});
        let b = json!({"a": {"x": null, "y": [1, 2]}, "b": 1});
        assert_eq!(SchemaFingerprint::of_json(&a), SchemaFingerprint::of_json(&b));
    }

    #[test]
    fn test_content_changes_fingerprint() {
        let a = json!({"type": "string"});
        let b = json!({"type": "integer"});
        assert_ne!(SchemaFingerprint::of_json(&a), SchemaFingerprint::of_json(&b));
    }

    #[test]
    fn test_array_order_matters() {
        assert_ne!(
            SchemaFingerprint::of_json(&json!([1, 2])),
            SchemaFingerprint::of_json(&json!([2, 1]))
        );
    }

    #[test]
    fn test_short_form() {
        let fp = SchemaFingerprint::of_json(&json!({}));
        assert_eq!(fp.short().len(), 12);
        assert_eq!(fp.as_str().len(), 64);
    }
}
