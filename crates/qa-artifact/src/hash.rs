//! Content fingerprints
//!
//! A [`ContentFingerprint`] is the Blake3 hash of a document's canonical JSON
//! form (object keys sorted at every depth), so two documents that differ only
//! in key order share a fingerprint.

use serde_json::{Map, Value};
use std::fmt::{self, Display, Formatter};

/// A 32-byte Blake3 fingerprint of canonical JSON content
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentFingerprint([u8; 32]);

impl ContentFingerprint {
    /// Fingerprint an arbitrary JSON value
    #[must_use]
    pub fn of(value: &Value) -> Self {
        let canonical = canonicalize(value);
        // Serializing a `Value` cannot fail.
        let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
        Self(*blake3::hash(&bytes).as_bytes())
    }

    /// Raw bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short string representation (first 16 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for ContentFingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Rebuild a value with every object's keys in sorted order
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
