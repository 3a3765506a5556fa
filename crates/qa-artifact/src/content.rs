//! Open JSON content model
//!
//! Artifact content is an opaque JSON object. Known fields are read through
//! accessors, unknown fields are carried along untouched.

use crate::error::StoreError;
use crate::hash::ContentFingerprint;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON object holding an artifact's content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentDoc(Map<String, Value>);

impl ContentDoc {
    /// Empty document
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build from a JSON value
    ///
    /// # Errors
    /// Returns [`StoreError::NotAnObject`] if `value` is not a JSON object
    pub fn from_value(value: Value) -> Result<Self, StoreError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(StoreError::NotAnObject {
                found: json_type_name(&other),
            }),
        }
    }

    /// Field lookup
    #[inline]
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// String field lookup
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// Array field lookup
    #[must_use]
    pub fn get_array(&self, field: &str) -> Option<&Vec<Value>> {
        self.0.get(field).and_then(Value::as_array)
    }

    /// Set a field, returning the previous value
    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    /// Builder form of [`insert`](Self::insert)
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.insert(field, value);
        self
    }

    /// Borrow the underlying map
    #[inline]
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Remove a field
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Convert into a JSON value
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Unwrap the underlying map
    #[inline]
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Merge a replacement document over this one
    ///
    /// Nested objects merge recursively. Arrays whose elements are all objects
    /// carrying an `id` merge element-wise by id, in the replacement's order,
    /// keeping fields of the original element the replacement does not mention.
    /// Every other value is taken from the replacement.
    #[must_use]
    pub fn merge_preserving(&self, replacement: &ContentDoc) -> ContentDoc {
        let mut merged = self.0.clone();
        for (key, incoming) in &replacement.0 {
            let value = match merged.get(key) {
                Some(existing) => merge_values(existing, incoming),
                None => incoming.clone(),
            };
            merged.insert(key.clone(), value);
        }
        ContentDoc(merged)
    }

    /// Fingerprint of the canonical form
    #[must_use]
    pub fn fingerprint(&self) -> ContentFingerprint {
        ContentFingerprint::of(&Value::Object(self.0.clone()))
    }
}

impl From<Map<String, Value>> for ContentDoc {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn merge_values(existing: &Value, incoming: &Value) -> Value {
    match (existing, incoming) {
        (Value::Object(old), Value::Object(new)) => {
            let merged = ContentDoc(old.clone()).merge_preserving(&ContentDoc(new.clone()));
            merged.into_value()
        }
        (Value::Array(old), Value::Array(new)) if all_identified(old) && all_identified(new) => {
            let merged = new
                .iter()
                .map(|item| {
                    let id = item.get("id");
                    match old.iter().find(|o| o.get("id") == id) {
                        Some(previous) => merge_values(previous, item),
                        None => item.clone(),
                    }
                })
                .collect();
            Value::Array(merged)
        }
        (_, replacement) => replacement.clone(),
    }
}

fn all_identified(items: &[Value]) -> bool {
    items
        .iter()
        .all(|item| item.get("id").is_some_and(|id| !id.is_null()))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn doc(value: Value) -> ContentDoc {
        ContentDoc::from_value(value).unwrap()
    }

    #[test]
    fn rejects_non_objects() {
        let err = ContentDoc::from_value(json!([1, 2])).unwrap_err();
        assert!(matches!(err, StoreError::NotAnObject { found: "array" }));
    }

    #[test]
    fn merge_keeps_unknown_fields() {
        let base = doc(json!({"title": "Old", "custom": {"owner": "qa"}, "priority": "P2"}));
        let edit = doc(json!({"title": "New"}));

        let merged = base.merge_preserving(&edit);
        assert_eq!(
            merged.into_value(),
            json!({"title": "New", "custom": {"owner": "qa"}, "priority": "P2"})
        );
    }

    #[test]
    fn merge_arrays_by_id() {
        let base = doc(json!({
            "cases": [
                {"id": "TC-001", "title": "Login", "note": "keep me"},
                {"id": "TC-002", "title": "Logout"}
            ]
        }));
        let edit = doc(json!({
            "cases": [
                {"id": "TC-002", "title": "Logout all sessions"},
                {"id": "TC-001", "title": "Login"}
            ]
        }));

        let merged = base.merge_preserving(&edit);
        assert_eq!(
            merged.get("cases").unwrap(),
            &json!([
                {"id": "TC-002", "title": "Logout all sessions"},
                {"id": "TC-001", "title": "Login", "note": "keep me"}
            ])
        );
    }

    #[test]
    fn merge_replaces_plain_arrays() {
        let base = doc(json!({"steps": ["a", "b"]}));
        let edit = doc(json!({"steps": ["c"]}));
        assert_eq!(base.merge_preserving(&edit).get("steps"), Some(&json!(["c"])));
    }

    #[test]
    fn identical_merge_keeps_fingerprint() {
        let base = doc(json!({"cases": [{"id": "TC-001", "title": "x"}], "extra": 1}));
        let edit = doc(json!({"cases": [{"id": "TC-001", "title": "x"}]}));
        assert_eq!(base.merge_preserving(&edit).fingerprint(), base.fingerprint());
    }
}
