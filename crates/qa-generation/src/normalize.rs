//! Normalization of generated JSON
//!
//! List-of-strings fields are flattened, every list item gets an id, and
//! duplicate ids are disambiguated with `-2`, `-3`, ... in encounter order.

use crate::parse::scalar_text;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Case fields joined into one string
const JOINED_FIELDS: [&str; 2] = ["preconditions", "steps"];
/// Case fields coerced to strings
const SCALAR_FIELDS: [&str; 4] = ["id", "title", "type", "expected"];
/// Top-level test case fields coerced to strings
const TOP_LEVEL_FIELDS: [&str; 3] = ["requirement_id", "source", "requirement_text"];

/// Assigns unique ids in encounter order
///
/// Blank ids get `fallback(position)`; a repeated id gets `-2`, `-3`, ...
/// appended until it is unused.
#[derive(Debug, Default)]
pub struct IdAllocator {
    used: HashSet<String>,
}

impl IdAllocator {
    /// Fresh allocator
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id for the item at 1-based `position`
    pub fn allocate(&mut self, raw: &str, position: usize, fallback: impl Fn(usize) -> String) -> String {
        let base = match raw.trim() {
            "" => fallback(position),
            trimmed => trimmed.to_string(),
        };
        let mut candidate = base.clone();
        let mut counter = 2;
        while self.used.contains(&candidate) {
            candidate = format!("{base}-{counter}");
            counter += 1;
        }
        self.used.insert(candidate.clone());
        candidate
    }
}

fn join_list(value: Option<&Value>) -> String {
    match value {
        Some(Value::Array(items)) => items.iter().map(scalar_text).collect::<Vec<_>>().join("; "),
        Some(other) => scalar_text(other),
        None => String::new(),
    }
}

/// Normalize one case object; non-objects become an `info` row
fn normalize_case(case: &Value) -> Map<String, Value> {
    let Value::Object(fields) = case else {
        let text = scalar_text(case);
        let mut info = Map::new();
        info.insert("id".into(), Value::String(String::new()));
        info.insert("type".into(), Value::String("info".into()));
        info.insert("title".into(), Value::String(text.clone()));
        info.insert("preconditions".into(), Value::String(String::new()));
        info.insert("steps".into(), Value::String(text));
        info.insert("expected".into(), Value::String(String::new()));
        return info;
    };

    let mut out = fields.clone();
    for field in JOINED_FIELDS {
        out.insert(field.into(), Value::String(join_list(fields.get(field))));
    }
    for field in SCALAR_FIELDS {
        let text = fields.get(field).map(scalar_text).unwrap_or_default();
        out.insert(field.into(), Value::String(text));
    }
    out
}

/// Normalize a test case document in place
///
/// `cases` entries are normalized and given unique ids (fallback
/// `<req_code>-TC-<n>`); top-level descriptive fields are coerced to strings.
pub fn normalize_testcases(doc: &mut Map<String, Value>, req_code: &str) {
    if let Some(Value::Array(cases)) = doc.get("cases") {
        let mut ids = IdAllocator::new();
        let normalized: Vec<Value> = cases
            .iter()
            .enumerate()
            .map(|(idx, case)| {
                let mut case = normalize_case(case);
                let raw = case.get("id").and_then(Value::as_str).unwrap_or_default();
                let id = ids.allocate(raw, idx + 1, |n| format!("{req_code}-TC-{n}"));
                case.insert("id".into(), Value::String(id));
                Value::Object(case)
            })
            .collect();
        doc.insert("cases".into(), Value::Array(normalized));
    }

    for field in TOP_LEVEL_FIELDS {
        if let Some(value) = doc.get(field) {
            if !value.is_string() {
                let text = scalar_text(value);
                doc.insert(field.into(), Value::String(text));
            }
        }
    }
}

/// Drop case references that do not resolve
///
/// `flow_id` must name a known flow and `viewpoint` a known viewpoint name.
/// Returns how many references were removed.
pub fn prune_dangling_refs(
    doc: &mut Map<String, Value>,
    flow_ids: &HashSet<String>,
    viewpoints: &HashSet<String>,
) -> usize {
    let Some(Value::Array(cases)) = doc.get_mut("cases") else {
        return 0;
    };
    let mut removed = 0;
    for case in cases.iter_mut().filter_map(Value::as_object_mut) {
        for (field, known) in [("flow_id", flow_ids), ("viewpoint", viewpoints)] {
            let dangling = case
                .get(field)
                .is_some_and(|v| !v.as_str().is_some_and(|s| known.contains(s)));
            if dangling {
                case.remove(field);
                removed += 1;
            }
        }
    }
    removed
}

/// Normalize test design flows
///
/// Non-object flows are dropped. Ids fall back to `FLOW-<n>`; `steps` and
/// `requirements` become lists of strings.
#[must_use]
pub fn normalize_flows(flows: &[Value]) -> Vec<Value> {
    let mut ids = IdAllocator::new();
    flows
        .iter()
        .filter_map(Value::as_object)
        .enumerate()
        .map(|(idx, flow)| {
            let mut out = flow.clone();
            let raw = flow.get("id").map(scalar_text).unwrap_or_default();
            out.insert(
                "id".into(),
                Value::String(ids.allocate(&raw, idx + 1, |n| format!("FLOW-{n}"))),
            );
            for field in ["steps", "requirements"] {
                let list = match flow.get(field) {
                    Some(Value::Array(items)) => {
                        items.iter().map(|v| Value::String(scalar_text(v))).collect()
                    }
                    Some(Value::Null) | None => Vec::new(),
                    Some(other) => vec![Value::String(scalar_text(other))],
                };
                out.insert(field.into(), Value::Array(list));
            }
            if let Some(name) = flow.get("name") {
                out.insert("name".into(), Value::String(scalar_text(name)));
            }
            Value::Object(out)
        })
        .collect()
}

/// Split into alternating digit / non-digit runs
fn runs(s: &str) -> impl Iterator<Item = &str> {
    let mut rest = s;
    std::iter::from_fn(move || {
        let first = rest.chars().next()?;
        let digit = first.is_ascii_digit();
        let end = rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() != digit)
            .map_or(rest.len(), |(i, _)| i);
        let (run, tail) = rest.split_at(end);
        rest = tail;
        Some(run)
    })
}

/// Human-friendly ordering where `REQ-9 < REQ-10`
#[must_use]
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = runs(a);
    let mut right = runs(b);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(nx), Ok(ny)) => nx.cmp(&ny),
                    _ => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Keep the first item per key, preserving order
pub fn dedupe_by_key<T, K, F>(items: Vec<T>, key: F) -> Vec<T>
where
    K: std::hash::Hash + Eq,
    F: Fn(&T) -> K,
{
    let mut seen: HashSet<K> = HashSet::new();
    items.into_iter().filter(|item| seen.insert(key(item))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn blank_and_duplicate_case_ids() {
        let mut doc = obj(json!({
            "requirement_id": "REQ-3",
            "cases": [
                {"id": "TC-1", "title": "a"},
                {"id": "TC-1", "title": "b"},
                {"id": "  ", "title": "c"},
                {"title": "d"},
                {"id": "TC-1", "title": "e"}
            ]
        }));
        normalize_testcases(&mut doc, "REQ-3");

        let ids: Vec<&str> = doc["cases"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["TC-1", "TC-1-2", "REQ-3-TC-3", "REQ-3-TC-4", "TC-1-3"]);
    }

    #[test]
    fn fallback_collision_is_disambiguated() {
        let mut doc = obj(json!({"cases": [{"id": "REQ-1-TC-2"}, {"id": ""}]}));
        normalize_testcases(&mut doc, "REQ-1");
        assert_eq!(doc["cases"][1]["id"], json!("REQ-1-TC-2-2"));
    }

    #[test]
    fn list_fields_are_joined_and_scalars_coerced() {
        let mut doc = obj(json!({
            "requirement_id": 7,
            "cases": [{
                "id": 12,
                "type": "happy",
                "preconditions": ["logged out", "account exists"],
                "steps": null,
                "expected": ["ok"],
                "priority": "P1"
            }]
        }));
        normalize_testcases(&mut doc, "REQ-7");

        let case = &doc["cases"][0];
        assert_eq!(case["id"], json!("12"));
        assert_eq!(case["preconditions"], json!("logged out; account exists"));
        assert_eq!(case["steps"], json!(""));
        assert_eq!(case["title"], json!(""));
        assert_eq!(case["expected"], json!("[\"ok\"]"));
        assert_eq!(case["priority"], json!("P1"));
        assert_eq!(doc["requirement_id"], json!("7"));
    }

    #[test]
    fn non_object_cases_become_info_rows() {
        let mut doc = obj(json!({"cases": ["Check the banner"]}));
        normalize_testcases(&mut doc, "REQ-2");
        assert_eq!(
            doc["cases"][0],
            json!({
                "id": "REQ-2-TC-1",
                "type": "info",
                "title": "Check the banner",
                "preconditions": "",
                "steps": "Check the banner",
                "expected": ""
            })
        );
    }

    #[test]
    fn dangling_references_are_removed() {
        let mut doc = obj(json!({"cases": [
            {"id": "a", "flow_id": "FLOW-1", "viewpoint": "Timeout"},
            {"id": "b", "flow_id": "FLOW-9", "viewpoint": 3}
        ]}));
        let flows = HashSet::from(["FLOW-1".to_string()]);
        let vps = HashSet::from(["Timeout".to_string()]);

        assert_eq!(prune_dangling_refs(&mut doc, &flows, &vps), 2);
        assert_eq!(doc["cases"][0]["flow_id"], json!("FLOW-1"));
        assert!(doc["cases"][1].get("flow_id").is_none());
        assert!(doc["cases"][1].get("viewpoint").is_none());
    }

    #[test]
    fn flows_get_ids_and_lists() {
        let flows = normalize_flows(&[
            json!({"name": "Sign in", "steps": "open page"}),
            json!("garbage"),
            json!({"id": "FLOW-1", "name": "Sign out", "requirements": ["REQ-2"]}),
        ]);
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0]["id"], json!("FLOW-1"));
        assert_eq!(flows[0]["steps"], json!(["open page"]));
        assert_eq!(flows[1]["id"], json!("FLOW-1-2"));
        assert_eq!(flows[1]["requirements"], json!(["REQ-2"]));
    }

    #[test]
    fn natural_ordering() {
        let mut codes = vec!["REQ-10", "REQ-9", "REQ-1", "REQ-2a"];
        codes.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(codes, vec!["REQ-1", "REQ-2a", "REQ-9", "REQ-10"]);
    }

    #[test]
    fn dedupe_keeps_first() {
        let items = vec![("a", 1), ("b", 2), ("a", 3)];
        assert_eq!(dedupe_by_key(items, |(k, _)| *k), vec![("a", 1), ("b", 2)]);
    }

    proptest! {
        #[test]
        fn case_ids_are_unique_and_never_blank(
            raw in proptest::collection::vec("(TC-[1-3]|TC-1-2|REQ-1-TC-[1-3]| |)", 0..12)
        ) {
            let cases: Vec<Value> = raw.iter().map(|id| json!({"id": id, "title": "t"})).collect();
            let mut doc = obj(json!({"cases": cases}));
            normalize_testcases(&mut doc, "REQ-1");

            let ids: Vec<String> = doc["cases"]
                .as_array()
                .unwrap()
                .iter()
                .map(|c| c["id"].as_str().unwrap().to_string())
                .collect();
            let unique: HashSet<&String> = ids.iter().collect();
            prop_assert_eq!(unique.len(), raw.len());
            prop_assert!(ids.iter().all(|id| !id.trim().is_empty()));
        }
    }
}
