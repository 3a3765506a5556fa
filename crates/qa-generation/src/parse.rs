//! Model output parsing

use crate::error::GenerationError;
use serde_json::{Map, Value};

/// Strip a surrounding Markdown code fence, if any
#[must_use]
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening line
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parse model output as any JSON value
///
/// # Errors
/// Returns [`GenerationError::InvalidOutput`] if the text is not JSON
pub fn parse_json(raw: &str, what: &str) -> Result<Value, GenerationError> {
    serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| GenerationError::invalid_output(format!("{what}: {e}")))
}

/// Parse model output as a JSON object
///
/// # Errors
/// Returns [`GenerationError::InvalidOutput`] if the text is not a JSON object
pub fn parse_object(raw: &str, what: &str) -> Result<Map<String, Value>, GenerationError> {
    match parse_json(raw, what)? {
        Value::Object(map) => Ok(map),
        _ => Err(GenerationError::invalid_output(format!("{what}: expected a JSON object"))),
    }
}

/// Parse model output as a JSON array
///
/// # Errors
/// Returns [`GenerationError::InvalidOutput`] if the text is not a JSON array
pub fn parse_array(raw: &str, what: &str) -> Result<Vec<Value>, GenerationError> {
    match parse_json(raw, what)? {
        Value::Array(items) => Ok(items),
        _ => Err(GenerationError::invalid_output(format!("{what}: expected a JSON array"))),
    }
}

/// Render a scalar as text (`null` becomes empty)
#[must_use]
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Non-empty trimmed string field
#[must_use]
pub fn non_empty_str<'a>(map: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    map.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
