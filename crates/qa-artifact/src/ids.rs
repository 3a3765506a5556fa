//! Identifier types shared by every artifact table

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Suite identifier
///
/// Suites are created outside this system, so the id is an opaque string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SuiteId(String);

impl SuiteId {
    /// Wrap an externally assigned suite id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SuiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SuiteId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SuiteId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Unique row identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub Ulid);

impl RowId {
    /// Generate new row ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suite_id_is_transparent_in_json() {
        let id = SuiteId::new("suite-42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"suite-42\"");
        assert_eq!(id.to_string(), "suite-42");
    }

    #[test]
    fn row_ids_are_unique() {
        assert_ne!(RowId::new(), RowId::new());
    }
}
