//! Suite row and persisted suite state

use chrono::{DateTime, Utc};
use qa_artifact::SuiteId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Whether a workflow run is in progress for the suite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteStatus {
    /// No run in progress
    #[default]
    Idle,
    /// A run is streaming turns
    Chatting,
}

impl fmt::Display for SuiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Chatting => f.write_str("chatting"),
        }
    }
}

/// One entry of the append-only version log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionHistoryEntry {
    /// Version number (starts at 1)
    pub version: u32,
    /// What produced the version
    pub description: String,
    /// When the version was cut
    pub timestamp: DateTime<Utc>,
}

impl VersionHistoryEntry {
    /// Entry stamped now
    #[must_use]
    pub fn new(version: u32, description: impl Into<String>) -> Self {
        Self {
            version,
            description: description.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Persisted `state` blob of a suite
///
/// Keys written by other components are kept in `extra` and round-trip
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuiteState {
    /// Opaque coordinator state
    #[serde(default)]
    pub agent_state: Option<Value>,
    /// Highest version cut so far (0 when none)
    #[serde(default)]
    pub latest_version: u32,
    /// One entry per cut, in cut order
    #[serde(default)]
    pub version_history: Vec<VersionHistoryEntry>,
    /// Unrecognized keys
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A suite: the unit of work owning one document set and its artifacts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suite {
    /// Suite id
    pub id: SuiteId,
    /// Run status
    pub status: SuiteStatus,
    /// Persisted state blob
    pub state: SuiteState,
}

impl Suite {
    /// Fresh idle suite with no versions
    #[must_use]
    pub fn new(id: SuiteId) -> Self {
        Self {
            id,
            status: SuiteStatus::Idle,
            state: SuiteState::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn state_keeps_unknown_keys() {
        let raw = json!({
            "latest_version": 2,
            "version_history": [],
            "ui_prefs": {"collapsed": true}
        });
        let state: SuiteState = serde_json::from_value(raw).unwrap();
        assert_eq!(state.latest_version, 2);
        assert!(state.agent_state.is_none());

        let back = serde_json::to_value(&state).unwrap();
        assert_eq!(back["ui_prefs"], json!({"collapsed": true}));
    }

    #[test]
    fn empty_state_defaults_to_version_zero() {
        let state: SuiteState = serde_json::from_value(json!({})).unwrap();
        assert_eq!(state.latest_version, 0);
        assert!(state.version_history.is_empty());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(SuiteStatus::Chatting).unwrap(), json!("chatting"));
    }
}
