//! Auditable suite events
//!
//! Recording is best-effort: sinks return [`PersistenceFailure`] and callers
//! log it and move on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use qa_artifact::{PersistenceFailure, SuiteId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event payloads, tagged by `event_type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A version was cut
    NewVersion {
        /// New version number
        version: u32,
        /// Version description
        description: String,
    },
    /// The coordinator asked the human a question and halted
    AskUser {
        /// Machine-distinguishable question tag
        question: String,
        /// Question text
        message: String,
    },
    /// Test cases were rewritten by an edit instruction
    #[serde(rename = "testcases_edited_bulk")]
    TestcasesEdited {
        /// Version holding the edits (`None` when nothing applied)
        version: Option<u32>,
        /// Per-requirement outcome: diff and replacement, or an error tag
        edits: Vec<Value>,
        /// Summary of the change
        summary: String,
        /// Instruction as the user phrased it
        user_edit_request: String,
    },
    /// One role turn of a workflow run
    Turn {
        /// Role that acted
        role: String,
        /// Turn output
        content: String,
    },
}

impl AuditEvent {
    /// The `event_type` tag
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::NewVersion { .. } => "new_version",
            Self::AskUser { .. } => "ask_user",
            Self::TestcasesEdited { .. } => "testcases_edited_bulk",
            Self::Turn { .. } => "turn",
        }
    }
}

/// A recorded event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Suite the event belongs to
    pub suite_id: SuiteId,
    /// Payload
    pub event: AuditEvent,
    /// Record time
    pub timestamp: DateTime<Utc>,
}

/// Destination for audit events
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Record one event
    ///
    /// # Errors
    /// Returns [`PersistenceFailure`] if the event could not be stored
    async fn record(&self, suite_id: &SuiteId, event: AuditEvent) -> Result<(), PersistenceFailure>;
}

/// Append-only in-memory event log
#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    inner: Mutex<Vec<RecordedEvent>>,
}

impl InMemoryEventLog {
    /// Empty log
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events in record order
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.inner.lock().clone()
    }

    /// Events of one suite with the given `event_type`
    #[must_use]
    pub fn of_type(&self, suite_id: &SuiteId, event_type: &str) -> Vec<AuditEvent> {
        self.inner
            .lock()
            .iter()
            .filter(|e| e.suite_id == *suite_id && e.event.event_type() == event_type)
            .map(|e| e.event.clone())
            .collect()
    }
}

#[async_trait]
impl EventSink for InMemoryEventLog {
    async fn record(&self, suite_id: &SuiteId, event: AuditEvent) -> Result<(), PersistenceFailure> {
        self.inner.lock().push(RecordedEvent {
            suite_id: suite_id.clone(),
            event,
            timestamp: Utc::now(),
        });
        Ok(())
    }
}

/// Sink that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn record(&self, _suite_id: &SuiteId, _event: AuditEvent) -> Result<(), PersistenceFailure> {
        Ok(())
    }
}
