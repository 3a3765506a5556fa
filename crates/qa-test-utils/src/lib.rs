//! Testing utilities for the QAS workspace
//!
//! Scripted text generation, fault-injecting stores and suite fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use qa_artifact::{
    ArtifactKind, ArtifactRow, ArtifactStore, InMemoryArtifactStore, NewArtifact,
    PersistenceFailure, RowFilter, StoreError, StoreResult, SuiteId,
};
use qa_generation::{ClientError, GenerationEnv, InMemoryDocumentSource, TextGenerator};
use qa_versioning::{
    AuditEvent, EventSink, InMemoryEventLog, InMemorySuiteStore, Suite, SuiteStatus, SuiteStore,
    VersionHistoryEntry, VersionManager,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Scripted text generation
// ============================================================================

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail(String),
}

#[derive(Debug, Clone)]
struct Rule {
    needles: Vec<String>,
    reply: Reply,
    remaining: Option<usize>,
}

/// One call seen by a [`ScriptedGenerator`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub system: String,
    pub user: String,
}

impl RecordedCall {
    /// Task tag of the call (`TASK: <name>` line)
    pub fn task(&self) -> &str {
        self.user
            .lines()
            .next()
            .and_then(|line| line.strip_prefix("TASK: "))
            .unwrap_or_default()
    }
}

/// [`TextGenerator`] answering from substring rules
///
/// Rules are checked in insertion order; the first whose needles all occur in
/// the user prompt answers. Unmatched prompts fail with a transport error.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<RecordedCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every call for `delay` (to observe concurrency)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn push(&self, needles: &[&str], reply: Reply, remaining: Option<usize>) -> &Self {
        self.rules.lock().push(Rule {
            needles: needles.iter().map(|n| (*n).to_string()).collect(),
            reply,
            remaining,
        });
        self
    }

    /// Answer prompts containing `needle`
    pub fn on(&self, needle: &str, response: impl Into<String>) -> &Self {
        self.push(&[needle], Reply::Text(response.into()), None)
    }

    /// Answer prompts containing every needle
    pub fn on_all(&self, needles: &[&str], response: impl Into<String>) -> &Self {
        self.push(needles, Reply::Text(response.into()), None)
    }

    /// Answer the next prompt containing `needle`, once
    pub fn once(&self, needle: &str, response: impl Into<String>) -> &Self {
        self.push(&[needle], Reply::Text(response.into()), Some(1))
    }

    /// Fail prompts containing every needle
    pub fn fail_on(&self, needles: &[&str], message: impl Into<String>) -> &Self {
        self.push(needles, Reply::Fail(message.into()), None)
    }

    /// All calls so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Number of calls for one task tag
    pub fn calls_for(&self, task: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.task() == task).count()
    }

    /// Highest number of calls observed in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn answer(&self, user_prompt: &str) -> Option<Reply> {
        let mut rules = self.rules.lock();
        let rule = rules.iter_mut().find(|rule| {
            rule.remaining != Some(0) && rule.needles.iter().all(|n| user_prompt.contains(n.as_str()))
        })?;
        if let Some(remaining) = rule.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(rule.reply.clone())
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ClientError> {
        self.calls.lock().push(RecordedCall {
            system: system_prompt.to_string(),
            user: user_prompt.to_string(),
        });
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.answer(user_prompt);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail(message)) => Err(ClientError::Transport(message)),
            None => {
                let task = user_prompt.lines().next().unwrap_or_default();
                Err(ClientError::Transport(format!("no scripted response for {task}")))
            }
        }
    }
}

// ============================================================================
// Fault injection
// ============================================================================

/// Store operation a fault applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Insert,
    Query,
    Deactivate,
}

/// Artifact store that fails chosen operations on chosen kinds
#[derive(Debug, Default)]
pub struct FlakyArtifactStore {
    inner: InMemoryArtifactStore,
    faults: Mutex<HashSet<(ArtifactKind, StoreOp)>>,
}

impl FlakyArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start failing `op` on `kind`
    pub fn fail(&self, kind: ArtifactKind, op: StoreOp) {
        self.faults.lock().insert((kind, op));
    }

    /// Stop failing `op` on `kind`
    pub fn heal(&self, kind: ArtifactKind, op: StoreOp) {
        self.faults.lock().remove(&(kind, op));
    }

    /// Wrapped store
    pub fn inner(&self) -> &InMemoryArtifactStore {
        &self.inner
    }

    fn check(&self, kind: ArtifactKind, op: StoreOp) -> StoreResult<()> {
        if self.faults.lock().contains(&(kind, op)) {
            return Err(StoreError::Unavailable(format!("injected {op:?} fault on {kind}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for FlakyArtifactStore {
    async fn insert(&self, kind: ArtifactKind, row: NewArtifact) -> StoreResult<ArtifactRow> {
        self.check(kind, StoreOp::Insert)?;
        self.inner.insert(kind, row).await
    }

    async fn query(&self, kind: ArtifactKind, filter: &RowFilter) -> StoreResult<Vec<ArtifactRow>> {
        self.check(kind, StoreOp::Query)?;
        self.inner.query(kind, filter).await
    }

    async fn deactivate(&self, kind: ArtifactKind, filter: &RowFilter) -> StoreResult<usize> {
        self.check(kind, StoreOp::Deactivate)?;
        self.inner.deactivate(kind, filter).await
    }
}

/// Suite store whose writes can be switched off
#[derive(Debug, Default)]
pub struct FlakySuiteStore {
    inner: InMemorySuiteStore,
    fail_writes: AtomicBool,
}

impl FlakySuiteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, suite_id: SuiteId) {
        self.inner.create(suite_id);
    }

    /// Make every write fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected suite write fault".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SuiteStore for FlakySuiteStore {
    async fn load(&self, suite_id: &SuiteId) -> StoreResult<Option<Suite>> {
        self.inner.load(suite_id).await
    }

    async fn append_version(
        &self,
        suite_id: &SuiteId,
        expected_latest: u32,
        entry: VersionHistoryEntry,
    ) -> StoreResult<bool> {
        self.check()?;
        self.inner.append_version(suite_id, expected_latest, entry).await
    }

    async fn write_agent_state(&self, suite_id: &SuiteId, state: Option<Value>) -> StoreResult<()> {
        self.check()?;
        self.inner.write_agent_state(suite_id, state).await
    }

    async fn set_status(&self, suite_id: &SuiteId, status: SuiteStatus) -> StoreResult<()> {
        self.check()?;
        self.inner.set_status(suite_id, status).await
    }
}

/// Event sink that rejects every event
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingEventSink;

#[async_trait]
impl EventSink for FailingEventSink {
    async fn record(&self, _suite_id: &SuiteId, event: AuditEvent) -> Result<(), PersistenceFailure> {
        Err(PersistenceFailure::new(
            format!("record {}", event.event_type()),
            StoreError::Unavailable("event log offline".into()),
        ))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// In-memory stores around one suite
pub struct TestStores {
    pub artifacts: Arc<InMemoryArtifactStore>,
    pub suites: Arc<InMemorySuiteStore>,
    pub events: Arc<InMemoryEventLog>,
    pub documents: Arc<InMemoryDocumentSource>,
    pub suite: SuiteId,
}

impl TestStores {
    /// Stores with suite `suite-1` created
    pub fn new() -> Self {
        let suites = Arc::new(InMemorySuiteStore::new());
        let suite = SuiteId::new("suite-1");
        suites.create(suite.clone());
        Self {
            artifacts: Arc::new(InMemoryArtifactStore::new()),
            suites,
            events: Arc::new(InMemoryEventLog::new()),
            documents: Arc::new(InMemoryDocumentSource::new()),
            suite,
        }
    }

    /// Attach a document to the suite
    pub fn with_document(self, name: &str, text: &str) -> Self {
        self.documents.put_document(&self.suite, name, text);
        self
    }

    pub fn versions(&self) -> VersionManager {
        VersionManager::new(self.artifacts.clone(), self.suites.clone(), self.events.clone())
    }

    pub fn env(&self, client: Arc<ScriptedGenerator>) -> GenerationEnv {
        GenerationEnv::new(client, self.documents.clone(), self.versions())
    }

    /// Active rows of `kind` for the suite
    pub fn active(&self, kind: ArtifactKind) -> Vec<ArtifactRow> {
        self.artifacts
            .dump(kind)
            .into_iter()
            .filter(|row| row.suite_id == self.suite && row.active)
            .collect()
    }
}

impl Default for TestStores {
    fn default() -> Self {
        Self::new()
    }
}

/// Extractor output with `n` requirements `REQ-1..=REQ-n`
pub fn requirements_json(n: usize) -> String {
    let items: Vec<Value> = (1..=n)
        .map(|i| json!({"id": format!("REQ-{i}"), "source": "spec.txt", "text": format!("Requirement {i}")}))
        .collect();
    Value::Array(items).to_string()
}

/// Test case writer output for one requirement
pub fn testcases_json(req_code: &str) -> String {
    json!({
        "requirement_id": req_code,
        "source": "spec.txt",
        "requirement_text": format!("Restated {req_code}"),
        "cases": [
            {"id": "TC-1", "type": "happy", "title": "works", "preconditions": ["ready"], "steps": ["do it"], "expected": "ok"},
            {"id": "TC-2", "type": "negative", "title": "rejects", "preconditions": [], "steps": ["do wrong"], "expected": "error"}
        ]
    })
    .to_string()
}

/// Test design output with one flow per listed requirement
pub fn design_json(testing_type: &str, codes: &[&str]) -> String {
    let flows: Vec<Value> = codes
        .iter()
        .enumerate()
        .map(|(i, code)| json!({"id": format!("FLOW-{}", i + 1), "name": format!("Flow for {code}"), "steps": ["start", "finish"], "requirements": [code]}))
        .collect();
    json!({"testing_type": testing_type, "flows": flows}).to_string()
}

/// Viewpoint output with one `Boundary` viewpoint per listed requirement
pub fn viewpoints_json(codes: &[&str]) -> String {
    let groups: Vec<Value> = codes
        .iter()
        .map(|code| json!({"req_code": code, "items": [{"name": "Boundary", "rationale": "limits"}]}))
        .collect();
    json!({"viewpoints": groups}).to_string()
}
