//! Suite row persistence

use crate::suite::{Suite, SuiteStatus, VersionHistoryEntry};
use async_trait::async_trait;
use dashmap::DashMap;
use qa_artifact::{StoreError, StoreResult, SuiteId};
use serde_json::Value;

/// Storage for suite rows
///
/// The suite row is the only resource several callers mutate.
/// [`append_version`](SuiteStore::append_version) is a compare-and-swap on
/// `latest_version`.
#[async_trait]
pub trait SuiteStore: Send + Sync {
    /// Load a suite, `None` if it does not exist
    ///
    /// # Errors
    /// Returns an error if the backend fails
    async fn load(&self, suite_id: &SuiteId) -> StoreResult<Option<Suite>>;

    /// Append a history entry if `latest_version` still equals `expected_latest`
    ///
    /// On success `latest_version` becomes `entry.version`.
    ///
    /// # Returns
    /// `true` if the entry was appended, `false` if another writer got there
    /// first
    ///
    /// # Errors
    /// Returns an error if the suite is missing or the backend fails
    async fn append_version(
        &self,
        suite_id: &SuiteId,
        expected_latest: u32,
        entry: VersionHistoryEntry,
    ) -> StoreResult<bool>;

    /// Replace the opaque coordinator state
    ///
    /// # Errors
    /// Returns an error if the suite is missing or the backend fails
    async fn write_agent_state(&self, suite_id: &SuiteId, state: Option<Value>) -> StoreResult<()>;

    /// Set the run status
    ///
    /// # Errors
    /// Returns an error if the suite is missing or the backend fails
    async fn set_status(&self, suite_id: &SuiteId, status: SuiteStatus) -> StoreResult<()>;
}

/// Suite store backed by a concurrent map
#[derive(Debug, Default)]
pub struct InMemorySuiteStore {
    suites: DashMap<SuiteId, Suite>,
}

impl InMemorySuiteStore {
    /// Empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an idle suite with no versions (no-op if it exists)
    pub fn create(&self, suite_id: SuiteId) {
        self.suites
            .entry(suite_id.clone())
            .or_insert_with(|| Suite::new(suite_id));
    }

    /// Insert or replace a whole suite row
    pub fn put(&self, suite: Suite) {
        self.suites.insert(suite.id.clone(), suite);
    }

    fn with_suite<T>(
        &self,
        suite_id: &SuiteId,
        f: impl FnOnce(&mut Suite) -> T,
    ) -> StoreResult<T> {
        let mut suite = self
            .suites
            .get_mut(suite_id)
            .ok_or_else(|| StoreError::SuiteNotFound(suite_id.clone()))?;
        Ok(f(&mut suite))
    }
}

#[async_trait]
impl SuiteStore for InMemorySuiteStore {
    async fn load(&self, suite_id: &SuiteId) -> StoreResult<Option<Suite>> {
        Ok(self.suites.get(suite_id).map(|s| s.clone()))
    }

    async fn append_version(
        &self,
        suite_id: &SuiteId,
        expected_latest: u32,
        entry: VersionHistoryEntry,
    ) -> StoreResult<bool> {
        self.with_suite(suite_id, |suite| {
            if suite.state.latest_version != expected_latest {
                return false;
            }
            suite.state.latest_version = entry.version;
            suite.state.version_history.push(entry);
            true
        })
    }

    async fn write_agent_state(&self, suite_id: &SuiteId, state: Option<Value>) -> StoreResult<()> {
        self.with_suite(suite_id, |suite| suite.state.agent_state = state)
    }

    async fn set_status(&self, suite_id: &SuiteId, status: SuiteStatus) -> StoreResult<()> {
        self.with_suite(suite_id, |suite| suite.status = status)
    }
}
