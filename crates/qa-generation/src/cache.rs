//! Requirements cache
//!
//! Explicit per-suite cache of the requirement rows at one version. An entry
//! is only served for the version it was built from; cutting any version
//! invalidates the suite, and extraction primes the fresh entry.

use moka::future::Cache;
use qa_artifact::{ArtifactRow, ContentDoc, RowId, SuiteId};
use std::sync::Arc;

/// Suites kept by a default cache
pub const DEFAULT_CACHED_SUITES: u64 = 1_000;

/// One requirement as generators consume it
#[derive(Debug, Clone, PartialEq)]
pub struct RequirementRecord {
    /// Row the record was read from
    pub row_id: RowId,
    /// Stable code, e.g. `REQ-3`
    pub req_code: String,
    /// Source document name
    pub source: String,
    /// Requirement text
    pub text: String,
    /// Full content
    pub content: ContentDoc,
}

impl RequirementRecord {
    /// Build from a requirement row; `None` for rows without a code
    #[must_use]
    pub fn from_row(row: &ArtifactRow) -> Option<Self> {
        let req_code = row.key.req_code()?.to_string();
        Some(Self {
            row_id: row.id,
            source: row
                .content
                .get_str("source")
                .unwrap_or("unknown.txt")
                .to_string(),
            text: row.content.get_str("text").unwrap_or_default().to_string(),
            content: row.content.clone(),
            req_code,
        })
    }
}

#[derive(Debug)]
struct Entry {
    version: u32,
    records: Arc<Vec<RequirementRecord>>,
}

/// Suite → requirements at a version
#[derive(Debug, Clone)]
pub struct RequirementsCache {
    inner: Cache<SuiteId, Arc<Entry>>,
}

impl RequirementsCache {
    /// Create a cache holding at most `max_suites` suites
    #[inline]
    #[must_use]
    pub fn new(max_suites: u64) -> Self {
        Self {
            inner: Cache::new(max_suites),
        }
    }

    /// Requirements of `suite_id` if cached for exactly `version`
    pub async fn get(&self, suite_id: &SuiteId, version: u32) -> Option<Arc<Vec<RequirementRecord>>> {
        self.inner
            .get(suite_id)
            .await
            .filter(|entry| entry.version == version)
            .map(|entry| entry.records.clone())
    }

    /// Store the requirements of `suite_id` at `version`
    pub async fn prime(
        &self,
        suite_id: &SuiteId,
        version: u32,
        records: Vec<RequirementRecord>,
    ) -> Arc<Vec<RequirementRecord>> {
        let records = Arc::new(records);
        let entry = Arc::new(Entry {
            version,
            records: records.clone(),
        });
        self.inner.insert(suite_id.clone(), entry).await;
        records
    }

    /// Drop the suite's entry
    #[inline]
    pub async fn invalidate(&self, suite_id: &SuiteId) {
        self.inner.invalidate(suite_id).await;
    }
}

impl Default for RequirementsCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHED_SUITES)
    }
}
