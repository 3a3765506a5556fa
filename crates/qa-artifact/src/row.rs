//! Stored rows and row filters

use crate::content::ContentDoc;
use crate::ids::{RowId, SuiteId};
use crate::kind::{ArtifactKey, ArtifactKind, NaturalKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One immutable artifact row
///
/// Only the `active` flag ever changes after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRow {
    /// Row identifier
    pub id: RowId,
    /// Store-assigned insertion sequence (monotonic across tables)
    pub seq: u64,
    /// Owning suite
    pub suite_id: SuiteId,
    /// Identifying columns and lineage links
    pub key: ArtifactKey,
    /// Suite version this row belongs to
    pub version: u32,
    /// Whether this is the authoritative row for its natural key
    pub active: bool,
    /// Open JSON content
    pub content: ContentDoc,
    /// Insert time
    pub created_at: DateTime<Utc>,
}

impl ArtifactRow {
    /// Kind of this row
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ArtifactKind {
        self.key.kind()
    }

    /// Natural key of this row
    #[inline]
    #[must_use]
    pub fn natural_key(&self) -> NaturalKey {
        self.key.natural_key()
    }
}

/// A row about to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewArtifact {
    /// Owning suite
    pub suite_id: SuiteId,
    /// Target version
    pub version: u32,
    /// Identifying columns
    pub key: ArtifactKey,
    /// Content
    pub content: ContentDoc,
    /// Initial active flag
    pub active: bool,
}

impl NewArtifact {
    /// New active row
    #[must_use]
    pub fn new(suite_id: SuiteId, version: u32, key: ArtifactKey, content: ContentDoc) -> Self {
        Self {
            suite_id,
            version,
            key,
            content,
            active: true,
        }
    }

    /// Insert as inactive (historical) row
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Kind implied by the key
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ArtifactKind {
        self.key.kind()
    }
}

/// Conjunctive row filter; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFilter {
    suite_id: Option<SuiteId>,
    version: Option<u32>,
    active: Option<bool>,
    natural_key: Option<NaturalKey>,
    req_code: Option<String>,
}

impl RowFilter {
    /// Match-all filter
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows of one suite
    #[inline]
    #[must_use]
    pub fn suite(suite_id: &SuiteId) -> Self {
        Self::new().with_suite(suite_id.clone())
    }

    /// Restrict to a suite
    #[inline]
    #[must_use]
    pub fn with_suite(mut self, suite_id: SuiteId) -> Self {
        self.suite_id = Some(suite_id);
        self
    }

    /// Restrict to a version
    #[inline]
    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    /// Restrict by active flag
    #[inline]
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    /// Restrict to one natural key
    #[inline]
    #[must_use]
    pub fn with_natural_key(mut self, key: NaturalKey) -> Self {
        self.natural_key = Some(key);
        self
    }

    /// Restrict to rows owned by a requirement code
    #[inline]
    #[must_use]
    pub fn with_req_code(mut self, req_code: impl Into<String>) -> Self {
        self.req_code = Some(req_code.into());
        self
    }

    /// Whether `row` passes every set condition
    #[must_use]
    pub fn matches(&self, row: &ArtifactRow) -> bool {
        self.suite_id.as_ref().map_or(true, |s| *s == row.suite_id)
            && self.version.map_or(true, |v| v == row.version)
            && self.active.map_or(true, |a| a == row.active)
            && self
                .natural_key
                .as_ref()
                .map_or(true, |k| *k == row.natural_key())
            && self
                .req_code
                .as_deref()
                .map_or(true, |code| row.key.req_code() == Some(code))
    }
}
