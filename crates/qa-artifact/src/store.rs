//! Artifact store contract
//!
//! A row store with one table per [`ArtifactKind`]. Inserts never touch
//! existing rows; the only mutation is clearing `active` through
//! [`ArtifactStore::deactivate`]. The store does not enforce the
//! single-active rule, callers deactivate before inserting.

use crate::error::StoreResult;
use crate::ids::SuiteId;
use crate::kind::{ArtifactKind, NaturalKey};
use crate::row::{ArtifactRow, NewArtifact, RowFilter};
use async_trait::async_trait;
use indexmap::IndexMap;

/// Typed CRUD over the four artifact tables
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Insert a row into `kind`'s table
    ///
    /// # Errors
    /// Returns an error if the key does not belong to `kind` or the backend
    /// fails
    async fn insert(&self, kind: ArtifactKind, row: NewArtifact) -> StoreResult<ArtifactRow>;

    /// Rows of `kind` matching `filter`, in insertion order
    ///
    /// # Errors
    /// Returns an error if the backend fails
    async fn query(&self, kind: ArtifactKind, filter: &RowFilter) -> StoreResult<Vec<ArtifactRow>>;

    /// Clear `active` on matching rows, returning how many changed
    ///
    /// # Errors
    /// Returns an error if the backend fails
    async fn deactivate(&self, kind: ArtifactKind, filter: &RowFilter) -> StoreResult<usize>;

    /// Complete view of `kind` at one version
    ///
    /// All rows stamped with `version`, reduced to the most recent write per
    /// natural key. A row cloned into a version and then overwritten inside
    /// the same version therefore resolves to the overwrite.
    ///
    /// # Errors
    /// Returns an error if the backend fails
    async fn snapshot(
        &self,
        kind: ArtifactKind,
        suite_id: &SuiteId,
        version: u32,
    ) -> StoreResult<Vec<ArtifactRow>> {
        let rows = self
            .query(kind, &RowFilter::suite(suite_id).with_version(version))
            .await?;
        Ok(latest_per_key(rows))
    }
}

/// Keep the highest-`seq` row per natural key, in first-seen key order
#[must_use]
pub fn latest_per_key(mut rows: Vec<ArtifactRow>) -> Vec<ArtifactRow> {
    rows.sort_by_key(|r| r.seq);
    let mut latest: IndexMap<NaturalKey, ArtifactRow> = IndexMap::new();
    for row in rows {
        latest.insert(row.natural_key(), row);
    }
    latest.into_values().collect()
}
