//! In-memory artifact store

use crate::error::{StoreError, StoreResult};
use crate::kind::ArtifactKind;
use crate::row::{ArtifactRow, NewArtifact, RowFilter};
use crate::store::ArtifactStore;
use crate::RowId;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Row store backed by per-kind vectors
///
/// Reads take a shared lock; inserts and deactivations take the write lock
/// only for the touched table.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    tables: RwLock<HashMap<ArtifactKind, Vec<ArtifactRow>>>,
    next_seq: AtomicU64,
}

impl InMemoryArtifactStore {
    /// Empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in `kind`'s table (active or not)
    #[must_use]
    pub fn row_count(&self, kind: ArtifactKind) -> usize {
        self.tables.read().get(&kind).map_or(0, Vec::len)
    }

    /// Copy of every row in `kind`'s table
    #[must_use]
    pub fn dump(&self, kind: ArtifactKind) -> Vec<ArtifactRow> {
        self.tables.read().get(&kind).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn insert(&self, kind: ArtifactKind, row: NewArtifact) -> StoreResult<ArtifactRow> {
        if row.kind() != kind {
            return Err(StoreError::KindMismatch {
                key: row.kind(),
                table: kind,
            });
        }
        if row.version == 0 {
            return Err(StoreError::InvalidVersion(0));
        }

        let stored = ArtifactRow {
            id: RowId::new(),
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst) + 1,
            suite_id: row.suite_id,
            key: row.key,
            version: row.version,
            active: row.active,
            content: row.content,
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .entry(kind)
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn query(&self, kind: ArtifactKind, filter: &RowFilter) -> StoreResult<Vec<ArtifactRow>> {
        let tables = self.tables.read();
        let rows = tables
            .get(&kind)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default();
        Ok(rows)
    }

    async fn deactivate(&self, kind: ArtifactKind, filter: &RowFilter) -> StoreResult<usize> {
        let mut tables = self.tables.write();
        let Some(rows) = tables.get_mut(&kind) else {
            return Ok(0);
        };
        let mut changed = 0;
        for row in rows.iter_mut().filter(|r| r.active && filter.matches(r)) {
            row.active = false;
            changed += 1;
        }
        Ok(changed)
    }
}
