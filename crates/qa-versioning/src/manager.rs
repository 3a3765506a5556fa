//! Version manager
//!
//! Owns a suite's monotonic version counter and history log, and clones
//! untouched artifact kinds forward so every version is a complete snapshot.

use crate::audit::{AuditEvent, EventSink};
use crate::error::VersioningFailure;
use crate::suite::{Suite, VersionHistoryEntry};
use crate::suite_store::SuiteStore;
use qa_artifact::{
    ArtifactKind, ArtifactStore, NewArtifact, PersistenceFailure, RowFilter, RowId, SuiteId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Version manager settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersioningConfig {
    /// Compare-and-swap attempts before giving up on a contended suite
    pub max_cut_attempts: u32,
}

impl VersioningConfig {
    /// Create default config
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max cut attempts (at least 1)
    #[inline]
    #[must_use]
    pub fn with_max_cut_attempts(mut self, attempts: u32) -> Self {
        self.max_cut_attempts = attempts.max(1);
        self
    }
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self {
            max_cut_attempts: 3,
        }
    }
}

/// Result of cutting a version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCut {
    /// The new version number
    pub version: u32,
    /// History description
    pub description: String,
    /// Version the clone step copied from (`None` for version 1)
    pub source_version: Option<u32>,
    /// Rows cloned per kind
    pub cloned: BTreeMap<ArtifactKind, usize>,
    /// Kinds whose clone failed (logged, not fatal)
    pub failed_kinds: Vec<ArtifactKind>,
}

/// Result of a restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreOutcome {
    /// Version holding the restored content
    pub new_version: u32,
    /// Version whose content was copied
    pub restored_from: u32,
}

/// Cuts versions and clones artifacts forward
#[derive(Clone)]
pub struct VersionManager {
    artifacts: Arc<dyn ArtifactStore>,
    suites: Arc<dyn SuiteStore>,
    events: Arc<dyn EventSink>,
    config: VersioningConfig,
}

impl std::fmt::Debug for VersionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl VersionManager {
    /// Create a manager over the given stores
    #[must_use]
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        suites: Arc<dyn SuiteStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            artifacts,
            suites,
            events,
            config: VersioningConfig::default(),
        }
    }

    /// Override settings
    #[must_use]
    pub fn with_config(mut self, config: VersioningConfig) -> Self {
        self.config = config;
        self
    }

    /// Artifact store this manager clones through
    #[must_use]
    pub fn artifacts(&self) -> &Arc<dyn ArtifactStore> {
        &self.artifacts
    }

    /// Suite store holding the version counter
    #[must_use]
    pub fn suites(&self) -> &Arc<dyn SuiteStore> {
        &self.suites
    }

    /// Audit sink
    #[must_use]
    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    /// Cut a new version, cloning every artifact kind forward
    ///
    /// # Arguments
    /// * `suite_id` - Suite to version
    /// * `description` - History description
    /// * `source_version` - Version to clone from (default: previous version)
    ///
    /// # Errors
    /// Returns [`VersioningFailure`] if the counter could not be advanced.
    /// Clone failures of individual kinds are logged and reported in
    /// [`VersionCut::failed_kinds`] instead.
    pub async fn cut_version(
        &self,
        suite_id: &SuiteId,
        description: &str,
        source_version: Option<u32>,
    ) -> Result<VersionCut, VersioningFailure> {
        self.cut_version_replacing(suite_id, description, source_version, &[])
            .await
    }

    /// Cut a new version, leaving `replaces` kinds for the caller to fill
    ///
    /// Kinds in `replaces` are about to be regenerated wholesale, so they are
    /// not cloned.
    ///
    /// # Errors
    /// See [`cut_version`](Self::cut_version)
    pub async fn cut_version_replacing(
        &self,
        suite_id: &SuiteId,
        description: &str,
        source_version: Option<u32>,
        replaces: &[ArtifactKind],
    ) -> Result<VersionCut, VersioningFailure> {
        let version = self
            .advance_counter(suite_id, description, source_version)
            .await?;
        tracing::info!("Cut version {} of suite {}: {}", version, suite_id, description);

        let mut cut = VersionCut {
            version,
            description: description.to_string(),
            source_version: None,
            cloned: BTreeMap::new(),
            failed_kinds: Vec::new(),
        };

        if version > 1 {
            let source = source_version.unwrap_or(version - 1);
            cut.source_version = Some(source);
            self.clone_forward(suite_id, source, version, replaces, &mut cut)
                .await;
        }

        let event = AuditEvent::NewVersion {
            version,
            description: description.to_string(),
        };
        if let Err(e) = self.events.record(suite_id, event).await {
            tracing::warn!("Failed to record new_version event for {}: {}", suite_id, e);
        }

        Ok(cut)
    }

    /// Create a new version whose content equals `source_version`
    ///
    /// Never rolls back in place: the restored content lands in a fresh
    /// version described as `Restored from v<N>`.
    ///
    /// # Errors
    /// Returns [`VersioningFailure::UnknownSourceVersion`] unless
    /// `1 <= source_version <= latest_version`, or any cut failure
    pub async fn restore(
        &self,
        suite_id: &SuiteId,
        source_version: u32,
    ) -> Result<RestoreOutcome, VersioningFailure> {
        let latest = self.current_version(suite_id).await?;
        if source_version == 0 || source_version > latest {
            return Err(VersioningFailure::UnknownSourceVersion {
                requested: source_version,
                latest,
            });
        }

        let description = format!("Restored from v{source_version}");
        let cut = self
            .cut_version(suite_id, &description, Some(source_version))
            .await?;
        Ok(RestoreOutcome {
            new_version: cut.version,
            restored_from: source_version,
        })
    }

    /// Latest version of a suite (0 when none were cut)
    ///
    /// # Errors
    /// Returns an error if the suite is missing or unreadable
    pub async fn current_version(&self, suite_id: &SuiteId) -> Result<u32, VersioningFailure> {
        Ok(self.load_suite(suite_id).await?.state.latest_version)
    }

    /// Version history, oldest first
    ///
    /// # Errors
    /// Returns an error if the suite is missing or unreadable
    pub async fn history(
        &self,
        suite_id: &SuiteId,
    ) -> Result<Vec<VersionHistoryEntry>, VersioningFailure> {
        Ok(self.load_suite(suite_id).await?.state.version_history)
    }

    async fn load_suite(&self, suite_id: &SuiteId) -> Result<Suite, VersioningFailure> {
        self.suites
            .load(suite_id)
            .await
            .map_err(|source| VersioningFailure::StateRead {
                suite: suite_id.clone(),
                source,
            })?
            .ok_or_else(|| VersioningFailure::SuiteNotFound(suite_id.clone()))
    }

    /// Read-then-CAS loop on `latest_version`
    async fn advance_counter(
        &self,
        suite_id: &SuiteId,
        description: &str,
        source_version: Option<u32>,
    ) -> Result<u32, VersioningFailure> {
        let max_attempts = self.config.max_cut_attempts.max(1);
        for attempt in 1..=max_attempts {
            let prior = self.load_suite(suite_id).await?.state.latest_version;
            if let Some(source) = source_version {
                if source == 0 || source > prior {
                    return Err(VersioningFailure::UnknownSourceVersion {
                        requested: source,
                        latest: prior,
                    });
                }
            }

            let version = prior + 1;
            let entry = VersionHistoryEntry::new(version, description);
            let appended = self
                .suites
                .append_version(suite_id, prior, entry)
                .await
                .map_err(|source| VersioningFailure::StateWrite {
                    suite: suite_id.clone(),
                    source,
                })?;
            if appended {
                return Ok(version);
            }
            tracing::debug!(
                "Version counter of {} moved past {} (attempt {}/{})",
                suite_id,
                prior,
                attempt,
                max_attempts
            );
        }

        tracing::error!("Giving up cutting a version of {} after {} attempts", suite_id, max_attempts);
        Err(VersioningFailure::Contention {
            suite: suite_id.clone(),
            attempts: max_attempts,
        })
    }

    async fn clone_forward(
        &self,
        suite_id: &SuiteId,
        source: u32,
        target: u32,
        replaces: &[ArtifactKind],
        cut: &mut VersionCut,
    ) {
        // Old row id -> cloned row id, filled in dependency order so later
        // kinds can follow their lineage links.
        let mut remap: HashMap<RowId, RowId> = HashMap::new();

        for kind in ArtifactKind::ALL {
            if replaces.contains(&kind) {
                continue;
            }
            match self
                .clone_kind(suite_id, kind, source, target, &mut remap)
                .await
            {
                Ok(Some(rows)) => {
                    tracing::debug!("Cloned {} {} rows v{} -> v{}", rows, kind, source, target);
                    cut.cloned.insert(kind, rows);
                }
                Ok(None) => {
                    tracing::debug!("Skipped cloning {}: rows already at v{}", kind, target);
                }
                Err(e) => {
                    tracing::warn!("Clone of {} for {} failed: {}", kind, suite_id, e);
                    cut.failed_kinds.push(kind);
                }
            }
        }
    }

    /// Clone one kind; `None` when the target version already has rows
    async fn clone_kind(
        &self,
        suite_id: &SuiteId,
        kind: ArtifactKind,
        source: u32,
        target: u32,
        remap: &mut HashMap<RowId, RowId>,
    ) -> Result<Option<usize>, PersistenceFailure> {
        let table = kind.table();
        let existing = self
            .artifacts
            .query(kind, &RowFilter::suite(suite_id).with_version(target))
            .await
            .map_err(|e| PersistenceFailure::new(format!("query {table}"), e))?;
        if !existing.is_empty() {
            return Ok(None);
        }

        let rows = self
            .artifacts
            .snapshot(kind, suite_id, source)
            .await
            .map_err(|e| PersistenceFailure::new(format!("snapshot {table}"), e))?;

        self.artifacts
            .deactivate(kind, &RowFilter::suite(suite_id).with_active(true))
            .await
            .map_err(|e| PersistenceFailure::new(format!("deactivate {table}"), e))?;

        for row in &rows {
            let mut key = row.key.clone();
            key.remap_links(remap);
            let copy = NewArtifact::new(suite_id.clone(), target, key, row.content.clone());
            let inserted = self
                .artifacts
                .insert(kind, copy)
                .await
                .map_err(|e| PersistenceFailure::new(format!("insert {table}"), e))?;
            remap.insert(row.id, inserted.id);
        }
        Ok(Some(rows.len()))
    }
}
