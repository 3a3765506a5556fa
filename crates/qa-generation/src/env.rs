//! Shared generator environment
//!
//! Bundles the collaborators every generator needs (text generator, document
//! source, version manager, requirements cache) and the read/write helpers
//! that classify store failures as critical.

use crate::cache::{RequirementRecord, RequirementsCache, DEFAULT_CACHED_SUITES};
use crate::client::TextGenerator;
use crate::documents::{Document, DocumentSource};
use crate::error::GenerationError;
use crate::prompts::Prompt;
use qa_artifact::{
    ArtifactKind, ArtifactRow, ArtifactStore, NewArtifact, PersistenceFailure, RowFilter,
    StoreError, SuiteId,
};
use qa_versioning::{VersionCut, VersionManager};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Hard ceiling on concurrent generation calls in bulk mode
pub const MAX_BULK_CONCURRENCY: usize = 6;

/// Generator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Concurrent generation calls in bulk mode (clamped to 1..=6)
    pub max_bulk_concurrency: usize,
    /// Per-document character limit for extraction
    pub max_document_chars: usize,
    /// Per-document character limit for previews and gap analysis
    pub preview_document_chars: usize,
    /// Character limit of each JSON context block in prompts
    pub context_chars: usize,
    /// Per-document character limit for direct test case generation
    pub direct_document_chars: usize,
    /// Suites held by the requirements cache
    pub cached_suites: u64,
}

impl GenerationConfig {
    /// Create default config
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bulk concurrency
    #[inline]
    #[must_use]
    pub fn with_max_bulk_concurrency(mut self, n: usize) -> Self {
        self.max_bulk_concurrency = n;
        self
    }

    /// Set extraction document limit
    #[inline]
    #[must_use]
    pub fn with_max_document_chars(mut self, n: usize) -> Self {
        self.max_document_chars = n;
        self
    }

    /// Set context block limit
    #[inline]
    #[must_use]
    pub fn with_context_chars(mut self, n: usize) -> Self {
        self.context_chars = n;
        self
    }

    /// Effective bulk concurrency
    #[inline]
    #[must_use]
    pub fn bulk_concurrency(&self) -> usize {
        self.max_bulk_concurrency.clamp(1, MAX_BULK_CONCURRENCY)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_bulk_concurrency: MAX_BULK_CONCURRENCY,
            max_document_chars: 80_000,
            preview_document_chars: 12_000,
            context_chars: 12_000,
            direct_document_chars: 16_000,
            cached_suites: DEFAULT_CACHED_SUITES,
        }
    }
}

/// Collaborators shared by all generators
#[derive(Clone)]
pub struct GenerationEnv {
    client: Arc<dyn TextGenerator>,
    documents: Arc<dyn DocumentSource>,
    versions: VersionManager,
    cache: RequirementsCache,
    config: GenerationConfig,
}

impl std::fmt::Debug for GenerationEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationEnv")
            .field("versions", &self.versions)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GenerationEnv {
    /// Create an environment with default settings and a fresh cache
    #[must_use]
    pub fn new(
        client: Arc<dyn TextGenerator>,
        documents: Arc<dyn DocumentSource>,
        versions: VersionManager,
    ) -> Self {
        Self {
            client,
            documents,
            versions,
            cache: RequirementsCache::default(),
            config: GenerationConfig::default(),
        }
    }

    /// Override settings
    #[must_use]
    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing cache
    #[must_use]
    pub fn with_cache(mut self, cache: RequirementsCache) -> Self {
        self.cache = cache;
        self
    }

    /// Settings
    #[inline]
    #[must_use]
    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Version manager
    #[inline]
    #[must_use]
    pub fn versions(&self) -> &VersionManager {
        &self.versions
    }

    /// Requirements cache
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &RequirementsCache {
        &self.cache
    }

    /// Document source
    #[inline]
    #[must_use]
    pub fn documents(&self) -> &Arc<dyn DocumentSource> {
        &self.documents
    }

    /// Artifact store
    #[inline]
    #[must_use]
    pub fn artifacts(&self) -> &Arc<dyn ArtifactStore> {
        self.versions.artifacts()
    }

    /// Run one generation call
    ///
    /// # Errors
    /// Returns [`GenerationError::Client`] if the call fails
    pub async fn complete(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        tracing::debug!("Generating {}: {} prompt chars", prompt.task, prompt.user.len());
        Ok(self.client.generate(&prompt.system, &prompt.user).await?)
    }

    /// Latest version of a suite
    ///
    /// # Errors
    /// Returns [`GenerationError::Versioning`] if the suite is unreadable
    pub async fn latest_version(&self, suite_id: &SuiteId) -> Result<u32, GenerationError> {
        Ok(self.versions.current_version(suite_id).await?)
    }

    /// Cut a version and drop the suite's cached requirements
    ///
    /// # Errors
    /// Returns [`GenerationError::Versioning`]; nothing may be written then
    pub async fn cut(
        &self,
        suite_id: &SuiteId,
        description: &str,
        replaces: &[ArtifactKind],
    ) -> Result<VersionCut, GenerationError> {
        let cut = self
            .versions
            .cut_version_replacing(suite_id, description, None, replaces)
            .await?;
        self.cache.invalidate(suite_id).await;
        Ok(cut)
    }

    /// Rows of `kind` at `version`, last write per natural key
    ///
    /// # Errors
    /// Returns [`GenerationError::Store`]; reads of required input are critical
    pub async fn snapshot(
        &self,
        kind: ArtifactKind,
        suite_id: &SuiteId,
        version: u32,
    ) -> Result<Vec<ArtifactRow>, GenerationError> {
        if version == 0 {
            return Ok(Vec::new());
        }
        self.artifacts()
            .snapshot(kind, suite_id, version)
            .await
            .map_err(|e| PersistenceFailure::new(format!("read {}", kind.table()), e).into())
    }

    /// Requirements at `version`, served from the cache when possible
    ///
    /// # Errors
    /// Returns [`GenerationError::Store`] if the rows cannot be read
    pub async fn requirements_at(
        &self,
        suite_id: &SuiteId,
        version: u32,
    ) -> Result<Arc<Vec<RequirementRecord>>, GenerationError> {
        if let Some(hit) = self.cache.get(suite_id, version).await {
            return Ok(hit);
        }
        let records = self
            .snapshot(ArtifactKind::Requirement, suite_id, version)
            .await?
            .iter()
            .filter_map(RequirementRecord::from_row)
            .collect();
        Ok(self.cache.prime(suite_id, version, records).await)
    }

    /// Latest version and the requirements stored at it
    ///
    /// # Errors
    /// See [`requirements_at`](Self::requirements_at)
    pub async fn requirements(
        &self,
        suite_id: &SuiteId,
    ) -> Result<(u32, Arc<Vec<RequirementRecord>>), GenerationError> {
        let version = self.latest_version(suite_id).await?;
        Ok((version, self.requirements_at(suite_id, version).await?))
    }

    /// Documents of a suite, each cut to `max_chars`
    ///
    /// # Errors
    /// Returns [`GenerationError::NoInputData`] when the suite has none
    pub async fn load_documents(
        &self,
        suite_id: &SuiteId,
        max_chars: usize,
    ) -> Result<Vec<Document>, GenerationError> {
        let documents = self
            .documents
            .documents(suite_id, max_chars)
            .await
            .map_err(|e| {
                PersistenceFailure::new("read documents", StoreError::Unavailable(e.to_string()))
            })?;
        if documents.is_empty() {
            return Err(GenerationError::no_input("No .txt docs in suite."));
        }
        Ok(documents)
    }

    /// Deactivate rows of `kind` matching `filter`
    ///
    /// # Errors
    /// Returns [`GenerationError::Store`]
    pub async fn deactivate(&self, kind: ArtifactKind, filter: &RowFilter) -> Result<usize, GenerationError> {
        self.artifacts()
            .deactivate(kind, filter)
            .await
            .map_err(|e| PersistenceFailure::new(format!("deactivate {}", kind.table()), e).into())
    }

    /// Make `row` the single active row for its natural key
    ///
    /// # Errors
    /// Returns [`GenerationError::Store`]
    pub async fn replace_active(&self, row: NewArtifact) -> Result<ArtifactRow, GenerationError> {
        let kind = row.kind();
        let filter = RowFilter::suite(&row.suite_id)
            .with_active(true)
            .with_natural_key(row.key.natural_key());
        self.deactivate(kind, &filter).await?;
        self.insert(row).await
    }

    /// Insert one row
    ///
    /// # Errors
    /// Returns [`GenerationError::Store`]
    pub async fn insert(&self, row: NewArtifact) -> Result<ArtifactRow, GenerationError> {
        let kind = row.kind();
        self.artifacts()
            .insert(kind, row)
            .await
            .map_err(|e| PersistenceFailure::new(format!("insert {}", kind.table()), e).into())
    }
}
