//! Generator contract
//!
//! A generator turns upstream context into one kind of artifact. The shared
//! [`produce`](ArtifactGenerator::produce) flow is:
//!
//! 1. load context at the current version
//! 2. call the model and validate the output
//! 3. cut a new version (cloning untouched kinds forward)
//! 4. persist under that version
//!
//! Invalid output fails at step 2, so it never consumes a version and nothing
//! is written. A failed cut stops before step 4.

use crate::env::GenerationEnv;
use crate::error::GenerationError;
use async_trait::async_trait;
use qa_artifact::{ArtifactKind, ArtifactRow, SuiteId};

/// Output of a full generate-and-persist run
#[derive(Debug, Clone)]
pub struct Produced<T> {
    /// Version the artifact was written under
    pub version: u32,
    /// Validated generator output
    pub output: T,
    /// Rows inserted
    pub rows: Vec<ArtifactRow>,
}

/// One generator per artifact kind
#[async_trait]
pub trait ArtifactGenerator: Send + Sync {
    /// Caller-supplied parameters (testing type, requirement code, ...)
    type Request: Send + Sync;
    /// Upstream input loaded before generation
    type Context: Send + Sync;
    /// Validated, normalized content ready to persist
    type Output: Send + Sync;

    /// Kind this generator writes
    const KIND: ArtifactKind;

    /// Shared environment
    fn env(&self) -> &GenerationEnv;

    /// Kinds the cut must not clone because `persist` rewrites them wholesale
    fn replaces(&self) -> &'static [ArtifactKind] {
        &[]
    }

    /// History description for the version this output lands in
    fn description(&self, request: &Self::Request, output: &Self::Output) -> String;

    /// Read upstream input as of `version`
    ///
    /// # Errors
    /// Returns [`GenerationError::NoInputData`] when required input is missing
    async fn load_context(
        &self,
        suite_id: &SuiteId,
        version: u32,
        request: &Self::Request,
    ) -> Result<Self::Context, GenerationError>;

    /// Call the model and validate its output
    ///
    /// # Errors
    /// Returns [`GenerationError::InvalidOutput`] for malformed output
    async fn generate(
        &self,
        suite_id: &SuiteId,
        context: &Self::Context,
    ) -> Result<Self::Output, GenerationError>;

    /// Write `output` under `version`
    ///
    /// # Errors
    /// Returns [`GenerationError::Store`] if the primary write fails
    async fn persist(
        &self,
        suite_id: &SuiteId,
        version: u32,
        output: &Self::Output,
    ) -> Result<Vec<ArtifactRow>, GenerationError>;

    /// Load, generate, cut a version, persist
    ///
    /// # Errors
    /// Any step's error; see the module docs for what has been written by then
    async fn produce(
        &self,
        suite_id: &SuiteId,
        request: Self::Request,
    ) -> Result<Produced<Self::Output>, GenerationError> {
        let current = self.env().latest_version(suite_id).await?;
        let context = self.load_context(suite_id, current, &request).await?;
        let output = self.generate(suite_id, &context).await?;

        let description = self.description(&request, &output);
        let cut = self.env().cut(suite_id, &description, self.replaces()).await?;
        let rows = self.persist(suite_id, cut.version, &output).await?;

        tracing::info!(
            "Stored {} {} rows for {} at v{}",
            rows.len(),
            Self::KIND,
            suite_id,
            cut.version
        );
        Ok(Produced {
            version: cut.version,
            output,
            rows,
        })
    }
}
