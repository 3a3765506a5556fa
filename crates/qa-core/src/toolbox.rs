//! Tools available to roles
//!
//! Each role turn calls exactly one of these. They are thin wrappers over the
//! generators; errors come back as [`GenerationError`] and the coordinator
//! turns them into a short message at the role boundary.

use crate::intent::Topic;
use qa_artifact::{PersistenceFailure, StoreError, SuiteId};
use qa_generation::{
    Answer, ArtifactGenerator, BatchReport, EditReport, FetchReport, GapReport,
    GenerationEnv, GenerationError, InsightTools, PreviewMode, RequirementExtractor,
    TestCaseEditor, TestCaseGenerator, TestDesignGenerator, ViewpointGenerator,
};

/// Test cases per document when writing straight from documents
pub const DIRECT_CASES_PER_DOC: usize = 6;

/// Generators and read-only tools bound to one environment
#[derive(Debug, Clone)]
pub struct Toolbox {
    env: GenerationEnv,
    insight: InsightTools,
}

impl Toolbox {
    /// Create a toolbox
    #[must_use]
    pub fn new(env: GenerationEnv) -> Self {
        Self {
            insight: InsightTools::new(env.clone()),
            env,
        }
    }

    /// Shared environment
    #[inline]
    #[must_use]
    pub fn env(&self) -> &GenerationEnv {
        &self.env
    }

    /// Copy named documents into the suite
    ///
    /// # Errors
    /// Returns [`GenerationError::Store`] if the document source fails
    pub async fn fetch(&self, suite_id: &SuiteId, names: &[String]) -> Result<FetchReport, GenerationError> {
        self.env
            .documents()
            .fetch(suite_id, names)
            .await
            .map_err(|e| PersistenceFailure::new("fetch documents", StoreError::Unavailable(e.to_string())).into())
    }

    /// Gap analysis over the suite's documents
    ///
    /// # Errors
    /// Returns an error if documents cannot be read or the call fails
    pub async fn identify_gaps(
        &self,
        suite_id: &SuiteId,
        testing_type: Option<&str>,
    ) -> Result<GapReport, GenerationError> {
        self.insight.identify_gaps(suite_id, testing_type).await
    }

    /// Short preview of what generation would produce
    ///
    /// # Errors
    /// Returns [`GenerationError::NoInputData`] without documents
    pub async fn preview(&self, suite_id: &SuiteId, mode: PreviewMode) -> Result<String, GenerationError> {
        self.insight.preview(suite_id, mode, None).await
    }

    /// Extract requirements; returns the version and count
    ///
    /// # Errors
    /// See [`ArtifactGenerator::produce`]
    pub async fn extract(&self, suite_id: &SuiteId) -> Result<(u32, usize), GenerationError> {
        let produced = RequirementExtractor::new(self.env.clone())
            .produce(suite_id, ())
            .await?;
        Ok((produced.version, produced.rows.len()))
    }

    /// Generate the test design; returns the version and flow count
    ///
    /// # Errors
    /// See [`ArtifactGenerator::produce`]
    pub async fn design(&self, suite_id: &SuiteId, testing_type: &str) -> Result<(u32, usize), GenerationError> {
        let produced = TestDesignGenerator::new(self.env.clone())
            .produce(suite_id, testing_type.to_string())
            .await?;
        let flows = produced.output.get_array("flows").map_or(0, Vec::len);
        Ok((produced.version, flows))
    }

    /// Generate viewpoints; returns the version and count
    ///
    /// # Errors
    /// See [`ArtifactGenerator::produce`]
    pub async fn viewpoints(&self, suite_id: &SuiteId) -> Result<(u32, usize), GenerationError> {
        let produced = ViewpointGenerator::new(self.env.clone())
            .produce(suite_id, ())
            .await?;
        Ok((produced.version, produced.rows.len()))
    }

    /// Test cases for every requirement
    ///
    /// # Errors
    /// Returns [`GenerationError::NoInputData`] without requirements and
    /// [`GenerationError::Versioning`] if the cut fails
    pub async fn testcases_all(&self, suite_id: &SuiteId) -> Result<BatchReport, GenerationError> {
        TestCaseGenerator::new(self.env.clone()).generate_all(suite_id).await
    }

    /// Test cases for one requirement; returns the version and case count
    ///
    /// # Errors
    /// See [`ArtifactGenerator::produce`]
    pub async fn testcases_for(&self, suite_id: &SuiteId, req_code: &str) -> Result<(u32, usize), GenerationError> {
        let produced = TestCaseGenerator::new(self.env.clone())
            .produce(suite_id, req_code.to_string())
            .await?;
        Ok((produced.version, produced.output.case_count()))
    }

    /// Free-text test cases straight from documents (nothing stored)
    ///
    /// # Errors
    /// Returns [`GenerationError::NoInputData`] without documents
    pub async fn direct_testcases(&self, suite_id: &SuiteId) -> Result<String, GenerationError> {
        self.insight.direct_testcases(suite_id, DIRECT_CASES_PER_DOC).await
    }

    /// Apply an edit instruction to stored test cases
    ///
    /// # Errors
    /// See [`TestCaseEditor::edit`]
    pub async fn edit(&self, suite_id: &SuiteId, instruction: &str) -> Result<EditReport, GenerationError> {
        TestCaseEditor::new(self.env.clone()).edit(suite_id, instruction).await
    }

    /// Answer a question about stored artifacts
    ///
    /// # Errors
    /// Returns an error if artifacts cannot be read or the call fails
    pub async fn answer(&self, suite_id: &SuiteId, topic: Topic, question: &str) -> Result<Answer, GenerationError> {
        match topic {
            Topic::Requirements => self.insight.answer_requirements(suite_id, question).await,
            Topic::Testcases => self.insight.answer_testcases(suite_id, question).await,
        }
    }
}
