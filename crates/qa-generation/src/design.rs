//! Test design generation

use crate::cache::RequirementRecord;
use crate::env::GenerationEnv;
use crate::error::GenerationError;
use crate::generator::ArtifactGenerator;
use crate::normalize::normalize_flows;
use crate::parse::parse_object;
use crate::prompts;
use crate::requirements::requirements_context;
use async_trait::async_trait;
use qa_artifact::{ArtifactKey, ArtifactKind, ArtifactRow, ContentDoc, NewArtifact, SuiteId};
use serde_json::Value;
use std::sync::Arc;

/// Normalized testing focus (`Integration` → `integration`)
#[must_use]
pub fn normalize_testing_type(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// Input of one test design run
#[derive(Debug, Clone)]
pub struct DesignContext {
    /// Testing focus
    pub testing_type: String,
    /// Requirements at the current version
    pub requirements: Arc<Vec<RequirementRecord>>,
}

/// Generates the test design (flows) for one testing focus
///
/// The cut clones the previous design forward; persisting then replaces the
/// row for this testing type only.
#[derive(Debug, Clone)]
pub struct TestDesignGenerator {
    env: GenerationEnv,
}

impl TestDesignGenerator {
    /// Create a generator
    #[inline]
    #[must_use]
    pub fn new(env: GenerationEnv) -> Self {
        Self { env }
    }
}

fn parse_design(raw: &str, testing_type: &str) -> Result<ContentDoc, GenerationError> {
    let mut doc = parse_object(raw, "test design")?;
    let flows = match doc.get("flows") {
        Some(Value::Array(flows)) => normalize_flows(flows),
        _ => Vec::new(),
    };
    if flows.is_empty() {
        return Err(GenerationError::invalid_output("test design: no flows"));
    }
    doc.insert("flows".into(), Value::Array(flows));
    doc.insert("testing_type".into(), Value::String(testing_type.to_string()));
    Ok(ContentDoc::from(doc))
}

#[async_trait]
impl ArtifactGenerator for TestDesignGenerator {
    type Request = String;
    type Context = DesignContext;
    type Output = ContentDoc;

    const KIND: ArtifactKind = ArtifactKind::TestDesign;

    fn env(&self) -> &GenerationEnv {
        &self.env
    }

    fn description(&self, request: &String, _output: &ContentDoc) -> String {
        format!("Generated {} test design", normalize_testing_type(request))
    }

    async fn load_context(
        &self,
        suite_id: &SuiteId,
        version: u32,
        testing_type: &String,
    ) -> Result<DesignContext, GenerationError> {
        let testing_type = normalize_testing_type(testing_type);
        if testing_type.is_empty() {
            return Err(GenerationError::no_input("No testing type selected."));
        }
        let requirements = self.env.requirements_at(suite_id, version).await?;
        if requirements.is_empty() {
            return Err(GenerationError::no_input(
                "No requirements available. Extract requirements first.",
            ));
        }
        Ok(DesignContext {
            testing_type,
            requirements,
        })
    }

    async fn generate(
        &self,
        _suite_id: &SuiteId,
        context: &DesignContext,
    ) -> Result<ContentDoc, GenerationError> {
        let requirements = requirements_context(&context.requirements, self.env.config().context_chars);
        let raw = self
            .env
            .complete(&prompts::test_design(&context.testing_type, &requirements))
            .await?;
        parse_design(&raw, &context.testing_type)
    }

    async fn persist(
        &self,
        suite_id: &SuiteId,
        version: u32,
        output: &ContentDoc,
    ) -> Result<Vec<ArtifactRow>, GenerationError> {
        let testing_type = output.get_str("testing_type").unwrap_or_default();
        let row = NewArtifact::new(
            suite_id.clone(),
            version,
            ArtifactKey::test_design(testing_type),
            output.clone(),
        );
        Ok(vec![self.env.replace_active(row).await?])
    }
}
