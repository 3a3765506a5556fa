//! Test case generation
//!
//! One row per `(suite, req_code)` holds all cases of a requirement. Flow and
//! viewpoint references are resolved against the version current before the
//! cut; references that do not resolve are dropped.
//!
//! Bulk mode cuts a single version up front and fans out one generation call
//! per requirement, at most [`MAX_BULK_CONCURRENCY`] at a time. Failed items
//! are reported next to the successes and keep their cloned rows.
//!
//! [`MAX_BULK_CONCURRENCY`]: crate::env::MAX_BULK_CONCURRENCY

use crate::cache::RequirementRecord;
use crate::env::GenerationEnv;
use crate::error::{ErrorKind, GenerationError};
use crate::generator::ArtifactGenerator;
use crate::normalize::{natural_cmp, normalize_testcases, prune_dangling_refs};
use crate::parse::{parse_object, scalar_text};
use crate::prompts::{self, clip_context};
use crate::viewpoints::design_flows;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use qa_artifact::{
    ArtifactKey, ArtifactKind, ArtifactRow, ContentDoc, NewArtifact, RowId, SuiteId,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const NO_REQUIREMENTS: &str = "No requirements available. Extract requirements first.";

/// Flows and viewpoints shared by every requirement of a run
#[derive(Debug, Clone, Default)]
struct SharedContext {
    flows: Arc<Vec<Value>>,
    flow_ids: Arc<HashSet<String>>,
    viewpoints: Arc<Vec<ArtifactRow>>,
    viewpoint_names: Arc<HashSet<String>>,
}

impl SharedContext {
    fn new(designs: &[ArtifactRow], viewpoints: Vec<ArtifactRow>) -> Self {
        let flows = design_flows(designs);
        let flow_ids = flows
            .iter()
            .filter_map(|f| f.get("id").and_then(Value::as_str))
            .map(str::to_string)
            .collect();
        let viewpoint_names = viewpoints
            .iter()
            .filter_map(|row| row.content.get_str("name"))
            .map(str::to_string)
            .collect();
        Self {
            flows: Arc::new(flows),
            flow_ids: Arc::new(flow_ids),
            viewpoints: Arc::new(viewpoints),
            viewpoint_names: Arc::new(viewpoint_names),
        }
    }

    fn for_requirement(&self, requirement: RequirementRecord) -> TestCaseContext {
        let code = requirement.req_code.as_str();
        let viewpoints = self
            .viewpoints
            .iter()
            .filter(|row| row.key.req_code().map_or(true, |c| c == code))
            .map(|row| row.content.clone().into_value())
            .collect();
        TestCaseContext {
            requirement,
            flows: self.flows.clone(),
            flow_ids: self.flow_ids.clone(),
            viewpoints,
            viewpoint_names: self.viewpoint_names.clone(),
        }
    }
}

/// Input of one requirement's generation
#[derive(Debug, Clone)]
pub struct TestCaseContext {
    /// Requirement the cases are written for
    pub requirement: RequirementRecord,
    /// Flows of the current test designs
    pub flows: Arc<Vec<Value>>,
    /// Known flow ids
    pub flow_ids: Arc<HashSet<String>>,
    /// Viewpoints of this requirement (and suite-wide ones)
    pub viewpoints: Vec<Value>,
    /// Every known viewpoint name
    pub viewpoint_names: Arc<HashSet<String>>,
}

/// Normalized cases of one requirement
#[derive(Debug, Clone, PartialEq)]
pub struct TestCaseOutput {
    /// Requirement code
    pub req_code: String,
    /// `{requirement_id, source, requirement_text, cases[]}`
    pub content: ContentDoc,
}

impl TestCaseOutput {
    /// Number of cases
    #[must_use]
    pub fn case_count(&self) -> usize {
        self.content.get_array("cases").map_or(0, Vec::len)
    }
}

/// One successful item of a bulk run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchItem {
    /// Requirement code
    pub req_code: String,
    /// Inserted row
    pub row_id: RowId,
    /// Cases written
    pub case_count: usize,
}

/// One failed item of a bulk run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    /// Requirement code
    pub req_id: String,
    /// Error tag
    pub kind: ErrorKind,
    /// Short description
    pub error: String,
}

/// Outcome of generating for all requirements
///
/// A batch with failed items is still a successful batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Version every item was written under
    pub version: u32,
    /// Items written
    pub generated: usize,
    /// Items failed
    pub failed: usize,
    /// Successes, by requirement code
    pub results: Vec<BatchItem>,
    /// Failures, by requirement code
    pub errors: Vec<BatchFailure>,
}

/// Writes test cases per requirement
#[derive(Debug, Clone)]
pub struct TestCaseGenerator {
    env: GenerationEnv,
}

impl TestCaseGenerator {
    /// Create a generator
    #[inline]
    #[must_use]
    pub fn new(env: GenerationEnv) -> Self {
        Self { env }
    }

    async fn load_shared(&self, suite_id: &SuiteId, version: u32) -> Result<SharedContext, GenerationError> {
        let designs = self
            .env
            .snapshot(ArtifactKind::TestDesign, suite_id, version)
            .await?;
        let viewpoints = self
            .env
            .snapshot(ArtifactKind::Viewpoint, suite_id, version)
            .await?;
        Ok(SharedContext::new(&designs, viewpoints))
    }

    /// Requirement code → requirement row at `version`
    async fn requirement_links(
        &self,
        suite_id: &SuiteId,
        version: u32,
    ) -> Result<HashMap<String, RowId>, GenerationError> {
        Ok(self
            .env
            .snapshot(ArtifactKind::Requirement, suite_id, version)
            .await?
            .into_iter()
            .filter_map(|row| Some((row.key.req_code()?.to_string(), row.id)))
            .collect())
    }

    async fn store(
        &self,
        suite_id: &SuiteId,
        version: u32,
        output: &TestCaseOutput,
        requirement_id: Option<RowId>,
    ) -> Result<ArtifactRow, GenerationError> {
        let key = ArtifactKey::test_case(output.req_code.clone()).with_requirement_link(requirement_id);
        let row = NewArtifact::new(suite_id.clone(), version, key, output.content.clone());
        self.env.replace_active(row).await
    }

    /// Generate cases for every requirement under one new version
    ///
    /// # Errors
    /// Returns [`GenerationError::NoInputData`] without requirements and
    /// [`GenerationError::Versioning`] if the version cannot be cut. Item
    /// failures are reported in the [`BatchReport`] instead.
    pub async fn generate_all(&self, suite_id: &SuiteId) -> Result<BatchReport, GenerationError> {
        let current = self.env.latest_version(suite_id).await?;
        let requirements = self.env.requirements_at(suite_id, current).await?;
        if requirements.is_empty() {
            return Err(GenerationError::no_input(NO_REQUIREMENTS));
        }
        let shared = self.load_shared(suite_id, current).await?;

        let description = format!("Generated test cases for {} requirements", requirements.len());
        let cut = self.env.cut(suite_id, &description, &[]).await?;
        let version = cut.version;
        let links = self.requirement_links(suite_id, version).await?;
        let concurrency = self.env.config().bulk_concurrency();
        tracing::info!(
            "Generating test cases for {} requirements of {} at v{} (concurrency {})",
            requirements.len(),
            suite_id,
            version,
            concurrency
        );

        let outcomes: Vec<(String, Result<BatchItem, GenerationError>)> =
            stream::iter(requirements.iter().cloned())
                .map(|record| {
                    let context = shared.for_requirement(record);
                    let links = &links;
                    async move {
                        let req_code = context.requirement.req_code.clone();
                        let result: Result<BatchItem, GenerationError> = async {
                            let output = self.generate(suite_id, &context).await?;
                            let link = links.get(&req_code).copied();
                            let row = self.store(suite_id, version, &output, link).await?;
                            Ok(BatchItem {
                                req_code: req_code.clone(),
                                row_id: row.id,
                                case_count: output.case_count(),
                            })
                        }
                        .await;
                        (req_code, result)
                    }
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;

        let mut results = Vec::new();
        let mut errors = Vec::new();
        for (req_code, outcome) in outcomes {
            match outcome {
                Ok(item) => results.push(item),
                Err(e) => {
                    tracing::warn!("Test case generation for {} failed: {}", req_code, e);
                    errors.push(BatchFailure {
                        req_id: req_code,
                        kind: e.kind(),
                        error: e.user_message(),
                    });
                }
            }
        }
        results.sort_by(|a, b| natural_cmp(&a.req_code, &b.req_code));
        errors.sort_by(|a, b| natural_cmp(&a.req_id, &b.req_id));

        tracing::info!(
            "Batch for {} at v{}: generated={} failed={}",
            suite_id,
            version,
            results.len(),
            errors.len()
        );
        Ok(BatchReport {
            version,
            generated: results.len(),
            failed: errors.len(),
            results,
            errors,
        })
    }
}

fn json_block(values: &[Value], max_chars: usize) -> Option<String> {
    (!values.is_empty()).then(|| clip_context(&Value::Array(values.to_vec()).to_string(), max_chars))
}

fn parse_testcases(raw: &str, context: &TestCaseContext) -> Result<ContentDoc, GenerationError> {
    let req_code = context.requirement.req_code.as_str();
    let mut doc = parse_object(raw, "test cases")?;
    if !doc.contains_key("requirement_id") {
        return Err(GenerationError::invalid_output(
            "test cases: missing 'requirement_id'",
        ));
    }
    if doc.get("source").map_or(true, |v| scalar_text(v).is_empty()) {
        doc.insert("source".into(), Value::String(context.requirement.source.clone()));
    }
    normalize_testcases(&mut doc, req_code);
    let pruned = prune_dangling_refs(&mut doc, &context.flow_ids, &context.viewpoint_names);
    if pruned > 0 {
        tracing::debug!("Dropped {} dangling references in cases of {}", pruned, req_code);
    }
    Ok(ContentDoc::from(doc))
}

#[async_trait]
impl ArtifactGenerator for TestCaseGenerator {
    type Request = String;
    type Context = TestCaseContext;
    type Output = TestCaseOutput;

    const KIND: ArtifactKind = ArtifactKind::TestCase;

    fn env(&self) -> &GenerationEnv {
        &self.env
    }

    fn description(&self, req_code: &String, _output: &TestCaseOutput) -> String {
        format!("Generated test cases for {req_code}")
    }

    async fn load_context(
        &self,
        suite_id: &SuiteId,
        version: u32,
        req_code: &String,
    ) -> Result<TestCaseContext, GenerationError> {
        let requirements = self.env.requirements_at(suite_id, version).await?;
        if requirements.is_empty() {
            return Err(GenerationError::no_input(NO_REQUIREMENTS));
        }
        let requirement = requirements
            .iter()
            .find(|r| r.req_code == *req_code)
            .cloned()
            .ok_or_else(|| GenerationError::no_input(format!("Requirement {req_code} not found.")))?;
        let shared = self.load_shared(suite_id, version).await?;
        Ok(shared.for_requirement(requirement))
    }

    async fn generate(
        &self,
        _suite_id: &SuiteId,
        context: &TestCaseContext,
    ) -> Result<TestCaseOutput, GenerationError> {
        let limit = self.env.config().context_chars;
        let requirement = &context.requirement;
        let flows = json_block(&context.flows, limit);
        let viewpoints = json_block(&context.viewpoints, limit);
        let prompt = prompts::testcases(
            &requirement.req_code,
            &requirement.source,
            &requirement.text,
            flows.as_deref(),
            viewpoints.as_deref(),
        );
        let raw = self.env.complete(&prompt).await?;
        Ok(TestCaseOutput {
            req_code: requirement.req_code.clone(),
            content: parse_testcases(&raw, context)?,
        })
    }

    async fn persist(
        &self,
        suite_id: &SuiteId,
        version: u32,
        output: &TestCaseOutput,
    ) -> Result<Vec<ArtifactRow>, GenerationError> {
        let links = self.requirement_links(suite_id, version).await?;
        let row = self
            .store(suite_id, version, output, links.get(&output.req_code).copied())
            .await?;
        Ok(vec![row])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn context() -> TestCaseContext {
        let shared = SharedContext {
            flows: Arc::new(vec![json!({"id": "FLOW-1"})]),
            flow_ids: Arc::new(HashSet::from(["FLOW-1".to_string()])),
            viewpoints: Arc::new(Vec::new()),
            viewpoint_names: Arc::new(HashSet::from(["Timeout".to_string()])),
        };
        shared.for_requirement(RequirementRecord {
            row_id: RowId::new(),
            req_code: "REQ-3".into(),
            source: "spec.txt".into(),
            text: "Users can reset passwords".into(),
            content: ContentDoc::new(),
        })
    }

    #[test]
    fn missing_requirement_id_is_invalid_output() {
        let err = parse_testcases(r#"{"cases": []}"#, &context()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidGenerationOutput);
    }

    #[test]
    fn cases_are_normalized_and_references_checked() {
        let raw = r#"```json
        {"requirement_id": "REQ-3", "cases": [
            {"id": "TC-1", "steps": ["a", "b"], "flow_id": "FLOW-1", "viewpoint": "Timeout"},
            {"id": "TC-1", "flow_id": "FLOW-7"},
            {"steps": "c"}
        ]}
        ```"#;
        let doc = parse_testcases(raw, &context()).unwrap();
        let cases = doc.get_array("cases").unwrap();

        assert_eq!(doc.get_str("source"), Some("spec.txt"));
        assert_eq!(cases[0]["steps"], json!("a; b"));
        assert_eq!(cases[0]["flow_id"], json!("FLOW-1"));
        assert_eq!(cases[1]["id"], json!("TC-1-2"));
        assert!(cases[1].get("flow_id").is_none());
        assert_eq!(cases[2]["id"], json!("REQ-3-TC-3"));
    }

    #[test]
    fn viewpoints_are_scoped_to_the_requirement() {
        let row = |code: Option<&str>, name: &str| ArtifactRow {
            id: RowId::new(),
            seq: 0,
            suite_id: SuiteId::new("s"),
            key: ArtifactKey::viewpoint(code.map(str::to_string), name),
            version: 1,
            active: true,
            content: ContentDoc::new().with("name", json!(name)),
            created_at: chrono::Utc::now(),
        };
        let shared = SharedContext::new(
            &[],
            vec![row(Some("REQ-1"), "a"), row(Some("REQ-2"), "b"), row(None, "c")],
        );
        let ctx = shared.for_requirement(RequirementRecord {
            row_id: RowId::new(),
            req_code: "REQ-1".into(),
            source: String::new(),
            text: String::new(),
            content: ContentDoc::new(),
        });
        let names: Vec<&str> = ctx.viewpoints.iter().map(|v| v["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(ctx.viewpoint_names.len(), 3);
    }
}
