//! Viewpoint generation

use crate::cache::RequirementRecord;
use crate::env::GenerationEnv;
use crate::error::GenerationError;
use crate::generator::ArtifactGenerator;
use crate::normalize::dedupe_by_key;
use crate::parse::{non_empty_str, parse_object};
use crate::prompts::{self, clip_context};
use crate::requirements::requirements_context;
use async_trait::async_trait;
use qa_artifact::{
    ArtifactKey, ArtifactKind, ArtifactRow, ContentDoc, NewArtifact, RowFilter, RowId, SuiteId,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One viewpoint of one requirement
#[derive(Debug, Clone, PartialEq)]
pub struct ViewpointItem {
    /// Owning requirement code
    pub req_code: String,
    /// Viewpoint name
    pub name: String,
    /// Full content (`name`, `rationale`, unknown fields, `req_code`)
    pub content: ContentDoc,
}

/// Input of one viewpoint run
#[derive(Debug, Clone)]
pub struct ViewpointContext {
    /// Requirements at the current version
    pub requirements: Arc<Vec<RequirementRecord>>,
    /// Flows of the test designs at the current version
    pub flows: Vec<Value>,
}

/// Generates viewpoints for every requirement
///
/// The viewpoint set is replaced wholesale, so the cut does not clone it.
/// Lineage links point at the requirement and test design rows of the new
/// version.
#[derive(Debug, Clone)]
pub struct ViewpointGenerator {
    env: GenerationEnv,
}

impl ViewpointGenerator {
    /// Create a generator
    #[inline]
    #[must_use]
    pub fn new(env: GenerationEnv) -> Self {
        Self { env }
    }
}

/// Flows of all test design rows, in row order
pub(crate) fn design_flows(designs: &[ArtifactRow]) -> Vec<Value> {
    designs
        .iter()
        .filter_map(|row| row.content.get_array("flows"))
        .flatten()
        .cloned()
        .collect()
}

fn parse_viewpoints(raw: &str, known: &HashSet<&str>) -> Result<Vec<ViewpointItem>, GenerationError> {
    let doc = parse_object(raw, "viewpoints")?;
    let Some(Value::Array(groups)) = doc.get("viewpoints") else {
        return Err(GenerationError::invalid_output(
            "viewpoints: expected a \"viewpoints\" array",
        ));
    };

    let mut items = Vec::new();
    for group in groups.iter().filter_map(Value::as_object) {
        let Some(req_code) = non_empty_str(group, "req_code").filter(|c| known.contains(c)) else {
            continue;
        };
        let Some(Value::Array(entries)) = group.get("items") else {
            continue;
        };
        for entry in entries.iter().filter_map(Value::as_object) {
            let Some(name) = non_empty_str(entry, "name") else {
                continue;
            };
            let mut content = entry.clone();
            content.insert("name".into(), Value::String(name.to_string()));
            content.insert("req_code".into(), Value::String(req_code.to_string()));
            items.push(ViewpointItem {
                req_code: req_code.to_string(),
                name: name.to_string(),
                content: ContentDoc::from(content),
            });
        }
    }

    let items = dedupe_by_key(items, |item| (item.req_code.clone(), item.name.clone()));
    if items.is_empty() {
        return Err(GenerationError::invalid_output(
            "viewpoints: none for a known requirement",
        ));
    }
    Ok(items)
}

#[async_trait]
impl ArtifactGenerator for ViewpointGenerator {
    type Request = ();
    type Context = ViewpointContext;
    type Output = Vec<ViewpointItem>;

    const KIND: ArtifactKind = ArtifactKind::Viewpoint;

    fn env(&self) -> &GenerationEnv {
        &self.env
    }

    fn replaces(&self) -> &'static [ArtifactKind] {
        &[ArtifactKind::Viewpoint]
    }

    fn description(&self, _request: &(), output: &Vec<ViewpointItem>) -> String {
        format!("Generated viewpoints ({})", output.len())
    }

    async fn load_context(
        &self,
        suite_id: &SuiteId,
        version: u32,
        _request: &(),
    ) -> Result<ViewpointContext, GenerationError> {
        let requirements = self.env.requirements_at(suite_id, version).await?;
        if requirements.is_empty() {
            return Err(GenerationError::no_input(
                "No requirements available. Extract requirements first.",
            ));
        }
        let designs = self
            .env
            .snapshot(ArtifactKind::TestDesign, suite_id, version)
            .await?;
        Ok(ViewpointContext {
            requirements,
            flows: design_flows(&designs),
        })
    }

    async fn generate(
        &self,
        _suite_id: &SuiteId,
        context: &ViewpointContext,
    ) -> Result<Vec<ViewpointItem>, GenerationError> {
        let limit = self.env.config().context_chars;
        let requirements = requirements_context(&context.requirements, limit);
        let flows = (!context.flows.is_empty())
            .then(|| clip_context(&Value::Array(context.flows.clone()).to_string(), limit));
        let raw = self
            .env
            .complete(&prompts::viewpoints(&requirements, flows.as_deref()))
            .await?;

        let known: HashSet<&str> = context.requirements.iter().map(|r| r.req_code.as_str()).collect();
        parse_viewpoints(&raw, &known)
    }

    async fn persist(
        &self,
        suite_id: &SuiteId,
        version: u32,
        output: &Vec<ViewpointItem>,
    ) -> Result<Vec<ArtifactRow>, GenerationError> {
        self.env
            .deactivate(
                ArtifactKind::Viewpoint,
                &RowFilter::suite(suite_id).with_active(true),
            )
            .await?;

        let requirement_ids: HashMap<String, RowId> = self
            .env
            .snapshot(ArtifactKind::Requirement, suite_id, version)
            .await?
            .into_iter()
            .filter_map(|row| Some((row.key.req_code()?.to_string(), row.id)))
            .collect();
        let design_id = self
            .env
            .snapshot(ArtifactKind::TestDesign, suite_id, version)
            .await?
            .into_iter()
            .max_by_key(|row| row.seq)
            .map(|row| row.id);

        let mut rows = Vec::with_capacity(output.len());
        for item in output {
            let key = ArtifactKey::viewpoint(Some(item.req_code.clone()), item.name.clone())
                .with_requirement_link(requirement_ids.get(&item.req_code).copied())
                .with_test_design_link(design_id);
            let row = NewArtifact::new(suite_id.clone(), version, key, item.content.clone());
            rows.push(self.env.insert(row).await?);
        }
        Ok(rows)
    }
}
