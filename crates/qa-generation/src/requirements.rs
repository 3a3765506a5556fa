//! Requirement extraction

use crate::cache::RequirementRecord;
use crate::documents::Document;
use crate::env::GenerationEnv;
use crate::error::GenerationError;
use crate::generator::ArtifactGenerator;
use crate::normalize::{dedupe_by_key, natural_cmp};
use crate::parse::{non_empty_str, parse_array};
use crate::prompts::{self, clip_context};
use async_trait::async_trait;
use qa_artifact::{
    ArtifactKey, ArtifactKind, ArtifactRow, ContentDoc, NewArtifact, RowFilter, SuiteId,
};
use serde_json::{json, Value};

/// `[{requirement_id, source, text}]` sorted by code, clipped to `max_chars`
#[must_use]
pub fn requirements_context(records: &[RequirementRecord], max_chars: usize) -> String {
    let mut brief: Vec<&RequirementRecord> = records.iter().collect();
    brief.sort_by(|a, b| natural_cmp(&a.req_code, &b.req_code));
    let brief: Vec<Value> = brief
        .into_iter()
        .map(|r| json!({"requirement_id": r.req_code, "source": r.source, "text": r.text}))
        .collect();
    clip_context(&Value::Array(brief).to_string(), max_chars)
}

/// Extracts requirements from the suite's documents
///
/// Extraction replaces the requirement set: the cut does not clone
/// requirements, and every previously active requirement is deactivated.
#[derive(Debug, Clone)]
pub struct RequirementExtractor {
    env: GenerationEnv,
}

impl RequirementExtractor {
    /// Create an extractor
    #[inline]
    #[must_use]
    pub fn new(env: GenerationEnv) -> Self {
        Self { env }
    }
}

/// Validate extractor output: objects with a non-empty `id`, first wins
fn parse_requirements(raw: &str) -> Result<Vec<ContentDoc>, GenerationError> {
    let items: Vec<ContentDoc> = parse_array(raw, "requirements")?
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) if non_empty_str(&map, "id").is_some() => Some(ContentDoc::from(map)),
            _ => None,
        })
        .collect();
    let items = dedupe_by_key(items, |doc| {
        doc.get_str("id").map(str::trim).unwrap_or_default().to_string()
    });
    if items.is_empty() {
        return Err(GenerationError::invalid_output(
            "requirements: no items with an id",
        ));
    }
    Ok(items)
}

#[async_trait]
impl ArtifactGenerator for RequirementExtractor {
    type Request = ();
    type Context = Vec<Document>;
    type Output = Vec<ContentDoc>;

    const KIND: ArtifactKind = ArtifactKind::Requirement;

    fn env(&self) -> &GenerationEnv {
        &self.env
    }

    fn replaces(&self) -> &'static [ArtifactKind] {
        &[ArtifactKind::Requirement]
    }

    fn description(&self, _request: &(), output: &Vec<ContentDoc>) -> String {
        format!("Requirements extracted ({})", output.len())
    }

    async fn load_context(
        &self,
        suite_id: &SuiteId,
        _version: u32,
        _request: &(),
    ) -> Result<Vec<Document>, GenerationError> {
        self.env
            .load_documents(suite_id, self.env.config().max_document_chars)
            .await
    }

    async fn generate(
        &self,
        _suite_id: &SuiteId,
        documents: &Vec<Document>,
    ) -> Result<Vec<ContentDoc>, GenerationError> {
        let raw = self.env.complete(&prompts::extract_requirements(documents)).await?;
        parse_requirements(&raw)
    }

    async fn persist(
        &self,
        suite_id: &SuiteId,
        version: u32,
        output: &Vec<ContentDoc>,
    ) -> Result<Vec<ArtifactRow>, GenerationError> {
        let retired = self
            .env
            .deactivate(
                ArtifactKind::Requirement,
                &RowFilter::suite(suite_id).with_active(true),
            )
            .await?;
        tracing::debug!("Retired {} requirement rows of {}", retired, suite_id);

        let mut rows = Vec::with_capacity(output.len());
        for content in output {
            let code = content.get_str("id").map(str::trim).unwrap_or_default();
            let row = NewArtifact::new(
                suite_id.clone(),
                version,
                ArtifactKey::requirement(code),
                content.clone(),
            );
            rows.push(self.env.insert(row).await?);
        }

        let records = rows.iter().filter_map(RequirementRecord::from_row).collect();
        self.env.cache().prime(suite_id, version, records).await;
        Ok(rows)
    }
}
