//! Suite-wide test case editing
//!
//! The model sees the full current snapshot and selects impacted
//! requirements by code. Each replacement is merged over the stored content,
//! so fields the model does not mention survive. A version is cut only when
//! at least one edit changes stored content.

use crate::env::GenerationEnv;
use crate::error::GenerationError;
use crate::normalize::{natural_cmp, normalize_testcases};
use crate::parse::{non_empty_str, parse_object, scalar_text};
use crate::prompts::{self, clip_context};
use crate::requirements::requirements_context;
use qa_artifact::{
    ArtifactKey, ArtifactKind, ArtifactRow, ContentDoc, NewArtifact, RowId, SuiteId,
};
use qa_versioning::AuditEvent;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};

/// One requirement whose cases were rewritten
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditedRequirement {
    /// Requirement code
    pub req_code: String,
    /// New test case row
    pub row_id: RowId,
    /// Version of the replaced row, if there was one
    pub old_version: Option<u32>,
    /// Version of the new row
    pub new_version: u32,
}

/// Outcome of an edit request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EditReport {
    /// Version holding the edits; `None` when nothing changed
    pub version: Option<u32>,
    /// Rewritten requirements
    pub edited: Vec<EditedRequirement>,
    /// Selected requirements whose content did not change
    pub unchanged: Vec<String>,
    /// Codes the model named that do not exist
    pub not_found: Vec<String>,
    /// Model summary of the change
    pub summary: String,
}

impl EditReport {
    /// Number of rewritten requirements
    #[inline]
    #[must_use]
    pub fn edited_count(&self) -> usize {
        self.edited.len()
    }
}

struct PendingEdit {
    req_code: String,
    diff: Value,
    content: ContentDoc,
    old_version: Option<u32>,
}

/// Content equality ignoring the embedded `version` stamp
fn same_content(a: &ContentDoc, b: &ContentDoc) -> bool {
    let strip = |doc: &ContentDoc| {
        let mut doc = doc.clone();
        doc.remove("version");
        doc.fingerprint()
    };
    strip(a) == strip(b)
}

/// Cases sorted by id, rows sorted by requirement code
fn testcases_context(rows: &[ArtifactRow], max_chars: usize) -> String {
    let mut rows: Vec<&ArtifactRow> = rows.iter().collect();
    rows.sort_by(|a, b| {
        natural_cmp(
            a.key.req_code().unwrap_or_default(),
            b.key.req_code().unwrap_or_default(),
        )
    });
    let brief: Vec<Value> = rows
        .into_iter()
        .map(|row| {
            let mut content = row.content.clone();
            if let Some(cases) = content.get_array("cases") {
                let mut cases = cases.clone();
                cases.sort_by(|a, b| {
                    natural_cmp(
                        &a.get("id").map(scalar_text).unwrap_or_default(),
                        &b.get("id").map(scalar_text).unwrap_or_default(),
                    )
                });
                content.insert("cases", Value::Array(cases));
            }
            json!({
                "req_code": row.key.req_code(),
                "version": row.version,
                "content": content,
            })
        })
        .collect();
    clip_context(&Value::Array(brief).to_string(), max_chars)
}

fn contents_context(rows: &[ArtifactRow], max_chars: usize) -> String {
    let contents: Vec<Value> = rows.iter().map(|row| row.content.clone().into_value()).collect();
    clip_context(&Value::Array(contents).to_string(), max_chars)
}

/// Rewrites test cases from a natural-language instruction
#[derive(Debug, Clone)]
pub struct TestCaseEditor {
    env: GenerationEnv,
}

impl TestCaseEditor {
    /// Create an editor
    #[inline]
    #[must_use]
    pub fn new(env: GenerationEnv) -> Self {
        Self { env }
    }

    /// Apply an edit instruction across the suite
    ///
    /// # Errors
    /// Returns [`GenerationError::NoInputData`] without requirements,
    /// [`GenerationError::InvalidOutput`] for malformed model output (nothing
    /// written), [`GenerationError::Versioning`] if the cut fails, and
    /// [`GenerationError::Store`] if an edited row cannot be written.
    pub async fn edit(&self, suite_id: &SuiteId, instruction: &str) -> Result<EditReport, GenerationError> {
        let current = self.env.latest_version(suite_id).await?;
        let requirements = self.env.requirements_at(suite_id, current).await?;
        if requirements.is_empty() {
            return Err(GenerationError::no_input("No requirements found for this suite."));
        }
        let testcases = self
            .env
            .snapshot(ArtifactKind::TestCase, suite_id, current)
            .await?;
        let designs = self
            .env
            .snapshot(ArtifactKind::TestDesign, suite_id, current)
            .await?;
        let viewpoints = self
            .env
            .snapshot(ArtifactKind::Viewpoint, suite_id, current)
            .await?;

        let limit = self.env.config().context_chars;
        let prompt = prompts::edit_testcases(
            instruction,
            &requirements_context(&requirements, limit),
            &testcases_context(&testcases, limit),
            &contents_context(&designs, limit),
            &contents_context(&viewpoints, limit),
        );
        let raw = self.env.complete(&prompt).await?;
        let output = parse_object(&raw, "edits")?;

        let known: HashSet<&str> = requirements.iter().map(|r| r.req_code.as_str()).collect();
        let stored: HashMap<&str, &ArtifactRow> = testcases
            .iter()
            .filter_map(|row| Some((row.key.req_code()?, row)))
            .collect();

        let mut report = EditReport {
            summary: output.get("summary").map(scalar_text).unwrap_or_default(),
            ..EditReport::default()
        };
        let mut event_edits = Vec::new();
        let mut pending: Vec<PendingEdit> = Vec::new();

        let edits = match output.get("edits") {
            Some(Value::Array(edits)) => edits.as_slice(),
            _ => &[],
        };
        for edit in edits.iter().filter_map(Value::as_object) {
            let code = non_empty_str(edit, "req_code").unwrap_or_default();
            if !known.contains(code) {
                report.not_found.push(code.to_string());
                event_edits.push(json!({"req_code": code, "error": "requirement_not_found"}));
                continue;
            }
            if pending.iter().any(|p| p.req_code == code) {
                continue;
            }
            let Some(Value::Object(replacement)) = edit.get("new_testcases") else {
                report.unchanged.push(code.to_string());
                event_edits.push(json!({"req_code": code, "error": "missing_new_testcases"}));
                continue;
            };

            let existing = stored.get(code);
            let base = existing.map(|row| row.content.clone()).unwrap_or_default();
            let merged = merge_and_normalize(&base, replacement, code);
            if existing.is_some() && same_content(&base, &merged) {
                report.unchanged.push(code.to_string());
                continue;
            }
            pending.push(PendingEdit {
                req_code: code.to_string(),
                diff: edit.get("diff").cloned().unwrap_or_else(|| json!({})),
                content: merged,
                old_version: existing.map(|row| row.version),
            });
        }

        if pending.is_empty() {
            tracing::info!("Edit request for {} changed nothing; no version cut", suite_id);
            self.record(suite_id, None, event_edits, &report.summary, instruction)
                .await;
            return Ok(report);
        }

        let codes: Vec<&str> = pending.iter().map(|p| p.req_code.as_str()).collect();
        let description = format!("Edited test cases for {}", codes.join(", "));
        let cut = self.env.cut(suite_id, &description, &[]).await?;
        let links: HashMap<String, RowId> = self
            .env
            .snapshot(ArtifactKind::Requirement, suite_id, cut.version)
            .await?
            .into_iter()
            .filter_map(|row| Some((row.key.req_code()?.to_string(), row.id)))
            .collect();

        for edit in pending {
            let mut content = edit.content;
            content.insert("version", json!(cut.version));
            let link = links.get(&edit.req_code).copied();
            let key = ArtifactKey::test_case(edit.req_code.clone()).with_requirement_link(link);
            let row = self
                .env
                .replace_active(NewArtifact::new(suite_id.clone(), cut.version, key, content.clone()))
                .await?;

            event_edits.push(json!({
                "req_code": edit.req_code,
                "requirement_id": link.map(|id| id.to_string()),
                "diff": edit.diff,
                "new_testcases": content,
                "old_version": edit.old_version,
                "new_version": cut.version,
                "row_id": row.id.to_string(),
            }));
            report.edited.push(EditedRequirement {
                req_code: edit.req_code,
                row_id: row.id,
                old_version: edit.old_version,
                new_version: cut.version,
            });
        }
        report.version = Some(cut.version);

        tracing::info!(
            "Edited {} requirements of {} at v{}",
            report.edited.len(),
            suite_id,
            cut.version
        );
        self.record(suite_id, Some(cut.version), event_edits, &report.summary, instruction)
            .await;
        Ok(report)
    }

    async fn record(
        &self,
        suite_id: &SuiteId,
        version: Option<u32>,
        edits: Vec<Value>,
        summary: &str,
        instruction: &str,
    ) {
        let event = AuditEvent::TestcasesEdited {
            version,
            edits,
            summary: summary.to_string(),
            user_edit_request: instruction.to_string(),
        };
        if let Err(e) = self.env.versions().events().record(suite_id, event).await {
            tracing::warn!("Failed to record edit event for {}: {}", suite_id, e);
        }
    }
}

fn merge_and_normalize(base: &ContentDoc, replacement: &Map<String, Value>, req_code: &str) -> ContentDoc {
    let mut merged = base.merge_preserving(&ContentDoc::from(replacement.clone())).into_map();
    normalize_testcases(&mut merged, req_code);
    ContentDoc::from(merged)
}
