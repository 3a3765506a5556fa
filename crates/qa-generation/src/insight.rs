//! Read-only generation tools
//!
//! Previews, gap analysis, question answering and direct test cases. None of
//! these write artifacts or cut versions.

use crate::env::GenerationEnv;
use crate::error::GenerationError;
use crate::parse::{parse_object, scalar_text};
use crate::prompts::{self, clip_context};
use qa_artifact::{ArtifactKind, SuiteId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

/// Context size for question answering
const ANSWER_CONTEXT_CHARS: usize = 8_000;
/// Gaps and recommendations kept in a report
const MAX_REPORT_ITEMS: usize = 10;
/// Follow-up used when the model asks for a testing focus without wording one
const DEFAULT_FOLLOW_UP: &str =
    "Please choose a testing focus: Unit testing, Integration testing, or System testing.";

/// What a preview focuses on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewMode {
    /// Requirements only
    Requirements,
    /// Test design flows only
    TestDesign,
    /// Viewpoints only
    Viewpoints,
    /// Test cases only
    Testcases,
    /// Model decides
    #[default]
    Auto,
}

impl PreviewMode {
    fn guidelines(self) -> &'static str {
        match self {
            Self::Requirements => {
                "- Preview REQUIREMENTS only.\n- Show a few atomic, verifiable items with their document names."
            }
            Self::TestDesign => {
                "- Preview TEST DESIGN only.\n- Sketch two or three flows with their steps and covered requirements."
            }
            Self::Viewpoints => {
                "- Preview VIEWPOINTS only.\n- List a few test angles per requirement with a one-line rationale."
            }
            Self::Testcases => {
                "- Preview TEST CASES only.\n- Give a few short titles, 1-3 steps each and the expected outcome."
            }
            Self::Auto => {
                "- Choose whether requirements, test cases or both make the most useful preview.\n- Keep each item short."
            }
        }
    }

    /// Tag text
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requirements => "requirements",
            Self::TestDesign => "test_design",
            Self::Viewpoints => "viewpoints",
            Self::Testcases => "testcases",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for PreviewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreviewMode {
    type Err = std::convert::Infallible;

    /// Unknown text falls back to [`PreviewMode::Auto`]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "requirements" => Self::Requirements,
            "test_design" | "design" => Self::TestDesign,
            "viewpoints" => Self::Viewpoints,
            "testcases" | "test_cases" => Self::Testcases,
            _ => Self::Auto,
        })
    }
}

/// Result of gap analysis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapReport {
    /// Documents analyzed (0 means nothing to analyze)
    pub documents: usize,
    /// Whether blocking gaps were found
    pub has_gaps: bool,
    /// Gaps, at most ten
    pub gaps: Vec<String>,
    /// Recommended actions, at most ten
    pub recommendations: Vec<String>,
    /// Whether the user still has to pick a testing focus
    pub testing_type_needed: bool,
    /// Question to ask about the testing focus
    pub follow_up: String,
}

impl GapReport {
    /// Whether the run should stop and show the gaps
    #[inline]
    #[must_use]
    pub fn blocks(&self) -> bool {
        self.has_gaps && !self.gaps.is_empty()
    }

    /// Short human-readable summary
    #[must_use]
    pub fn render(&self) -> String {
        if self.documents == 0 {
            return "No documents available for gap analysis.".to_string();
        }
        let follow_up = if self.follow_up.is_empty() {
            DEFAULT_FOLLOW_UP
        } else {
            self.follow_up.as_str()
        };
        if !self.blocks() {
            return if self.testing_type_needed {
                follow_up.to_string()
            } else {
                "No significant gaps detected in documents.".to_string()
            };
        }

        let mut lines = vec!["Gap analysis results:".to_string()];
        lines.extend(self.gaps.iter().map(|g| format!("- {g}")));
        if !self.recommendations.is_empty() {
            lines.push("\nRecommended actions:".to_string());
            lines.extend(self.recommendations.iter().map(|r| format!("- {r}")));
        }
        if self.testing_type_needed {
            lines.push("\nAdditional info needed:".to_string());
            lines.push(format!("- {follow_up}"));
        }
        lines.join("\n")
    }

    fn from_output(output: &Map<String, Value>, documents: usize) -> Self {
        let list = |field: &str| -> Vec<String> {
            let items = match output.get(field) {
                Some(Value::Array(items)) => items.iter().map(scalar_text).collect(),
                Some(Value::Null) | None => Vec::new(),
                Some(other) => vec![scalar_text(other)],
            };
            items
                .into_iter()
                .filter(|s| !s.trim().is_empty())
                .take(MAX_REPORT_ITEMS)
                .collect()
        };
        let flag = |field: &str| output.get(field).and_then(Value::as_bool).unwrap_or(false);
        Self {
            documents,
            has_gaps: flag("has_gaps"),
            gaps: list("gaps"),
            recommendations: list("recommendations"),
            testing_type_needed: flag("testing_type_needed"),
            follow_up: output.get("follow_up").map(scalar_text).unwrap_or_default(),
        }
    }
}

/// Answer to a question about stored artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum Answer {
    /// Model answer
    Answered(String),
    /// Nothing of the asked kind is stored yet
    NothingStored,
}

/// Read-only tools over a suite's documents and artifacts
#[derive(Debug, Clone)]
pub struct InsightTools {
    env: GenerationEnv,
}

impl InsightTools {
    /// Create the tool set
    #[inline]
    #[must_use]
    pub fn new(env: GenerationEnv) -> Self {
        Self { env }
    }

    /// Short free-text preview of what generation would produce
    ///
    /// # Errors
    /// Returns [`GenerationError::NoInputData`] without documents
    pub async fn preview(
        &self,
        suite_id: &SuiteId,
        mode: PreviewMode,
        ask: Option<&str>,
    ) -> Result<String, GenerationError> {
        let documents = self
            .env
            .load_documents(suite_id, self.env.config().preview_document_chars)
            .await?;
        let ask = ask.map(str::trim).filter(|a| !a.is_empty());
        let prompt = prompts::preview(mode.guidelines(), ask, &documents);
        self.env.complete(&prompt).await
    }

    /// Find gaps that would block clean requirements and testing
    ///
    /// A suite without documents yields an empty report rather than an error.
    ///
    /// # Errors
    /// Returns [`GenerationError::InvalidOutput`] for malformed model output
    pub async fn identify_gaps(
        &self,
        suite_id: &SuiteId,
        testing_type: Option<&str>,
    ) -> Result<GapReport, GenerationError> {
        let documents = match self
            .env
            .load_documents(suite_id, self.env.config().preview_document_chars)
            .await
        {
            Ok(documents) => documents,
            Err(GenerationError::NoInputData(_)) => return Ok(GapReport::default()),
            Err(e) => return Err(e),
        };
        let focus = testing_type
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| matches!(t.as_str(), "unit" | "integration" | "system"));
        let raw = self
            .env
            .complete(&prompts::identify_gaps(&documents, focus.as_deref()))
            .await?;
        let output = parse_object(&raw, "gap analysis")?;
        let report = GapReport::from_output(&output, documents.len());
        tracing::debug!(
            "Gap analysis for {}: has_gaps={} gaps={}",
            suite_id,
            report.has_gaps,
            report.gaps.len()
        );
        Ok(report)
    }

    /// Answer a question from the current requirements
    ///
    /// # Errors
    /// Returns an error if requirements cannot be read or the call fails
    pub async fn answer_requirements(&self, suite_id: &SuiteId, question: &str) -> Result<Answer, GenerationError> {
        let (_, requirements) = self.env.requirements(suite_id).await?;
        if requirements.is_empty() {
            return Ok(Answer::NothingStored);
        }
        let brief: Vec<Value> = requirements
            .iter()
            .map(|r| json!({"id": r.req_code, "source": r.source, "text": r.text}))
            .collect();
        let context = clip_context(&Value::Array(brief).to_string(), ANSWER_CONTEXT_CHARS);
        let text = self
            .env
            .complete(&prompts::answer_requirements(question, &context))
            .await?;
        Ok(Answer::Answered(text))
    }

    /// Answer a question from the current test cases
    ///
    /// # Errors
    /// Returns an error if test cases cannot be read or the call fails
    pub async fn answer_testcases(&self, suite_id: &SuiteId, question: &str) -> Result<Answer, GenerationError> {
        let version = self.env.latest_version(suite_id).await?;
        let rows = self
            .env
            .snapshot(ArtifactKind::TestCase, suite_id, version)
            .await?;
        let compact: Vec<Value> = rows
            .iter()
            .flat_map(|row| {
                let requirement = row.key.req_code().map(str::to_string);
                let source = row.content.get("source").cloned();
                row.content
                    .get_array("cases")
                    .into_iter()
                    .flatten()
                    .filter(|case| case.is_object())
                    .map(move |case| {
                        json!({
                            "requirement_id": requirement,
                            "source": source,
                            "type": case.get("type"),
                            "title": case.get("title"),
                            "expected": case.get("expected"),
                        })
                    })
            })
            .collect();
        if compact.is_empty() {
            return Ok(Answer::NothingStored);
        }
        let context = clip_context(&Value::Array(compact).to_string(), ANSWER_CONTEXT_CHARS);
        let text = self
            .env
            .complete(&prompts::answer_testcases(question, &context))
            .await?;
        Ok(Answer::Answered(text))
    }

    /// Free-text test cases straight from the documents
    ///
    /// # Errors
    /// Returns [`GenerationError::NoInputData`] without documents
    pub async fn direct_testcases(&self, suite_id: &SuiteId, limit_per_doc: usize) -> Result<String, GenerationError> {
        let documents = self
            .env
            .load_documents(suite_id, self.env.config().direct_document_chars)
            .await?;
        let prompt = prompts::direct_testcases(limit_per_doc.max(1), &documents);
        self.env.complete(&prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn report(value: Value) -> GapReport {
        GapReport::from_output(value.as_object().unwrap(), 1)
    }

    #[test]
    fn preview_modes_parse_leniently() {
        assert_eq!("Requirements".parse::<PreviewMode>().unwrap(), PreviewMode::Requirements);
        assert_eq!("test_design".parse::<PreviewMode>().unwrap(), PreviewMode::TestDesign);
        assert_eq!("whatever".parse::<PreviewMode>().unwrap(), PreviewMode::Auto);
    }

    #[test]
    fn gap_lists_are_coerced_and_capped() {
        let gaps: Vec<String> = (0..15).map(|i| format!("gap {i}")).collect();
        let r = report(json!({"has_gaps": true, "gaps": gaps, "recommendations": "clarify roles"}));
        assert_eq!(r.gaps.len(), 10);
        assert_eq!(r.recommendations, vec!["clarify roles".to_string()]);
        assert!(r.blocks());
    }

    #[test]
    fn rendering_follows_findings() {
        let r = report(json!({"has_gaps": true, "gaps": ["No timeout defined"], "testing_type_needed": true}));
        assert_eq!(
            r.render(),
            format!("Gap analysis results:\n- No timeout defined\n\nAdditional info needed:\n- {DEFAULT_FOLLOW_UP}")
        );

        let clean = report(json!({"has_gaps": false}));
        assert_eq!(clean.render(), "No significant gaps detected in documents.");

        let focus = report(json!({"has_gaps": false, "testing_type_needed": true, "follow_up": "Unit or system?"}));
        assert_eq!(focus.render(), "Unit or system?");

        assert_eq!(GapReport::default().render(), "No documents available for gap analysis.");
    }

    #[test]
    fn answer_serializes_with_status() {
        let value = serde_json::to_value(Answer::Answered("REQ-1".into())).unwrap();
        assert_eq!(value, json!({"status": "answered", "text": "REQ-1"}));
        let value = serde_json::to_value(Answer::NothingStored).unwrap();
        assert_eq!(value, json!({"status": "nothing_stored"}));
    }
}
