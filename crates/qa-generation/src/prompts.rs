//! Prompt builders
//!
//! Every user prompt opens with a `TASK: <name>` line so logs and scripted
//! test generators can tell calls apart.

use crate::documents::{bundle, Document};
use std::fmt::Write as _;

const JSON_ONLY: &str = "Respond with strict JSON only. No markdown, no commentary.";

/// One generation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Task tag, e.g. `extract_requirements`
    pub task: &'static str,
    /// System message
    pub system: String,
    /// User message
    pub user: String,
}

impl Prompt {
    fn new(task: &'static str, system: &str, body: &str) -> Self {
        Self {
            task,
            system: system.to_string(),
            user: format!("TASK: {task}\n\n{}", body.trim()),
        }
    }
}

/// Cut a serialized context block to `max_chars`
#[must_use]
pub fn clip_context(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}\n...truncated...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Requirement extraction over a document bundle
#[must_use]
pub fn extract_requirements(documents: &[Document]) -> Prompt {
    let body = format!(
        r#"Extract a de-duplicated list of atomic, verifiable requirements from the documents.

Rules:
- Every item is standalone and testable.
- Preserve the documents' meaning; invent no constraints.
- Name the source document of every item.
- Number ids REQ-1, REQ-2, ... in order of appearance.

Output: a JSON array
[{{"id": "REQ-1", "source": "<doc name>", "text": "<requirement>"}}]

Documents:
{}"#,
        bundle(documents)
    );
    Prompt::new("extract_requirements", JSON_ONLY, &body)
}

/// Test design flows for one testing focus
#[must_use]
pub fn test_design(testing_type: &str, requirements_json: &str) -> Prompt {
    let body = format!(
        r#"Design {testing_type} test flows covering the requirements below.

Output: a JSON object
{{"testing_type": "{testing_type}", "flows": [
  {{"id": "FLOW-1", "name": "<flow name>", "steps": ["..."], "requirements": ["REQ-1"]}}
]}}

Requirements:
{requirements_json}"#
    );
    Prompt::new("test_design", JSON_ONLY, &body)
}

/// Test viewpoints per requirement
#[must_use]
pub fn viewpoints(requirements_json: &str, flows_json: Option<&str>) -> Prompt {
    let mut body = format!(
        r#"List test viewpoints (angles a tester must cover) for each requirement.

Output: a JSON object
{{"viewpoints": [
  {{"req_code": "REQ-1", "items": [{{"name": "<short name>", "rationale": "<why it matters>"}}]}}
]}}

Use only the requirement codes given below.

Requirements:
{requirements_json}"#
    );
    if let Some(flows) = flows_json {
        let _ = write!(body, "\n\nTest design flows:\n{flows}");
    }
    Prompt::new("viewpoints", JSON_ONLY, &body)
}

/// Happy, edge and negative cases for one requirement
#[must_use]
pub fn testcases(
    req_code: &str,
    source: &str,
    text: &str,
    flows_json: Option<&str>,
    viewpoints_json: Option<&str>,
) -> Prompt {
    let mut body = format!(
        r#"Write concise test cases (happy, edge, negative) for requirement {req_code}.

Output: a JSON object
{{"requirement_id": "{req_code}", "source": "{source}", "requirement_text": "<short restatement>",
  "cases": [
    {{"id": "TC-1", "type": "happy", "title": "...", "preconditions": ["..."], "steps": ["..."], "expected": "..."}}
  ]}}

Case ids are short and unique within this requirement.
A case may reference a flow with "flow_id" and a viewpoint with "viewpoint" (exact name)."#
    );
    if let Some(flows) = flows_json {
        let _ = write!(body, "\n\nFlows:\n{flows}");
    }
    if let Some(viewpoints) = viewpoints_json {
        let _ = write!(body, "\n\nViewpoints:\n{viewpoints}");
    }
    let _ = write!(body, "\n\nRequirement text:\n{text}");
    Prompt::new("testcases", JSON_ONLY, &body)
}

/// Suite-wide edit of existing test cases
#[must_use]
pub fn edit_testcases(
    instruction: &str,
    requirements_json: &str,
    testcases_json: &str,
    designs_json: &str,
    viewpoints_json: &str,
) -> Prompt {
    let body = format!(
        r#"Apply the edit request to the test cases it affects. Content schemas are open:
keep every field you do not change.

Output: a JSON object
{{"edits": [
  {{"req_code": "REQ-1",
    "diff": {{"added": [], "removed": [], "edited": [{{"before": {{}}, "after": {{}}, "change_note": "..."}}]}},
    "new_testcases": {{"requirement_id": "REQ-1", "cases": []}}}}
 ],
 "summary": "<one or two sentences>"}}

Select affected requirements by req_code. Return "edits": [] when nothing applies.

Requirements:
{requirements_json}

Current test cases (latest per requirement):
{testcases_json}

Test designs:
{designs_json}

Viewpoints:
{viewpoints_json}

Edit request:
{instruction}"#
    );
    Prompt::new("edit_testcases", JSON_ONLY, &body)
}

/// Short free-text preview
#[must_use]
pub fn preview(guidelines: &str, ask: Option<&str>, documents: &[Document]) -> Prompt {
    let ask = ask.map(|a| format!("User ask: {a}\n\n")).unwrap_or_default();
    let body = format!(
        r#"Write a SHORT preview for a test suite.

Guidelines:
{guidelines}
- Stay under about 200 words and easy to skim.
- Quote the documents sparingly.

{ask}Documents:
{}"#,
        bundle(documents)
    );
    Prompt::new(
        "preview",
        "Return a compact, readable preview. Avoid code blocks.",
        &body,
    )
}

/// Test cases straight from documents
#[must_use]
pub fn direct_testcases(limit_per_doc: usize, documents: &[Document]) -> Prompt {
    let body = format!(
        r#"Write high-value test cases directly from the documents, without extracting requirements.

- At most {limit_per_doc} cases per document.
- Short titles, 1-5 steps, a clear expected outcome.
- Name the source document of each case.

Documents:
{}"#,
        bundle(documents)
    );
    Prompt::new(
        "direct_testcases",
        "Return a compact, readable list of test cases.",
        &body,
    )
}

/// Gap and ambiguity analysis
#[must_use]
pub fn identify_gaps(documents: &[Document], testing_type: Option<&str>) -> Prompt {
    let mut body = format!(
        r#"Find gaps in the documents that would block clean requirements and testing:
missing acceptance criteria, undefined terms, conflicts, untestable wording,
unclear boundaries, missing error handling, role or permission gaps.

Output: a JSON object
{{"has_gaps": false, "gaps": ["..."], "recommendations": ["..."],
  "testing_type_needed": false, "follow_up": "<question when a testing focus is needed>"}}

Documents:
{}"#,
        bundle(documents)
    );
    if let Some(focus) = testing_type {
        let _ = write!(
            body,
            "\n\nTesting focus: {focus}. Emphasize {focus}-testing concerns."
        );
    }
    Prompt::new("identify_gaps", JSON_ONLY, &body)
}

/// Question about stored requirements
#[must_use]
pub fn answer_requirements(question: &str, requirements_json: &str) -> Prompt {
    let body = format!(
        r#"Answer the question using only these requirements. Cite ids such as REQ-1.
If the answer is not there, say "Not found in requirements".

Requirements:
{requirements_json}

Question:
{question}"#
    );
    Prompt::new(
        "answer_requirements",
        "Answer concisely from the provided requirements only.",
        &body,
    )
}

/// Question about stored test cases
#[must_use]
pub fn answer_testcases(question: &str, testcases_json: &str) -> Prompt {
    let body = format!(
        r#"Answer the question using only these test cases. Reference requirement ids and case titles.
If the answer is not there, say "Not found in test cases".

Test cases:
{testcases_json}

Question:
{question}"#
    );
    Prompt::new(
        "answer_testcases",
        "Answer concisely from the provided test cases only.",
        &body,
    )
}
