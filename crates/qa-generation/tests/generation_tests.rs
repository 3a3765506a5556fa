//! End-to-end generator behavior over in-memory stores

use pretty_assertions::assert_eq;
use qa_artifact::{ArtifactKind, ArtifactStore, InMemoryArtifactStore, RowFilter};
use qa_generation::prelude::*;
use qa_generation::{Answer, GenerationConfig, InMemoryDocumentSource, PreviewMode};
use qa_test_utils::{
    design_json, requirements_json, testcases_json, viewpoints_json, FailingEventSink,
    FlakySuiteStore, ScriptedGenerator, TestStores,
};
use qa_versioning::{AuditEvent, InMemoryEventLog, VersionManager};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn stores() -> TestStores {
    TestStores::new().with_document("spec.txt", "Users sign in with email and password.")
}

async fn extract(stores: &TestStores, client: &Arc<ScriptedGenerator>, n: usize) -> u32 {
    client.once("TASK: extract_requirements", requirements_json(n));
    RequirementExtractor::new(stores.env(client.clone()))
        .produce(&stores.suite, ())
        .await
        .unwrap()
        .version
}

fn script_testcases(client: &ScriptedGenerator, codes: &[&str]) {
    for code in codes {
        let needle = format!("for requirement {code}.");
        client.on_all(&["TASK: testcases", &needle], testcases_json(code));
    }
}

/// Content of `kind` at `version`, keyed by natural key
async fn contents_at(
    stores: &TestStores,
    kind: ArtifactKind,
    version: u32,
) -> HashMap<String, serde_json::Value> {
    stores
        .artifacts
        .snapshot(kind, &stores.suite, version)
        .await
        .unwrap()
        .into_iter()
        .map(|row| (row.natural_key().to_string(), row.content.into_value()))
        .collect()
}

fn assert_single_active(stores: &TestStores, kind: ArtifactKind) {
    let mut seen = std::collections::HashSet::new();
    for row in stores.active(kind) {
        assert!(
            seen.insert(row.natural_key()),
            "two active {kind} rows for {}",
            row.natural_key()
        );
    }
}

#[tokio::test]
async fn extraction_cuts_version_one() {
    let stores = stores();
    let client = Arc::new(ScriptedGenerator::new());
    let version = extract(&stores, &client, 3).await;

    assert_eq!(version, 1);
    assert_eq!(stores.active(ArtifactKind::Requirement).len(), 3);
    let history = stores.versions().history(&stores.suite).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].description.starts_with("Requirements extracted"));
}

#[tokio::test]
async fn missing_documents_fail_before_any_call() {
    let stores = TestStores::new();
    let client = Arc::new(ScriptedGenerator::new());
    let err = RequirementExtractor::new(stores.env(client.clone()))
        .produce(&stores.suite, ())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NoInputData);
    assert!(client.calls().is_empty());
    assert_eq!(stores.versions().current_version(&stores.suite).await.unwrap(), 0);
}

#[tokio::test]
async fn invalid_output_writes_nothing_and_keeps_version() {
    let stores = stores();
    let client = Arc::new(ScriptedGenerator::new());
    client.on("TASK: extract_requirements", "Sure! Here are your requirements:");

    let err = RequirementExtractor::new(stores.env(client))
        .produce(&stores.suite, ())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidGenerationOutput);
    assert_eq!(stores.artifacts.row_count(ArtifactKind::Requirement), 0);
    assert_eq!(stores.versions().current_version(&stores.suite).await.unwrap(), 0);
}

#[tokio::test]
async fn versioning_failure_blocks_the_write() {
    let suites = Arc::new(FlakySuiteStore::new());
    let suite = SuiteId::new("suite-1");
    suites.create(suite.clone());
    suites.set_fail_writes(true);
    let artifacts = Arc::new(InMemoryArtifactStore::new());
    let versions = VersionManager::new(artifacts.clone(), suites, Arc::new(InMemoryEventLog::new()));
    let documents = Arc::new(InMemoryDocumentSource::new());
    documents.put_document(&suite, "spec.txt", "text");
    let client = Arc::new(ScriptedGenerator::new());
    client.on("TASK: extract_requirements", requirements_json(2));

    let env = GenerationEnv::new(client, documents, versions);
    let err = RequirementExtractor::new(env).produce(&suite, ()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::VersioningFailure);
    assert_eq!(artifacts.row_count(ArtifactKind::Requirement), 0);
}

#[tokio::test]
async fn re_extraction_replaces_the_requirement_set() {
    let stores = stores();
    let client = Arc::new(ScriptedGenerator::new());
    extract(&stores, &client, 3).await;
    let version = extract(&stores, &client, 2).await;

    assert_eq!(version, 2);
    let active = stores.active(ArtifactKind::Requirement);
    assert_eq!(active.len(), 2);
    assert!(active.iter().all(|row| row.version == 2));
    assert_single_active(&stores, ArtifactKind::Requirement);
}

#[tokio::test]
async fn bulk_generation_reports_partial_failure() {
    let stores = stores();
    let client = Arc::new(ScriptedGenerator::new());
    extract(&stores, &client, 5).await;
    client.fail_on(&["TASK: testcases", "for requirement REQ-3."], "model overloaded");
    script_testcases(&client, &["REQ-1", "REQ-2", "REQ-4", "REQ-5"]);

    let report = TestCaseGenerator::new(stores.env(client))
        .generate_all(&stores.suite)
        .await
        .unwrap();

    assert_eq!(report.version, 2);
    assert_eq!(report.generated, 4);
    assert_eq!(report.failed, 1);
    assert_eq!(report.errors[0].req_id, "REQ-3");
    assert_eq!(report.errors[0].kind, ErrorKind::GenerationCallFailed);
    let codes: Vec<&str> = report.results.iter().map(|r| r.req_code.as_str()).collect();
    assert_eq!(codes, vec!["REQ-1", "REQ-2", "REQ-4", "REQ-5"]);

    let rows = stores.active(ArtifactKind::TestCase);
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|row| row.version == 2));
    assert_eq!(stores.versions().current_version(&stores.suite).await.unwrap(), 2);
}

#[tokio::test]
async fn bulk_generation_respects_the_concurrency_cap() {
    let stores = stores();
    let client = Arc::new(ScriptedGenerator::new().with_delay(Duration::from_millis(20)));
    extract(&stores, &client, 10).await;
    client.on("TASK: testcases", testcases_json("REQ-1"));

    let report = TestCaseGenerator::new(stores.env(client.clone()))
        .generate_all(&stores.suite)
        .await
        .unwrap();

    assert_eq!(report.generated, 10);
    assert!(client.max_in_flight() <= 6, "saw {}", client.max_in_flight());
    assert!(client.max_in_flight() > 1);
}

#[tokio::test]
async fn bulk_concurrency_setting_is_honored() {
    let stores = stores();
    let client = Arc::new(ScriptedGenerator::new().with_delay(Duration::from_millis(5)));
    extract(&stores, &client, 4).await;
    client.on("TASK: testcases", testcases_json("REQ-1"));

    let env = stores
        .env(client.clone())
        .with_config(GenerationConfig::new().with_max_bulk_concurrency(1));
    TestCaseGenerator::new(env).generate_all(&stores.suite).await.unwrap();

    assert_eq!(client.max_in_flight(), 1);
}

#[tokio::test]
async fn bulk_without_requirements_is_no_input() {
    let stores = stores();
    let client = Arc::new(ScriptedGenerator::new());
    let err = TestCaseGenerator::new(stores.env(client))
        .generate_all(&stores.suite)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoInputData);
}

#[tokio::test]
async fn full_pipeline_keeps_every_version_complete() {
    let stores = stores();
    let client = Arc::new(ScriptedGenerator::new());
    client.on("TASK: test_design", design_json("integration", &["REQ-1", "REQ-2"]));
    client.on("TASK: viewpoints", viewpoints_json(&["REQ-1", "REQ-2"]));
    script_testcases(&client, &["REQ-1", "REQ-2"]);
    let env = stores.env(client.clone());

    assert_eq!(extract(&stores, &client, 2).await, 1);
    let design = TestDesignGenerator::new(env.clone())
        .produce(&stores.suite, "Integration".to_string())
        .await
        .unwrap();
    assert_eq!(design.version, 2);
    let viewpoints = ViewpointGenerator::new(env.clone())
        .produce(&stores.suite, ())
        .await
        .unwrap();
    assert_eq!(viewpoints.version, 3);
    let cases = TestCaseGenerator::new(env)
        .produce(&stores.suite, "REQ-1".to_string())
        .await
        .unwrap();
    assert_eq!(cases.version, 4);

    for kind in [ArtifactKind::Requirement, ArtifactKind::TestDesign, ArtifactKind::Viewpoint] {
        assert_eq!(
            contents_at(&stores, kind, 4).await,
            contents_at(&stores, kind, 3).await,
            "{kind} changed between v3 and v4"
        );
    }
    let v4_cases = contents_at(&stores, ArtifactKind::TestCase, 4).await;
    assert_eq!(v4_cases.len(), 1);
    assert_eq!(v4_cases["REQ-1"]["requirement_id"], json!("REQ-1"));

    for kind in ArtifactKind::ALL {
        assert_single_active(&stores, kind);
    }
}

#[tokio::test]
async fn viewpoint_links_point_at_the_new_version() {
    let stores = stores();
    let client = Arc::new(ScriptedGenerator::new());
    client.on("TASK: test_design", design_json("unit", &["REQ-1"]));
    client.on("TASK: viewpoints", viewpoints_json(&["REQ-1", "REQ-404"]));
    let env = stores.env(client.clone());
    extract(&stores, &client, 1).await;
    TestDesignGenerator::new(env.clone())
        .produce(&stores.suite, "unit".to_string())
        .await
        .unwrap();

    let produced = ViewpointGenerator::new(env).produce(&stores.suite, ()).await.unwrap();
    assert_eq!(produced.rows.len(), 1);

    let requirement = &stores.active(ArtifactKind::Requirement)[0];
    let design = &stores.active(ArtifactKind::TestDesign)[0];
    assert_eq!(requirement.version, produced.version);
    match &produced.rows[0].key {
        qa_artifact::ArtifactKey::Viewpoint {
            requirement_id,
            test_design_id,
            ..
        } => {
            assert_eq!(*requirement_id, Some(requirement.id));
            assert_eq!(*test_design_id, Some(design.id));
        }
        other => panic!("unexpected key {other:?}"),
    }
}

#[tokio::test]
async fn dangling_flow_references_are_dropped() {
    let stores = stores();
    let client = Arc::new(ScriptedGenerator::new());
    client.on("TASK: test_design", design_json("integration", &["REQ-1"]));
    client.on(
        "TASK: testcases",
        json!({"requirement_id": "REQ-1", "cases": [
            {"id": "TC-1", "flow_id": "FLOW-1"},
            {"id": "TC-2", "flow_id": "FLOW-99", "viewpoint": "Nope"}
        ]})
        .to_string(),
    );
    let env = stores.env(client.clone());
    extract(&stores, &client, 1).await;
    TestDesignGenerator::new(env.clone())
        .produce(&stores.suite, "integration".to_string())
        .await
        .unwrap();

    let produced = TestCaseGenerator::new(env)
        .produce(&stores.suite, "REQ-1".to_string())
        .await
        .unwrap();
    let cases = produced.output.content.get_array("cases").unwrap().clone();
    assert_eq!(cases[0]["flow_id"], json!("FLOW-1"));
    assert!(cases[1].get("flow_id").is_none());
    assert!(cases[1].get("viewpoint").is_none());
}

#[tokio::test]
async fn unknown_requirement_is_no_input() {
    let stores = stores();
    let client = Arc::new(ScriptedGenerator::new());
    extract(&stores, &client, 1).await;
    let err = TestCaseGenerator::new(stores.env(client))
        .produce(&stores.suite, "REQ-9".to_string())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoInputData);
    assert_eq!(stores.versions().current_version(&stores.suite).await.unwrap(), 1);
}

#[tokio::test]
async fn no_op_edit_does_not_consume_a_version() {
    let stores = stores();
    let client = Arc::new(ScriptedGenerator::new());
    extract(&stores, &client, 2).await;
    client.on(
        "TASK: edit_testcases",
        json!({"edits": [{"req_code": "REQ-77", "new_testcases": {}}], "summary": "nothing"}).to_string(),
    );

    let report = TestCaseEditor::new(stores.env(client))
        .edit(&stores.suite, "make titles shorter")
        .await
        .unwrap();

    assert_eq!(report.version, None);
    assert_eq!(report.not_found, vec!["REQ-77".to_string()]);
    assert_eq!(stores.versions().current_version(&stores.suite).await.unwrap(), 1);
    let events = stores.events.of_type(&stores.suite, "testcases_edited_bulk");
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn edit_merges_over_stored_cases() {
    let stores = stores();
    let client = Arc::new(ScriptedGenerator::new());
    extract(&stores, &client, 2).await;
    script_testcases(&client, &["REQ-1", "REQ-2"]);
    TestCaseGenerator::new(stores.env(client.clone()))
        .generate_all(&stores.suite)
        .await
        .unwrap();

    client.on(
        "TASK: edit_testcases",
        json!({
            "edits": [
                {
                    "req_code": "REQ-1",
                    "diff": {"edited": [{"change_note": "shorter title"}]},
                    "new_testcases": {"cases": [
                        {"id": "TC-1", "title": "short"},
                        {"id": "TC-2", "title": "rejects"}
                    ]}
                },
                {"req_code": "REQ-2", "new_testcases": {"requirement_id": "REQ-2"}}
            ],
            "summary": "Shortened one title"
        })
        .to_string(),
    );
    let report = TestCaseEditor::new(stores.env(client))
        .edit(&stores.suite, "shorten the first title of REQ-1")
        .await
        .unwrap();

    assert_eq!(report.version, Some(3));
    assert_eq!(report.edited_count(), 1);
    assert_eq!(report.edited[0].req_code, "REQ-1");
    assert_eq!(report.edited[0].old_version, Some(2));
    assert_eq!(report.unchanged, vec!["REQ-2".to_string()]);

    let rows = contents_at(&stores, ArtifactKind::TestCase, 3).await;
    let edited = &rows["REQ-1"];
    assert_eq!(edited["version"], json!(3));
    assert_eq!(edited["source"], json!("spec.txt"));
    assert_eq!(edited["cases"][0]["title"], json!("short"));
    assert_eq!(edited["cases"][0]["expected"], json!("ok"));
    assert_eq!(rows["REQ-2"]["cases"][0]["title"], json!("works"));
    assert_single_active(&stores, ArtifactKind::TestCase);

    match &stores.events.of_type(&stores.suite, "testcases_edited_bulk")[0] {
        AuditEvent::TestcasesEdited { version, edits, .. } => {
            assert_eq!(*version, Some(3));
            assert_eq!(edits.len(), 1);
            assert_eq!(edits[0]["req_code"], json!("REQ-1"));
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn audit_failures_do_not_fail_generation() {
    let stores = stores();
    let versions = VersionManager::new(
        stores.artifacts.clone(),
        stores.suites.clone(),
        Arc::new(FailingEventSink),
    );
    let client = Arc::new(ScriptedGenerator::new());
    client.on("TASK: extract_requirements", requirements_json(1));
    script_testcases(&client, &["REQ-1"]);
    client.on(
        "TASK: edit_testcases",
        json!({"edits": [{"req_code": "REQ-1", "new_testcases": {"note": "reviewed"}}]}).to_string(),
    );
    let env = GenerationEnv::new(client, stores.documents.clone(), versions);

    RequirementExtractor::new(env.clone()).produce(&stores.suite, ()).await.unwrap();
    TestCaseGenerator::new(env.clone())
        .generate_all(&stores.suite)
        .await
        .unwrap();
    let report = TestCaseEditor::new(env).edit(&stores.suite, "mark reviewed").await.unwrap();

    assert_eq!(report.version, Some(3));
    assert_eq!(stores.active(ArtifactKind::TestCase)[0].content.get_str("note"), Some("reviewed"));
}

#[tokio::test]
async fn cache_follows_the_latest_version() {
    let stores = stores();
    let client = Arc::new(ScriptedGenerator::new());
    client.on("TASK: test_design", design_json("unit", &["REQ-1"]));
    let env = stores.env(client.clone());

    client.once("TASK: extract_requirements", requirements_json(3));
    RequirementExtractor::new(env.clone())
        .produce(&stores.suite, ())
        .await
        .unwrap();
    assert_eq!(env.cache().get(&stores.suite, 1).await.unwrap().len(), 3);

    TestDesignGenerator::new(env.clone())
        .produce(&stores.suite, "unit".to_string())
        .await
        .unwrap();
    assert!(env.cache().get(&stores.suite, 1).await.is_none());

    let (version, requirements) = env.requirements(&stores.suite).await.unwrap();
    assert_eq!(version, 2);
    assert_eq!(requirements.len(), 3);
}

#[tokio::test]
async fn restore_reproduces_generated_content() {
    let stores = stores();
    let client = Arc::new(ScriptedGenerator::new());
    extract(&stores, &client, 2).await;
    extract(&stores, &client, 4).await;

    let outcome = stores.versions().restore(&stores.suite, 1).await.unwrap();
    assert_eq!(outcome.new_version, 3);
    assert_eq!(
        contents_at(&stores, ArtifactKind::Requirement, 3).await,
        contents_at(&stores, ArtifactKind::Requirement, 1).await
    );
    let active = stores
        .artifacts
        .query(
            ArtifactKind::Requirement,
            &RowFilter::suite(&stores.suite).with_active(true),
        )
        .await
        .unwrap();
    assert_eq!(active.len(), 2);
}

#[tokio::test]
async fn insight_tools_read_without_writing() {
    let stores = stores();
    let client = Arc::new(ScriptedGenerator::new());
    client.on("TASK: preview", "REQ-1: users sign in");
    client.on(
        "TASK: identify_gaps",
        json!({"has_gaps": true, "gaps": ["Lockout policy undefined"], "recommendations": ["Define lockout"]})
            .to_string(),
    );
    client.on("TASK: answer_requirements", "REQ-1 covers sign in.");
    let tools = InsightTools::new(stores.env(client.clone()));

    let preview = tools
        .preview(&stores.suite, PreviewMode::Requirements, None)
        .await
        .unwrap();
    assert_eq!(preview, "REQ-1: users sign in");

    let gaps = tools.identify_gaps(&stores.suite, Some("Unit")).await.unwrap();
    assert!(gaps.blocks());
    assert!(gaps.render().contains("Lockout policy undefined"));
    let gap_prompt = client.calls().last().unwrap().user.clone();
    assert!(gap_prompt.contains("Testing focus: unit"));

    assert_eq!(
        tools.answer_requirements(&stores.suite, "what about sign in?").await.unwrap(),
        Answer::NothingStored
    );
    assert_eq!(
        tools.answer_testcases(&stores.suite, "any negatives?").await.unwrap(),
        Answer::NothingStored
    );

    extract(&stores, &client, 1).await;
    assert_eq!(
        tools.answer_requirements(&stores.suite, "what about sign in?").await.unwrap(),
        Answer::Answered("REQ-1 covers sign in.".into())
    );
    assert_eq!(stores.versions().current_version(&stores.suite).await.unwrap(), 1);
}

#[tokio::test]
async fn gap_analysis_without_documents_is_empty() {
    let stores = TestStores::new();
    let client = Arc::new(ScriptedGenerator::new());
    let report = InsightTools::new(stores.env(client.clone()))
        .identify_gaps(&stores.suite, None)
        .await
        .unwrap();
    assert_eq!(report.documents, 0);
    assert!(!report.blocks());
    assert!(client.calls().is_empty());
}
