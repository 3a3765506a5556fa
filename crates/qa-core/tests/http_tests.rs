//! Runs driven through the HTTP router

use axum::body::{to_bytes, Body};
use axum::http::{header::CONTENT_TYPE, Request, StatusCode};
use axum::Router;
use pretty_assertions::assert_eq;
use qa_core::http::{router, ApiState};
use qa_core::prelude::*;
use qa_test_utils::{ScriptedGenerator, TestStores};
use qa_versioning::{SuiteStatus, SuiteStore};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const BODY_LIMIT: usize = 1_048_576;

fn app(stores: &TestStores, client: &Arc<ScriptedGenerator>) -> Router {
    let coordinator = WorkflowCoordinator::new(stores.env(client.clone()), WorkflowConfig::default());
    router(ApiState::new(coordinator, stores.suites.clone()))
}

fn run_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("build request")
}

async fn lines(app: Router, request: Request<Body>) -> Vec<Value> {
    let response = app.oneshot(request).await.expect("router call");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
        Some("application/x-ndjson")
    );
    let bytes = to_bytes(response.into_body(), BODY_LIMIT).await.expect("read body");
    std::str::from_utf8(&bytes)
        .expect("utf-8 body")
        .lines()
        .map(|line| serde_json::from_str(line).expect("one json value per line"))
        .collect()
}

#[tokio::test]
async fn run_streams_turn_events_then_done() {
    let stores = TestStores::new();
    let client = Arc::new(ScriptedGenerator::new());
    let suite = stores.suite.to_string();

    let body = lines(
        app(&stores, &client),
        run_request("/run", json!({"task": "Generate test cases", "suite_id": suite})),
    )
    .await;

    let (done, events) = body.split_last().expect("at least the done line");
    assert_eq!(done, &json!({"event": "done"}));
    assert!(!events.is_empty());
    assert!(events.iter().all(|e| e["suite_id"] == json!(suite)));
    assert_eq!(events[0]["turn"], json!(1));

    let suite = stores.suites.load(&stores.suite).await.unwrap().unwrap();
    assert_eq!(suite.status, SuiteStatus::Idle);
}

#[tokio::test]
async fn stream_route_creates_the_default_suite() {
    let stores = TestStores::new();
    let client = Arc::new(ScriptedGenerator::new());

    let body = lines(
        app(&stores, &client),
        run_request("/run/stream", json!({"task": "hello"})),
    )
    .await;

    assert_eq!(body.last(), Some(&json!({"event": "done"})));
    assert!(body[..body.len() - 1]
        .iter()
        .all(|e| e["suite_id"] == json!("default")));
    let created = stores.suites.load(&SuiteId::new("default")).await.unwrap();
    assert!(created.is_some());
}
