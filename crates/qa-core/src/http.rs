//! HTTP API
//!
//! - `GET /health` → `{"status":"ok"}`
//! - `POST /run`, `POST /run/stream` with `{task, suite_id?}` → one JSON
//!   turn event per line as the run produces it, then `{"event":"done"}`

use crate::coordinator::WorkflowCoordinator;
use axum::{
    body::Body,
    extract::State,
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, StreamExt};
use qa_artifact::SuiteId;
use qa_versioning::InMemorySuiteStore;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Suite used when a request names none
pub const DEFAULT_SUITE: &str = "default";

/// Shared handler state
#[derive(Debug, Clone)]
pub struct ApiState {
    coordinator: WorkflowCoordinator,
    suites: Arc<InMemorySuiteStore>,
}

impl ApiState {
    /// Serve `coordinator`; unknown suites are created in `suites` on first use
    #[must_use]
    pub fn new(coordinator: WorkflowCoordinator, suites: Arc<InMemorySuiteStore>) -> Self {
        Self { coordinator, suites }
    }
}

#[derive(Debug, Deserialize)]
struct RunRequest {
    task: String,
    #[serde(default)]
    suite_id: Option<String>,
}

/// Build the router
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/run", post(run))
        .route("/run/stream", post(run))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn run(State(state): State<ApiState>, Json(req): Json<RunRequest>) -> Response {
    let suite_id = SuiteId::new(req.suite_id.unwrap_or_else(|| DEFAULT_SUITE.to_string()));
    state.suites.create(suite_id.clone());
    tracing::info!("HTTP run on suite {}", suite_id);

    let lines = state
        .coordinator
        .run(req.task, suite_id)
        .map(|event| {
            serde_json::to_string(&event).unwrap_or_else(|e| {
                tracing::error!("failed to encode turn event: {e}");
                json!({ "event": "progress" }).to_string()
            })
        })
        .chain(stream::once(async { json!({ "event": "done" }).to_string() }))
        .map(|line| Ok::<_, Infallible>(format!("{line}\n")));

    ([(CONTENT_TYPE, "application/x-ndjson")], Body::from_stream(lines)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::{Request, StatusCode};
    use qa_test_utils::{ScriptedGenerator, TestStores};
    use tower::ServiceExt;

    const BODY_LIMIT: usize = 1_048_576;

    fn app(stores: &TestStores) -> Router {
        let coordinator = WorkflowCoordinator::new(
            stores.env(Arc::new(ScriptedGenerator::new())),
            crate::config::WorkflowConfig::default(),
        );
        router(ApiState::new(coordinator, stores.suites.clone()))
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .expect("build request");
        let response = app(&TestStores::new()).oneshot(request).await.expect("router call");
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), BODY_LIMIT).await.expect("read body");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("parse json");
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let request = Request::builder()
            .method("POST")
            .uri("/run")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"suite_id": "s"}"#))
            .expect("build request");
        let response = app(&TestStores::new()).oneshot(request).await.expect("router call");
        assert!(response.status().is_client_error());
    }
}
