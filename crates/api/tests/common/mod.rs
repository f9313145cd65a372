#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use printforge_api::config::{RelayConfig, ServerConfig};
use printforge_api::handlers::relay::build_relay_client;
use printforge_api::router::build_app_router;
use printforge_api::state::AppState;
use printforge_api::ws::WsManager;
use printforge_core::polling::PollConfig;
use printforge_core::provider::{
    FetchFailed, FetchFailureKind, GenerationProvider, ProviderError, StatusFetcher,
};
use printforge_core::relay::ResultMaterializer;
use printforge_core::status::{StatusRecord, TaskStatus};
use printforge_core::submission::{SubmissionError, ValidatedSubmission};
use printforge_pipeline::manager::GenerationManager;

/// Prompt the fake provider refuses.
pub const REJECTED_PROMPT: &str = "forbidden";
/// Prompt that makes the fake provider look unreachable.
pub const UNAVAILABLE_PROMPT: &str = "offline";
/// Task id the fake provider reports as unknown (HTTP 404).
pub const MISSING_TASK: &str = "missing-task";
/// Task id the fake provider refuses to cancel.
pub const LOCKED_TASK: &str = "locked-task";

/// In-memory provider whose task statuses the test sets directly.
///
/// Tasks without an explicit status report `queued` at 0%.
#[derive(Default)]
pub struct FakeProvider {
    statuses: Mutex<HashMap<String, Result<StatusRecord, FetchFailed>>>,
    submitted: Mutex<Vec<ValidatedSubmission>>,
    cancelled: Mutex<Vec<String>>,
    next_id: AtomicUsize,
}

impl FakeProvider {
    pub fn set_status(&self, task_id: &str, record: StatusRecord) {
        self.statuses
            .lock()
            .unwrap()
            .insert(task_id.to_string(), Ok(record));
    }

    pub fn set_failure(&self, task_id: &str, failure: FetchFailed) {
        self.statuses
            .lock()
            .unwrap()
            .insert(task_id.to_string(), Err(failure));
    }

    pub fn submitted(&self) -> Vec<ValidatedSubmission> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusFetcher for FakeProvider {
    async fn fetch_status(&self, job_id: &str) -> Result<StatusRecord, FetchFailed> {
        if job_id == MISSING_TASK {
            return Err(FetchFailed::new(
                FetchFailureKind::HttpStatus(404),
                "task not found",
            ));
        }
        self.statuses
            .lock()
            .unwrap()
            .get(job_id)
            .cloned()
            .unwrap_or_else(|| Ok(StatusRecord::new(TaskStatus::Queued, 0)))
    }
}

#[async_trait]
impl GenerationProvider for FakeProvider {
    async fn submit(&self, submission: &ValidatedSubmission) -> Result<String, SubmissionError> {
        if let ValidatedSubmission::Text { prompt } = submission {
            match prompt.as_str() {
                REJECTED_PROMPT => {
                    return Err(SubmissionError::Rejected("prompt rejected".into()))
                }
                UNAVAILABLE_PROMPT => {
                    return Err(SubmissionError::Unavailable("connection refused".into()))
                }
                _ => {}
            }
        }
        self.submitted.lock().unwrap().push(submission.clone());
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("job-{n}"))
    }

    async fn cancel(&self, job_id: &str) -> Result<(), ProviderError> {
        if job_id == LOCKED_TASK {
            return Err(ProviderError("task cannot be cancelled".into()));
        }
        self.cancelled.lock().unwrap().push(job_id.to_string());
        Ok(())
    }

    async fn list_tasks(&self, page: u32, limit: u32) -> Result<serde_json::Value, ProviderError> {
        Ok(serde_json::json!({
            "tasks": [{ "task_id": "job-1", "status": "success" }],
            "page": page,
            "limit": limit,
        }))
    }
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        propagate_cancel: false,
        relay: RelayConfig::default(),
    }
}

/// Fast polling so sessions finish within a test.
pub fn fast_poll_config() -> PollConfig {
    PollConfig {
        poll_interval: Duration::from_millis(10),
        error_retry_interval: Duration::from_millis(10),
        ..PollConfig::default()
    }
}

/// The router plus the pieces tests inspect behind it.
pub struct TestApp {
    pub router: Router,
    pub provider: Arc<FakeProvider>,
    pub generations: Arc<GenerationManager>,
    pub ws_manager: Arc<WsManager>,
}

impl TestApp {
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

pub fn build_test_app() -> TestApp {
    build_test_app_with(test_config())
}

/// Build the full application router with the production middleware
/// stack, backed by a [`FakeProvider`].
pub fn build_test_app_with(config: ServerConfig) -> TestApp {
    let provider = Arc::new(FakeProvider::default());
    let materializer: Arc<dyn ResultMaterializer> = Arc::new(config.relay.materializer());
    let generations = Arc::new(GenerationManager::new(
        Arc::clone(&provider) as Arc<dyn GenerationProvider>,
        Arc::clone(&materializer),
        fast_poll_config(),
        config.propagate_cancel,
    ));
    let ws_manager = Arc::new(WsManager::new());

    let state = AppState {
        config: Arc::new(config.clone()),
        provider: Arc::clone(&provider) as Arc<dyn GenerationProvider>,
        generations: Arc::clone(&generations),
        materializer,
        relay_client: build_relay_client(&config.relay, Duration::from_secs(10)).unwrap(),
        ws_manager: Arc::clone(&ws_manager),
    };

    TestApp {
        router: build_app_router(state, &config),
        provider,
        generations,
        ws_manager,
    }
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, Body::empty()).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, Body::empty()).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

async fn send(app: Router, method: Method, uri: &str, body: Body) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(body)
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Poll the context snapshot until `done` holds, failing after two seconds.
pub async fn wait_for_snapshot(
    app: &TestApp,
    context: &str,
    done: impl Fn(&serde_json::Value) -> bool,
) -> serde_json::Value {
    for _ in 0..200 {
        let response = get(app.router(), &format!("/api/v1/generations/{context}")).await;
        if response.status() == StatusCode::OK {
            let json = body_json(response).await;
            if done(&json["data"]) {
                return json["data"].clone();
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("snapshot for '{context}' never reached the expected state");
}
