//! Request helpers shared by the integration and E2E tests

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tower::ServiceExt;

use media_jobs::app_state::AppState;
use media_jobs::config::AppConfig;
use media_jobs::routes;

use crate::fixtures::{ScriptedFetcher, ScriptedResolver};

/// In-process service wired with scripted collaborators.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    /// Each permit lets one blocked download complete.
    pub gate: Arc<Semaphore>,
    _artifacts: tempfile::TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        let artifacts = tempfile::tempdir().expect("Failed to create artifact dir");
        let config = AppConfig {
            artifact_dir: artifacts.path().to_string_lossy().into_owned(),
            max_concurrent_jobs: 0,
            max_batch_size: 10,
            ..AppConfig::default()
        };
        let (fetcher, gate) = ScriptedFetcher::new();
        let state = AppState::new(&config, Arc::new(fetcher), Arc::new(ScriptedResolver::new()));
        Self {
            router: routes::router(state.clone()),
            state,
            gate,
            _artifacts: artifacts,
        }
    }

    pub fn release(&self, downloads: usize) {
        self.gate.add_permits(downloads);
    }

    pub async fn request(&self, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = self
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("Router failed");
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        (status, headers, body.to_vec())
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let req = Request::get(uri).body(Body::empty()).unwrap();
        let (status, _, body) = self.request(req).await;
        (status, parse_json(&body))
    }

    pub async fn post_json(&self, uri: &str, payload: Value) -> (StatusCode, Value) {
        let req = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap();
        let (status, _, body) = self.request(req).await;
        (status, parse_json(&body))
    }

    pub async fn status_of(&self, job_id: &str) -> Value {
        let (status, body) = self.get_json(&format!("/jobs/{job_id}")).await;
        assert_eq!(status, StatusCode::OK, "status lookup failed: {body}");
        body
    }

    /// Poll until the job leaves queued/running, recording every observation.
    pub async fn wait_terminal(&self, job_id: &str) -> (Value, Vec<Value>) {
        let mut seen = Vec::new();
        for _ in 0..400 {
            let body = self.status_of(job_id).await;
            seen.push(body.clone());
            match body["status"].as_str() {
                Some("finished") | Some("error") => return (body, seen),
                _ => tokio::time::sleep(Duration::from_millis(5)).await,
            }
        }
        panic!("job {job_id} did not reach a terminal state: {seen:?}");
    }

    /// Poll until the job reports `running`.
    pub async fn wait_running(&self, job_id: &str) {
        for _ in 0..400 {
            if self.status_of(job_id).await["status"] == "running" {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {job_id} never started running");
    }
}

fn parse_json(body: &[u8]) -> Value {
    if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(body).unwrap_or(Value::Null)
    }
}

/// Base URL of a running server for the E2E suite.
pub fn base_url() -> String {
    std::env::var("API_BASE_URL").unwrap_or_else(|_| "http://localhost:5000".to_string())
}

/// Poll a live server until the job finishes or fails (with timeout).
pub async fn poll_job_status(
    client: &reqwest::Client,
    base_url: &str,
    job_id: &str,
    timeout_secs: u64,
) -> Result<Value, Box<dyn std::error::Error>> {
    let max_attempts = timeout_secs * 2; // Poll every 500ms
    let mut last_progress = 0;

    for _ in 0..max_attempts {
        let response = client
            .get(format!("{}/jobs/{}", base_url, job_id))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(format!("Status check failed: {}", error_text).into());
        }

        let body: Value = response.json().await?;
        match body["status"].as_str() {
            Some("finished") | Some("error") => return Ok(body),
            Some("running") => {
                let progress = body["progress"].as_u64().unwrap_or(0);
                if progress < last_progress {
                    return Err(format!("progress went backwards: {last_progress} -> {progress}").into());
                }
                last_progress = progress;
                println!("  ... {}%", progress);
            }
            _ => {}
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    Err(format!("Job {} did not complete within {}s", job_id, timeout_secs).into())
}
