//! Shared helpers for gsync-api tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{body::Body, http::Request, Router};
use serde_json::Value;
use tempfile::TempDir;

use gsync_api::{create_app, AppState};
use gsync_core::FleetConfig;
use gsync_orchestrator::Orchestrator;
use gsync_runtime::mock::{MockCompose, MockRuntime};

/// An app wired to mock runtimes over a throwaway workspace.
pub struct TestApp {
    pub temp: TempDir,
    pub runtime: Arc<MockRuntime>,
    pub state: AppState,
    pub app: Router,
}

impl TestApp {
    pub fn fleet(&self) -> FleetConfig {
        FleetConfig::for_workspace(self.temp.path())
    }
}

pub fn create_test_app() -> TestApp {
    let temp = TempDir::new().expect("Failed to create temp workspace");
    let fleet = FleetConfig::for_workspace(temp.path());
    let runtime = Arc::new(MockRuntime::new());
    let compose = Arc::new(MockCompose::new(runtime.clone(), &fleet.container_prefix));
    let orchestrator = Orchestrator::new(fleet, runtime.clone(), compose);
    let state = AppState::new(orchestrator);
    let app = create_app(state.clone());
    TestApp {
        temp,
        runtime,
        state,
        app,
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

/// Helper to extract JSON body from response
pub async fn extract_json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub async fn extract_text_body(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}
