use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "gsync-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn readiness_check(State(state): State<AppState>) -> Json<Value> {
    // Check the container runtime answers
    let runtime_ok = state.run(|o| o.container_stats()).await.is_ok();

    Json(json!({
        "status": if runtime_ok { "ready" } else { "not_ready" },
        "service": "gsync-api",
        "version": env!("CARGO_PKG_VERSION"),
        "runtime": if runtime_ok { "connected" } else { "disconnected" }
    }))
}
