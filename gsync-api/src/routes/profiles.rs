use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use gsync_core::FleetError;
use gsync_orchestrator::{OperationReport, ProfileConfig, ProfileMetadata, ProfileSummary, ReportStatus};

use crate::{error::ApiResult, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/profiles", get(list_profiles).post(create_profile))
        .route("/api/profiles/available", get(list_available))
        .route("/api/profiles/{name}", axum::routing::delete(delete_profile))
        .route("/api/profiles/{name}/display-name", put(rename_profile))
        .route("/api/profiles/{name}/config", get(get_config).put(save_config))
        .route("/api/profiles/{name}/start", post(start_profile))
        .route("/api/profiles/{name}/stop", post(stop_profile))
        .route("/api/profiles/{name}/recreate", post(recreate_profile))
}

async fn list_profiles(State(state): State<AppState>) -> ApiResult<Json<Vec<ProfileSummary>>> {
    Ok(Json(state.run(|o| o.list_profiles()).await?))
}

async fn list_available(State(state): State<AppState>) -> ApiResult<Json<Vec<ProfileSummary>>> {
    Ok(Json(state.run(|o| o.list_available()).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateProfileRequest {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

async fn create_profile(
    State(state): State<AppState>,
    Json(req): Json<CreateProfileRequest>,
) -> ApiResult<(StatusCode, Json<ProfileMetadata>)> {
    let meta = state
        .run(move |o| o.create_profile(req.name.trim(), req.display_name.as_deref()))
        .await?;
    Ok((StatusCode::CREATED, Json(meta)))
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub display_name: String,
}

async fn rename_profile(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<RenameRequest>,
) -> ApiResult<Json<ProfileMetadata>> {
    let meta = state
        .run(move |o| o.rename_profile(&name, &req.display_name))
        .await?;
    Ok(Json(meta))
}

#[derive(Debug, Serialize)]
pub struct ProfileConfigView {
    pub profile: String,
    pub display_name: String,
    pub has_compose: bool,
    pub config: ProfileConfig,
}

/// The stored config, or fleet defaults when the profile has no manifest yet.
async fn get_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<ProfileConfigView>> {
    let view = state
        .run(move |o| {
            let meta = o.load_metadata(&name)?;
            let (config, has_compose) = match o.load_config(&name) {
                Ok(config) => (config, true),
                Err(FleetError::ManifestMissing(_)) => (o.default_config(), false),
                Err(e) => return Err(e),
            };
            Ok(ProfileConfigView {
                profile: name,
                display_name: meta.display_name,
                has_compose,
                config,
            })
        })
        .await?;
    Ok(Json(view))
}

async fn save_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(config): Json<ProfileConfig>,
) -> ApiResult<Json<Value>> {
    let (path, content) = state
        .run(move |o| {
            let content = o.save_config(&name, &config)?;
            Ok((o.fleet().manifest_path(&name), content))
        })
        .await?;
    Ok(Json(json!({
        "status": "saved",
        "manifest": path.display().to_string(),
        "content": content
    })))
}

async fn start_profile(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<Json<Value>> {
    let output = state.run(move |o| o.start_profile(&name)).await?;
    Ok(Json(json!({ "status": "started", "message": output })))
}

async fn stop_profile(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<Json<Value>> {
    let output = state.run(move |o| o.stop_profile(&name)).await?;
    Ok(Json(json!({ "status": "stopped", "message": output })))
}

async fn recreate_profile(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let output = state.run(move |o| o.recreate_profile(&name)).await?;
    Ok(Json(json!({ "status": "recreated", "message": output })))
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    /// Files are only removed on an explicit `keep_files=false`.
    #[serde(default = "keep_files_by_default")]
    pub keep_files: bool,
}

fn keep_files_by_default() -> bool {
    true
}

/// Removes the container. With `?keep_files=false` the manifest and the
/// profile working directory go too. Partial deletes still answer 200; the
/// report lists what failed.
async fn delete_profile(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> ApiResult<(StatusCode, Json<OperationReport>)> {
    let report = state
        .run(move |o| o.delete_profile(&name, query.keep_files))
        .await?;
    let status = match report.status {
        ReportStatus::Failed => StatusCode::INTERNAL_SERVER_ERROR,
        ReportStatus::Success | ReportStatus::Partial => StatusCode::OK,
    };
    Ok((status, Json(report)))
}
