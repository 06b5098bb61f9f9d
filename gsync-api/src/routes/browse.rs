use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use gsync_orchestrator::browser::DirectoryListing;

use crate::{error::ApiResult, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/browse", get(browse))
}

#[derive(Debug, Default, Deserialize)]
pub struct BrowseQuery {
    #[serde(default)]
    pub path: String,
}

async fn browse(
    State(state): State<AppState>,
    Query(query): Query<BrowseQuery>,
) -> ApiResult<Json<DirectoryListing>> {
    let listing = state.run(move |o| o.browse(&query.path)).await?;
    Ok(Json(listing))
}
