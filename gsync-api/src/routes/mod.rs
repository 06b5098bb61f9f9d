pub mod browse;
pub mod containers;
pub mod health;
pub mod profiles;
pub mod rebuild;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(containers::routes())
        .merge(profiles::routes())
        .merge(rebuild::routes())
        .merge(browse::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
