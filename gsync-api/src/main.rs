use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use gsync_api::{create_app, AppState};
use gsync_core::{tracing_init, FleetConfig};
use gsync_orchestrator::Orchestrator;
use gsync_runtime::{DockerCompose, DockerRuntime};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init::init_with_defaults("gsync_api=info,gsync_orchestrator=info,tower_http=info")?;

    info!("Starting gsync-api service...");

    let config = FleetConfig::from_env();
    info!(
        "Configuration loaded: bind_addr={}, workspace={}, image={}",
        config.bind_addr,
        config.workspace_root.display(),
        config.image
    );

    let runtime = Arc::new(DockerRuntime::new(&config)?);
    let compose = Arc::new(DockerCompose::new(&config));
    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(Orchestrator::new(config, runtime, compose));

    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
