use std::sync::Arc;

use gsync_orchestrator::Orchestrator;

use crate::error::ApiResult;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// Run a blocking orchestrator call on the blocking pool.
    pub async fn run<T, F>(&self, op: F) -> ApiResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Orchestrator) -> gsync_core::Result<T> + Send + 'static,
    {
        let orchestrator = self.orchestrator.clone();
        Ok(tokio::task::spawn_blocking(move || op(&orchestrator)).await??)
    }
}
