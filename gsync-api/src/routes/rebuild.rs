use std::convert::Infallible;

use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use bytes::Bytes;
use futures_util::stream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use gsync_orchestrator::RebuildEvent;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/rebuild", post(rebuild))
}

/// Newline-delimited JSON progress frames, written as the pipeline produces
/// them. The pipeline keeps running if the client disconnects.
///
/// The response is only committed once the pipeline has taken the rebuild
/// key, so a concurrent request gets a 409 instead of a second run.
async fn rebuild(State(state): State<AppState>) -> ApiResult<Response> {
    let (tx, rx) = mpsc::unbounded_channel::<RebuildEvent>();
    let (started_tx, started_rx) = oneshot::channel::<gsync_core::Result<()>>();
    let orchestrator = state.orchestrator.clone();

    tokio::task::spawn_blocking(move || {
        let mut started_tx = Some(started_tx);
        let result = orchestrator.rebuild(&mut |event: RebuildEvent| {
            if let Some(started) = started_tx.take() {
                let _ = started.send(Ok(()));
            }
            let _ = tx.send(event);
        });
        match result {
            Ok(summary) => {
                info!(?summary, "rebuild pipeline finished");
                if let Some(started) = started_tx.take() {
                    let _ = started.send(Ok(()));
                }
            }
            Err(e) => {
                debug!(error = %e, "rebuild refused");
                if let Some(started) = started_tx.take() {
                    let _ = started.send(Err(e));
                }
            }
        }
    });

    match started_rx.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(ApiError::Internal("rebuild task ended unexpectedly".into())),
    }

    let frames = stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|event| (Ok::<_, Infallible>(Bytes::from(event.to_frame())), rx))
    });

    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(frames),
    )
        .into_response())
}
