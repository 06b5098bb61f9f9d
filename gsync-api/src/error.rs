use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use gsync_core::{ErrorKind, FleetError};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Timeout(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<FleetError> for ApiError {
    fn from(err: FleetError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::NotFound => ApiError::NotFound(message),
            ErrorKind::ValidationFailure => ApiError::BadRequest(message),
            ErrorKind::Conflict => ApiError::Conflict(message),
            ErrorKind::Timeout => ApiError::Timeout(message),
            ErrorKind::RuntimeFailure => ApiError::Internal(message),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("worker task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_follows_error_kind() {
        let cases = [
            (FleetError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (FleetError::ManifestMissing("x".into()), StatusCode::NOT_FOUND),
            (FleetError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (FleetError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                FleetError::Timeout {
                    command: "docker stop".into(),
                    after: std::time::Duration::from_secs(30),
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (FleetError::runtime("docker rm", "busy"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}
