//! Error taxonomy shared by every fleet crate.
//!
//! Variants are grouped into a small set of [`ErrorKind`]s so callers can decide
//! how to react (treat as success, surface as a 404, retry by hand) without
//! matching on message text.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FleetError>;

/// Coarse classification of a [`FleetError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Timeout,
    RuntimeFailure,
    ValidationFailure,
}

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No manifest for profile '{0}'. Save a configuration before starting it")]
    ManifestMissing(String),

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Timed out after {}s: {command}", .after.as_secs())]
    Timeout { command: String, after: Duration },

    #[error("{operation} failed: {detail}")]
    RuntimeFailure { operation: String, detail: String },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),
}

impl FleetError {
    pub fn runtime(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::RuntimeFailure {
            operation: operation.into(),
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::ManifestMissing(_) => ErrorKind::NotFound,
            Self::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Validation(_) => ErrorKind::ValidationFailure,
            Self::RuntimeFailure { .. }
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Template(_) => ErrorKind::RuntimeFailure,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<serde_yaml_ng::Error> for FleetError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        FleetError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for FleetError {
    fn from(err: serde_json::Error) -> Self {
        FleetError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_missing_is_not_found() {
        let err = FleetError::ManifestMissing("alpha".into());
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.is_not_found());
        assert!(err.to_string().contains("alpha"));
    }

    #[test]
    fn test_io_not_found_maps_to_not_found() {
        let err: FleetError = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err: FleetError = std::io::Error::from(std::io::ErrorKind::PermissionDenied).into();
        assert_eq!(err.kind(), ErrorKind::RuntimeFailure);
    }

    #[test]
    fn test_timeout_message_names_command() {
        let err = FleetError::Timeout {
            command: "docker stop gphotos-sync-alpha".into(),
            after: Duration::from_secs(30),
        };
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(
            err.to_string(),
            "Timed out after 30s: docker stop gphotos-sync-alpha"
        );
    }
}
