//! Dependency-service errors.
//!
//! `From<ServiceError> for GantryError` lets callers propagate with `?`.

use gantry_core::error::{GantryError, ProcessError};

/// Dependency-service domain error.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The start step failed.
    #[error("service '{service}' failed to start: {reason}")]
    StartFailed { service: String, reason: String },

    /// The stop step failed.
    #[error("service '{service}' failed to stop: {reason}")]
    StopFailed { service: String, reason: String },

    /// Readiness polling gave up.
    #[error("service '{service}' not ready after {attempts} attempts: {last}")]
    NotReady {
        service: String,
        attempts: u32,
        last: String,
    },

    /// Docker API call failed.
    #[error("docker api error: {0}")]
    DockerApi(String),

    /// Docker socket connection failed.
    #[error("docker connection error: {0}")]
    DockerConnection(String),

    /// The container does not exist.
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// The descriptor cannot be turned into a service.
    #[error("invalid service '{service}': {reason}")]
    InvalidSpec { service: String, reason: String },

    /// A start, stop or probe command could not be prepared or spawned.
    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl From<ServiceError> for GantryError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Process(e) => GantryError::Process(e),
            other => GantryError::Service(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_message_names_attempts() {
        let err = ServiceError::NotReady {
            service: "opensearch".to_owned(),
            attempts: 30,
            last: "connection refused".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "service 'opensearch' not ready after 30 attempts: connection refused"
        );
    }

    #[test]
    fn converts_into_gantry_error() {
        let err: GantryError = ServiceError::DockerApi("boom".to_owned()).into();
        assert!(matches!(err, GantryError::Service(_)));

        let err: GantryError = ServiceError::Process(ProcessError::EmptyCommand).into();
        assert!(matches!(err, GantryError::Process(ProcessError::EmptyCommand)));
    }
}
