//! Error handling for the gateway.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

/// Client-visible error taxonomy.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or empty request body.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Record failed field validation.
    #[error("validation failed: {0}")]
    Validation(#[from] cne_proto::Error),

    /// Endpoint URI was unreachable or answered with the wrong status.
    #[error("endpoint validation failed: {0}")]
    ProbeFailed(String),

    /// Resource is not served by this node.
    #[error("resource not available: {0}")]
    ResourceUnavailable(String),

    /// Unknown id or resource.
    #[error("{0} not found")]
    NotFound(String),

    /// Registration already exists.
    #[error("already exists: {0}")]
    Conflict(String),

    /// Store reported a failure.
    #[error("store error: {0}")]
    Store(String),

    /// Status query could not be resolved.
    #[error("status not resolved: {0}")]
    StatusResolution(String),

    /// Nobody is draining the dispatch channel.
    #[error("event dispatch channel is closed")]
    DispatchClosed,

    /// No reply arrived for a status query in time.
    #[error("no status reply within {0:?}")]
    StatusTimeout(Duration),

    /// Rejected by the authentication gate.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status and stable error code for this error.
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::ProbeFailed(_) => (StatusCode::BAD_REQUEST, "ENDPOINT_PROBE_FAILED"),
            AppError::ResourceUnavailable(_) => (StatusCode::NOT_FOUND, "RESOURCE_NOT_AVAILABLE"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            AppError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
            AppError::StatusResolution(_) => (StatusCode::NOT_FOUND, "STATUS_NOT_RESOLVED"),
            AppError::DispatchClosed => (StatusCode::SERVICE_UNAVAILABLE, "DISPATCH_UNAVAILABLE"),
            AppError::StatusTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "STATUS_TIMEOUT"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();

        let body = Json(json!({
            "success": false,
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => AppError::NotFound(format!("{kind} {id}")),
            StoreError::AlreadyExists(existing) => AppError::Conflict(format!(
                "resource {} is already registered for this endpoint",
                existing.resource
            )),
            StoreError::Backend(msg) => AppError::Store(msg),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON error: {}", err))
    }
}

/// Listener lifecycle errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding the listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The listener stopped with an error.
    #[error("listener error: {0}")]
    Serve(#[from] std::io::Error),

    /// The service never became reachable.
    #[error("health check failed: {0}")]
    HealthCheck(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use cne_proto::PubSub;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::BadRequest("x".into()).status().0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::ProbeFailed("x".into()).status().0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::NotFound("x".into()).status().0, StatusCode::NOT_FOUND);
        assert_eq!(AppError::Conflict("x".into()).status().0, StatusCode::CONFLICT);
        assert_eq!(
            AppError::StatusTimeout(Duration::from_secs(1)).status().0,
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            AppError::DispatchClosed.status().0,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_store_error_conversion() {
        let err: AppError = StoreError::AlreadyExists(PubSub::new("/a")).into();
        assert!(matches!(err, AppError::Conflict(_)));

        let err: AppError = StoreError::Backend("disk full".into()).into();
        assert_eq!(err.status().0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_response_status() {
        let response = AppError::NotFound("subscription abc".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
