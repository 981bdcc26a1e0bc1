//! Event publication and current-state queries.

use axum::{
    body::Bytes,
    extract::{OriginalUri, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use cne_proto::CloudEvent;
use serde_json::{json, Value};
use tracing::info;

use super::records::parse_body;
use crate::error::AppError;
use crate::AppState;

const CURRENT_STATE_SUFFIX: &str = "/CurrentState";

/// Event routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/create/event", post(publish_event))
        .route("/log", post(log_event))
}

/// Publish an event for a registered publisher.
async fn publish_event(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let event: CloudEvent = parse_body(&body)?;
    state.registry.publish_event(event).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "message": "event sent" }))))
}

/// Log a posted event.
async fn log_event(body: Bytes) -> Result<StatusCode, AppError> {
    let event: CloudEvent = parse_body(&body)?;
    info!(
        id = %event.id,
        source = %event.source,
        event_type = %event.event_type,
        "event received"
    );
    Ok(StatusCode::ACCEPTED)
}

/// Extract the resource address from `{api}/{resource}/CurrentState`.
pub fn current_state_address<'a>(api_path: &str, path: &'a str) -> Option<&'a str> {
    path.strip_prefix(api_path)?
        .strip_suffix(CURRENT_STATE_SUFFIX)
        .filter(|address| address.starts_with('/'))
}

/// Fallback handler serving `GET {api}/{resource}/CurrentState`.
///
/// Resource addresses contain slashes, so they cannot be matched by a route
/// parameter.
pub async fn current_state(
    State(state): State<AppState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
) -> Response {
    let Some(address) = current_state_address(&state.config.api_path, uri.path()) else {
        return AppError::NotFound(format!("route {}", uri.path())).into_response();
    };

    if method != Method::GET {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    match state.bridge.current_state(address).await {
        Ok(reply) => reply.into_response(),
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_state_address() {
        let api = "/api/ocloudNotifications/v1";

        assert_eq!(
            current_state_address(api, "/api/ocloudNotifications/v1/east/node1/sync/CurrentState"),
            Some("/east/node1/sync")
        );
        assert_eq!(current_state_address(api, "/api/ocloudNotifications/v1/CurrentState"), None);
        assert_eq!(current_state_address(api, "/other/east/CurrentState"), None);
        assert_eq!(current_state_address(api, "/api/ocloudNotifications/v1/east/node1"), None);
    }

    #[test]
    fn test_current_state_address_without_prefix() {
        assert_eq!(current_state_address("", "/east/node1/CurrentState"), Some("/east/node1"));
    }
}
