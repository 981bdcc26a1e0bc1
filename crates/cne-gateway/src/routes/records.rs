//! Handlers shared by the publisher and subscription collections.

use axum::{
    body::Bytes,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use cne_proto::PubSub;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::registry::Created;
use crate::store::RecordKind;
use crate::AppState;

/// Bulk delete response.
#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: usize,
}

/// Decode a JSON request body, rejecting empty ones.
pub(crate) fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::BadRequest("request body is empty".into()));
    }
    Ok(serde_json::from_slice(body)?)
}

pub(super) async fn create(state: &AppState, kind: RecordKind, body: Bytes) -> Result<Response> {
    let record: PubSub = parse_body(&body)?;

    let response = match state.registry.create(kind, record).await? {
        Created::New(record) => {
            let location = record.uri_location.clone().unwrap_or_default();
            (
                StatusCode::CREATED,
                [(header::LOCATION, location)],
                Json(record),
            )
                .into_response()
        }
        Created::Existing(record) => (StatusCode::OK, Json(record)).into_response(),
    };
    Ok(response)
}

pub(super) fn get(state: &AppState, kind: RecordKind, id: &str) -> Result<Json<PubSub>> {
    Ok(Json(state.registry.get(kind, id)?))
}

pub(super) fn list(state: &AppState, kind: RecordKind) -> Result<Json<Vec<PubSub>>> {
    Ok(Json(state.registry.list(kind)?))
}

pub(super) async fn delete(state: &AppState, kind: RecordKind, id: &str) -> Result<StatusCode> {
    state.registry.delete(kind, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn delete_all(state: &AppState, kind: RecordKind) -> Result<Json<DeletedResponse>> {
    let deleted = state.registry.delete_all(kind).await?;
    Ok(Json(DeletedResponse { deleted }))
}
