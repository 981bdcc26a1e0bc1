//! Publisher endpoints.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use cne_proto::PubSub;

use super::records::{self, DeletedResponse};
use crate::error::AppError;
use crate::store::RecordKind;
use crate::AppState;

/// Publisher routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/publishers",
            get(list_publishers)
                .post(create_publisher)
                .delete(delete_all_publishers),
        )
        .route(
            "/publishers/:id",
            get(get_publisher).delete(delete_publisher),
        )
}

async fn create_publisher(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, AppError> {
    records::create(&state, RecordKind::Publisher, body).await
}

async fn list_publishers(State(state): State<AppState>) -> Result<Json<Vec<PubSub>>, AppError> {
    records::list(&state, RecordKind::Publisher)
}

async fn get_publisher(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PubSub>, AppError> {
    records::get(&state, RecordKind::Publisher, &id)
}

async fn delete_publisher(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    records::delete(&state, RecordKind::Publisher, &id).await
}

async fn delete_all_publishers(
    State(state): State<AppState>,
) -> Result<Json<DeletedResponse>, AppError> {
    records::delete_all(&state, RecordKind::Publisher).await
}
