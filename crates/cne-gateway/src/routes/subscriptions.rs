//! Subscription endpoints.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::{get, put},
    Json, Router,
};
use cne_proto::PubSub;
use serde_json::{json, Value};

use super::records::{self, DeletedResponse};
use crate::error::AppError;
use crate::store::RecordKind;
use crate::AppState;

/// Subscription routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/subscriptions",
            get(list_subscriptions)
                .post(create_subscription)
                .delete(delete_all_subscriptions),
        )
        .route(
            "/subscriptions/:id",
            get(get_subscription).delete(delete_subscription),
        )
        .route("/subscriptions/status/:id", put(ping_subscription))
}

async fn create_subscription(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, AppError> {
    records::create(&state, RecordKind::Subscription, body).await
}

async fn list_subscriptions(State(state): State<AppState>) -> Result<Json<Vec<PubSub>>, AppError> {
    records::list(&state, RecordKind::Subscription)
}

async fn get_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PubSub>, AppError> {
    records::get(&state, RecordKind::Subscription, &id)
}

async fn delete_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    records::delete(&state, RecordKind::Subscription, &id).await
}

async fn delete_all_subscriptions(
    State(state): State<AppState>,
) -> Result<Json<DeletedResponse>, AppError> {
    records::delete_all(&state, RecordKind::Subscription).await
}

/// Ask the publisher side to re-send the status for a subscription.
async fn ping_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    state.registry.ping_status(&id).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "message": "ping sent" }))))
}
