//! Status bridge.
//!
//! Turns a synchronous `GET .../CurrentState` into a status query. A
//! [`StatusResolver`] either answers in place by filling the message payload,
//! or asks the bridge to forward the query over the dispatch channel and wait
//! for the reply, bounded by the status timeout.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use cne_proto::{CloudEvent, DispatchMessage, ReplyEnvelope};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dispatch::Dispatcher;
use crate::error::{AppError, Result};
use crate::registry::Registry;

/// How a resolver handled a status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The payload was filled in on the dispatch message.
    Resolved,
    /// The bridge should dispatch the message and wait for its reply.
    Forward,
}

/// Result of a resolver call. The error text is returned to the client.
pub type ResolveResult = std::result::Result<Resolution, String>;

/// Deployment-supplied capability resolving current-state queries.
pub trait StatusResolver: Send + Sync {
    /// Resolve `query`, either in place on `message` or by asking for a forward.
    fn resolve(&self, query: &CloudEvent, message: &mut DispatchMessage) -> ResolveResult;
}

impl<F> StatusResolver for F
where
    F: Fn(&CloudEvent, &mut DispatchMessage) -> ResolveResult + Send + Sync,
{
    fn resolve(&self, query: &CloudEvent, message: &mut DispatchMessage) -> ResolveResult {
        self(query, message)
    }
}

/// Shared resolver handle.
pub type SharedResolver = Arc<dyn StatusResolver>;

/// Answer of a status query.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeReply {
    /// Event resolved in place.
    Event(CloudEvent),
    /// Reply delivered by the transport.
    Envelope(ReplyEnvelope),
}

impl IntoResponse for BridgeReply {
    fn into_response(self) -> Response {
        match self {
            BridgeReply::Event(event) => (StatusCode::OK, Json(event)).into_response(),
            BridgeReply::Envelope(envelope) => {
                let Ok(status) = StatusCode::from_u16(envelope.status_code) else {
                    return AppError::Internal(format!(
                        "invalid status code {} in status reply",
                        envelope.status_code
                    ))
                    .into_response();
                };

                match envelope.payload {
                    Some(payload) if status.is_success() => (status, Json(payload)).into_response(),
                    _ => (
                        status,
                        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                        envelope.message,
                    )
                        .into_response(),
                }
            }
        }
    }
}

/// Bridges HTTP status queries to the dispatch channel.
pub struct StatusBridge {
    registry: Arc<Registry>,
    dispatcher: Dispatcher,
    resolver: Option<SharedResolver>,
    timeout: Duration,
}

impl StatusBridge {
    /// Create a bridge. Without a resolver every query fails as not found.
    pub fn new(
        registry: Arc<Registry>,
        dispatcher: Dispatcher,
        resolver: Option<SharedResolver>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            resolver,
            timeout,
        }
    }

    /// Current state of the resource at `address`.
    pub async fn current_state(&self, address: &str) -> Result<BridgeReply> {
        let address = normalize_address(address);
        if address == "/" {
            return Err(AppError::BadRequest("resource address is empty".into()));
        }

        let Some(target) = self.registry.find_by_resource(&address)? else {
            return Err(AppError::NotFound(format!("subscription for {address}")));
        };

        let Some(resolver) = &self.resolver else {
            return Err(AppError::StatusResolution(
                "no status resolver registered".into(),
            ));
        };

        let query = CloudEvent::current_state(&address);
        let client_id = target.client_id().unwrap_or_else(Uuid::new_v4);
        let (mut message, receiver) = DispatchMessage::status_query(&address, client_id);

        let resolution = resolver.resolve(&query, &mut message).map_err(|e| {
            warn!(address = %address, error = %e, "status resolver failed");
            AppError::StatusResolution(e)
        })?;

        match resolution {
            Resolution::Resolved => match message.payload.take() {
                Some(event) => Ok(BridgeReply::Event(event)),
                None => Err(AppError::NotFound(format!("event for {address}"))),
            },
            Resolution::Forward => {
                if message.payload.is_none() {
                    message.payload = Some(query);
                }
                debug!(
                    address = %address,
                    correlation_id = receiver.correlation_id(),
                    "forwarding status query"
                );

                let exchange = async {
                    self.dispatcher.send(message).await?;
                    Ok::<_, AppError>(receiver.recv().await)
                };

                // The receiver is dropped on expiry, so a late reply is discarded.
                match tokio::time::timeout(self.timeout, exchange).await {
                    Ok(Ok(Some(envelope))) => Ok(BridgeReply::Envelope(envelope)),
                    Ok(Ok(None)) => Err(AppError::NotFound(format!("status for {address}"))),
                    Ok(Err(e)) => Err(e),
                    Err(_) => {
                        warn!(address = %address, timeout = ?self.timeout, "status query timed out");
                        Err(AppError::StatusTimeout(self.timeout))
                    }
                }
            }
        }
    }
}

fn normalize_address(address: &str) -> String {
    if address.starts_with('/') {
        address.to_string()
    } else {
        format!("/{address}")
    }
}
