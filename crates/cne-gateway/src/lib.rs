//! Cloud native events REST gateway.
//!
//! HTTP registry for event publishers and subscriptions, a status bridge that
//! answers current-state queries over the asynchronous dispatch channel, and a
//! supervisor that keeps the listener alive.

pub mod auth;
pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod prober;
pub mod registry;
pub mod routes;
pub mod store;
pub mod supervisor;

pub use bridge::{BridgeReply, Resolution, ResolveResult, SharedResolver, StatusBridge, StatusResolver};
pub use config::{Args, AuthConfig, DuplicatePolicy, GatewayConfig};
pub use dispatch::{dispatch_channel, DispatchReceiver, Dispatcher};
pub use error::{AppError, ServerError};
pub use metrics::{MetricsRegistry, SharedMetricsRegistry};
pub use registry::{Created, Registry};
pub use store::{MemoryStore, PubSubStore, RecordKind, SharedStore};
pub use supervisor::{ServerStatus, StatusCell, Supervisor};

use std::sync::Arc;

use axum::{handler::Handler, middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::AuthGate;
use crate::prober::{EndpointProbe, HttpProber};

/// Application state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Publisher and subscription registry.
    pub registry: Arc<Registry>,
    /// Current-state bridge.
    pub bridge: Arc<StatusBridge>,
    /// Metrics boundary.
    pub metrics: SharedMetricsRegistry,
    /// Gateway configuration.
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    /// Create state with the in-memory store and the HTTP endpoint prober.
    pub fn new(
        config: GatewayConfig,
        dispatcher: Dispatcher,
        resolver: Option<SharedResolver>,
    ) -> error::Result<Self> {
        let prober = HttpProber::new(config.probe_timeout)?;
        Ok(Self::with_parts(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(prober),
            dispatcher,
            resolver,
            metrics::new_shared_registry(),
        ))
    }

    /// Create state from explicit collaborators.
    pub fn with_parts(
        config: GatewayConfig,
        store: SharedStore,
        prober: Arc<dyn EndpointProbe>,
        dispatcher: Dispatcher,
        resolver: Option<SharedResolver>,
        metrics: SharedMetricsRegistry,
    ) -> Self {
        let registry = Arc::new(Registry::new(
            &config,
            store,
            prober,
            dispatcher.clone(),
            metrics.clone(),
        ));
        let bridge = Arc::new(StatusBridge::new(
            registry.clone(),
            dispatcher,
            resolver,
            config.status_timeout,
        ));

        Self {
            registry,
            bridge,
            metrics,
            config: Arc::new(config),
        }
    }
}

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let gate = Arc::new(AuthGate::new(state.config.auth.clone()));
    let gated = middleware::from_fn_with_state(gate, auth::require_auth);

    // Liveness stays reachable so the supervisor can check readiness.
    let api = Router::new().merge(routes::health::routes()).merge(
        Router::new()
            .merge(routes::subscriptions::routes())
            .merge(routes::publishers::routes())
            .merge(routes::events::routes())
            .route_layer(gated.clone()),
    );

    // Nesting at the root is not allowed.
    let router = if state.config.api_path.is_empty() {
        Router::new().merge(api)
    } else {
        Router::new().nest(&state.config.api_path, api)
    };

    router
        .fallback(routes::events::current_state.layer(gated))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
