//! Cloud native events REST gateway binary.

use clap::Parser;
use cne_gateway::{
    create_router, dispatch::spawn_log_consumer, dispatch_channel, AppState, Args,
    GatewayConfig, Supervisor,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line args
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "cne_gateway={level},tower_http={level}",
            level = args.log_level
        ))
    });
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    let config = GatewayConfig::from(args);

    info!(
        listen = %config.listen_addr(),
        api_path = %config.api_path,
        duplicate_policy = ?config.duplicate_policy,
        "Starting cloud native events gateway"
    );

    // Dispatch channel; the logging consumer stands in for the event transport
    let (dispatcher, receiver) = dispatch_channel(config.dispatch_capacity);
    let consumer = spawn_log_consumer(receiver);

    let state = AppState::new(config.clone(), dispatcher, None)?;
    let metrics = state.metrics.clone();
    let registry = state.registry.clone();
    let app = create_router(state);

    let supervisor = Supervisor::new(config.clone(), app, metrics)?;
    supervisor.start();

    if let Err(e) = supervisor.wait_healthy().await {
        warn!(error = %e, "gateway did not become healthy, continuing to retry");
    }

    // Resource locations carry the port actually bound.
    if let Some(addr) = supervisor.local_addr() {
        registry.set_base_url(config.base_url_for(addr));
        info!(base_url = %registry.base_url(), "advertising resource locations");
    }

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");

    supervisor.cancel();
    supervisor.join().await;
    consumer.abort();

    info!("Gateway stopped");
    Ok(())
}
