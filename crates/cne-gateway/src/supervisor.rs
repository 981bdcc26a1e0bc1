//! HTTP listener lifecycle.
//!
//! The [`Supervisor`] owns the listener. It binds and serves the router,
//! marks the listener `Failed` when serving stops and relaunches it after the
//! restart interval, until its cancellation token fires.
//!
//! ```text
//! NotReady --start--> Starting --bound--> Started
//!                        ^                   |
//!                        |              error/shutdown
//!                        +----- tick ---- Failed
//!
//! any --cancel--> NotReady (loop exits)
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::GatewayConfig;
use crate::error::ServerError;
use crate::metrics::SharedMetricsRegistry;

/// Listener state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerStatus {
    Starting = 0,
    Started = 1,
    NotReady = 2,
    Failed = 3,
}

impl ServerStatus {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => ServerStatus::Starting,
            1 => ServerStatus::Started,
            2 => ServerStatus::NotReady,
            _ => ServerStatus::Failed,
        }
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ServerStatus::Starting => "starting",
            ServerStatus::Started => "started",
            ServerStatus::NotReady => "not ready",
            ServerStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Atomically shared [`ServerStatus`].
#[derive(Debug)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    pub fn new(status: ServerStatus) -> Self {
        Self(AtomicU8::new(status as u8))
    }

    pub fn load(&self) -> ServerStatus {
        ServerStatus::from_raw(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, status: ServerStatus) {
        self.0.store(status as u8, Ordering::Release);
    }

    /// Swap `current` for `new`. Returns `false` if the state was not `current`.
    pub fn transition(&self, current: ServerStatus, new: ServerStatus) -> bool {
        self.0
            .compare_exchange(
                current as u8,
                new as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new(ServerStatus::NotReady)
    }
}

struct Inner {
    config: GatewayConfig,
    router: Router,
    metrics: SharedMetricsRegistry,
    status: StatusCell,
    running: AtomicBool,
    cancel: CancellationToken,
    bound: Mutex<Option<SocketAddr>>,
    close: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    client: reqwest::Client,
}

/// Keeps the HTTP listener alive.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    /// Create a supervisor serving `router`. Nothing is bound until [`start`](Self::start).
    pub fn new(
        config: GatewayConfig,
        router: Router,
        metrics: SharedMetricsRegistry,
    ) -> Result<Self, ServerError> {
        let client = reqwest::Client::builder()
            .timeout(config.probe_timeout)
            .build()
            .map_err(|e| ServerError::HealthCheck(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                router,
                metrics,
                status: StatusCell::default(),
                running: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                bound: Mutex::new(None),
                close: Mutex::new(None),
                task: Mutex::new(None),
                client,
            }),
        })
    }

    /// Launch the supervision loop. A no-op while the loop is running.
    pub fn start(&self) -> bool {
        if self.inner.cancel.is_cancelled() || self.inner.running.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.inner.status.store(ServerStatus::Starting);
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { run(inner).await });
        *self.inner.task.lock() = Some(handle);
        true
    }

    /// Close the active listener. The loop relaunches it on the next tick.
    pub fn shutdown(&self) -> bool {
        match self.inner.close.lock().take() {
            Some(close) => {
                info!("closing listener");
                close.send(()).is_ok()
            }
            None => false,
        }
    }

    /// Stop the supervision loop for good.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    /// Wait for the loop to exit after [`cancel`](Self::cancel).
    pub async fn join(&self) {
        let handle = self.inner.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "supervisor task panicked");
            }
        }
    }

    pub fn status(&self) -> ServerStatus {
        self.inner.status.load()
    }

    /// Whether the listener is bound and serving.
    pub fn is_ready(&self) -> bool {
        self.status() == ServerStatus::Started
    }

    /// Address of the listener, once bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.bound.lock()
    }

    /// Block until the health endpoint answers 200, within the configured attempts.
    pub async fn wait_healthy(&self) -> Result<(), ServerError> {
        let attempts = self.inner.config.health_check_attempts;
        let pause = self.inner.config.health_check_pause;

        for attempt in 1..=attempts {
            if let (true, Some(addr)) = (self.is_ready(), self.local_addr()) {
                let url = format!("http://{}{}/health", addr, self.inner.config.api_path);
                match self.inner.client.get(&url).send().await {
                    Ok(response) if response.status() == reqwest::StatusCode::OK => {
                        info!(%url, attempt, "listener is healthy");
                        return Ok(());
                    }
                    Ok(response) => {
                        warn!(%url, attempt, status = %response.status(), "health check failed")
                    }
                    Err(e) => warn!(%url, attempt, error = %e, "health check failed"),
                }
            } else {
                debug!(attempt, status = %self.status(), "listener not ready yet");
            }
            tokio::time::sleep(pause).await;
        }

        Err(ServerError::HealthCheck(format!(
            "listener not healthy after {attempts} attempts"
        )))
    }
}

async fn bind(inner: &Inner) -> Result<TcpListener, ServerError> {
    let addr = match *inner.bound.lock() {
        Some(addr) => addr.to_string(),
        None => inner.config.listen_addr(),
    };

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

    let local = listener.local_addr()?;
    inner.bound.lock().get_or_insert(local);
    Ok(listener)
}

async fn serve(
    inner: &Inner,
    listener: TcpListener,
    close_rx: oneshot::Receiver<()>,
) -> Result<(), ServerError> {
    let cancel = inner.cancel.clone();
    let result = axum::serve(listener, inner.router.clone())
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = close_rx => {}
            }
        })
        .await;

    inner.close.lock().take();
    result.map_err(ServerError::from)
}

async fn run(inner: Arc<Inner>) {
    let mut launches: u64 = 0;

    loop {
        if inner.cancel.is_cancelled() {
            break;
        }

        if launches > 0 {
            inner.metrics.record_listener_restart();
        }
        launches += 1;
        inner.status.store(ServerStatus::Starting);

        match bind(&inner).await {
            Ok(listener) => {
                let addr = inner.local_addr_string();

                // A listener reported as started can always be closed.
                let (close_tx, close_rx) = oneshot::channel::<()>();
                *inner.close.lock() = Some(close_tx);
                inner
                    .status
                    .transition(ServerStatus::Starting, ServerStatus::Started);
                info!(addr = %addr, launch = launches, "listener started");

                match serve(&inner, listener, close_rx).await {
                    Ok(()) => info!(addr = %addr, "listener closed"),
                    Err(e) => error!(addr = %addr, error = %e, "listener failed"),
                }
            }
            Err(e) => error!(error = %e, launch = launches, "listener failed to start"),
        }

        if inner.cancel.is_cancelled() {
            break;
        }
        inner.status.store(ServerStatus::Failed);

        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            _ = tokio::time::sleep(inner.config.restart_interval) => {}
        }
    }

    inner.status.store(ServerStatus::NotReady);
    inner.running.store(false, Ordering::Release);
    info!("supervisor stopped");
}

impl Inner {
    fn local_addr_string(&self) -> String {
        let bound = *self.bound.lock();
        bound
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| self.config.listen_addr())
    }
}
