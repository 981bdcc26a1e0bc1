//! Integration tests for the listener supervisor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cne_gateway::{
    create_router, dispatch_channel, metrics::new_shared_registry, AppState, AuthConfig,
    DispatchReceiver, GatewayConfig, ServerStatus, StatusCell, Supervisor,
};

fn test_config() -> GatewayConfig {
    GatewayConfig::default()
        .with_listen("127.0.0.1", 0)
        .with_restart_interval(Duration::from_millis(50))
        .with_health_check(40, Duration::from_millis(25))
}

fn supervisor(config: GatewayConfig) -> (Supervisor, DispatchReceiver) {
    let (dispatcher, rx) = dispatch_channel(16);
    let state = AppState::new(config.clone(), dispatcher, None).unwrap();
    let metrics = state.metrics.clone();
    let supervisor = Supervisor::new(config, create_router(state), metrics).unwrap();
    (supervisor, rx)
}

async fn health_status(supervisor: &Supervisor) -> Option<u16> {
    let addr = supervisor.local_addr()?;
    let url = format!("http://{addr}/api/ocloudNotifications/v1/health");
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(1))
        .pool_max_idle_per_host(0)
        .build()
        .ok()?;
    let response = client.get(url).send().await.ok()?;
    Some(response.status().as_u16())
}

#[test]
fn test_status_concurrent_read_write() {
    let cell = Arc::new(StatusCell::default());
    let stop = Arc::new(AtomicBool::new(false));

    let writer = {
        let cell = cell.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            let mut flips = 0u64;
            while !stop.load(Ordering::Relaxed) {
                let next = if flips % 2 == 0 {
                    ServerStatus::Started
                } else {
                    ServerStatus::Failed
                };
                cell.store(next);
                flips += 1;
                thread::sleep(Duration::from_millis(1));
            }
            flips
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let cell = cell.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let mut reads = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    let status = cell.load();
                    assert!(matches!(
                        status,
                        ServerStatus::NotReady | ServerStatus::Started | ServerStatus::Failed
                    ));
                    reads += 1;
                }
                reads
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(200));
    stop.store(true, Ordering::Relaxed);

    assert!(writer.join().unwrap() > 0);
    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }
}

#[tokio::test]
async fn test_start_and_health_check() {
    let (supervisor, _rx) = supervisor(test_config());
    assert_eq!(supervisor.status(), ServerStatus::NotReady);

    assert!(supervisor.start());
    assert!(!supervisor.start());

    supervisor.wait_healthy().await.unwrap();
    assert!(supervisor.is_ready());
    assert_eq!(health_status(&supervisor).await, Some(200));

    supervisor.cancel();
    supervisor.join().await;
}

#[tokio::test]
async fn test_relaunch_after_shutdown() {
    let metrics = new_shared_registry();
    let config = test_config();
    let (dispatcher, _rx) = dispatch_channel(16);
    let state = AppState::new(config.clone(), dispatcher, None).unwrap();
    let supervisor = Supervisor::new(config, create_router(state), metrics.clone()).unwrap();

    supervisor.start();
    supervisor.wait_healthy().await.unwrap();
    let addr = supervisor.local_addr().unwrap();

    assert!(supervisor.shutdown());

    // Give the listener time to go down, then wait for the relaunch.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if metrics.listener_restarts() >= 1 && supervisor.is_ready() {
            break;
        }
        assert!(Instant::now() < deadline, "listener was not relaunched");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    supervisor.wait_healthy().await.unwrap();
    assert_eq!(supervisor.local_addr(), Some(addr));
    assert_eq!(health_status(&supervisor).await, Some(200));

    supervisor.cancel();
    supervisor.join().await;
}

#[tokio::test]
async fn test_cancel_stops_supervisor() {
    let (supervisor, _rx) = supervisor(test_config());

    supervisor.start();
    supervisor.wait_healthy().await.unwrap();

    supervisor.cancel();
    supervisor.join().await;

    assert_eq!(supervisor.status(), ServerStatus::NotReady);
    assert!(!supervisor.start());
    assert_eq!(health_status(&supervisor).await, None);
}

#[tokio::test]
async fn test_wait_healthy_gives_up() {
    let config = test_config().with_health_check(3, Duration::from_millis(10));
    let (supervisor, _rx) = supervisor(config);

    let err = supervisor.wait_healthy().await.unwrap_err();
    assert!(err.to_string().contains("3 attempts"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_as_soon_as_started() {
    let (supervisor, _rx) = supervisor(test_config());
    supervisor.start();

    let deadline = Instant::now() + Duration::from_secs(5);
    while !supervisor.is_ready() {
        assert!(Instant::now() < deadline, "listener never started");
        std::hint::spin_loop();
    }
    assert!(supervisor.shutdown());

    supervisor.cancel();
    supervisor.join().await;
}

#[tokio::test]
async fn test_health_check_with_oauth_enabled() {
    let config = test_config().with_auth(AuthConfig {
        enable_oauth: true,
        oauth_secret: Some("secret".into()),
        ..AuthConfig::default()
    });
    let (supervisor, _rx) = supervisor(config);

    supervisor.start();
    supervisor.wait_healthy().await.unwrap();
    assert_eq!(health_status(&supervisor).await, Some(200));

    // The registry itself still requires a token.
    let addr = supervisor.local_addr().unwrap();
    let response = reqwest::get(format!(
        "http://{addr}/api/ocloudNotifications/v1/subscriptions"
    ))
    .await
    .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);

    supervisor.cancel();
    supervisor.join().await;
}

#[tokio::test]
async fn test_locations_use_bound_port() {
    let config = test_config();
    let (dispatcher, _rx) = dispatch_channel(16);
    let state = AppState::new(config.clone(), dispatcher, None).unwrap();
    let registry = state.registry.clone();
    let supervisor =
        Supervisor::new(config.clone(), create_router(state), new_shared_registry()).unwrap();

    supervisor.start();
    supervisor.wait_healthy().await.unwrap();
    let addr = supervisor.local_addr().unwrap();
    registry.set_base_url(config.base_url_for(addr));

    let response = reqwest::Client::new()
        .post(format!(
            "http://{addr}/api/ocloudNotifications/v1/publishers"
        ))
        .json(&serde_json::json!({ "Resource": "/east/node1/sync" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    let body: serde_json::Value = response.json().await.unwrap();
    let location = body["UriLocation"].as_str().unwrap();
    assert!(location.starts_with(&format!(
        "http://127.0.0.1:{}/api/ocloudNotifications/v1/publishers/",
        addr.port()
    )));

    supervisor.cancel();
    supervisor.join().await;
}
