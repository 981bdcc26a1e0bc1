//! Gateway configuration.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Default API path prefix.
pub const DEFAULT_API_PATH: &str = "/api/ocloudNotifications/v1";

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 8089;

/// Default capacity of the dispatch channel.
pub const DEFAULT_DISPATCH_CAPACITY: usize = 10;

/// How a create for an already registered `(resource, endpoint)` pair is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DuplicatePolicy {
    /// Fail with 409 Conflict.
    #[default]
    Reject,
    /// Return the existing record unchanged.
    Idempotent,
}

/// Authentication gate settings.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Require a verified client certificate.
    pub enable_mtls: bool,
    /// Require an OAuth bearer token.
    pub enable_oauth: bool,
    /// HMAC secret used to verify bearer tokens.
    pub oauth_secret: Option<String>,
    /// Required token issuer.
    pub oauth_issuer: Option<String>,
    /// Required token audience.
    pub oauth_audience: Option<String>,
}

impl AuthConfig {
    /// Whether any gate is active.
    pub fn is_enabled(&self) -> bool {
        self.enable_mtls || self.enable_oauth
    }
}

/// Cloud native events REST gateway command line arguments.
#[derive(Debug, Parser)]
#[command(name = "cne-gateway")]
#[command(version, about = "REST registry and status bridge for cloud native events")]
pub struct Args {
    /// Host name to bind and to advertise in resource locations.
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// API path prefix.
    #[arg(long, default_value = DEFAULT_API_PATH)]
    pub api_path: String,

    /// Capacity of the outbound dispatch channel.
    #[arg(long, default_value_t = DEFAULT_DISPATCH_CAPACITY)]
    pub dispatch_capacity: usize,

    /// Timeout (ms) for endpoint validation probes.
    #[arg(long, default_value_t = 10_000)]
    pub probe_timeout_ms: u64,

    /// Timeout (ms) a status query waits for its reply.
    #[arg(long, default_value_t = 5_000)]
    pub status_timeout_ms: u64,

    /// Interval (ms) between listener restart attempts.
    #[arg(long, default_value_t = 1_000)]
    pub restart_interval_ms: u64,

    /// Number of readiness check attempts.
    #[arg(long, default_value_t = 5)]
    pub health_check_attempts: usize,

    /// Pause (ms) between readiness check attempts.
    #[arg(long, default_value_t = 2_000)]
    pub health_check_pause_ms: u64,

    /// Answer for re-creating an existing registration.
    #[arg(long, value_enum, default_value_t = DuplicatePolicy::Reject)]
    pub duplicate_policy: DuplicatePolicy,

    /// Resource prefix served by this node (repeatable). Empty accepts any resource.
    #[arg(long = "supported-resource")]
    pub supported_resources: Vec<String>,

    /// Externally reachable base URL (scheme, host and port) used in resource
    /// locations. Defaults to the listen address.
    #[arg(long)]
    pub advertised_url: Option<String>,

    /// Require mTLS client certificates.
    #[arg(long, default_value_t = false)]
    pub enable_mtls: bool,

    /// Require OAuth bearer tokens.
    #[arg(long, default_value_t = false)]
    pub enable_oauth: bool,

    /// HMAC secret for bearer token verification.
    #[arg(long, env = "CNE_OAUTH_SECRET")]
    pub oauth_secret: Option<String>,

    /// Required bearer token issuer.
    #[arg(long)]
    pub oauth_issuer: Option<String>,

    /// Required bearer token audience.
    #[arg(long)]
    pub oauth_audience: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Host name to bind and advertise.
    pub host: String,
    /// Port to listen on. `0` picks a free port on first bind.
    pub port: u16,
    /// Normalized API path prefix (leading `/`, no trailing `/`).
    pub api_path: String,
    /// Capacity of the outbound dispatch channel.
    pub dispatch_capacity: usize,
    /// Timeout for endpoint validation probes.
    pub probe_timeout: Duration,
    /// Timeout a status query waits for its reply.
    pub status_timeout: Duration,
    /// Interval between listener restart attempts.
    pub restart_interval: Duration,
    /// Number of readiness check attempts.
    pub health_check_attempts: usize,
    /// Pause between readiness check attempts.
    pub health_check_pause: Duration,
    /// Answer for re-creating an existing registration.
    pub duplicate_policy: DuplicatePolicy,
    /// Resource prefixes served by this node.
    pub supported_resources: Vec<String>,
    /// Externally reachable base URL, without the API path.
    pub advertised_url: Option<String>,
    /// Authentication gate settings.
    pub auth: AuthConfig,
}

/// Normalize an API path to `/segment/...` without a trailing slash.
///
/// The root path normalizes to an empty string.
pub fn normalize_api_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

impl From<Args> for GatewayConfig {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            api_path: normalize_api_path(&args.api_path),
            dispatch_capacity: args.dispatch_capacity.max(1),
            probe_timeout: Duration::from_millis(args.probe_timeout_ms),
            status_timeout: Duration::from_millis(args.status_timeout_ms),
            restart_interval: Duration::from_millis(args.restart_interval_ms),
            health_check_attempts: args.health_check_attempts,
            health_check_pause: Duration::from_millis(args.health_check_pause_ms),
            duplicate_policy: args.duplicate_policy,
            supported_resources: args.supported_resources,
            advertised_url: args.advertised_url,
            auth: AuthConfig {
                enable_mtls: args.enable_mtls,
                enable_oauth: args.enable_oauth,
                oauth_secret: args.oauth_secret,
                oauth_issuer: args.oauth_issuer,
                oauth_audience: args.oauth_audience,
            },
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            api_path: DEFAULT_API_PATH.to_string(),
            dispatch_capacity: DEFAULT_DISPATCH_CAPACITY,
            probe_timeout: Duration::from_secs(10),
            status_timeout: Duration::from_secs(5),
            restart_interval: Duration::from_secs(1),
            health_check_attempts: 5,
            health_check_pause: Duration::from_secs(2),
            duplicate_policy: DuplicatePolicy::Reject,
            supported_resources: Vec::new(),
            advertised_url: None,
            auth: AuthConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Set host and port.
    pub fn with_listen(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Set the API path prefix.
    pub fn with_api_path(mut self, path: &str) -> Self {
        self.api_path = normalize_api_path(path);
        self
    }

    /// Set the status query timeout.
    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    /// Set the restart interval.
    pub fn with_restart_interval(mut self, interval: Duration) -> Self {
        self.restart_interval = interval;
        self
    }

    /// Set readiness check attempts and pause.
    pub fn with_health_check(mut self, attempts: usize, pause: Duration) -> Self {
        self.health_check_attempts = attempts;
        self.health_check_pause = pause;
        self
    }

    /// Set the duplicate registration policy.
    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Restrict registrations to resources under the given prefixes.
    pub fn with_supported_resources<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_resources = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the authentication gate.
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Set the externally reachable base URL.
    pub fn with_advertised_url(mut self, url: impl Into<String>) -> Self {
        self.advertised_url = Some(url.into());
        self
    }

    /// Address the listener binds to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL of the API, used for resource locations.
    pub fn base_url(&self) -> String {
        self.advertised_base().unwrap_or_else(|| {
            format!("http://{}:{}{}", self.advertised_host(), self.port, self.api_path)
        })
    }

    /// Base URL of the API once the listener is bound to `bound`.
    ///
    /// Resolves a configured port `0` to the port actually bound.
    pub fn base_url_for(&self, bound: SocketAddr) -> String {
        self.advertised_base().unwrap_or_else(|| {
            format!("http://{}:{}{}", self.advertised_host(), bound.port(), self.api_path)
        })
    }

    fn advertised_base(&self) -> Option<String> {
        self.advertised_url
            .as_deref()
            .map(|url| format!("{}{}", url.trim_end_matches('/'), self.api_path))
    }

    /// Wildcard bind hosts are not reachable, advertise the loopback name instead.
    fn advertised_host(&self) -> &str {
        match self.host.as_str() {
            "0.0.0.0" | "::" | "[::]" => "localhost",
            host => host,
        }
    }

    /// Whether a resource is served by this node.
    pub fn serves_resource(&self, resource: &str) -> bool {
        self.supported_resources.is_empty()
            || self
                .supported_resources
                .iter()
                .any(|prefix| resource.starts_with(prefix.as_str()))
    }
}
