//! Metrics boundary.
//!
//! Counters for registrations, event publication and listener restarts,
//! exported in Prometheus text format at `GET /metrics`.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use crate::store::RecordKind;

#[derive(Default)]
struct KindCounters {
    active: AtomicI64,
    create_failed: AtomicU64,
    delete_failed: AtomicU64,
}

#[derive(Default)]
struct PublishCounters {
    success: AtomicU64,
    failed: AtomicU64,
}

/// Central registry for gateway metrics.
pub struct MetricsRegistry {
    started_at: Instant,
    publishers: KindCounters,
    subscriptions: KindCounters,
    events_by_address: RwLock<BTreeMap<String, PublishCounters>>,
    listener_restarts: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry.
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            publishers: KindCounters::default(),
            subscriptions: KindCounters::default(),
            events_by_address: RwLock::new(BTreeMap::new()),
            listener_restarts: AtomicU64::new(0),
        }
    }

    fn kind(&self, kind: RecordKind) -> &KindCounters {
        match kind {
            RecordKind::Publisher => &self.publishers,
            RecordKind::Subscription => &self.subscriptions,
        }
    }

    /// Record a successful registration.
    pub fn record_created(&self, kind: RecordKind) {
        self.kind(kind).active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed registration attempt.
    pub fn record_create_failed(&self, kind: RecordKind) {
        self.kind(kind).create_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record removed registrations.
    pub fn record_deleted(&self, kind: RecordKind, count: usize) {
        self.kind(kind)
            .active
            .fetch_sub(count as i64, Ordering::Relaxed);
    }

    /// Record a failed delete.
    pub fn record_delete_failed(&self, kind: RecordKind) {
        self.kind(kind).delete_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an event publication attempt for an address.
    pub fn record_event_published(&self, address: &str, success: bool) {
        {
            let map = self.events_by_address.read();
            if let Some(counters) = map.get(address) {
                counters.bump(success);
                return;
            }
        }
        self.events_by_address
            .write()
            .entry(address.to_string())
            .or_default()
            .bump(success);
    }

    /// Record a listener relaunch by the supervisor.
    pub fn record_listener_restart(&self) {
        self.listener_restarts.fetch_add(1, Ordering::Relaxed);
    }

    // Getters

    /// Get uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Active registrations of a kind.
    pub fn active(&self, kind: RecordKind) -> i64 {
        self.kind(kind).active.load(Ordering::Relaxed)
    }

    /// Failed creates of a kind.
    pub fn create_failed(&self, kind: RecordKind) -> u64 {
        self.kind(kind).create_failed.load(Ordering::Relaxed)
    }

    /// Failed deletes of a kind.
    pub fn delete_failed(&self, kind: RecordKind) -> u64 {
        self.kind(kind).delete_failed.load(Ordering::Relaxed)
    }

    /// `(success, failed)` publications for an address.
    pub fn events_published(&self, address: &str) -> (u64, u64) {
        self.events_by_address
            .read()
            .get(address)
            .map(|c| {
                (
                    c.success.load(Ordering::Relaxed),
                    c.failed.load(Ordering::Relaxed),
                )
            })
            .unwrap_or((0, 0))
    }

    /// Number of listener relaunches.
    pub fn listener_restarts(&self) -> u64 {
        self.listener_restarts.load(Ordering::Relaxed)
    }

    /// Export to Prometheus text format.
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();

        out.push_str("# HELP cne_uptime_seconds Gateway uptime in seconds\n");
        out.push_str("# TYPE cne_uptime_seconds gauge\n");
        let _ = writeln!(out, "cne_uptime_seconds {}\n", self.uptime_secs());

        for (name, kind) in [
            ("cne_api_publishers", RecordKind::Publisher),
            ("cne_api_subscriptions", RecordKind::Subscription),
        ] {
            let _ = writeln!(out, "# HELP {name} Number of {kind} registrations by status");
            let _ = writeln!(out, "# TYPE {name} gauge");
            let _ = writeln!(out, "{name}{{status=\"active\"}} {}", self.active(kind));
            let _ = writeln!(
                out,
                "{name}{{status=\"failed to create\"}} {}",
                self.create_failed(kind)
            );
            let _ = writeln!(
                out,
                "{name}{{status=\"failed to delete\"}} {}\n",
                self.delete_failed(kind)
            );
        }

        out.push_str("# HELP cne_events_api_published Events published through the api\n");
        out.push_str("# TYPE cne_events_api_published counter\n");
        for (address, counters) in self.events_by_address.read().iter() {
            let address = escape_label(address);
            let _ = writeln!(
                out,
                "cne_events_api_published{{address=\"{address}\",status=\"success\"}} {}",
                counters.success.load(Ordering::Relaxed)
            );
            let _ = writeln!(
                out,
                "cne_events_api_published{{address=\"{address}\",status=\"fail\"}} {}",
                counters.failed.load(Ordering::Relaxed)
            );
        }
        out.push('\n');

        out.push_str("# HELP cne_listener_restarts_total Listener relaunches by the supervisor\n");
        out.push_str("# TYPE cne_listener_restarts_total counter\n");
        let _ = writeln!(out, "cne_listener_restarts_total {}", self.listener_restarts());

        out
    }
}

/// Escape a Prometheus label value.
fn escape_label(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

impl PublishCounters {
    fn bump(&self, success: bool) {
        if success {
            self.success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics registry handle.
pub type SharedMetricsRegistry = Arc<MetricsRegistry>;

/// Create a new shared metrics registry.
pub fn new_shared_registry() -> SharedMetricsRegistry {
    Arc::new(MetricsRegistry::new())
}
