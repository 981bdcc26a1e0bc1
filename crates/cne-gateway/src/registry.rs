//! Publisher and subscription registry.
//!
//! Validates and probes new registrations, assigns ids and locations,
//! delegates persistence to the store and tells the event transport about
//! every change through the dispatch channel.

use std::sync::Arc;

use cne_proto::{ChannelKind, CloudEvent, DispatchMessage, Lifecycle, PubSub};
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{DuplicatePolicy, GatewayConfig};
use crate::dispatch::Dispatcher;
use crate::error::{AppError, Result};
use crate::metrics::SharedMetricsRegistry;
use crate::prober::EndpointProbe;
use crate::store::{RecordKind, SharedStore, StoreError};

/// Outcome of a create.
#[derive(Debug, Clone, PartialEq)]
pub enum Created {
    /// A new record was stored.
    New(PubSub),
    /// The registration already existed and was returned unchanged.
    Existing(PubSub),
}

impl Created {
    /// The record, new or existing.
    pub fn record(&self) -> &PubSub {
        match self {
            Created::New(record) | Created::Existing(record) => record,
        }
    }

    /// Unwrap into the record.
    pub fn into_record(self) -> PubSub {
        match self {
            Created::New(record) | Created::Existing(record) => record,
        }
    }
}

fn channel_kind(kind: RecordKind) -> ChannelKind {
    match kind {
        RecordKind::Publisher => ChannelKind::Publisher,
        RecordKind::Subscription => ChannelKind::Subscriber,
    }
}

fn delete_all_address(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Publisher => "delete-all-publishers",
        RecordKind::Subscription => "delete-all-subscriptions",
    }
}

/// Registry of publishers and subscriptions.
pub struct Registry {
    store: SharedStore,
    prober: Arc<dyn EndpointProbe>,
    dispatcher: Dispatcher,
    metrics: SharedMetricsRegistry,
    base_url: RwLock<String>,
    config: GatewayConfig,
}

impl Registry {
    /// Create a registry for the given configuration.
    pub fn new(
        config: &GatewayConfig,
        store: SharedStore,
        prober: Arc<dyn EndpointProbe>,
        dispatcher: Dispatcher,
        metrics: SharedMetricsRegistry,
    ) -> Self {
        Self {
            store,
            prober,
            dispatcher,
            metrics,
            base_url: RwLock::new(config.base_url()),
            config: config.clone(),
        }
    }

    /// Base URL resource locations are built from.
    pub fn base_url(&self) -> String {
        self.base_url.read().clone()
    }

    /// Rebase resource locations, e.g. once the listener port is known.
    /// Existing records keep their location.
    pub fn set_base_url(&self, url: impl Into<String>) {
        *self.base_url.write() = url.into();
    }

    /// Register a publisher or subscription.
    pub async fn create(&self, kind: RecordKind, record: PubSub) -> Result<Created> {
        let result = self.try_create(kind, record).await;
        if let Err(e) = &result {
            warn!(%kind, error = %e, "registration failed");
            self.metrics.record_create_failed(kind);
        }
        result
    }

    async fn try_create(&self, kind: RecordKind, mut record: PubSub) -> Result<Created> {
        record.validate()?;

        if !self.config.serves_resource(&record.resource) {
            return Err(AppError::ResourceUnavailable(record.resource));
        }

        if let Some(endpoint) = record.endpoint_url()? {
            self.prober.probe(&endpoint).await?;
        }

        record.id = Uuid::new_v4().to_string();
        record.uri_location = Some(format!(
            "{}/{}/{}",
            self.base_url(),
            kind.path_segment(),
            record.id
        ));

        let stored = match self.store.create(kind, record) {
            Ok(stored) => stored,
            Err(StoreError::AlreadyExists(existing))
                if self.config.duplicate_policy == DuplicatePolicy::Idempotent =>
            {
                debug!(%kind, id = %existing.id, "returning existing registration");
                return Ok(Created::Existing(existing));
            }
            Err(e) => return Err(e.into()),
        };

        let mut message = DispatchMessage::new(channel_kind(kind), Lifecycle::New, &stored.resource)
            .with_id(&stored.id);
        if kind == RecordKind::Subscription {
            message = message.with_client_id(stored.client_id());
        }

        if let Err(e) = self.dispatcher.send(message).await {
            if let Err(rollback) = self.store.delete(kind, &stored.id) {
                error!(%kind, id = %stored.id, error = %rollback, "failed to roll back registration");
            }
            return Err(e);
        }

        self.metrics.record_created(kind);
        info!(
            %kind,
            id = %stored.id,
            resource = %stored.resource,
            endpoint = stored.endpoint().unwrap_or("-"),
            "registration created"
        );
        Ok(Created::New(stored))
    }

    /// Fetch a record by id.
    pub fn get(&self, kind: RecordKind, id: &str) -> Result<PubSub> {
        Ok(self.store.get(kind, id)?)
    }

    /// All records of a kind.
    pub fn list(&self, kind: RecordKind) -> Result<Vec<PubSub>> {
        Ok(self.store.list(kind)?)
    }

    /// Remove a record. A second delete of the same id is not found.
    ///
    /// If the transport cannot be told, the record is put back and the
    /// delete fails.
    pub async fn delete(&self, kind: RecordKind, id: &str) -> Result<PubSub> {
        let removed = match self.store.delete(kind, id) {
            Ok(removed) => removed,
            Err(e) => {
                self.metrics.record_delete_failed(kind);
                return Err(e.into());
            }
        };

        let mut message =
            DispatchMessage::new(channel_kind(kind), Lifecycle::Delete, &removed.resource)
                .with_id(&removed.id);
        if kind == RecordKind::Subscription {
            message = message.with_client_id(removed.client_id());
        }
        if let Err(e) = self.dispatcher.send(message).await {
            warn!(%kind, id = %removed.id, error = %e, "delete not dispatched, restoring");
            self.restore(kind, vec![removed]);
            self.metrics.record_delete_failed(kind);
            return Err(e);
        }

        self.metrics.record_deleted(kind, 1);
        info!(%kind, id = %removed.id, resource = %removed.resource, "registration deleted");
        Ok(removed)
    }

    /// Remove every record of a kind, returning how many were removed.
    pub async fn delete_all(&self, kind: RecordKind) -> Result<usize> {
        let snapshot = self.store.list(kind)?;
        let count = snapshot.len();
        let removed = match self.store.delete_all(kind) {
            Ok(removed) => removed,
            Err(e) => {
                self.metrics.record_delete_failed(kind);
                return Err(e.into());
            }
        };

        let message =
            DispatchMessage::new(channel_kind(kind), Lifecycle::Delete, delete_all_address(kind));
        if let Err(e) = self.dispatcher.send(message).await {
            warn!(%kind, count, error = %e, "delete-all not dispatched, restoring");
            self.restore(kind, snapshot);
            self.metrics.record_delete_failed(kind);
            return Err(e);
        }

        self.metrics.record_deleted(kind, count);
        info!(%kind, count, removed, "all registrations deleted");
        Ok(removed)
    }

    fn restore(&self, kind: RecordKind, records: Vec<PubSub>) {
        for record in records {
            let id = record.id.clone();
            if let Err(e) = self.store.create(kind, record) {
                error!(%kind, %id, error = %e, "failed to restore registration");
            }
        }
    }

    /// Publish an event on behalf of the publisher named by its id.
    pub async fn publish_event(&self, mut event: CloudEvent) -> Result<PubSub> {
        if event.id.is_empty() {
            return Err(AppError::BadRequest("event id naming a publisher is required".into()));
        }

        let publisher = self.store.get(RecordKind::Publisher, &event.id)?;
        event.source = publisher.resource.clone();

        let message = DispatchMessage::new(ChannelKind::Event, Lifecycle::New, &publisher.resource)
            .with_id(&publisher.id)
            .with_payload(event);

        match self.dispatcher.send(message).await {
            Ok(()) => {
                self.metrics
                    .record_event_published(&publisher.resource, true);
                debug!(publisher = %publisher.id, resource = %publisher.resource, "event published");
                Ok(publisher)
            }
            Err(e) => {
                self.metrics
                    .record_event_published(&publisher.resource, false);
                Err(e)
            }
        }
    }

    /// Ask the publisher side to re-emit its status for a subscription.
    pub async fn ping_status(&self, subscription_id: &str) -> Result<PubSub> {
        let subscription = self.store.get(RecordKind::Subscription, subscription_id)?;

        let event = CloudEvent::status_check(&subscription.id, &subscription.resource);
        let message = DispatchMessage::new(
            ChannelKind::Status,
            Lifecycle::New,
            format!("{}/status", subscription.resource),
        )
        .with_id(&subscription.id)
        .with_client_id(subscription.client_id())
        .with_payload(event);

        self.dispatcher.send(message).await?;
        info!(id = %subscription.id, resource = %subscription.resource, "status ping sent");
        Ok(subscription)
    }

    /// Find a registration whose resource contains `target`.
    ///
    /// Subscriptions are searched before publishers.
    pub fn find_by_resource(&self, target: &str) -> Result<Option<PubSub>> {
        for kind in [RecordKind::Subscription, RecordKind::Publisher] {
            if let Some(found) = self
                .store
                .list(kind)?
                .into_iter()
                .find(|record| record.resource.contains(target))
            {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{dispatch_channel, DispatchReceiver};
    use crate::metrics::new_shared_registry;
    use crate::prober::NoopProber;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use url::Url;

    struct FailingProber;

    #[async_trait]
    impl EndpointProbe for FailingProber {
        async fn probe(&self, endpoint: &Url) -> Result<()> {
            Err(AppError::ProbeFailed(format!("{endpoint} unreachable")))
        }
    }

    fn registry_with(
        config: GatewayConfig,
        prober: Arc<dyn EndpointProbe>,
    ) -> (Registry, DispatchReceiver, SharedMetricsRegistry) {
        let (dispatcher, rx) = dispatch_channel(16);
        let metrics = new_shared_registry();
        let registry = Registry::new(
            &config,
            Arc::new(MemoryStore::new()),
            prober,
            dispatcher,
            metrics.clone(),
        );
        (registry, rx, metrics)
    }

    fn registry() -> (Registry, DispatchReceiver, SharedMetricsRegistry) {
        registry_with(GatewayConfig::default(), Arc::new(NoopProber))
    }

    fn sub(resource: &str) -> PubSub {
        PubSub::new(resource).with_endpoint("http://localhost:9090/ack")
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_location() {
        let (registry, mut rx, metrics) = registry();

        let created = registry
            .create(RecordKind::Subscription, sub("/east/node1/sync"))
            .await
            .unwrap();
        let Created::New(record) = created else {
            panic!("expected a new record");
        };

        assert!(!record.id.is_empty());
        assert_eq!(
            record.uri_location.as_deref(),
            Some(
                format!(
                    "http://localhost:8089/api/ocloudNotifications/v1/subscriptions/{}",
                    record.id
                )
                .as_str()
            )
        );

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.kind, ChannelKind::Subscriber);
        assert_eq!(msg.lifecycle, Lifecycle::New);
        assert_eq!(msg.address, "/east/node1/sync");
        assert_eq!(msg.id.as_deref(), Some(record.id.as_str()));
        assert_eq!(msg.client_id, record.client_id());
        assert_eq!(metrics.active(RecordKind::Subscription), 1);
    }

    #[tokio::test]
    async fn test_duplicate_rejected_by_default() {
        let (registry, _rx, metrics) = registry();

        registry
            .create(RecordKind::Publisher, sub("/a"))
            .await
            .unwrap();
        let err = registry
            .create(RecordKind::Publisher, sub("/a"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(registry.list(RecordKind::Publisher).unwrap().len(), 1);
        assert_eq!(metrics.create_failed(RecordKind::Publisher), 1);
    }

    #[tokio::test]
    async fn test_duplicate_idempotent_policy() {
        let config = GatewayConfig::default().with_duplicate_policy(DuplicatePolicy::Idempotent);
        let (registry, mut rx, _metrics) = registry_with(config, Arc::new(NoopProber));

        let first = registry
            .create(RecordKind::Subscription, sub("/a"))
            .await
            .unwrap();
        let second = registry
            .create(RecordKind::Subscription, sub("/a"))
            .await
            .unwrap();

        assert!(matches!(second, Created::Existing(_)));
        assert_eq!(first.record(), second.record());

        rx.recv().await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_same_resource_different_endpoint() {
        let (registry, _rx, _metrics) = registry();

        registry
            .create(RecordKind::Subscription, sub("/a"))
            .await
            .unwrap();
        registry
            .create(
                RecordKind::Subscription,
                PubSub::new("/a").with_endpoint("http://localhost:9091/ack"),
            )
            .await
            .unwrap();

        assert_eq!(registry.list(RecordKind::Subscription).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_probe_failure_aborts_create() {
        let (registry, mut rx, _metrics) =
            registry_with(GatewayConfig::default(), Arc::new(FailingProber));

        let err = registry
            .create(RecordKind::Subscription, sub("/a"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ProbeFailed(_)));
        assert!(registry.list(RecordKind::Subscription).unwrap().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_create_without_endpoint_skips_probe() {
        let (registry, _rx, _metrics) =
            registry_with(GatewayConfig::default(), Arc::new(FailingProber));

        assert!(registry
            .create(RecordKind::Publisher, PubSub::new("/a"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_missing_resource_is_validation_error() {
        let (registry, _rx, _metrics) = registry();

        let err = registry
            .create(RecordKind::Subscription, PubSub::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unsupported_resource() {
        let config = GatewayConfig::default().with_supported_resources(["/east"]);
        let (registry, _rx, _metrics) = registry_with(config, Arc::new(FailingProber));

        let err = registry
            .create(RecordKind::Subscription, sub("/west/node1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ResourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let (registry, mut rx, metrics) = registry();
        let record = registry
            .create(RecordKind::Subscription, sub("/a"))
            .await
            .unwrap()
            .into_record();
        rx.recv().await.unwrap();

        registry
            .delete(RecordKind::Subscription, &record.id)
            .await
            .unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.lifecycle, Lifecycle::Delete);
        assert_eq!(msg.address, "/a");

        let err = registry
            .delete(RecordKind::Subscription, &record.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(metrics.delete_failed(RecordKind::Subscription), 1);
        assert_eq!(metrics.active(RecordKind::Subscription), 0);
    }

    #[tokio::test]
    async fn test_delete_all() {
        let (registry, mut rx, metrics) = registry();
        for resource in ["/a", "/b", "/c"] {
            registry
                .create(RecordKind::Publisher, sub(resource))
                .await
                .unwrap();
            rx.recv().await.unwrap();
        }

        let removed = registry.delete_all(RecordKind::Publisher).await.unwrap();

        assert_eq!(removed, 3);
        assert!(registry.list(RecordKind::Publisher).unwrap().is_empty());
        assert_eq!(metrics.active(RecordKind::Publisher), 0);

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.address, "delete-all-publishers");
        assert_eq!(msg.lifecycle, Lifecycle::Delete);
    }

    #[tokio::test]
    async fn test_create_rolled_back_when_dispatch_closed() {
        let (registry, rx, metrics) = registry();
        drop(rx);

        let err = registry
            .create(RecordKind::Subscription, sub("/a"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::DispatchClosed));
        assert!(registry.list(RecordKind::Subscription).unwrap().is_empty());
        assert_eq!(metrics.active(RecordKind::Subscription), 0);
        assert_eq!(metrics.create_failed(RecordKind::Subscription), 1);
    }

    #[tokio::test]
    async fn test_delete_restored_when_dispatch_closed() {
        let (registry, mut rx, metrics) = registry();
        let record = registry
            .create(RecordKind::Subscription, sub("/a"))
            .await
            .unwrap()
            .into_record();
        rx.recv().await.unwrap();
        drop(rx);

        let err = registry
            .delete(RecordKind::Subscription, &record.id)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::DispatchClosed));
        assert_eq!(
            registry.get(RecordKind::Subscription, &record.id).unwrap(),
            record
        );
        assert_eq!(metrics.active(RecordKind::Subscription), 1);
        assert_eq!(metrics.delete_failed(RecordKind::Subscription), 1);
    }

    #[tokio::test]
    async fn test_delete_all_restored_when_dispatch_closed() {
        let (registry, mut rx, metrics) = registry();
        for resource in ["/a", "/b"] {
            registry
                .create(RecordKind::Publisher, sub(resource))
                .await
                .unwrap();
            rx.recv().await.unwrap();
        }
        drop(rx);

        let err = registry.delete_all(RecordKind::Publisher).await.unwrap_err();

        assert!(matches!(err, AppError::DispatchClosed));
        assert_eq!(registry.list(RecordKind::Publisher).unwrap().len(), 2);
        assert_eq!(metrics.active(RecordKind::Publisher), 2);
    }

    #[tokio::test]
    async fn test_publish_event() {
        let (registry, mut rx, metrics) = registry();
        let publisher = registry
            .create(RecordKind::Publisher, sub("/east/node1/sync"))
            .await
            .unwrap()
            .into_record();
        rx.recv().await.unwrap();

        let mut event = CloudEvent::new("", "event.sync-state");
        event.id = publisher.id.clone();
        registry.publish_event(event).await.unwrap();

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.kind, ChannelKind::Event);
        assert_eq!(msg.payload.unwrap().source, "/east/node1/sync");
        assert_eq!(metrics.events_published("/east/node1/sync"), (1, 0));
    }

    #[tokio::test]
    async fn test_publish_event_unknown_publisher() {
        let (registry, _rx, _metrics) = registry();

        let mut event = CloudEvent::new("", "event.sync-state");
        event.id = "missing".into();
        let err = registry.publish_event(event).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_ping_status() {
        let (registry, mut rx, _metrics) = registry();
        let record = registry
            .create(RecordKind::Subscription, sub("/a/b"))
            .await
            .unwrap()
            .into_record();
        rx.recv().await.unwrap();

        registry.ping_status(&record.id).await.unwrap();

        let mut msg = rx.recv().await.unwrap();
        assert_eq!(msg.kind, ChannelKind::Status);
        assert_eq!(msg.address, "/a/b/status");
        assert!(msg.take_reply().is_none());
        assert_eq!(msg.payload.unwrap().id, record.id);
    }

    #[tokio::test]
    async fn test_find_by_resource_prefers_subscriptions() {
        let (registry, _rx, _metrics) = registry();
        registry
            .create(RecordKind::Publisher, sub("/east/node1/sync"))
            .await
            .unwrap();
        let subscription = registry
            .create(
                RecordKind::Subscription,
                PubSub::new("/east/node1/sync").with_endpoint("http://localhost:9091/ack"),
            )
            .await
            .unwrap()
            .into_record();

        let found = registry.find_by_resource("/node1/sync").unwrap().unwrap();
        assert_eq!(found.id, subscription.id);
        assert!(registry.find_by_resource("/west").unwrap().is_none());
    }
}
