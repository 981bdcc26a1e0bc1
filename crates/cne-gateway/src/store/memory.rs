//! In-memory store.

use std::collections::HashMap;

use cne_proto::PubSub;
use parking_lot::RwLock;

use super::{PubSubStore, RecordKind, StoreError};

/// Process-local store keeping records in hash maps.
///
/// Duplicate detection and insert happen under one write lock, so concurrent
/// creates of the same registration store exactly one record.
#[derive(Default)]
pub struct MemoryStore {
    publishers: RwLock<HashMap<String, PubSub>>,
    subscriptions: RwLock<HashMap<String, PubSub>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self, kind: RecordKind) -> &RwLock<HashMap<String, PubSub>> {
        match kind {
            RecordKind::Publisher => &self.publishers,
            RecordKind::Subscription => &self.subscriptions,
        }
    }
}

impl PubSubStore for MemoryStore {
    fn create(&self, kind: RecordKind, record: PubSub) -> Result<PubSub, StoreError> {
        if record.id.is_empty() {
            return Err(StoreError::Backend(format!("{kind} record has no id")));
        }

        let mut records = self.records(kind).write();
        if let Some(existing) = records.values().find(|r| r.same_registration(&record)) {
            return Err(StoreError::AlreadyExists(existing.clone()));
        }

        records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn get(&self, kind: RecordKind, id: &str) -> Result<PubSub, StoreError> {
        self.records(kind)
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind,
                id: id.to_string(),
            })
    }

    fn list(&self, kind: RecordKind) -> Result<Vec<PubSub>, StoreError> {
        Ok(self.records(kind).read().values().cloned().collect())
    }

    fn delete(&self, kind: RecordKind, id: &str) -> Result<PubSub, StoreError> {
        self.records(kind)
            .write()
            .remove(id)
            .ok_or_else(|| StoreError::NotFound {
                kind,
                id: id.to_string(),
            })
    }

    fn delete_all(&self, kind: RecordKind) -> Result<usize, StoreError> {
        let mut records = self.records(kind).write();
        let removed = records.len();
        records.clear();
        Ok(removed)
    }

    fn count(&self, kind: RecordKind) -> usize {
        self.records(kind).read().len()
    }
}
