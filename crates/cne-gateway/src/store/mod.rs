//! Publisher/subscription store boundary.
//!
//! The registry delegates persistence to a [`PubSubStore`]. The store owns
//! duplicate detection: it must reject a record whose `(resource, endpoint)`
//! pair is already registered for the same kind, atomically with the insert.

mod memory;

pub use memory::MemoryStore;

use std::sync::Arc;

use cne_proto::PubSub;
use thiserror::Error;

/// Kind of registration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Publisher,
    Subscription,
}

impl RecordKind {
    /// Collection path segment used in URLs.
    pub fn path_segment(&self) -> &'static str {
        match self {
            RecordKind::Publisher => "publishers",
            RecordKind::Subscription => "subscriptions",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Publisher => f.write_str("publisher"),
            RecordKind::Subscription => f.write_str("subscription"),
        }
    }
}

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record with this id.
    #[error("{kind} {id} not found")]
    NotFound { kind: RecordKind, id: String },

    /// The `(resource, endpoint)` pair is already registered.
    #[error("{} already registered", .0.resource)]
    AlreadyExists(PubSub),

    /// Backend failure.
    #[error("{0}")]
    Backend(String),
}

/// Persistence for publisher and subscription records.
pub trait PubSubStore: Send + Sync {
    /// Insert a record that already carries its id and location.
    fn create(&self, kind: RecordKind, record: PubSub) -> Result<PubSub, StoreError>;

    /// Fetch a record by id.
    fn get(&self, kind: RecordKind, id: &str) -> Result<PubSub, StoreError>;

    /// All records of a kind, in no particular order.
    fn list(&self, kind: RecordKind) -> Result<Vec<PubSub>, StoreError>;

    /// Remove a record, returning it.
    fn delete(&self, kind: RecordKind, id: &str) -> Result<PubSub, StoreError>;

    /// Remove every record of a kind, returning how many were removed.
    fn delete_all(&self, kind: RecordKind) -> Result<usize, StoreError>;

    /// Number of records of a kind.
    fn count(&self, kind: RecordKind) -> usize;
}

/// Shared store handle.
pub type SharedStore = Arc<dyn PubSubStore>;
