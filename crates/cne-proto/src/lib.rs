//! Cloud native events protocol types.
//!
//! This crate defines the data exchanged between the REST gateway and the
//! transport that delivers events to subscribers.
//!
//! # Modules
//!
//! - [`pubsub`] - Publisher/subscription resource records
//! - [`event`] - Cloud event envelope carried as dispatch payload
//! - [`channel`] - Dispatch messages, reply envelopes and reply handles
//! - [`error`] - Protocol error types

pub mod channel;
pub mod error;
pub mod event;
pub mod pubsub;

pub use error::Error;

// Re-export commonly used types at crate root
pub use channel::{
    ChannelKind, DispatchMessage, Lifecycle, ReplyEnvelope, ReplyHandle, ReplyReceiver,
};
pub use event::CloudEvent;
pub use pubsub::PubSub;

/// Cloud events spec version stamped on every envelope built by this crate.
pub const CLOUD_EVENTS_SPEC_VERSION: &str = "1.0";

/// Event type used for pull-status ("current state") queries.
pub const CURRENT_STATE_EVENT_TYPE: &str = "event.current-state";

/// Event type used for subscription status pings.
pub const STATUS_CHECK_EVENT_TYPE: &str = "status_check";
