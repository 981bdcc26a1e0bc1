//! Cloud event envelope.
//!
//! The gateway treats event data as opaque JSON; only the context attributes
//! it needs for routing are typed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{CLOUD_EVENTS_SPEC_VERSION, CURRENT_STATE_EVENT_TYPE, STATUS_CHECK_EVENT_TYPE};

fn default_spec_version() -> String {
    CLOUD_EVENTS_SPEC_VERSION.to_string()
}

/// A cloud event in structured JSON mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudEvent {
    /// Event identifier. For events posted by publishers this names the
    /// publisher record the event belongs to.
    #[serde(default)]
    pub id: String,
    /// Resource address the event originates from.
    #[serde(default)]
    pub source: String,
    /// Event type.
    #[serde(rename = "type", default)]
    pub event_type: String,
    /// Cloud events spec version.
    #[serde(rename = "specversion", default = "default_spec_version")]
    pub spec_version: String,
    /// Time the event was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    /// Content type of `data`.
    #[serde(rename = "datacontenttype", default, skip_serializing_if = "Option::is_none")]
    pub data_content_type: Option<String>,
    /// Optional subject, used for lifecycle markers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Opaque event data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CloudEvent {
    /// Create a new event with a fresh id and the current time.
    pub fn new(source: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            event_type: event_type.into(),
            spec_version: default_spec_version(),
            time: Some(Utc::now()),
            data_content_type: None,
            subject: None,
            data: None,
        }
    }

    /// Query event asking for the current state of a resource.
    pub fn current_state(address: impl Into<String>) -> Self {
        Self::new(address, CURRENT_STATE_EVENT_TYPE)
    }

    /// Ping event asking a publisher to re-emit its status for a subscription.
    pub fn status_check(subscription_id: impl Into<String>, resource: impl Into<String>) -> Self {
        let mut event = Self::new(resource, STATUS_CHECK_EVENT_TYPE)
            .with_data(serde_json::json!({ "version": "v1" }));
        event.id = subscription_id.into();
        event
    }

    /// Attach JSON data.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data_content_type = Some("application/json".to_string());
        self.data = Some(data);
        self
    }
}
