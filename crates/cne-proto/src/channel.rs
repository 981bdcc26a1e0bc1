//! Dispatch messages handed from the gateway to the event transport.
//!
//! Every registry operation and status query produces one [`DispatchMessage`].
//! Status queries that expect an answer carry a single-use [`ReplyHandle`];
//! the requesting side keeps the matching [`ReplyReceiver`].

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::event::CloudEvent;

/// What the transport should do with a dispatch message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    /// Open a listener on the address.
    Listener,
    /// Open a sender on the address.
    Sender,
    /// Publisher registration change.
    Publisher,
    /// Subscriber registration change.
    Subscriber,
    /// Event data to deliver.
    Event,
    /// Status query or ping.
    Status,
}

/// Lifecycle marker of a dispatch message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lifecycle {
    New,
    Success,
    Failed,
    Delete,
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Lifecycle::New => "NEW",
            Lifecycle::Success => "SUCCESS",
            Lifecycle::Failed => "FAILED",
            Lifecycle::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// Answer to a status query, produced by the transport side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    /// Correlation id copied from the [`ReplyHandle`].
    pub correlation_id: String,
    /// Client the answer was produced for.
    pub client_id: Uuid,
    /// Event payload, if the query resolved to one.
    pub payload: Option<CloudEvent>,
    /// HTTP status the requester should answer with.
    pub status_code: u16,
    /// Human readable message, returned as body when there is no payload.
    pub message: Vec<u8>,
}

impl ReplyEnvelope {
    /// A 200 reply carrying an event payload.
    pub fn ok(correlation_id: impl Into<String>, client_id: Uuid, payload: CloudEvent) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            client_id,
            payload: Some(payload),
            status_code: 200,
            message: b"ok".to_vec(),
        }
    }

    /// A reply with an explicit status and message and no payload.
    pub fn status(
        correlation_id: impl Into<String>,
        client_id: Uuid,
        status_code: u16,
        message: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            client_id,
            payload: None,
            status_code,
            message: message.into(),
        }
    }
}

/// Write side of a status query's reply channel.
///
/// Sending never blocks. Once the requester has given up (timeout, client
/// disconnect) the envelope is handed back instead of being delivered.
#[derive(Debug)]
pub struct ReplyHandle {
    correlation_id: String,
    tx: oneshot::Sender<ReplyEnvelope>,
}

impl ReplyHandle {
    /// Correlation id of the query this handle answers.
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Whether the requester stopped waiting.
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }

    /// Deliver the reply. Returns the envelope if the requester is gone.
    pub fn send(self, envelope: ReplyEnvelope) -> Result<(), ReplyEnvelope> {
        self.tx.send(envelope)
    }
}

/// Read side of a status query's reply channel.
#[derive(Debug)]
pub struct ReplyReceiver {
    correlation_id: String,
    rx: oneshot::Receiver<ReplyEnvelope>,
}

impl ReplyReceiver {
    /// Correlation id of the query.
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Wait for the reply. `None` if the handle was dropped unanswered.
    pub async fn recv(self) -> Option<ReplyEnvelope> {
        self.rx.await.ok()
    }

    /// Mark the query as abandoned; later sends fail without blocking.
    pub fn abandon(mut self) {
        self.rx.close();
    }
}

fn reply_channel() -> (ReplyHandle, ReplyReceiver) {
    let correlation_id = Uuid::new_v4().to_string();
    let (tx, rx) = oneshot::channel();
    (
        ReplyHandle {
            correlation_id: correlation_id.clone(),
            tx,
        },
        ReplyReceiver { correlation_id, rx },
    )
}

/// Unit of work handed to the event transport.
#[derive(Debug)]
pub struct DispatchMessage {
    /// Record id the message refers to, if any.
    pub id: Option<String>,
    /// Resource address.
    pub address: String,
    /// Message kind.
    pub kind: ChannelKind,
    /// Lifecycle marker.
    pub lifecycle: Lifecycle,
    /// Client the message is issued for.
    pub client_id: Option<Uuid>,
    /// Event payload.
    pub payload: Option<CloudEvent>,
    reply: Option<ReplyHandle>,
}

impl DispatchMessage {
    /// Create a message without payload or reply channel.
    pub fn new(kind: ChannelKind, lifecycle: Lifecycle, address: impl Into<String>) -> Self {
        Self {
            id: None,
            address: address.into(),
            kind,
            lifecycle,
            client_id: None,
            payload: None,
            reply: None,
        }
    }

    /// Status query with a fresh reply channel.
    ///
    /// This is the only way to build a message that carries a reply handle.
    pub fn status_query(address: impl Into<String>, client_id: Uuid) -> (Self, ReplyReceiver) {
        let (handle, receiver) = reply_channel();
        let mut message = Self::new(ChannelKind::Status, Lifecycle::New, address);
        message.client_id = Some(client_id);
        message.reply = Some(handle);
        (message, receiver)
    }

    /// Set the record id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the client id.
    pub fn with_client_id(mut self, client_id: Option<Uuid>) -> Self {
        self.client_id = client_id;
        self
    }

    /// Set the payload.
    pub fn with_payload(mut self, payload: CloudEvent) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Whether a requester is waiting for an answer to this message.
    pub fn expects_reply(&self) -> bool {
        self.reply.is_some()
    }

    /// Correlation id of the pending reply, if any.
    pub fn correlation_id(&self) -> Option<&str> {
        self.reply.as_ref().map(ReplyHandle::correlation_id)
    }

    /// Take the reply handle. Subsequent calls return `None`.
    pub fn take_reply(&mut self) -> Option<ReplyHandle> {
        self.reply.take()
    }
}
