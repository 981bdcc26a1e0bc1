//! Outbound event dispatch channel.
//!
//! All request handlers share one bounded [`Dispatcher`]; a single consumer
//! owns the [`DispatchReceiver`]. A full channel makes the sender wait, so
//! messages are never dropped.

use cne_proto::{DispatchMessage, ReplyEnvelope};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};

/// Receiving end handed to the transport consumer.
pub type DispatchReceiver = mpsc::Receiver<DispatchMessage>;

/// Producer handle for the dispatch channel.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    tx: mpsc::Sender<DispatchMessage>,
}

impl Dispatcher {
    /// Push a message, waiting for capacity when the channel is full.
    pub async fn send(&self, message: DispatchMessage) -> Result<()> {
        debug!(
            address = %message.address,
            kind = ?message.kind,
            lifecycle = %message.lifecycle,
            "dispatching message"
        );
        self.tx
            .send(message)
            .await
            .map_err(|_| AppError::DispatchClosed)
    }

    /// Free slots in the channel.
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }

    /// Whether the consumer has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create the bounded dispatch channel.
pub fn dispatch_channel(capacity: usize) -> (Dispatcher, DispatchReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (Dispatcher { tx }, rx)
}

/// Spawn a consumer that logs every message and drops it.
///
/// Reply handles are dropped unanswered, so forwarded status queries resolve
/// as not found instead of waiting for the timeout.
pub fn spawn_log_consumer(mut rx: DispatchReceiver) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(mut message) = rx.recv().await {
            info!(
                id = message.id.as_deref().unwrap_or("-"),
                address = %message.address,
                kind = ?message.kind,
                lifecycle = %message.lifecycle,
                "event transport received message"
            );
            if let Some(reply) = message.take_reply() {
                debug!(correlation_id = %reply.correlation_id(), "no transport attached, dropping status query");
            }
        }
        info!("dispatch channel closed, consumer exiting");
    })
}

/// Answer a status query, treating an abandoned requester as a normal outcome.
///
/// Returns `true` if the reply was delivered.
pub fn answer_status(message: &mut DispatchMessage, envelope: ReplyEnvelope) -> bool {
    let Some(reply) = message.take_reply() else {
        warn!(address = %message.address, "status answer for a message without reply channel");
        return false;
    };

    let correlation_id = reply.correlation_id().to_string();
    match reply.send(envelope) {
        Ok(()) => true,
        Err(_) => {
            debug!(%correlation_id, "status requester already gone, reply discarded");
            false
        }
    }
}
