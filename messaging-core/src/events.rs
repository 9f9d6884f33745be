//! Outbound notification contract.
//!
//! The core reports state changes to an external delivery collaborator (push
//! or socket fan-out) through an [`EventSink`]. Events are emitted
//! synchronously as side effects of the triggering operation and are never
//! retried: a rejected event is logged and the operation still succeeds,
//! because the state mutation itself already committed.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::metrics;
use crate::models::message::Message;
use crate::models::presence::PresenceStatus;
use crate::models::UserId;

/// All notifications the core can emit.
///
/// Each variant carries only the data it needs; serialization is centralized
/// in [`CoreEvent::to_payload_value`] so every event shares the same flat
/// top-level structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CoreEvent {
    #[serde(rename = "message.sent")]
    MessageSent { message: Message },

    #[serde(rename = "message.read")]
    MessageRead {
        conversation_id: Uuid,
        user_id: UserId,
        message_id: Uuid,
    },

    #[serde(rename = "message.edited")]
    MessageEdited {
        conversation_id: Uuid,
        message_id: Uuid,
    },

    #[serde(rename = "message.deleted")]
    MessageDeleted {
        conversation_id: Uuid,
        message_id: Uuid,
    },

    #[serde(rename = "reaction.changed")]
    ReactionChanged {
        conversation_id: Uuid,
        message_id: Uuid,
        user_id: UserId,
        emoji: String,
        added: bool,
    },

    #[serde(rename = "typing.changed")]
    TypingChanged {
        conversation_id: Uuid,
        typing_user_ids: Vec<UserId>,
    },

    #[serde(rename = "presence.changed")]
    PresenceChanged {
        user_id: UserId,
        status: PresenceStatus,
    },
}

impl CoreEvent {
    /// Get event type as string (e.g., "message.sent")
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MessageSent { .. } => "message.sent",
            Self::MessageRead { .. } => "message.read",
            Self::MessageEdited { .. } => "message.edited",
            Self::MessageDeleted { .. } => "message.deleted",
            Self::ReactionChanged { .. } => "reaction.changed",
            Self::TypingChanged { .. } => "typing.changed",
            Self::PresenceChanged { .. } => "presence.changed",
        }
    }

    /// Flat JSON payload for transport fan-out:
    ///
    /// ```json
    /// {
    ///   "type": "typing.changed",
    ///   "timestamp": "2026-08-06T10:30:00Z",
    ///   "conversation_id": "uuid",
    ///   "typing_user_ids": ["a", "b"]
    /// }
    /// ```
    pub fn to_payload_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        let mut payload = serde_json::json!({
            "type": self.event_type(),
            "timestamp": Utc::now().to_rfc3339(),
        });

        let event_data = serde_json::to_value(self)?;
        if let serde_json::Value::Object(map) = event_data {
            for (_, fields) in map {
                if let serde_json::Value::Object(fields) = fields {
                    for (key, value) in fields {
                        payload[key] = value;
                    }
                }
            }
        }

        Ok(payload)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink closed: {0}")]
    Closed(String),

    #[error("sink rejected event: {0}")]
    Rejected(String),
}

/// Boundary to the external notification fan-out. Implementations must not
/// block: hand the event off and return.
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: CoreEvent) -> Result<(), SinkError>;
}

/// Discards every event. Default for hosts that poll instead of push.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn deliver(&self, _event: CoreEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Forwards events into an unbounded channel; the receiving half belongs to
/// the transport layer (or a test).
pub struct ChannelEventSink {
    tx: UnboundedSender<CoreEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, UnboundedReceiver<CoreEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn deliver(&self, event: CoreEvent) -> Result<(), SinkError> {
        self.tx
            .send(event)
            .map_err(|e| SinkError::Closed(e.to_string()))
    }
}

/// Emit an event, swallowing sink failures. Notification delivery is the
/// collaborator's responsibility; the triggering operation already succeeded.
pub(crate) fn emit(sink: &dyn EventSink, event: CoreEvent) {
    let event_type = event.event_type();
    if let Err(err) = sink.deliver(event) {
        metrics::record_notification_failure(event_type);
        tracing::warn!(event = event_type, error = %err, "event sink rejected notification");
    }
}
