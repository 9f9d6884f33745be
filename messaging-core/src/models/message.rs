use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Video,
    File,
    Location,
    Voice,
    System,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Video => "video",
            MessageType::File => "file",
            MessageType::Location => "location",
            MessageType::Voice => "voice",
            MessageType::System => "system",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    /// Playback length for video/voice media.
    pub duration_secs: Option<u32>,
}

/// Message payload, shape-checked against [`MessageType`] at send time.
///
/// Replaces the mixed-shape optional-field content bag of older designs: a
/// message body is exactly one of these variants, and validation rejects a
/// type/body mismatch before anything is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    Text {
        text: String,
    },
    Media {
        media: MediaDescriptor,
        caption: Option<String>,
    },
    Location {
        latitude: f64,
        longitude: f64,
        address: String,
    },
    System {
        text: String,
    },
}

impl MessageBody {
    /// Searchable text carried by this body, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            MessageBody::Text { text } | MessageBody::System { text } => Some(text),
            MessageBody::Media { caption, .. } => caption.as_deref(),
            MessageBody::Location { .. } => None,
        }
    }

    pub fn media(&self) -> Option<&MediaDescriptor> {
        match self {
            MessageBody::Media { media, .. } => Some(media),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// Per-message delivery bookkeeping.
///
/// `delivered_to` and `read_by` are ground truth; the `delivered` and `read`
/// aggregates are derived conveniences. `read` means conversation-wide
/// consensus: every participant other than the sender appears in `read_by`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryState {
    pub sent: bool,
    pub delivered: bool,
    pub delivered_to: HashSet<UserId>,
    pub read: bool,
    pub read_by: HashSet<UserId>,
    pub failed: bool,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: UserId,
    pub message_type: MessageType,
    pub body: MessageBody,
    pub reply_to: Option<Uuid>,
    pub mentions: Vec<UserId>,
    /// Position in the conversation's total order; strictly increasing,
    /// assigned under the conversation lock.
    pub sequence_number: i64,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_edited: bool,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub auto_delete_at: Option<DateTime<Utc>>,
    pub delivery: DeliveryState,
    pub reactions: Vec<Reaction>,
}

impl Message {
    /// Soft-deleted messages stay in the log but are only visible to their
    /// sender and conversation admins.
    pub fn visible_to(&self, requester: &str, requester_is_admin: bool) -> bool {
        !self.is_deleted || self.sender_id == requester || requester_is_admin
    }

    pub fn has_text(&self) -> bool {
        self.body.text().is_some_and(|t| !t.is_empty())
    }

    pub fn has_media(&self) -> bool {
        self.body.media().is_some()
    }
}
