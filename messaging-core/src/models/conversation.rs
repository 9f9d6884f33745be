use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UserId;
use crate::config::CoreConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Direct,
    Group,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationKind::Direct => "direct",
            ConversationKind::Group => "group",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Admin,
    Moderator,
    Member,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: UserId,
    pub role: ParticipantRole,
    pub joined_at: DateTime<Utc>,
    pub last_read_at: Option<DateTime<Utc>>,
    pub muted: bool,
    pub muted_until: Option<DateTime<Utc>>,
}

impl Participant {
    pub fn new(user_id: impl Into<UserId>, role: ParticipantRole, joined_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            joined_at,
            last_read_at: None,
            muted: false,
            muted_until: None,
        }
    }
}

/// Group-facing metadata. `name`/`description`/`avatar_url` stay `None` for
/// direct conversations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationInfo {
    pub name: Option<String>,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    pub is_private: bool,
    pub max_members: usize,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSettings {
    pub message_retention_days: u32,
    pub allow_reactions: bool,
    pub allow_replies: bool,
    pub allow_file_sharing: bool,
}

impl ConversationSettings {
    pub fn defaults_from(config: &CoreConfig) -> Self {
        Self {
            message_retention_days: config.default_retention_days,
            allow_reactions: true,
            allow_replies: true,
            allow_file_sharing: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub kind: ConversationKind,
    pub participants: Vec<Participant>,
    pub info: ConversationInfo,
    pub settings: ConversationSettings,
    pub unread_counts: HashMap<UserId, u64>,
    pub last_message_id: Option<Uuid>,
    /// Highest sequence number handed out in this conversation. Incremented
    /// only while holding the conversation lock.
    pub last_sequence: i64,
    pub last_activity: DateTime<Utc>,
}

impl Conversation {
    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    pub fn participant_mut(&mut self, user_id: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.user_id == user_id)
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participant(user_id).is_some()
    }

    pub fn role_of(&self, user_id: &str) -> Option<ParticipantRole> {
        self.participant(user_id).map(|p| p.role)
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        matches!(self.role_of(user_id), Some(ParticipantRole::Admin))
    }
}
