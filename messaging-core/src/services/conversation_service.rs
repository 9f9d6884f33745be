use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::CoreConfig;
use crate::error::{AppError, AppResult};
use crate::events::{emit, CoreEvent, EventSink};
use crate::locks::KeyedLocks;
use crate::metrics;
use crate::models::conversation::{
    Conversation, ConversationInfo, ConversationKind, ConversationSettings, Participant,
    ParticipantRole,
};
use crate::repository::ConversationRepository;
use crate::services::message_service::MessageService;

const DEFAULT_CONVERSATION_PAGE: usize = 20;

#[derive(Debug, Clone, Default)]
pub struct GroupOptions {
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    pub is_private: bool,
    /// Overrides the configured group cap for this conversation; may only
    /// shrink it.
    pub max_members: Option<usize>,
}

/// Creates and mutates conversations: participant lists, roles, unread
/// counters, read marks. Every mutating call bumps `last_activity`.
pub struct ConversationService {
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<MessageService>,
    locks: KeyedLocks,
    sink: Arc<dyn EventSink>,
    config: Arc<CoreConfig>,
}

impl ConversationService {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        messages: Arc<MessageService>,
        locks: KeyedLocks,
        sink: Arc<dyn EventSink>,
        config: Arc<CoreConfig>,
    ) -> Self {
        Self {
            conversations,
            messages,
            locks,
            sink,
            config,
        }
    }

    /// Create (or return) the direct conversation between two users.
    ///
    /// Idempotent: there is exactly one direct conversation per unordered
    /// pair, and re-requesting it returns the existing one. Racing calls for
    /// the same pair serialize on the pair lock.
    pub async fn create_direct(&self, user_a: &str, user_b: &str) -> AppResult<Conversation> {
        if user_a.trim().is_empty() || user_b.trim().is_empty() {
            return Err(AppError::InvalidParticipants(
                "participant ids cannot be empty".into(),
            ));
        }
        if user_a == user_b {
            return Err(AppError::InvalidParticipants(
                "a direct conversation requires two distinct users".into(),
            ));
        }

        let _guard = self
            .locks
            .acquire(&KeyedLocks::direct_pair_key(user_a, user_b))
            .await;

        if let Some(existing) = self.conversations.find_direct_between(user_a, user_b).await? {
            return Ok(existing);
        }

        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            kind: ConversationKind::Direct,
            participants: vec![
                Participant::new(user_a, ParticipantRole::Member, now),
                Participant::new(user_b, ParticipantRole::Member, now),
            ],
            info: ConversationInfo {
                name: None,
                description: None,
                avatar_url: None,
                is_private: true,
                max_members: 2,
                created_by: user_a.to_string(),
                created_at: now,
            },
            settings: ConversationSettings::defaults_from(&self.config),
            unread_counts: HashMap::from([(user_a.to_string(), 0), (user_b.to_string(), 0)]),
            last_message_id: None,
            last_sequence: 0,
            last_activity: now,
        };

        self.conversations.insert(conversation.clone()).await?;
        metrics::record_conversation_created(ConversationKind::Direct.as_str());

        Ok(conversation)
    }

    /// Create a group conversation. The creator becomes its (sole) admin and
    /// a `system` message announces the creation.
    pub async fn create_group(
        &self,
        creator_id: &str,
        name: &str,
        member_ids: &[String],
        options: GroupOptions,
    ) -> AppResult<Conversation> {
        if creator_id.trim().is_empty() {
            return Err(AppError::InvalidParticipants(
                "creator id cannot be empty".into(),
            ));
        }
        if name.trim().is_empty() {
            return Err(AppError::InvalidContent("group name cannot be empty".into()));
        }
        if name.len() > 255 {
            return Err(AppError::InvalidContent("group name too long (max 255)".into()));
        }
        if let Some(description) = &options.description {
            if description.len() > 1000 {
                return Err(AppError::InvalidContent(
                    "group description too long (max 1000)".into(),
                ));
            }
        }

        // Dedupe, and the creator is never listed twice.
        let mut members: Vec<String> = Vec::new();
        for member in member_ids {
            if member != creator_id && !members.contains(member) {
                members.push(member.clone());
            }
        }

        let max_members = options.max_members.unwrap_or(self.config.max_group_size);
        if members.len() + 1 > max_members {
            return Err(AppError::GroupTooLarge {
                requested: members.len() + 1,
                max: max_members,
            });
        }

        let now = Utc::now();
        let mut participants = vec![Participant::new(creator_id, ParticipantRole::Admin, now)];
        let mut unread_counts = HashMap::from([(creator_id.to_string(), 0)]);
        for member in &members {
            participants.push(Participant::new(member.clone(), ParticipantRole::Member, now));
            unread_counts.insert(member.clone(), 0);
        }

        let conversation = Conversation {
            id: Uuid::new_v4(),
            kind: ConversationKind::Group,
            participants,
            info: ConversationInfo {
                name: Some(name.to_string()),
                description: options.description,
                avatar_url: options.avatar_url,
                is_private: options.is_private,
                max_members,
                created_by: creator_id.to_string(),
                created_at: now,
            },
            settings: ConversationSettings::defaults_from(&self.config),
            unread_counts,
            last_message_id: None,
            last_sequence: 0,
            last_activity: now,
        };
        let conversation_id = conversation.id;

        self.conversations.insert(conversation).await?;
        metrics::record_conversation_created(ConversationKind::Group.as_str());

        self.messages
            .send_system(
                conversation_id,
                format!("Group \"{name}\" created by {creator_id}"),
            )
            .await?;

        // The announcement advanced the sequence counter; return fresh state.
        self.conversations
            .get(conversation_id)
            .await?
            .ok_or(AppError::NotFound("conversation"))
    }

    /// Participant-gated fetch.
    pub async fn get(&self, conversation_id: Uuid, requester_id: &str) -> AppResult<Conversation> {
        let conversation = self
            .conversations
            .get(conversation_id)
            .await?
            .ok_or(AppError::NotFound("conversation"))?;
        if !conversation.is_participant(requester_id) {
            return Err(AppError::NotParticipant);
        }
        Ok(conversation)
    }

    /// Conversations the user participates in, most recent activity first.
    pub async fn list_for_user(&self, user_id: &str, limit: usize) -> AppResult<Vec<Conversation>> {
        let limit = if limit == 0 { DEFAULT_CONVERSATION_PAGE } else { limit };
        let mut conversations = self.conversations.list_for_user(user_id).await?;
        conversations.truncate(limit);
        Ok(conversations)
    }

    /// Add a member to a group. Admins and moderators only; idempotent when
    /// the user is already in.
    pub async fn add_participant(
        &self,
        conversation_id: Uuid,
        actor_id: &str,
        new_member_id: &str,
    ) -> AppResult<Conversation> {
        if new_member_id.trim().is_empty() {
            return Err(AppError::InvalidParticipants(
                "participant id cannot be empty".into(),
            ));
        }

        let _guard = self
            .locks
            .acquire(&KeyedLocks::conversation_key(conversation_id))
            .await;

        let mut conversation = self
            .conversations
            .get(conversation_id)
            .await?
            .ok_or(AppError::NotFound("conversation"))?;

        if conversation.kind == ConversationKind::Direct {
            return Err(AppError::NotAuthorized(
                "participants of a direct conversation are fixed",
            ));
        }

        match conversation.role_of(actor_id) {
            None => return Err(AppError::NotParticipant),
            Some(ParticipantRole::Admin) | Some(ParticipantRole::Moderator) => {}
            Some(ParticipantRole::Member) => {
                return Err(AppError::NotAuthorized(
                    "only admins and moderators may add participants",
                ))
            }
        }

        if conversation.is_participant(new_member_id) {
            return Ok(conversation);
        }

        if conversation.participants.len() + 1 > conversation.info.max_members {
            return Err(AppError::GroupTooLarge {
                requested: conversation.participants.len() + 1,
                max: conversation.info.max_members,
            });
        }

        let now = Utc::now();
        conversation
            .participants
            .push(Participant::new(new_member_id, ParticipantRole::Member, now));
        conversation
            .unread_counts
            .insert(new_member_id.to_string(), 0);
        conversation.last_activity = now;

        self.conversations.update(conversation.clone()).await?;
        Ok(conversation)
    }

    /// Remove a member from a group. Any member may leave; admins and
    /// moderators may remove members; only an admin may remove another admin.
    pub async fn remove_participant(
        &self,
        conversation_id: Uuid,
        actor_id: &str,
        target_id: &str,
    ) -> AppResult<Conversation> {
        let _guard = self
            .locks
            .acquire(&KeyedLocks::conversation_key(conversation_id))
            .await;

        let mut conversation = self
            .conversations
            .get(conversation_id)
            .await?
            .ok_or(AppError::NotFound("conversation"))?;

        if conversation.kind == ConversationKind::Direct {
            return Err(AppError::NotAuthorized(
                "participants of a direct conversation are fixed",
            ));
        }

        let actor_role = conversation
            .role_of(actor_id)
            .ok_or(AppError::NotParticipant)?;
        let target_role = conversation
            .role_of(target_id)
            .ok_or(AppError::NotFound("participant"))?;

        if actor_id != target_id {
            match actor_role {
                ParticipantRole::Admin | ParticipantRole::Moderator => {}
                ParticipantRole::Member => {
                    return Err(AppError::NotAuthorized(
                        "only admins and moderators may remove participants",
                    ))
                }
            }
            if target_role == ParticipantRole::Admin && actor_role != ParticipantRole::Admin {
                return Err(AppError::NotAuthorized(
                    "only an admin may remove another admin",
                ));
            }
        }

        conversation.participants.retain(|p| p.user_id != target_id);
        conversation.unread_counts.remove(target_id);
        conversation.last_activity = Utc::now();

        self.conversations.update(conversation.clone()).await?;
        Ok(conversation)
    }

    /// Mark messages as read by `user_id`, up to `up_to` (inclusive) or all
    /// of them. Resets the user's unread counter, stamps `last_read_at`, and
    /// emits `message.read` for the newest message that transitioned.
    pub async fn mark_read(
        &self,
        conversation_id: Uuid,
        user_id: &str,
        up_to: Option<Uuid>,
    ) -> AppResult<()> {
        let _guard = self
            .locks
            .acquire(&KeyedLocks::conversation_key(conversation_id))
            .await;

        let mut conversation = self
            .conversations
            .get(conversation_id)
            .await?
            .ok_or(AppError::NotFound("conversation"))?;

        if !conversation.is_participant(user_id) {
            return Err(AppError::NotParticipant);
        }

        let last_marked = self
            .messages
            .apply_read_marks(&conversation, user_id, up_to)
            .await?;

        let now = Utc::now();
        conversation.unread_counts.insert(user_id.to_string(), 0);
        if let Some(participant) = conversation.participant_mut(user_id) {
            participant.last_read_at = Some(now);
        }
        conversation.last_activity = now;
        self.conversations.update(conversation).await?;

        if let Some(message_id) = last_marked {
            emit(
                self.sink.as_ref(),
                CoreEvent::MessageRead {
                    conversation_id,
                    user_id: user_id.to_string(),
                    message_id,
                },
            );
        }

        Ok(())
    }

    /// Change a group member's role. Admin only.
    pub async fn set_role(
        &self,
        conversation_id: Uuid,
        actor_id: &str,
        target_id: &str,
        role: ParticipantRole,
    ) -> AppResult<Conversation> {
        let _guard = self
            .locks
            .acquire(&KeyedLocks::conversation_key(conversation_id))
            .await;

        let mut conversation = self
            .conversations
            .get(conversation_id)
            .await?
            .ok_or(AppError::NotFound("conversation"))?;

        if conversation.kind == ConversationKind::Direct {
            return Err(AppError::NotAuthorized("direct conversations have no roles"));
        }
        if !conversation.is_admin(actor_id) {
            return Err(AppError::NotAuthorized("only an admin may change roles"));
        }

        conversation
            .participant_mut(target_id)
            .ok_or(AppError::NotFound("participant"))?
            .role = role;
        conversation.last_activity = Utc::now();

        self.conversations.update(conversation.clone()).await?;
        Ok(conversation)
    }

    /// Mute or unmute the conversation for one participant.
    pub async fn set_muted(
        &self,
        conversation_id: Uuid,
        user_id: &str,
        muted: bool,
        muted_until: Option<DateTime<Utc>>,
    ) -> AppResult<Conversation> {
        let _guard = self
            .locks
            .acquire(&KeyedLocks::conversation_key(conversation_id))
            .await;

        let mut conversation = self
            .conversations
            .get(conversation_id)
            .await?
            .ok_or(AppError::NotFound("conversation"))?;

        {
            let participant = conversation
                .participant_mut(user_id)
                .ok_or(AppError::NotParticipant)?;
            participant.muted = muted;
            participant.muted_until = if muted { muted_until } else { None };
        }
        conversation.last_activity = Utc::now();

        self.conversations.update(conversation.clone()).await?;
        Ok(conversation)
    }
}
