use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::Arc;

use chrono::{Duration, Utc};
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use uuid::Uuid;

use crate::config::CoreConfig;
use crate::error::{AppError, AppResult};
use crate::events::{emit, CoreEvent, EventSink};
use crate::locks::KeyedLocks;
use crate::metrics;
use crate::models::conversation::Conversation;
use crate::models::message::{DeliveryState, Message, MessageBody, MessageType, Reaction};
use crate::models::{UserId, SYSTEM_SENDER};
use crate::repository::{ConversationRepository, MessageRepository};
use crate::services::presence_service::PresenceTracker;
use crate::services::search_service::{extract_mentions, SearchFilters, SearchIndex};

type SendLimiter = RateLimiter<UserId, DefaultKeyedStateStore<UserId>, DefaultClock>;

#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub reply_to: Option<Uuid>,
    /// Earliest time the delivery collaborator should surface the message.
    /// Stored and passed through; the core does not gate on it.
    pub scheduled_for: Option<chrono::DateTime<Utc>>,
    /// Hours until the retention sweeper hard-deletes the message.
    pub auto_delete_after_hours: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    /// Id of the last message of this page; absent when there is no more
    /// data.
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Append-only per-conversation message log with delivery/read bookkeeping.
///
/// All mutations of one conversation's log serialize on that conversation's
/// lock; operations on different conversations run fully in parallel.
pub struct MessageService {
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
    search: Arc<SearchIndex>,
    presence: Arc<PresenceTracker>,
    locks: KeyedLocks,
    sink: Arc<dyn EventSink>,
    config: Arc<CoreConfig>,
    send_limiter: Option<SendLimiter>,
}

impl MessageService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        messages: Arc<dyn MessageRepository>,
        search: Arc<SearchIndex>,
        presence: Arc<PresenceTracker>,
        locks: KeyedLocks,
        sink: Arc<dyn EventSink>,
        config: Arc<CoreConfig>,
    ) -> Self {
        let send_limiter = config
            .send_rate_per_minute
            .and_then(NonZeroU32::new)
            .map(|per_minute| RateLimiter::keyed(Quota::per_minute(per_minute)));
        Self {
            conversations,
            messages,
            search,
            presence,
            locks,
            sink,
            config,
            send_limiter,
        }
    }

    /// Append a message to a conversation.
    ///
    /// Validation happens before any mutation; on success the conversation's
    /// sequence counter, unread counters and activity stamp are updated, the
    /// message is indexed for search, and `message.sent` is emitted. The
    /// initial delivery set is every other participant currently online;
    /// everyone else picks the message up on their next page read.
    pub async fn send(
        &self,
        conversation_id: Uuid,
        sender_id: &str,
        message_type: MessageType,
        body: MessageBody,
        options: SendOptions,
    ) -> AppResult<Message> {
        if message_type == MessageType::System {
            return Err(AppError::InvalidContent(
                "system messages cannot be sent by clients".into(),
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

        if !conversation.is_participant(sender_id) {
            return Err(AppError::NotParticipant);
        }

        validate_content(message_type, &body, &self.config)?;

        if body.media().is_some() && !conversation.settings.allow_file_sharing {
            return Err(AppError::NotAuthorized(
                "file sharing is disabled for this conversation",
            ));
        }

        if let Some(reply_to) = options.reply_to {
            if !conversation.settings.allow_replies {
                return Err(AppError::NotAuthorized(
                    "replies are disabled for this conversation",
                ));
            }
            let target = self
                .messages
                .get(reply_to)
                .await?
                .ok_or(AppError::NotFound("message"))?;
            if target.conversation_id != conversation_id {
                return Err(AppError::InvalidContent(
                    "reply target belongs to a different conversation".into(),
                ));
            }
        }

        if let Some(limiter) = &self.send_limiter {
            limiter
                .check_key(&sender_id.to_string())
                .map_err(|_| AppError::RateLimited)?;
        }

        let now = Utc::now();
        let sequence_number = conversation.last_sequence + 1;
        let mentions = body.text().map(extract_mentions).unwrap_or_default();

        let delivered_to: HashSet<UserId> = conversation
            .participants
            .iter()
            .filter(|p| p.user_id != sender_id && self.presence.is_online(&p.user_id))
            .map(|p| p.user_id.clone())
            .collect();

        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id: sender_id.to_string(),
            message_type,
            body,
            reply_to: options.reply_to,
            mentions,
            sequence_number,
            created_at: now,
            edited_at: None,
            is_edited: false,
            is_deleted: false,
            deleted_at: None,
            scheduled_for: options.scheduled_for,
            auto_delete_at: options
                .auto_delete_after_hours
                .map(|hours| now + Duration::hours(hours as i64)),
            delivery: DeliveryState {
                sent: true,
                delivered: !delivered_to.is_empty(),
                delivered_to,
                read: false,
                read_by: Default::default(),
                failed: false,
                failure_reason: None,
            },
            reactions: Vec::new(),
        };

        self.messages.append(message.clone()).await?;

        conversation.last_sequence = sequence_number;
        conversation.last_message_id = Some(message.id);
        conversation.last_activity = now;
        for participant in &conversation.participants {
            if participant.user_id != sender_id {
                *conversation
                    .unread_counts
                    .entry(participant.user_id.clone())
                    .or_insert(0) += 1;
            }
        }
        self.conversations.update(conversation).await?;

        self.search.index(&message).await;
        metrics::record_message_sent(message_type.as_str());
        emit(
            self.sink.as_ref(),
            CoreEvent::MessageSent {
                message: message.clone(),
            },
        );

        Ok(message)
    }

    /// Append a core-authored `system` message. Born delivered and read, does
    /// not touch unread counters.
    pub(crate) async fn send_system(
        &self,
        conversation_id: Uuid,
        text: String,
    ) -> AppResult<Message> {
        let _guard = self
            .locks
            .acquire(&KeyedLocks::conversation_key(conversation_id))
            .await;

        let mut conversation = self
            .conversations
            .get(conversation_id)
            .await?
            .ok_or(AppError::NotFound("conversation"))?;

        let now = Utc::now();
        let sequence_number = conversation.last_sequence + 1;
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id: SYSTEM_SENDER.to_string(),
            message_type: MessageType::System,
            body: MessageBody::System { text },
            reply_to: None,
            mentions: Vec::new(),
            sequence_number,
            created_at: now,
            edited_at: None,
            is_edited: false,
            is_deleted: false,
            deleted_at: None,
            scheduled_for: None,
            auto_delete_at: None,
            delivery: DeliveryState {
                sent: true,
                delivered: true,
                read: true,
                ..Default::default()
            },
            reactions: Vec::new(),
        };

        self.messages.append(message.clone()).await?;

        conversation.last_sequence = sequence_number;
        conversation.last_message_id = Some(message.id);
        conversation.last_activity = now;
        self.conversations.update(conversation).await?;

        self.search.index(&message).await;
        metrics::record_message_sent(MessageType::System.as_str());
        emit(
            self.sink.as_ref(),
            CoreEvent::MessageSent {
                message: message.clone(),
            },
        );

        Ok(message)
    }

    /// Replace a message's body. Only the original sender may edit.
    pub async fn edit(
        &self,
        message_id: Uuid,
        editor_id: &str,
        new_body: MessageBody,
    ) -> AppResult<Message> {
        let existing = self
            .messages
            .get(message_id)
            .await?
            .ok_or(AppError::NotFound("message"))?;

        let _guard = self
            .locks
            .acquire(&KeyedLocks::conversation_key(existing.conversation_id))
            .await;

        // Re-read under the lock; the first read only located the
        // conversation.
        let mut message = self
            .messages
            .get(message_id)
            .await?
            .ok_or(AppError::NotFound("message"))?;

        if message.is_deleted {
            return Err(AppError::NotFound("message"));
        }
        if message.sender_id != editor_id {
            return Err(AppError::NotAuthorized("only the sender may edit a message"));
        }
        validate_content(message.message_type, &new_body, &self.config)?;

        message.mentions = new_body.text().map(extract_mentions).unwrap_or_default();
        message.body = new_body;
        message.edited_at = Some(Utc::now());
        message.is_edited = true;

        self.messages.update(message.clone()).await?;
        self.search.reindex(&message).await;
        emit(
            self.sink.as_ref(),
            CoreEvent::MessageEdited {
                conversation_id: message.conversation_id,
                message_id: message.id,
            },
        );

        Ok(message)
    }

    /// Soft delete: the message stays in the log for audit, its content is
    /// hidden from everyone but the sender and conversation admins.
    pub async fn soft_delete(&self, message_id: Uuid, requester_id: &str) -> AppResult<()> {
        let existing = self
            .messages
            .get(message_id)
            .await?
            .ok_or(AppError::NotFound("message"))?;

        let _guard = self
            .locks
            .acquire(&KeyedLocks::conversation_key(existing.conversation_id))
            .await;

        let mut message = self
            .messages
            .get(message_id)
            .await?
            .ok_or(AppError::NotFound("message"))?;

        let conversation = self
            .conversations
            .get(message.conversation_id)
            .await?
            .ok_or(AppError::NotFound("conversation"))?;

        if message.sender_id != requester_id && !conversation.is_admin(requester_id) {
            return Err(AppError::NotAuthorized(
                "only the sender or an admin may delete a message",
            ));
        }

        if message.is_deleted {
            // Idempotent: already deleted.
            return Ok(());
        }

        message.is_deleted = true;
        message.deleted_at = Some(Utc::now());
        self.messages.update(message.clone()).await?;
        self.search.remove(message_id).await;
        emit(
            self.sink.as_ref(),
            CoreEvent::MessageDeleted {
                conversation_id: message.conversation_id,
                message_id,
            },
        );

        Ok(())
    }

    /// Toggle a (user, emoji) reaction onto the message. Reacting twice with
    /// the same emoji removes it.
    pub async fn add_reaction(
        &self,
        message_id: Uuid,
        user_id: &str,
        emoji: &str,
    ) -> AppResult<bool> {
        self.toggle_reaction(message_id, user_id, emoji, false).await
    }

    /// Explicitly remove a (user, emoji) reaction. Idempotent.
    pub async fn remove_reaction(
        &self,
        message_id: Uuid,
        user_id: &str,
        emoji: &str,
    ) -> AppResult<bool> {
        self.toggle_reaction(message_id, user_id, emoji, true).await
    }

    async fn toggle_reaction(
        &self,
        message_id: Uuid,
        user_id: &str,
        emoji: &str,
        remove_only: bool,
    ) -> AppResult<bool> {
        if emoji.trim().is_empty() {
            return Err(AppError::InvalidContent("emoji cannot be empty".into()));
        }

        let existing = self
            .messages
            .get(message_id)
            .await?
            .ok_or(AppError::NotFound("message"))?;

        let _guard = self
            .locks
            .acquire(&KeyedLocks::conversation_key(existing.conversation_id))
            .await;

        let mut message = self
            .messages
            .get(message_id)
            .await?
            .ok_or(AppError::NotFound("message"))?;

        let conversation = self
            .conversations
            .get(message.conversation_id)
            .await?
            .ok_or(AppError::NotFound("conversation"))?;

        if !conversation.is_participant(user_id) {
            return Err(AppError::NotParticipant);
        }
        if !conversation.settings.allow_reactions {
            return Err(AppError::NotAuthorized(
                "reactions are disabled for this conversation",
            ));
        }

        let position = message
            .reactions
            .iter()
            .position(|r| r.user_id == user_id && r.emoji == emoji);

        let added = match (position, remove_only) {
            // Toggle off, or explicit removal.
            (Some(index), _) => {
                message.reactions.remove(index);
                false
            }
            // Explicit removal of something that is not there: no-op.
            (None, true) => return Ok(false),
            (None, false) => {
                message.reactions.push(Reaction {
                    emoji: emoji.to_string(),
                    user_id: user_id.to_string(),
                    created_at: Utc::now(),
                });
                true
            }
        };

        self.messages.update(message.clone()).await?;
        emit(
            self.sink.as_ref(),
            CoreEvent::ReactionChanged {
                conversation_id: message.conversation_id,
                message_id,
                user_id: user_id.to_string(),
                emoji: emoji.to_string(),
                added,
            },
        );

        Ok(added)
    }

    /// Newest-first page of a conversation's log.
    ///
    /// Soft-deleted messages are filtered out unless the requester is their
    /// sender or a conversation admin. Returned messages are marked delivered
    /// to the requester as a side effect; `read` only moves via an explicit
    /// mark-read.
    pub async fn list(
        &self,
        conversation_id: Uuid,
        requester_id: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> AppResult<MessagePage> {
        let limit = self.normalize_limit(limit);

        let _guard = self
            .locks
            .acquire(&KeyedLocks::conversation_key(conversation_id))
            .await;

        let conversation = self
            .conversations
            .get(conversation_id)
            .await?
            .ok_or(AppError::NotFound("conversation"))?;

        if !conversation.is_participant(requester_id) {
            return Err(AppError::NotParticipant);
        }
        let is_admin = conversation.is_admin(requester_id);

        let before_seq = match cursor {
            Some(cursor) => {
                let id = Uuid::parse_str(cursor)
                    .map_err(|_| AppError::InvalidContent("malformed cursor".into()))?;
                let anchor = self
                    .messages
                    .get(id)
                    .await?
                    .ok_or(AppError::NotFound("message"))?;
                if anchor.conversation_id != conversation_id {
                    return Err(AppError::InvalidContent(
                        "cursor belongs to a different conversation".into(),
                    ));
                }
                Some(anchor.sequence_number)
            }
            None => None,
        };

        // Fetch limit+1 visible messages so has_more is known without a
        // second query; deleted messages other requesters cannot see are
        // skipped, not counted.
        let want = limit + 1;
        let mut visible: Vec<Message> = Vec::with_capacity(want);
        let mut before = before_seq;
        'fetch: loop {
            let batch = self
                .messages
                .page_before(conversation_id, before, want)
                .await?;
            if batch.is_empty() {
                break;
            }
            for message in batch {
                before = Some(message.sequence_number);
                if !message.visible_to(requester_id, is_admin) {
                    continue;
                }
                visible.push(message);
                if visible.len() == want {
                    break 'fetch;
                }
            }
        }

        let has_more = visible.len() > limit;
        visible.truncate(limit);

        // Reading the page delivers it.
        for message in &mut visible {
            if message.sender_id == requester_id
                || message.delivery.delivered_to.contains(requester_id)
            {
                continue;
            }
            message
                .delivery
                .delivered_to
                .insert(requester_id.to_string());
            message.delivery.delivered = true;
            self.messages.update(message.clone()).await?;
        }

        let next_cursor = if has_more {
            visible.last().map(|m| m.id.to_string())
        } else {
            None
        };

        Ok(MessagePage {
            messages: visible,
            next_cursor,
            has_more,
        })
    }

    /// Ranked full-text search resolved back to messages.
    pub async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
        cursor: Option<&str>,
    ) -> AppResult<MessagePage> {
        let limit = self.normalize_limit(limit);
        let page = self.search.search(query, filters, limit, cursor).await;

        let mut messages = Vec::with_capacity(page.hits.len());
        for hit in &page.hits {
            if let Some(message) = self.messages.get(hit.message_id).await? {
                messages.push(message);
            }
        }

        Ok(MessagePage {
            messages,
            next_cursor: page.next_cursor,
            has_more: page.has_more,
        })
    }

    /// Mark every message up to `up_to` (or all of them) as read by
    /// `reader`, recomputing the conversation-wide read consensus. Returns
    /// the id of the newest message that transitioned for the reader.
    ///
    /// Caller must hold the conversation lock.
    pub(crate) async fn apply_read_marks(
        &self,
        conversation: &Conversation,
        reader: &str,
        up_to: Option<Uuid>,
    ) -> AppResult<Option<Uuid>> {
        let up_to_seq = match up_to {
            Some(id) => {
                let anchor = self
                    .messages
                    .get(id)
                    .await?
                    .ok_or(AppError::NotFound("message"))?;
                if anchor.conversation_id != conversation.id {
                    return Err(AppError::InvalidContent(
                        "message belongs to a different conversation".into(),
                    ));
                }
                Some(anchor.sequence_number)
            }
            None => None,
        };

        let log = self.messages.for_conversation(conversation.id).await?;
        let mut last_marked = None;
        for mut message in log {
            if let Some(cut) = up_to_seq {
                if message.sequence_number > cut {
                    break;
                }
            }
            // System messages are born read and carry no receipts.
            if message.message_type == MessageType::System {
                continue;
            }
            if message.sender_id == reader || message.delivery.read_by.contains(reader) {
                continue;
            }

            message.delivery.read_by.insert(reader.to_string());
            message.delivery.delivered_to.insert(reader.to_string());
            message.delivery.delivered = true;

            // Consensus: every current participant other than the sender has
            // read it.
            message.delivery.read = conversation
                .participants
                .iter()
                .filter(|p| p.user_id != message.sender_id)
                .all(|p| message.delivery.read_by.contains(&p.user_id));

            last_marked = Some(message.id);
            self.messages.update(message).await?;
        }

        Ok(last_marked)
    }

    fn normalize_limit(&self, limit: usize) -> usize {
        if limit == 0 {
            self.config.default_page_size
        } else {
            limit.min(self.config.max_page_size)
        }
    }
}

/// Shape-check a body against its declared type and the configured limits.
/// Rejected sends leave no trace.
fn validate_content(
    message_type: MessageType,
    body: &MessageBody,
    config: &CoreConfig,
) -> AppResult<()> {
    match (message_type, body) {
        (MessageType::Text, MessageBody::Text { text }) => {
            if text.trim().is_empty() {
                return Err(AppError::InvalidContent("text message cannot be empty".into()));
            }
            if text.chars().count() > config.max_message_length {
                return Err(AppError::InvalidContent(format!(
                    "message exceeds {} characters",
                    config.max_message_length
                )));
            }
            Ok(())
        }
        (
            MessageType::Image | MessageType::Video | MessageType::File | MessageType::Voice,
            MessageBody::Media { media, caption },
        ) => {
            if media.url.trim().is_empty() {
                return Err(AppError::InvalidContent("media url is required".into()));
            }
            if media.file_size > config.max_file_size_bytes {
                return Err(AppError::InvalidContent(format!(
                    "file exceeds {} bytes",
                    config.max_file_size_bytes
                )));
            }
            if let Some(caption) = caption {
                if caption.chars().count() > config.max_message_length {
                    return Err(AppError::InvalidContent(format!(
                        "caption exceeds {} characters",
                        config.max_message_length
                    )));
                }
            }
            Ok(())
        }
        (MessageType::Location, MessageBody::Location { latitude, longitude, address }) => {
            if !(-90.0..=90.0).contains(latitude) || !(-180.0..=180.0).contains(longitude) {
                return Err(AppError::InvalidContent(
                    "location coordinates out of range".into(),
                ));
            }
            if address.trim().is_empty() {
                return Err(AppError::InvalidContent("location address is required".into()));
            }
            Ok(())
        }
        (MessageType::System, MessageBody::System { text }) => {
            if text.trim().is_empty() {
                return Err(AppError::InvalidContent("system message cannot be empty".into()));
            }
            Ok(())
        }
        (message_type, _) => Err(AppError::InvalidContent(format!(
            "body does not match message type '{}'",
            message_type.as_str()
        ))),
    }
}
