//! In-memory reference repositories.
//!
//! Per-conversation append-only logs behind an async `RwLock`, with a
//! message-id side index so reactions and edits can address a message without
//! knowing its conversation. Good enough for tests and single-process
//! deployments; everything the services need from a real backend goes through
//! the same trait surface.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::conversation::Conversation;
use crate::models::message::{Message, MessageType};

use super::{ConversationRepository, MessageRepository};

#[derive(Default)]
pub struct InMemoryConversationRepository {
    inner: RwLock<HashMap<Uuid, Conversation>>,
}

impl InMemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn insert(&self, conversation: Conversation) -> AppResult<()> {
        self.inner
            .write()
            .await
            .insert(conversation.id, conversation);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        Ok(self.inner.read().await.get(&id).cloned())
    }

    async fn update(&self, conversation: Conversation) -> AppResult<()> {
        self.inner
            .write()
            .await
            .insert(conversation.id, conversation);
        Ok(())
    }

    async fn find_direct_between(&self, a: &str, b: &str) -> AppResult<Option<Conversation>> {
        let guard = self.inner.read().await;
        Ok(guard
            .values()
            .find(|c| {
                c.kind == crate::models::conversation::ConversationKind::Direct
                    && c.is_participant(a)
                    && c.is_participant(b)
            })
            .cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> AppResult<Vec<Conversation>> {
        let guard = self.inner.read().await;
        let mut out: Vec<Conversation> = guard
            .values()
            .filter(|c| c.is_participant(user_id))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(out)
    }

    async fn list_ids(&self) -> AppResult<Vec<Uuid>> {
        Ok(self.inner.read().await.keys().copied().collect())
    }
}

#[derive(Default)]
struct MessageStore {
    /// conversation id -> ascending-sequence log
    logs: HashMap<Uuid, Vec<Message>>,
    /// message id -> conversation id
    conversation_of: HashMap<Uuid, Uuid>,
}

#[derive(Default)]
pub struct InMemoryMessageRepository {
    inner: RwLock<MessageStore>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn append(&self, message: Message) -> AppResult<()> {
        let mut guard = self.inner.write().await;
        guard
            .conversation_of
            .insert(message.id, message.conversation_id);
        let log = guard.logs.entry(message.conversation_id).or_default();
        log.push(message);
        // Appends arrive in sequence order (assigned under the conversation
        // lock), but seeded fixtures may not; keep the invariant locally.
        if log
            .windows(2)
            .any(|w| w[0].sequence_number > w[1].sequence_number)
        {
            log.sort_by_key(|m| m.sequence_number);
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Message>> {
        let guard = self.inner.read().await;
        let Some(conversation_id) = guard.conversation_of.get(&id) else {
            return Ok(None);
        };
        Ok(guard
            .logs
            .get(conversation_id)
            .and_then(|log| log.iter().find(|m| m.id == id))
            .cloned())
    }

    async fn update(&self, message: Message) -> AppResult<()> {
        let mut guard = self.inner.write().await;
        if let Some(log) = guard.logs.get_mut(&message.conversation_id) {
            if let Some(slot) = log.iter_mut().find(|m| m.id == message.id) {
                *slot = message;
            }
        }
        Ok(())
    }

    async fn page_before(
        &self,
        conversation_id: Uuid,
        before_seq: Option<i64>,
        limit: usize,
    ) -> AppResult<Vec<Message>> {
        let guard = self.inner.read().await;
        let Some(log) = guard.logs.get(&conversation_id) else {
            return Ok(Vec::new());
        };
        Ok(log
            .iter()
            .rev()
            .filter(|m| before_seq.map_or(true, |cut| m.sequence_number < cut))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn for_conversation(&self, conversation_id: Uuid) -> AppResult<Vec<Message>> {
        let guard = self.inner.read().await;
        Ok(guard
            .logs
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_many(&self, conversation_id: Uuid, ids: &[Uuid]) -> AppResult<usize> {
        let mut guard = self.inner.write().await;
        let Some(log) = guard.logs.get_mut(&conversation_id) else {
            return Ok(0);
        };
        let before = log.len();
        log.retain(|m| !ids.contains(&m.id));
        let removed = before - log.len();
        for id in ids {
            guard.conversation_of.remove(id);
        }
        Ok(removed)
    }

    async fn counts_by_type(&self) -> AppResult<HashMap<MessageType, usize>> {
        let guard = self.inner.read().await;
        let mut counts = HashMap::new();
        for log in guard.logs.values() {
            for message in log {
                *counts.entry(message.message_type).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}
