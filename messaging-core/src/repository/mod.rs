//! Storage seams.
//!
//! The core owns its data shapes but not the storage technology: every
//! component reaches durable state through these traits, injected at
//! construction. The crate ships an in-memory reference implementation
//! ([`memory`]) that the test suite runs against; a host binds Postgres,
//! Scylla, or whatever else at the same seam.
//!
//! Both repositories have whole-record update semantics. Callers mutate a
//! loaded copy and write it back while holding the conversation lock, which
//! keeps read-modify-write cycles race-free without storage-level CAS.

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::conversation::Conversation;
use crate::models::message::{Message, MessageType};

pub mod memory;

pub use memory::{InMemoryConversationRepository, InMemoryMessageRepository};

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn insert(&self, conversation: Conversation) -> AppResult<()>;

    async fn get(&self, id: Uuid) -> AppResult<Option<Conversation>>;

    async fn update(&self, conversation: Conversation) -> AppResult<()>;

    /// The unique direct conversation between an unordered user pair, if any.
    async fn find_direct_between(&self, a: &str, b: &str) -> AppResult<Option<Conversation>>;

    /// Conversations the user participates in, most recent activity first.
    async fn list_for_user(&self, user_id: &str) -> AppResult<Vec<Conversation>>;

    async fn list_ids(&self) -> AppResult<Vec<Uuid>>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn append(&self, message: Message) -> AppResult<()>;

    async fn get(&self, id: Uuid) -> AppResult<Option<Message>>;

    async fn update(&self, message: Message) -> AppResult<()>;

    /// Newest-first page: messages with sequence number strictly below
    /// `before_seq` (or from the top when `None`), at most `limit` of them.
    async fn page_before(
        &self,
        conversation_id: Uuid,
        before_seq: Option<i64>,
        limit: usize,
    ) -> AppResult<Vec<Message>>;

    /// Full log for one conversation in ascending sequence order.
    async fn for_conversation(&self, conversation_id: Uuid) -> AppResult<Vec<Message>>;

    /// Hard delete. Returns how many of `ids` were actually removed.
    async fn delete_many(&self, conversation_id: Uuid, ids: &[Uuid]) -> AppResult<usize>;

    async fn counts_by_type(&self) -> AppResult<HashMap<MessageType, usize>>;
}
