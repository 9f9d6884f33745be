use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::error::AppResult;
use crate::models::message::MessageType;
use crate::repository::{ConversationRepository, MessageRepository};

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSnapshot {
    pub total_messages: usize,
    pub active_conversations: usize,
    pub average_messages_per_conversation: f64,
    pub messages_by_type: HashMap<MessageType, usize>,
}

/// Aggregate usage numbers over the stored state. Everything here is
/// derivable, nothing is sampled or estimated.
pub struct AnalyticsService {
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
}

impl AnalyticsService {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        messages: Arc<dyn MessageRepository>,
    ) -> Self {
        Self {
            conversations,
            messages,
        }
    }

    pub async fn snapshot(&self) -> AppResult<AnalyticsSnapshot> {
        let messages_by_type = self.messages.counts_by_type().await?;
        let total_messages: usize = messages_by_type.values().sum();
        let active_conversations = self.conversations.list_ids().await?.len();
        let average_messages_per_conversation = if active_conversations > 0 {
            total_messages as f64 / active_conversations as f64
        } else {
            0.0
        };

        Ok(AnalyticsSnapshot {
            total_messages,
            active_conversations,
            average_messages_per_conversation,
            messages_by_type,
        })
    }
}
