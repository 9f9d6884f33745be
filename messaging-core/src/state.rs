use std::sync::Arc;

use crate::config::CoreConfig;
use crate::events::EventSink;
use crate::locks::KeyedLocks;
use crate::repository::{
    ConversationRepository, InMemoryConversationRepository, InMemoryMessageRepository,
    MessageRepository,
};
use crate::services::analytics_service::AnalyticsService;
use crate::services::conversation_service::ConversationService;
use crate::services::message_service::MessageService;
use crate::services::presence_service::PresenceTracker;
use crate::services::retention_service::RetentionSweeper;
use crate::services::search_service::SearchIndex;
use crate::services::typing_service::TypingRegistry;

/// Fully wired messaging core.
///
/// Owns one instance of every component, sharing the repositories, the
/// per-conversation lock registry and the event sink between them. Clone is
/// cheap; all state lives behind `Arc`s.
#[derive(Clone)]
pub struct MessagingCore {
    config: Arc<CoreConfig>,
    pub conversations: Arc<ConversationService>,
    pub messages: Arc<MessageService>,
    pub presence: Arc<PresenceTracker>,
    pub typing: Arc<TypingRegistry>,
    pub search: Arc<SearchIndex>,
    pub analytics: Arc<AnalyticsService>,
    pub sweeper: Arc<RetentionSweeper>,
}

impl MessagingCore {
    /// Core backed by the in-memory reference repositories.
    pub fn new_in_memory(config: CoreConfig, sink: Arc<dyn EventSink>) -> Self {
        Self::with_repositories(
            config,
            Arc::new(InMemoryConversationRepository::new()),
            Arc::new(InMemoryMessageRepository::new()),
            sink,
        )
    }

    /// Core backed by caller-provided repositories (a durable store, or
    /// instrumented fakes in tests).
    pub fn with_repositories(
        config: CoreConfig,
        conversations: Arc<dyn ConversationRepository>,
        messages: Arc<dyn MessageRepository>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let config = Arc::new(config);
        let locks = KeyedLocks::new();
        let presence = Arc::new(PresenceTracker::new(&config, sink.clone()));
        let typing = Arc::new(TypingRegistry::new(&config, sink.clone()));
        let search = Arc::new(SearchIndex::new());

        let message_service = Arc::new(MessageService::new(
            conversations.clone(),
            messages.clone(),
            search.clone(),
            presence.clone(),
            locks.clone(),
            sink.clone(),
            config.clone(),
        ));
        let conversation_service = Arc::new(ConversationService::new(
            conversations.clone(),
            message_service.clone(),
            locks.clone(),
            sink.clone(),
            config.clone(),
        ));
        let analytics = Arc::new(AnalyticsService::new(
            conversations.clone(),
            messages.clone(),
        ));
        let sweeper = Arc::new(RetentionSweeper::new(
            conversations,
            messages,
            search.clone(),
            typing.clone(),
            presence.clone(),
            locks,
            config.clone(),
        ));

        Self {
            config,
            conversations: conversation_service,
            messages: message_service,
            presence,
            typing,
            search,
            analytics,
            sweeper,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }
}
