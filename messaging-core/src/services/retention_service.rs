use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::CoreConfig;
use crate::error::{AppError, AppResult};
use crate::locks::KeyedLocks;
use crate::metrics;
use crate::models::message::MessageType;
use crate::repository::{ConversationRepository, MessageRepository};
use crate::services::presence_service::PresenceTracker;
use crate::services::search_service::SearchIndex;
use crate::services::typing_service::TypingRegistry;

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub conversations_swept: usize,
    pub conversations_failed: usize,
    pub messages_deleted: usize,
}

/// Background enforcement of per-conversation retention and ephemeral-state
/// expiry.
///
/// Each conversation's cleanup runs as its own critical section under that
/// conversation's lock, so an interrupted sweep leaves no partial visible
/// state, and one conversation's failure never aborts the rest.
pub struct RetentionSweeper {
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
    search: Arc<SearchIndex>,
    typing: Arc<TypingRegistry>,
    presence: Arc<PresenceTracker>,
    locks: KeyedLocks,
    config: Arc<CoreConfig>,
}

impl RetentionSweeper {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        messages: Arc<dyn MessageRepository>,
        search: Arc<SearchIndex>,
        typing: Arc<TypingRegistry>,
        presence: Arc<PresenceTracker>,
        locks: KeyedLocks,
        config: Arc<CoreConfig>,
    ) -> Self {
        Self {
            conversations,
            messages,
            search,
            typing,
            presence,
            locks,
            config,
        }
    }

    /// One full retention pass over every conversation.
    pub async fn run_once(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let ids = match self.conversations.list_ids().await {
            Ok(ids) => ids,
            Err(err) => {
                tracing::warn!(error = %err, "retention sweep could not list conversations");
                return report;
            }
        };

        for conversation_id in ids {
            match self.sweep_conversation(conversation_id).await {
                Ok(deleted) => {
                    report.conversations_swept += 1;
                    report.messages_deleted += deleted;
                }
                Err(err) => {
                    report.conversations_failed += 1;
                    tracing::warn!(
                        conversation_id = %conversation_id,
                        error = %err,
                        "retention sweep failed for conversation, skipping"
                    );
                }
            }
        }

        if report.messages_deleted > 0 {
            metrics::record_retention_deleted(report.messages_deleted as u64);
            tracing::info!(
                deleted = report.messages_deleted,
                failed = report.conversations_failed,
                "retention sweep complete"
            );
        }

        report
    }

    /// Hard-delete this conversation's over-retention messages (`system`
    /// messages are exempt) and any message whose auto-delete deadline has
    /// passed. Returns how many messages were removed.
    async fn sweep_conversation(&self, conversation_id: Uuid) -> AppResult<usize> {
        let _guard = self
            .locks
            .acquire(&KeyedLocks::conversation_key(conversation_id))
            .await;

        let conversation = self
            .conversations
            .get(conversation_id)
            .await?
            .ok_or(AppError::NotFound("conversation"))?;

        let now = Utc::now();
        let cutoff = now - Duration::days(i64::from(conversation.settings.message_retention_days));

        let log = self.messages.for_conversation(conversation_id).await?;
        let doomed: Vec<Uuid> = log
            .iter()
            .filter(|m| {
                let over_retention =
                    m.message_type != MessageType::System && m.created_at < cutoff;
                let auto_expired = m.auto_delete_at.map_or(false, |deadline| deadline <= now);
                over_retention || auto_expired
            })
            .map(|m| m.id)
            .collect();

        if doomed.is_empty() {
            return Ok(0);
        }

        let removed = self.messages.delete_many(conversation_id, &doomed).await?;
        for message_id in &doomed {
            self.search.purge(*message_id).await;
        }

        // The conversation's last-message pointer may now dangle.
        if let Some(last) = conversation.last_message_id {
            if doomed.contains(&last) {
                let mut conversation = conversation;
                conversation.last_message_id = self
                    .messages
                    .page_before(conversation_id, None, 1)
                    .await?
                    .first()
                    .map(|m| m.id);
                self.conversations.update(conversation).await?;
            }
        }

        Ok(removed)
    }

    /// Expire typing entries and flip stale presence records offline.
    /// Returns (expired typing entries, flipped presence records).
    pub fn sweep_ephemeral(&self) -> (usize, usize) {
        (self.typing.sweep_expired(), self.presence.sweep_stale())
    }

    /// Periodic retention loop. Stops when `true` is observed on the
    /// shutdown channel (or the sender is dropped).
    pub fn spawn(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let sweeper = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweeper.config.retention_sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = sweeper.run_once().await;
                        tracing::debug!(
                            swept = report.conversations_swept,
                            deleted = report.messages_deleted,
                            "retention tick"
                        );
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Fast loop for typing/presence expiry.
    pub fn spawn_ephemeral(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let sweeper = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweeper.config.ephemeral_sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        sweeper.sweep_ephemeral();
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }
}
