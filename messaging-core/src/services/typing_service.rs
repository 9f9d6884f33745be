use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::config::CoreConfig;
use crate::events::{emit, CoreEvent, EventSink};
use crate::models::typing::TypingEntry;
use crate::models::UserId;

/// Per-conversation set of currently-typing users.
///
/// Every entry carries its own expiry; expiry is applied lazily on read and
/// by the periodic ephemeral sweep, so a client that never sends an explicit
/// stop signal still drops out after the TTL.
pub struct TypingRegistry {
    inner: DashMap<Uuid, HashMap<UserId, TypingEntry>>,
    ttl: Duration,
    sink: Arc<dyn EventSink>,
}

impl TypingRegistry {
    pub fn new(config: &CoreConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            inner: DashMap::new(),
            ttl: Duration::milliseconds(config.typing_ttl.as_millis() as i64),
            sink,
        }
    }

    /// Add/refresh (`is_typing = true`) or drop (`is_typing = false`) the
    /// user's typing entry. Emits `typing.changed` only when the visible
    /// typer set actually changes; a refresh is silent.
    pub fn set_typing(&self, conversation_id: Uuid, user_id: &str, is_typing: bool) {
        let now = Utc::now();
        let mut changed = false;
        let typers: Vec<UserId> = {
            let mut map = self.inner.entry(conversation_id).or_default();
            let before = map.len();
            map.retain(|_, entry| !entry.is_expired_at(now));
            changed |= map.len() != before;

            if is_typing {
                let entry = TypingEntry {
                    conversation_id,
                    user_id: user_id.to_string(),
                    expires_at: now + self.ttl,
                };
                changed |= map.insert(user_id.to_string(), entry).is_none();
            } else {
                changed |= map.remove(user_id).is_some();
            }
            map.keys().cloned().collect()
        };

        if changed {
            emit(
                self.sink.as_ref(),
                CoreEvent::TypingChanged {
                    conversation_id,
                    typing_user_ids: typers,
                },
            );
        }
    }

    /// Unexpired typing entries for one conversation, pruning expired ones
    /// as a side effect.
    pub fn entries(&self, conversation_id: Uuid) -> Vec<TypingEntry> {
        let now = Utc::now();
        match self.inner.get_mut(&conversation_id) {
            Some(mut map) => {
                map.retain(|_, entry| !entry.is_expired_at(now));
                map.values().cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Users whose entries have not expired as of now.
    pub fn current_typers(&self, conversation_id: Uuid) -> Vec<UserId> {
        self.entries(conversation_id)
            .into_iter()
            .map(|entry| entry.user_id)
            .collect()
    }

    /// Drop every expired entry, emitting `typing.changed` for each affected
    /// conversation. Returns how many entries expired.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut expired = 0;
        let mut affected = Vec::new();
        for mut shard in self.inner.iter_mut() {
            let before = shard.len();
            shard.retain(|_, entry| !entry.is_expired_at(now));
            let dropped = before - shard.len();
            if dropped > 0 {
                expired += dropped;
                affected.push((*shard.key(), shard.keys().cloned().collect::<Vec<_>>()));
            }
        }
        for (conversation_id, typers) in affected {
            emit(
                self.sink.as_ref(),
                CoreEvent::TypingChanged {
                    conversation_id,
                    typing_user_ids: typers,
                },
            );
        }
        expired
    }
}
