use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UserId;

/// Ephemeral "user is composing" marker. Refreshed by every typing signal,
/// dropped on an explicit stop or when `expires_at` passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingEntry {
    pub conversation_id: Uuid,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

impl TypingEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
