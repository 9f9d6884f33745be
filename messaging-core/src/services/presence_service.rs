use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashMap;

use crate::config::CoreConfig;
use crate::events::{emit, CoreEvent, EventSink};
use crate::models::presence::{DeviceInfo, PresenceRecord, PresenceStatus};
use crate::models::UserId;

/// Tracks each user's online/away/busy/offline status and last-seen time.
///
/// Presence is an ephemeral cache rebuilt from heartbeats after a restart;
/// writes are non-blocking upserts with overwrite semantics (a second
/// heartbeat simply wins). A record whose heartbeats stop is flipped offline
/// lazily on read and by the periodic sweep.
pub struct PresenceTracker {
    records: DashMap<UserId, PresenceRecord>,
    timeout: Duration,
    sink: Arc<dyn EventSink>,
}

impl PresenceTracker {
    pub fn new(config: &CoreConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            records: DashMap::new(),
            timeout: Duration::milliseconds(config.presence_timeout.as_millis() as i64),
            sink,
        }
    }

    pub fn heartbeat(
        &self,
        user_id: &str,
        status: PresenceStatus,
        activity: Option<String>,
        device: Option<DeviceInfo>,
    ) {
        let record = PresenceRecord {
            user_id: user_id.to_string(),
            status,
            last_seen: Utc::now(),
            activity,
            device,
        };
        let changed = match self.records.insert(user_id.to_string(), record) {
            Some(previous) => previous.status != status,
            None => true,
        };
        if changed {
            emit(
                self.sink.as_ref(),
                CoreEvent::PresenceChanged {
                    user_id: user_id.to_string(),
                    status,
                },
            );
        }
    }

    /// Current record, or `None` for a user never seen. Applies the lazy
    /// offline transition: a stale non-offline record is downgraded in place.
    pub fn get(&self, user_id: &str) -> Option<PresenceRecord> {
        let now = Utc::now();
        let mut entry = self.records.get_mut(user_id)?;
        if entry.status != PresenceStatus::Offline && now - entry.last_seen > self.timeout {
            entry.status = PresenceStatus::Offline;
            let snapshot = entry.value().clone();
            let user_id = snapshot.user_id.clone();
            drop(entry);
            emit(
                self.sink.as_ref(),
                CoreEvent::PresenceChanged {
                    user_id,
                    status: PresenceStatus::Offline,
                },
            );
            return Some(snapshot);
        }
        Some(entry.clone())
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.get(user_id)
            .map_or(false, |r| r.status == PresenceStatus::Online)
    }

    /// Flip every stale non-offline record to offline. Returns how many
    /// records were flipped.
    pub fn sweep_stale(&self) -> usize {
        let now = Utc::now();
        let mut flipped = Vec::new();
        for mut entry in self.records.iter_mut() {
            if entry.status != PresenceStatus::Offline && now - entry.last_seen > self.timeout {
                entry.status = PresenceStatus::Offline;
                flipped.push(entry.user_id.clone());
            }
        }
        for user_id in &flipped {
            emit(
                self.sink.as_ref(),
                CoreEvent::PresenceChanged {
                    user_id: user_id.clone(),
                    status: PresenceStatus::Offline,
                },
            );
        }
        flipped.len()
    }
}
