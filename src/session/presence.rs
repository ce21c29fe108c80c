use crate::types::Message;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    Offline,
}

/// Last reported presence of one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceEntry {
    pub user_id: String,
    pub status: PresenceStatus,
    /// Epoch milliseconds of the presence message
    pub last_seen: u64,
    pub channel_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PresencePayload {
    status: PresenceStatus,
}

/// Outcome of applying a presence message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceChange {
    Online(PresenceEntry),
    Offline(PresenceEntry),
}

/// Presence map keyed by user id, last writer wins.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    enabled: bool,
    entries: HashMap<String, PresenceEntry>,
}

impl PresenceTracker {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: HashMap::new(),
        }
    }

    /// Upserts the sender's entry from a presence message.
    pub fn apply(&mut self, message: &Message) -> Option<PresenceChange> {
        if !self.enabled {
            return None;
        }

        let payload: PresencePayload = match serde_json::from_value(message.payload().clone()) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(
                    "Ignoring presence message {} with invalid payload: {}",
                    message.id(),
                    e
                );
                return None;
            }
        };

        let entry = PresenceEntry {
            user_id: message.sender_id().to_string(),
            status: payload.status,
            last_seen: message.timestamp(),
            channel_id: message.channel_id().map(str::to_string),
        };
        self.entries.insert(entry.user_id.clone(), entry.clone());

        Some(match entry.status {
            PresenceStatus::Online => PresenceChange::Online(entry),
            PresenceStatus::Away | PresenceStatus::Offline => PresenceChange::Offline(entry),
        })
    }

    pub fn get(&self, user_id: &str) -> Option<&PresenceEntry> {
        self.entries.get(user_id)
    }

    /// Entries currently reported as online, sorted by user id.
    pub fn online(&self) -> Vec<PresenceEntry> {
        let mut online: Vec<PresenceEntry> = self
            .entries
            .values()
            .filter(|entry| entry.status == PresenceStatus::Online)
            .cloned()
            .collect();
        online.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        online
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
