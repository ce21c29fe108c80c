use crate::types::Message;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// A peer started or stopped typing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypingEvent {
    pub user_id: String,
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone)]
struct TypingEntry {
    started_at: Instant,
    channel_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypingPayload {
    is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypingChange {
    Started(TypingEvent),
    Stopped(TypingEvent),
}

/// Transient typing indicators that expire after a fixed TTL.
#[derive(Debug)]
pub struct TypingTracker {
    enabled: bool,
    ttl: Duration,
    entries: HashMap<String, TypingEntry>,
}

impl TypingTracker {
    pub fn new(enabled: bool, ttl: Duration) -> Self {
        Self {
            enabled,
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Sets, refreshes or removes the sender's indicator.
    pub fn apply(&mut self, message: &Message, now: Instant) -> Option<TypingChange> {
        if !self.enabled {
            return None;
        }

        let payload: TypingPayload = match serde_json::from_value(message.payload().clone()) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(
                    "Ignoring typing message {} with invalid payload: {}",
                    message.id(),
                    e
                );
                return None;
            }
        };

        let event = TypingEvent {
            user_id: message.sender_id().to_string(),
            channel_id: message.channel_id().map(str::to_string),
        };

        if payload.is_typing {
            self.entries.insert(
                event.user_id.clone(),
                TypingEntry {
                    started_at: now,
                    channel_id: event.channel_id.clone(),
                },
            );
            Some(TypingChange::Started(event))
        } else {
            self.entries.remove(&event.user_id);
            Some(TypingChange::Stopped(event))
        }
    }

    /// Removes indicators older than the TTL and reports each as stopped.
    pub fn sweep(&mut self, now: Instant) -> Vec<TypingEvent> {
        let ttl = self.ttl;
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.started_at) >= ttl)
            .map(|(user_id, _)| user_id.clone())
            .collect();

        let mut stopped: Vec<TypingEvent> = expired
            .into_iter()
            .filter_map(|user_id| {
                self.entries.remove(&user_id).map(|entry| TypingEvent {
                    user_id,
                    channel_id: entry.channel_id,
                })
            })
            .collect();
        stopped.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        stopped
    }

    /// Users with a live indicator, sorted.
    pub fn typing_users(&self) -> Vec<TypingEvent> {
        let mut users: Vec<TypingEvent> = self
            .entries
            .iter()
            .map(|(user_id, entry)| TypingEvent {
                user_id: user_id.clone(),
                channel_id: entry.channel_id.clone(),
            })
            .collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        users
    }

    pub fn is_typing(&self, user_id: &str) -> bool {
        self.entries.contains_key(user_id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
