use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

use super::constants::message_types;
use super::error::Result;

/// Kind of a frame, carried as the `type` field on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Chat payload (`"message"` on the wire)
    #[serde(rename = "message")]
    Data,
    Status,
    Presence,
    Typing,
    System,
    Ping,
    Pong,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Data => message_types::DATA,
            Self::Status => message_types::STATUS,
            Self::Presence => message_types::PRESENCE,
            Self::Typing => message_types::TYPING,
            Self::System => message_types::SYSTEM,
            Self::Ping => message_types::PING,
            Self::Pong => message_types::PONG,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message exchanged with the server.
///
/// Messages are immutable once built: fields are only reachable through
/// accessors, and the `with_*` builders consume `self`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    #[serde(default = "generate_id")]
    id: String,
    #[serde(rename = "type")]
    kind: MessageType,
    #[serde(rename = "data", default)]
    payload: Value,
    #[serde(default = "now_ms")]
    timestamp: u64,
    #[serde(rename = "userId", default)]
    sender_id: String,
    #[serde(
        rename = "channelId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    channel_id: Option<String>,
}

impl Message {
    /// Creates a message with a fresh id and the current timestamp.
    pub fn new(kind: MessageType, payload: Value, sender_id: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            kind,
            payload,
            timestamp: now_ms(),
            sender_id: sender_id.into(),
            channel_id: None,
        }
    }

    pub fn ping(sender_id: impl Into<String>) -> Self {
        Self::new(MessageType::Ping, Value::Null, sender_id)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Parses one inbound text frame.
    pub fn from_frame(frame: &str) -> Result<Self> {
        Ok(serde_json::from_str(frame)?)
    }

    /// Serializes the message into one outbound text frame.
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn channel_id(&self) -> Option<&str> {
        self.channel_id.as_deref()
    }
}

fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
