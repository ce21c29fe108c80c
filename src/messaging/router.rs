use crate::infrastructure::PendingPing;
use crate::session::SessionHandle;
use crate::types::{Message, MessageType};

/// Routes incoming frames to the appropriate handlers
pub struct MessageRouter {
    session: SessionHandle,
    pending_ping: PendingPing,
}

impl MessageRouter {
    pub fn new(session: SessionHandle, pending_ping: PendingPing) -> Self {
        Self {
            session,
            pending_ping,
        }
    }

    /// Parses a raw frame and routes it. Malformed frames are logged and dropped.
    pub async fn route_frame(&self, frame: &str) {
        match Message::from_frame(frame) {
            Ok(message) => {
                tracing::debug!(
                    "Parsed message: id={}, type={}, from={}",
                    message.id(),
                    message.kind(),
                    message.sender_id()
                );
                self.route(message).await;
            }
            Err(e) => {
                tracing::error!("Failed to parse message: {} - Raw: {}", e, frame);
            }
        }
    }

    /// Routes a message to the appropriate handler(s)
    pub async fn route(&self, message: Message) {
        match message.kind() {
            MessageType::Presence => self.session.apply_presence(message).await,
            MessageType::Typing => self.session.apply_typing(message).await,
            MessageType::Pong => {
                self.handle_pong(&message);
                self.session.deliver(message).await;
            }
            MessageType::Data | MessageType::Status | MessageType::System | MessageType::Ping => {
                self.session.deliver(message).await
            }
        }
    }

    /// Handles heartbeat acknowledgment by clearing the pending ping
    fn handle_pong(&self, message: &Message) {
        if self.pending_ping.acknowledge() {
            tracing::debug!("Received heartbeat ack {}", message.id());
        }
    }
}
