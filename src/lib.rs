//! # Chat Realtime Rust
//!
//! A resilient client for real-time chat servers speaking JSON frames over a
//! persistent WebSocket: automatic reconnection with exponential backoff,
//! offline message queueing, heartbeats, presence and typing indicators.
//!
//! ## Example
//!
//! ```no_run
//! use chat_realtime_rs::{RealtimeClient, RealtimeClientOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RealtimeClient::new(
//!         "wss://chat.example.com/ws",
//!         RealtimeClientOptions {
//!             user_id: "alice".to_string(),
//!             access_token: Some("secret".to_string()),
//!             ..Default::default()
//!         }
//!     )?;
//!
//!     client.on_user_online(|entry| println!("{} is online", entry.user_id));
//!     client.connect().await?;
//!     client.send_chat_message("hello", Some("general")).await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod infrastructure;
pub mod messaging;
pub mod session;
pub mod types;
pub mod websocket;

pub use client::{
    ConnectionState, ConnectionStatus, RealtimeClient, RealtimeClientBuilder,
    RealtimeClientOptions,
};
pub use messaging::OverflowPolicy;
pub use session::{PresenceEntry, PresenceStatus, TypingEvent};
pub use types::{Message, MessageType, RealtimeError, Result};
pub use websocket::{FrameSink, FrameStream, Transport, TransportConnection};
