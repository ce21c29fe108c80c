use crate::messaging::EventHandlers;
use crate::types::{CLOSE_TIMEOUT, Message, RealtimeError, Result, now_ms};
use crate::websocket::FrameSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::time;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Snapshot of the connection, published on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Reason of the last failure; `None` after a successful connect or a manual disconnect
    pub last_error: Option<String>,
    /// Epoch milliseconds of the last successful connect
    pub last_connected_at: Option<u64>,
    /// Attempts made in the current reconnect campaign
    pub reconnect_attempts: u32,
    /// Backoff delay being waited on, while `Reconnecting`
    pub next_retry_in: Option<Duration>,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            last_error: None,
            last_connected_at: None,
            reconnect_attempts: 0,
            next_retry_in: None,
        }
    }
}

/// Owns the connection status and the write half of the transport.
///
/// Every transition goes through a `watch` channel so callers can await
/// state changes, and is also reported to the `on_connection_status`
/// callbacks.
pub struct ConnectionManager {
    writer: Mutex<Option<Box<dyn FrameSink>>>,
    status: watch::Sender<ConnectionStatus>,
    // Bumped by `close` to abort sends still in flight
    close_generation: watch::Sender<u64>,
    handlers: Arc<EventHandlers>,
}

impl ConnectionManager {
    pub fn new(handlers: Arc<EventHandlers>) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());
        let (close_generation, _) = watch::channel(0);
        Self {
            writer: Mutex::new(None),
            status,
            close_generation,
            handlers,
        }
    }

    /// Gets the current connection state
    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    /// Gets a full status snapshot
    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Checks if currently connected
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Moves to `Connecting` unless a connection is already open or being opened.
    ///
    /// Returns `false` when the transition was refused.
    pub fn begin_connecting(&self) -> bool {
        let changed = self.status.send_if_modified(|status| {
            if matches!(
                status.state,
                ConnectionState::Connecting | ConnectionState::Connected
            ) {
                return false;
            }
            status.state = ConnectionState::Connecting;
            status.next_retry_in = None;
            true
        });
        if changed {
            self.notify();
        }
        changed
    }

    pub fn mark_connected(&self) {
        self.update(|status| {
            status.state = ConnectionState::Connected;
            status.last_error = None;
            status.last_connected_at = Some(now_ms());
            status.reconnect_attempts = 0;
            status.next_retry_in = None;
        });
    }

    /// Records a failure and falls back to `Disconnected` with the error attached.
    pub fn mark_failed(&self, error: impl Into<String>) {
        let error = error.into();
        self.update(|status| {
            status.state = ConnectionState::Disconnected;
            status.last_error = Some(error);
            status.next_retry_in = None;
        });
    }

    /// Attaches an error to the status without changing state; the next transition publishes it.
    pub fn record_error(&self, error: impl Into<String>) {
        let error = error.into();
        self.status.send_modify(|status| status.last_error = Some(error));
    }

    pub fn mark_reconnecting(&self, delay: Duration) {
        self.update(|status| {
            status.state = ConnectionState::Reconnecting;
            status.next_retry_in = Some(delay);
        });
    }

    /// User-initiated disconnect: no error, counter reset.
    pub fn mark_disconnected(&self) {
        self.update(|status| {
            status.state = ConnectionState::Disconnected;
            status.last_error = None;
            status.reconnect_attempts = 0;
            status.next_retry_in = None;
        });
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.status.borrow().reconnect_attempts
    }

    pub fn increment_attempts(&self) {
        self.status.send_modify(|status| {
            status.reconnect_attempts = status.reconnect_attempts.saturating_add(1);
        });
    }

    /// Starts a fresh reconnect campaign.
    pub fn reset_attempts(&self) {
        self.status.send_modify(|status| status.reconnect_attempts = 0);
    }

    /// Sets the transport write half (called after successful connection)
    pub async fn set_writer(&self, writer: Box<dyn FrameSink>) {
        *self.writer.lock().await = Some(writer);
    }

    /// Sends a message through the transport
    ///
    /// A send still waiting on the transport when [`close`](Self::close) is
    /// called fails instead of holding the writer.
    pub async fn send_message(&self, msg: &Message) -> Result<()> {
        let frame = msg.to_frame()?;
        let mut closing = self.close_generation.subscribe();

        tokio::select! {
            result = self.write_frame(frame) => {
                result?;
                tracing::debug!("Sent {} message {}", msg.kind(), msg.id());
                Ok(())
            }
            _ = closing.changed() => Err(RealtimeError::Connection(
                "send aborted, connection closing".to_string(),
            )),
        }
    }

    async fn write_frame(&self, frame: String) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(RealtimeError::NotConnected)?;
        sink.send_frame(frame).await
    }

    /// Closes the transport gracefully, if one is open
    pub async fn close(&self) -> Result<()> {
        self.close_generation
            .send_modify(|generation| *generation = generation.wrapping_add(1));

        let writer = self.writer.lock().await.take();
        if let Some(mut sink) = writer {
            match time::timeout(Duration::from_millis(CLOSE_TIMEOUT), sink.close()).await {
                Ok(result) => result?,
                Err(_) => tracing::warn!("Timed out closing the transport, dropping it"),
            }
        }
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut ConnectionStatus)) {
        self.status.send_modify(apply);
        self.notify();
    }

    fn notify(&self) {
        let status = self.status();
        tracing::debug!("Connection state: {:?}", status.state);
        self.handlers.emit_status(&status);
    }
}
