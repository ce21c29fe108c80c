use super::{
    ClientState, ConnectionLost, ConnectionManager, ConnectionState, ConnectionStatus,
    LossCause, RealtimeClientBuilder, RealtimeClientOptions,
};
use crate::infrastructure::{HeartbeatManager, PendingPing, Timer};
use crate::messaging::{EventHandlers, MessageRouter, OutboundQueue};
use crate::session::{PresenceEntry, PresenceStatus, SessionHandle, TypingEvent};
use crate::types::{
    MAX_RECONNECT_ATTEMPTS_REACHED, Message, MessageType, RealtimeError, Result, payload_keys,
};
use crate::websocket::{FrameStream, Transport, TransportConnection};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, watch};
use url::Url;

/// The main entry point of the crate.
///
/// `RealtimeClient` owns the connection to the chat server, reconnects with
/// exponential backoff when it drops, buffers outbound messages while
/// offline, and keeps presence and typing state in sync with inbound
/// traffic.
///
/// Construct one per session and hand clones to whoever needs it; clones
/// share the same connection.
///
/// # Example
///
/// ```no_run
/// use chat_realtime_rs::{RealtimeClient, RealtimeClientOptions};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RealtimeClient::new(
///     "wss://chat.example.com/ws",
///     RealtimeClientOptions {
///         user_id: "alice".to_string(),
///         ..Default::default()
///     },
/// )?;
///
/// client.on_message(|message| println!("{:?}", message.payload()));
/// client.connect().await?;
/// client.send_chat_message("hello", Some("general")).await?;
/// client.disconnect().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RealtimeClient {
    pub(crate) inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(crate) endpoint: Url,
    pub(crate) options: RealtimeClientOptions,
    pub(crate) transport: Arc<dyn Transport>,

    // Connection manager
    pub(crate) connection: Arc<ConnectionManager>,
    pub(crate) queue: Arc<OutboundQueue>,
    pub(crate) session: SessionHandle,
    pub(crate) handlers: Arc<EventHandlers>,
    pub(crate) pending_ping: PendingPing,
    pub(crate) lost_tx: mpsc::UnboundedSender<ConnectionLost>,

    // Consolidated mutable state
    pub(crate) state: RwLock<ClientState>,
}

impl RealtimeClient {
    /// Creates a new RealtimeClient instance.
    ///
    /// This initializes the client but does not establish a connection. You must call
    /// [`connect()`](Self::connect) or send a message to open it.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::UrlParse`] if the endpoint URL cannot be parsed and
    /// [`RealtimeError::Config`] if an option is out of range.
    pub fn new(endpoint: impl Into<String>, options: RealtimeClientOptions) -> Result<Self> {
        RealtimeClientBuilder::new(endpoint, options).map(|builder| builder.build())
    }

    /// Starts a builder, e.g. to plug in a custom [`Transport`].
    pub fn builder(
        endpoint: impl Into<String>,
        options: RealtimeClientOptions,
    ) -> Result<RealtimeClientBuilder> {
        RealtimeClientBuilder::new(endpoint, options)
    }

    /// Opens the connection.
    ///
    /// Returns immediately if the client is already connected or connecting.
    /// On success the receive loop and heartbeat are started and every queued
    /// message is flushed. On failure the error is returned and automatic
    /// reconnection with exponential backoff is scheduled.
    pub async fn connect(&self) -> Result<()> {
        self.inner.connect().await
    }

    /// Closes the connection and stops all background work.
    ///
    /// The client will NOT reconnect on its own after this; presence, typing
    /// and queued messages are discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails (rare). The client is
    /// disconnected either way.
    pub async fn disconnect(&self) -> Result<()> {
        self.inner.disconnect().await
    }

    /// Sends a message, queueing it while the connection is down.
    ///
    /// When the client is disconnected and no reconnect is in progress, this
    /// also starts connecting in the background.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::QueueFull`] when the queue is full and the
    /// overflow policy is `Reject`.
    pub async fn send(&self, message: Message) -> Result<()> {
        self.inner.send(message).await
    }

    /// Sends a chat text, optionally scoped to a channel.
    pub async fn send_chat_message(&self, text: &str, channel_id: Option<&str>) -> Result<()> {
        let message = self.outbound(
            MessageType::Data,
            json!({ (payload_keys::TEXT): text }),
            channel_id,
        );
        self.send(message).await
    }

    /// Tells peers whether this user is typing.
    pub async fn send_typing(&self, channel_id: Option<&str>, is_typing: bool) -> Result<()> {
        let message = self.outbound(
            MessageType::Typing,
            json!({ (payload_keys::IS_TYPING): is_typing }),
            channel_id,
        );
        self.send(message).await
    }

    /// Publishes this user's presence status.
    pub async fn update_presence(&self, status: PresenceStatus, channel_id: Option<&str>) -> Result<()> {
        let message = self.outbound(
            MessageType::Presence,
            json!({ (payload_keys::STATUS): status }),
            channel_id,
        );
        self.send(message).await
    }

    fn outbound(&self, kind: MessageType, payload: serde_json::Value, channel_id: Option<&str>) -> Message {
        let message = Message::new(kind, payload, self.inner.options.user_id.as_str());
        match channel_id {
            Some(channel_id) => message.with_channel(channel_id),
            None => message,
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    /// Full status snapshot, including the last error and retry counter
    pub fn status(&self) -> ConnectionStatus {
        self.inner.connection.status()
    }

    /// Receiver that observes every status transition.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.connection.subscribe()
    }

    /// Checks if currently connected
    pub fn is_connected(&self) -> bool {
        self.inner.connection.is_connected()
    }

    /// Number of messages waiting to be sent
    pub fn pending_messages(&self) -> usize {
        self.inner.queue.len()
    }

    /// Messages waiting to be sent, oldest first
    pub fn queued_messages(&self) -> Vec<Message> {
        self.inner.queue.snapshot()
    }

    /// Last reported presence of a user, if any
    pub async fn presence(&self, user_id: &str) -> Option<PresenceEntry> {
        self.inner.session.presence(user_id).await
    }

    /// Users currently online, sorted by id
    pub async fn online_users(&self) -> Vec<PresenceEntry> {
        self.inner.session.online_users().await
    }

    /// Users with an active typing indicator
    pub async fn typing_users(&self) -> Vec<TypingEvent> {
        self.inner.session.typing_users().await
    }

    /// Registers a callback for chat, status, system and heartbeat messages
    pub fn on_message<F>(&self, callback: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.inner.handlers.on_message(callback);
    }

    /// Registers a callback for connection status transitions
    pub fn on_connection_status<F>(&self, callback: F)
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        self.inner.handlers.on_connection_status(callback);
    }

    /// Registers a callback for when a peer starts typing
    pub fn on_typing_started<F>(&self, callback: F)
    where
        F: Fn(&TypingEvent) + Send + Sync + 'static,
    {
        self.inner.handlers.on_typing_started(callback);
    }

    /// Registers a callback for when a peer stops typing or the indicator expires
    pub fn on_typing_stopped<F>(&self, callback: F)
    where
        F: Fn(&TypingEvent) + Send + Sync + 'static,
    {
        self.inner.handlers.on_typing_stopped(callback);
    }

    /// Registers a callback for peers coming online
    pub fn on_user_online<F>(&self, callback: F)
    where
        F: Fn(&PresenceEntry) + Send + Sync + 'static,
    {
        self.inner.handlers.on_user_online(callback);
    }

    /// Registers a callback for peers going away or offline
    pub fn on_user_offline<F>(&self, callback: F)
    where
        F: Fn(&PresenceEntry) + Send + Sync + 'static,
    {
        self.inner.handlers.on_user_offline(callback);
    }

    /// Connection failures, reconnect exhaustion and other non-fatal errors.
    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&RealtimeError) + Send + Sync + 'static,
    {
        self.inner.handlers.on_error(callback);
    }
}

impl ClientInner {
    async fn connect(self: &Arc<Self>) -> Result<()> {
        let epoch = {
            let mut state = self.state.write().await;
            match self.connection.state() {
                ConnectionState::Connecting | ConnectionState::Connected => return Ok(()),
                // A manual connect starts a fresh campaign
                ConnectionState::Disconnected => self.connection.reset_attempts(),
                ConnectionState::Reconnecting => {}
            }
            if let Some(task) = state.reconnect_task.take() {
                task.abort();
            }
            state.epoch
        };

        match self.open_connection(epoch).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.handlers.emit_error(&e);
                self.schedule_reconnect(epoch, false).await;
                Err(e)
            }
        }
    }

    /// One connection attempt. Does not schedule retries.
    async fn open_connection(self: &Arc<Self>, epoch: u64) -> Result<()> {
        if !self.connection.begin_connecting() {
            return Ok(());
        }

        // The query string may carry the access token
        tracing::info!(
            "Connecting to {}{}",
            self.endpoint.origin().ascii_serialization(),
            self.endpoint.path()
        );
        let TransportConnection { sink, stream } = match self.transport.open(&self.endpoint).await
        {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!("Connection attempt failed: {}", e);
                self.connection.mark_failed(e.to_string());
                return Err(e);
            }
        };
        self.connection.set_writer(sink).await;

        {
            let mut state = self.state.write().await;
            if state.epoch != epoch {
                drop(state);
                tracing::info!("Connection attempt cancelled by disconnect");
                if let Err(e) = self.connection.close().await {
                    tracing::debug!("Failed to close cancelled connection: {}", e);
                }
                return Err(RealtimeError::Connection(
                    "connection attempt cancelled".to_string(),
                ));
            }

            state.connection_id += 1;
            let connection_id = state.connection_id;
            self.pending_ping.acknowledge();

            state.task_manager.abort_all();
            let router = MessageRouter::new(self.session.clone(), self.pending_ping.clone());
            state.task_manager.spawn(Self::read_loop(
                stream,
                router,
                self.lost_tx.clone(),
                connection_id,
            ));

            let heartbeat = HeartbeatManager::new(
                Arc::downgrade(&self.connection),
                Arc::clone(&self.queue),
                self.pending_ping.clone(),
                self.lost_tx.clone(),
                connection_id,
            )
            .with_interval(Duration::from_millis(self.options.heartbeat_interval))
            .with_pong_timeout(self.options.pong_timeout.map(Duration::from_millis))
            .with_sender(self.options.user_id.as_str());
            state.task_manager.spawn(heartbeat.run());

            self.connection.mark_connected();
        }
        tracing::info!("Connected to server");

        let sent = self.queue.flush(&self.connection).await;
        if sent > 0 {
            tracing::debug!("Flushed {} queued messages", sent);
        }
        Ok(())
    }

    async fn read_loop(
        mut stream: Box<dyn FrameStream>,
        router: MessageRouter,
        lost_tx: mpsc::UnboundedSender<ConnectionLost>,
        connection_id: u64,
    ) {
        tracing::info!("Starting read task");
        let cause = loop {
            match stream.next_frame().await {
                Some(Ok(frame)) => {
                    tracing::debug!("Received frame: {}", frame);
                    router.route_frame(&frame).await;
                }
                Some(Err(e)) => {
                    tracing::error!("Transport read error: {}", e);
                    break LossCause::Transport(e.to_string());
                }
                None => break LossCause::Closed,
            }
        };
        tracing::info!("Read task finished");
        let _ = lost_tx.send(ConnectionLost {
            connection_id,
            cause,
        });
    }

    pub(crate) async fn handle_connection_lost(self: &Arc<Self>, lost: ConnectionLost) {
        let epoch = {
            let mut state = self.state.write().await;
            if lost.connection_id != state.connection_id
                || self.connection.state() != ConnectionState::Connected
            {
                tracing::debug!("Ignoring stale connection loss: {}", lost.cause);
                return;
            }
            state.task_manager.abort_all();
            state.epoch
        };

        tracing::warn!("Connection lost: {}", lost.cause);
        // Also aborts sends stuck on the dead transport
        if let Err(e) = self.connection.close().await {
            tracing::debug!("Failed to close lost connection: {}", e);
        }
        self.connection.record_error(lost.cause.to_string());
        self.handlers.emit_error(&lost.cause.into_error());
        self.schedule_reconnect(epoch, false).await;
    }

    /// Starts the backoff driver.
    ///
    /// With `immediate`, the first attempt happens without delay as a new
    /// campaign, and nothing is started if a driver is already running.
    async fn schedule_reconnect(self: &Arc<Self>, epoch: u64, immediate: bool) {
        let mut state = self.state.write().await;
        if state.epoch != epoch {
            return;
        }
        if immediate {
            if state.reconnect_in_progress() {
                return;
            }
            self.connection.reset_attempts();
        }
        if let Some(task) = state.reconnect_task.take() {
            task.abort();
        }

        let client = Arc::clone(self);
        state.reconnect_task = Some(tokio::spawn(async move {
            client.run_reconnect(epoch, immediate).await;
        }));
    }

    async fn run_reconnect(self: Arc<Self>, epoch: u64, immediate: bool) {
        if immediate {
            match self.open_connection(epoch).await {
                Ok(()) => return,
                Err(e) => {
                    tracing::error!("Connection attempt failed: {}", e);
                    self.handlers.emit_error(&e);
                }
            }
        }

        let timer = Timer::new(Duration::from_millis(self.options.reconnect_interval));
        let max_attempts = self.options.max_reconnect_attempts;
        loop {
            let attempts = self.connection.reconnect_attempts();
            if attempts >= max_attempts {
                tracing::error!("Giving up after {} reconnection attempts", attempts);
                self.connection.mark_failed(MAX_RECONNECT_ATTEMPTS_REACHED);
                self.handlers.emit_error(&RealtimeError::MaxReconnectAttempts);
                return;
            }

            let delay = timer.delay_for(attempts);
            self.connection.mark_reconnecting(delay);
            tracing::info!(
                "Reconnecting in {:?} (attempt {}/{})",
                delay,
                attempts + 1,
                max_attempts
            );
            timer.schedule_timeout(attempts).await;
            self.connection.increment_attempts();

            tracing::info!("Attempting to reconnect...");
            match self.open_connection(epoch).await {
                Ok(()) => {
                    tracing::info!("Reconnected successfully");
                    return;
                }
                Err(e) => {
                    tracing::error!("Reconnection attempt failed: {}", e);
                    self.handlers.emit_error(&e);
                }
            }
        }
    }

    async fn disconnect(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.epoch += 1;
            // Invalidates loss reports already in flight
            state.connection_id += 1;
            state.cancel_background_work();
        }
        self.pending_ping.acknowledge();
        tracing::info!("Disconnecting from server");

        let closed = self.connection.close().await;
        self.connection.mark_disconnected();

        let discarded = self.queue.clear();
        if discarded > 0 {
            tracing::info!("Discarded {} unsent messages", discarded);
        }
        self.session.clear().await;

        tracing::info!("Disconnected from server");
        closed
    }

    async fn send(self: &Arc<Self>, message: Message) -> Result<()> {
        tracing::debug!("Queueing {} message {}", message.kind(), message.id());
        self.queue.enqueue(message)?;

        match self.connection.state() {
            ConnectionState::Connected => {
                self.queue.flush(&self.connection).await;
            }
            ConnectionState::Disconnected => {
                let epoch = self.state.read().await.epoch;
                self.schedule_reconnect(epoch, true).await;
            }
            // Flushed once the pending attempt succeeds
            ConnectionState::Connecting | ConnectionState::Reconnecting => {}
        }
        Ok(())
    }
}
