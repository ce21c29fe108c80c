use super::core::ClientInner;
use super::{ClientState, ConnectionLost, ConnectionManager, RealtimeClient};
use crate::infrastructure::PendingPing;
use crate::messaging::{EventHandlers, OutboundQueue, OverflowPolicy};
use crate::session::{SessionConfig, SessionHandle};
use crate::types::{
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_INTERVAL, HEARTBEAT_INTERVAL,
    MAX_QUEUE_SIZE, RealtimeError, Result, TOKEN_QUERY_PARAM, TYPING_SWEEP_INTERVAL, TYPING_TTL,
};
use crate::websocket::{Transport, WebSocketFactory};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};
use url::Url;

/// Client configuration. All durations are in milliseconds.
///
/// Deserializes from camelCase keys (`reconnectInterval`,
/// `maxReconnectAttempts`, ...); missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RealtimeClientOptions {
    /// Id stamped as `userId` on outbound messages
    pub user_id: String,
    /// Appended to the endpoint as the `token` query parameter
    pub access_token: Option<String>,
    /// Base unit of the exponential reconnect backoff
    pub reconnect_interval: u64,
    pub max_reconnect_attempts: u32,
    pub heartbeat_interval: u64,
    /// Reconnect when a ping is not answered within this delay. Disabled when `None`.
    pub pong_timeout: Option<u64>,
    pub enable_presence: bool,
    pub enable_typing: bool,
    pub typing_ttl: u64,
    pub typing_sweep_interval: u64,
    pub max_queue_size: usize,
    pub overflow_policy: OverflowPolicy,
}

impl Default for RealtimeClientOptions {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            access_token: None,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            pong_timeout: None,
            enable_presence: true,
            enable_typing: true,
            typing_ttl: TYPING_TTL,
            typing_sweep_interval: TYPING_SWEEP_INTERVAL,
            max_queue_size: MAX_QUEUE_SIZE,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

impl RealtimeClientOptions {
    fn validate(&self) -> Result<()> {
        let non_zero = [
            ("reconnectInterval", self.reconnect_interval),
            ("heartbeatInterval", self.heartbeat_interval),
            ("typingTtl", self.typing_ttl),
            ("typingSweepInterval", self.typing_sweep_interval),
            ("maxQueueSize", self.max_queue_size as u64),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                return Err(RealtimeError::Config(format!("{} must be greater than 0", name)));
            }
        }
        if self.pong_timeout == Some(0) {
            return Err(RealtimeError::Config(
                "pongTimeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn session_config(&self) -> SessionConfig {
        SessionConfig {
            enable_presence: self.enable_presence,
            enable_typing: self.enable_typing,
            typing_ttl: Duration::from_millis(self.typing_ttl),
            sweep_interval: Duration::from_millis(self.typing_sweep_interval),
        }
    }
}

/// Builder for RealtimeClient that handles initialization
pub struct RealtimeClientBuilder {
    endpoint: Url,
    options: RealtimeClientOptions,
    transport: Arc<dyn Transport>,
}

impl RealtimeClientBuilder {
    /// Create a new builder, validating the endpoint and options
    pub fn new(endpoint: impl Into<String>, options: RealtimeClientOptions) -> Result<Self> {
        let endpoint = Url::parse(&endpoint.into())?;
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(RealtimeError::Config(format!(
                "unsupported endpoint scheme '{}', expected ws or wss",
                endpoint.scheme()
            )));
        }
        options.validate()?;

        Ok(Self {
            endpoint,
            options,
            transport: Arc::new(WebSocketFactory),
        })
    }

    /// Replace the default WebSocket transport
    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    /// Build the client and spawn background tasks
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> RealtimeClient {
        let endpoint = self.build_endpoint_url();
        let handlers = Arc::new(EventHandlers::new());
        let (session, _worker) =
            SessionHandle::spawn(self.options.session_config(), Arc::clone(&handlers));
        let (lost_tx, lost_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(ClientInner {
            endpoint,
            queue: Arc::new(OutboundQueue::new(
                self.options.max_queue_size,
                self.options.overflow_policy,
            )),
            options: self.options,
            transport: self.transport,
            connection: Arc::new(ConnectionManager::new(Arc::clone(&handlers))),
            session,
            handlers,
            pending_ping: PendingPing::default(),
            lost_tx,
            state: RwLock::new(ClientState::new()),
        });

        // Spawn reconnection supervisor task
        tokio::spawn(supervise(Arc::downgrade(&inner), lost_rx));

        RealtimeClient { inner }
    }

    /// Build the endpoint URL with query parameters
    fn build_endpoint_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        if let Some(token) = &self.options.access_token {
            url.query_pairs_mut().append_pair(TOKEN_QUERY_PARAM, token);
        }
        url
    }
}

/// Turns connection-loss reports into reconnect campaigns until the client is dropped.
async fn supervise(client: Weak<ClientInner>, mut lost_rx: mpsc::UnboundedReceiver<ConnectionLost>) {
    while let Some(lost) = lost_rx.recv().await {
        let Some(client) = client.upgrade() else {
            break;
        };
        client.handle_connection_lost(lost).await;
    }
    tracing::info!("Reconnection supervisor finished");
}
