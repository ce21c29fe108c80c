use thiserror::Error;

/// Errors that can occur when using the realtime chat client.
#[derive(Error, Debug)]
pub enum RealtimeError {
    /// WebSocket protocol error (connection failed, invalid frame, etc.)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// General connection error with descriptive message
    #[error("Connection error: {0}")]
    Connection(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing error (malformed endpoint URL)
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Invalid client options
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Outbound queue is at capacity and the overflow policy rejects new messages
    #[error("Outbound queue is full ({0} messages)")]
    QueueFull(usize),

    /// Automatic reconnection gave up
    #[error("{}", crate::types::MAX_RECONNECT_ATTEMPTS_REACHED)]
    MaxReconnectAttempts,

    /// No pong arrived before the heartbeat deadline
    #[error("Heartbeat timeout: no pong received")]
    Timeout,

    /// Attempted operation while not connected to the server
    #[error("Not connected")]
    NotConnected,
}

/// Convenience type alias for `Result<T, RealtimeError>`.
pub type Result<T> = std::result::Result<T, RealtimeError>;
