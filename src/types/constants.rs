/// Wire names for the `type` field of a frame
pub mod message_types {
    pub const DATA: &str = "message";
    pub const STATUS: &str = "status";
    pub const PRESENCE: &str = "presence";
    pub const TYPING: &str = "typing";
    pub const SYSTEM: &str = "system";
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
}

/// Payload keys (magic strings layer)
pub mod payload_keys {
    pub const TEXT: &str = "text";
    pub const STATUS: &str = "status";
    pub const IS_TYPING: &str = "isTyping";
}

/// Query parameter carrying the access token on the connect URL
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Default base reconnect interval (milliseconds)
pub const DEFAULT_RECONNECT_INTERVAL: u64 = 1000;

/// Default number of reconnect attempts before giving up
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default heartbeat interval (milliseconds)
pub const HEARTBEAT_INTERVAL: u64 = 30000;

/// Typing indicator time-to-live (milliseconds)
pub const TYPING_TTL: u64 = 5000;

/// Typing sweep interval (milliseconds)
pub const TYPING_SWEEP_INTERVAL: u64 = 1000;

/// How long a graceful transport close may take (milliseconds)
pub const CLOSE_TIMEOUT: u64 = 1000;

/// Max outbound queue size
pub const MAX_QUEUE_SIZE: usize = 1000;

/// Capacity of the inbound command channel feeding the session worker
pub const SESSION_CHANNEL_CAPACITY: usize = 256;

/// Terminal error surfaced once the reconnect budget is spent
pub const MAX_RECONNECT_ATTEMPTS_REACHED: &str = "max reconnection attempts reached";
