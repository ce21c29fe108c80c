use crate::infrastructure::TaskManager;
use crate::types::RealtimeError;
use std::fmt;
use tokio::task::JoinHandle;

/// Report from a receive loop or heartbeat that its connection is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionLost {
    pub connection_id: u64,
    pub cause: LossCause,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LossCause {
    /// The server closed the connection
    Closed,
    /// The transport failed while reading
    Transport(String),
    /// A ping went unanswered past the pong deadline
    HeartbeatTimeout,
}

impl LossCause {
    /// Error reported to `on_error` callbacks
    pub fn into_error(self) -> RealtimeError {
        match self {
            Self::HeartbeatTimeout => RealtimeError::Timeout,
            other => RealtimeError::Connection(other.to_string()),
        }
    }
}

impl fmt::Display for LossCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("connection closed by server"),
            Self::Transport(reason) => f.write_str(reason),
            Self::HeartbeatTimeout => f.write_str("heartbeat timeout"),
        }
    }
}

/// Consolidated mutable state for RealtimeClient
/// Using a single struct reduces lock contention
pub struct ClientState {
    /// Receive loop and heartbeat of the current connection
    pub task_manager: TaskManager,

    /// Backoff/reconnect driver, if one was started
    pub reconnect_task: Option<JoinHandle<()>>,

    /// Bumped by every manual disconnect; work started under an older epoch must not resurrect the connection
    pub epoch: u64,

    /// Bumped for every opened connection so stale loss reports can be told apart
    pub connection_id: u64,
}

impl ClientState {
    pub fn new() -> Self {
        Self {
            task_manager: TaskManager::new(),
            reconnect_task: None,
            epoch: 0,
            connection_id: 0,
        }
    }

    /// Whether a reconnect driver is still running
    pub fn reconnect_in_progress(&self) -> bool {
        self.reconnect_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Cancels the receive loop, the heartbeat and any backoff wait
    pub fn cancel_background_work(&mut self) {
        self.task_manager.abort_all();
        if let Some(task) = self.reconnect_task.take() {
            task.abort();
        }
    }
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}
