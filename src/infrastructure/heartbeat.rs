use crate::client::{ConnectionLost, ConnectionManager, LossCause};
use crate::messaging::OutboundQueue;
use crate::types::{HEARTBEAT_INTERVAL, Message};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(HEARTBEAT_INTERVAL);

/// The oldest ping still waiting for a pong.
#[derive(Debug, Clone, Default)]
pub struct PendingPing {
    inner: Arc<Mutex<Option<(String, Instant)>>>,
}

impl PendingPing {
    /// Records a ping unless an older one is still unanswered.
    pub fn mark_sent(&self, id: &str) {
        let mut pending = self.lock();
        if pending.is_none() {
            *pending = Some((id.to_string(), Instant::now()));
        }
    }

    /// Clears the pending ping; returns whether one was pending.
    pub fn acknowledge(&self) -> bool {
        self.lock().take().is_some()
    }

    pub fn sent_at(&self) -> Option<Instant> {
        self.lock().as_ref().map(|(_, sent_at)| *sent_at)
    }

    pub fn is_pending(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<(String, Instant)>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Emits keepalive pings while the connection is open.
///
/// Without a pong timeout the manager only sends pings and liveness is left
/// to the transport. With one, an unanswered ping reports the connection as
/// lost once the deadline passes.
pub struct HeartbeatManager {
    interval: Duration,
    pong_timeout: Option<Duration>,
    sender_id: String,
    connection: Weak<ConnectionManager>,
    queue: Arc<OutboundQueue>,
    pending_ping: PendingPing,
    lost_tx: mpsc::UnboundedSender<ConnectionLost>,
    connection_id: u64,
}

impl HeartbeatManager {
    pub fn new(
        connection: Weak<ConnectionManager>,
        queue: Arc<OutboundQueue>,
        pending_ping: PendingPing,
        lost_tx: mpsc::UnboundedSender<ConnectionLost>,
        connection_id: u64,
    ) -> Self {
        Self {
            interval: DEFAULT_HEARTBEAT_INTERVAL,
            pong_timeout: None,
            sender_id: String::new(),
            connection,
            queue,
            pending_ping,
            lost_tx,
            connection_id,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_pong_timeout(mut self, pong_timeout: Option<Duration>) -> Self {
        self.pong_timeout = pong_timeout;
        self
    }

    pub fn with_sender(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = sender_id.into();
        self
    }

    /// Runs until the connection goes away, a pong deadline is missed, or the task is aborted
    pub async fn run(self) {
        let watchdog = async {
            match self.pong_timeout {
                Some(timeout) => self.watch_pong(timeout).await,
                None => std::future::pending().await,
            }
        };

        // The deadline is watched apart from the sends, which can stall on a dead socket
        tokio::select! {
            _ = self.emit_pings() => {}
            _ = watchdog => {}
        }
        tracing::info!("Heartbeat task finished");
    }

    async fn emit_pings(&self) {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            // Client dropped, exit heartbeat task
            let Some(connection) = self.connection.upgrade() else {
                break;
            };
            if !connection.is_connected() {
                continue;
            }
            self.send_ping(&connection).await;
        }
    }

    async fn watch_pong(&self, timeout: Duration) {
        loop {
            let deadline = match self.pending_ping.sent_at() {
                Some(sent_at) => sent_at + timeout,
                None => Instant::now() + timeout,
            };
            time::sleep_until(deadline).await;

            if self.pong_overdue(timeout) {
                tracing::warn!("Heartbeat timeout - no pong received, closing connection");
                let _ = self.lost_tx.send(ConnectionLost {
                    connection_id: self.connection_id,
                    cause: LossCause::HeartbeatTimeout,
                });
                break;
            }
        }
    }

    async fn send_ping(&self, connection: &ConnectionManager) {
        let ping = Message::ping(self.sender_id.as_str());
        let ping_id = ping.id().to_string();
        self.pending_ping.mark_sent(&ping_id);

        if let Err(e) = self.queue.enqueue(ping) {
            tracing::error!("[Heartbeat] Failed to queue ping: {}", e);
            return;
        }
        self.queue.flush(connection).await;
        tracing::debug!("Sent heartbeat {}", ping_id);
    }

    fn pong_overdue(&self, timeout: Duration) -> bool {
        self.pending_ping
            .sent_at()
            .is_some_and(|sent_at| sent_at.elapsed() >= timeout)
    }
}
