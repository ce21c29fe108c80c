use super::presence::{PresenceChange, PresenceEntry, PresenceTracker};
use super::typing::{TypingChange, TypingEvent, TypingTracker};
use crate::messaging::EventHandlers;
use crate::types::{Message, SESSION_CHANNEL_CAPACITY};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

/// Settings the session worker needs from the client options.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub enable_presence: bool,
    pub enable_typing: bool,
    pub typing_ttl: Duration,
    pub sweep_interval: Duration,
}

enum SessionCommand {
    Deliver(Message),
    ApplyPresence(Message),
    ApplyTyping(Message),
    Presence {
        user_id: String,
        reply: oneshot::Sender<Option<PresenceEntry>>,
    },
    OnlineUsers(oneshot::Sender<Vec<PresenceEntry>>),
    TypingUsers(oneshot::Sender<Vec<TypingEvent>>),
    Clear,
}

/// Cheap handle to the session worker.
///
/// The worker task is the only owner of the presence and typing maps;
/// everything else talks to it through this handle, so all mutations and
/// the callbacks they trigger happen one at a time, in arrival order.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Spawns the worker. It stops once every handle has been dropped.
    pub fn spawn(config: SessionConfig, handlers: Arc<EventHandlers>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        let worker = SessionWorker {
            presence: PresenceTracker::new(config.enable_presence),
            typing: TypingTracker::new(config.enable_typing, config.typing_ttl),
            sweep_interval: config.sweep_interval,
            handlers,
        };
        let task = tokio::spawn(worker.run(rx));
        (Self { tx }, task)
    }

    /// Hands a generic message to the `on_message` callbacks.
    pub async fn deliver(&self, message: Message) {
        self.send(SessionCommand::Deliver(message)).await;
    }

    pub async fn apply_presence(&self, message: Message) {
        self.send(SessionCommand::ApplyPresence(message)).await;
    }

    pub async fn apply_typing(&self, message: Message) {
        self.send(SessionCommand::ApplyTyping(message)).await;
    }

    pub async fn presence(&self, user_id: &str) -> Option<PresenceEntry> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Presence {
            user_id: user_id.to_string(),
            reply,
        })
        .await;
        rx.await.ok().flatten()
    }

    pub async fn online_users(&self) -> Vec<PresenceEntry> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::OnlineUsers(reply)).await;
        rx.await.unwrap_or_default()
    }

    pub async fn typing_users(&self) -> Vec<TypingEvent> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::TypingUsers(reply)).await;
        rx.await.unwrap_or_default()
    }

    /// Forgets all presence and typing state.
    pub async fn clear(&self) {
        self.send(SessionCommand::Clear).await;
    }

    async fn send(&self, command: SessionCommand) {
        if self.tx.send(command).await.is_err() {
            tracing::debug!("Session worker stopped, dropping command");
        }
    }
}

struct SessionWorker {
    presence: PresenceTracker,
    typing: TypingTracker,
    sweep_interval: Duration,
    handlers: Arc<EventHandlers>,
}

impl SessionWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<SessionCommand>) {
        let mut sweep = time::interval_at(Instant::now() + self.sweep_interval, self.sweep_interval);
        sweep.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = sweep.tick() => self.sweep(),
            }
        }
        tracing::info!("Session worker finished");
    }

    fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Deliver(message) => self.handlers.emit_message(&message),
            SessionCommand::ApplyPresence(message) => match self.presence.apply(&message) {
                Some(PresenceChange::Online(entry)) => {
                    tracing::debug!("User {} is online", entry.user_id);
                    self.handlers.emit_user_online(&entry);
                }
                Some(PresenceChange::Offline(entry)) => {
                    tracing::debug!("User {} is {:?}", entry.user_id, entry.status);
                    self.handlers.emit_user_offline(&entry);
                }
                None => {}
            },
            SessionCommand::ApplyTyping(message) => {
                match self.typing.apply(&message, Instant::now()) {
                    Some(TypingChange::Started(event)) => self.handlers.emit_typing_started(&event),
                    Some(TypingChange::Stopped(event)) => self.handlers.emit_typing_stopped(&event),
                    None => {}
                }
            }
            SessionCommand::Presence { user_id, reply } => {
                let _ = reply.send(self.presence.get(&user_id).cloned());
            }
            SessionCommand::OnlineUsers(reply) => {
                let _ = reply.send(self.presence.online());
            }
            SessionCommand::TypingUsers(reply) => {
                let _ = reply.send(self.typing.typing_users());
            }
            SessionCommand::Clear => {
                self.presence.clear();
                self.typing.clear();
            }
        }
    }

    fn sweep(&mut self) {
        for event in self.typing.sweep(Instant::now()) {
            tracing::debug!("Typing indicator for {} expired", event.user_id);
            self.handlers.emit_typing_stopped(&event);
        }
    }
}
