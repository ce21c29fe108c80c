use crate::client::ConnectionStatus;
use crate::session::{PresenceEntry, TypingEvent};
use crate::types::{Message, RealtimeError};
use std::sync::{Arc, Mutex, PoisonError};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync + 'static>;

/// A list of callbacks for one event kind.
struct Listeners<T> {
    callbacks: Mutex<Vec<Callback<T>>>,
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self {
            callbacks: Mutex::new(Vec::new()),
        }
    }
}

impl<T> Listeners<T> {
    fn add(&self, callback: Callback<T>) {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }

    fn emit(&self, value: &T) {
        let callbacks = {
            let callbacks = self.callbacks.lock().unwrap_or_else(PoisonError::into_inner);
            callbacks.clone()
        }; // Lock released here

        for callback in callbacks {
            callback(value);
        }
    }
}

/// Registry of caller callbacks.
///
/// Callbacks run on the client's background tasks. The display layer is
/// expected to hop onto its own execution context if it needs to.
#[derive(Default)]
pub struct EventHandlers {
    message: Listeners<Message>,
    status: Listeners<ConnectionStatus>,
    typing_started: Listeners<TypingEvent>,
    typing_stopped: Listeners<TypingEvent>,
    user_online: Listeners<PresenceEntry>,
    user_offline: Listeners<PresenceEntry>,
    error: Listeners<RealtimeError>,
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_message<F>(&self, callback: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.message.add(Arc::new(callback));
    }

    pub fn on_connection_status<F>(&self, callback: F)
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        self.status.add(Arc::new(callback));
    }

    pub fn on_typing_started<F>(&self, callback: F)
    where
        F: Fn(&TypingEvent) + Send + Sync + 'static,
    {
        self.typing_started.add(Arc::new(callback));
    }

    pub fn on_typing_stopped<F>(&self, callback: F)
    where
        F: Fn(&TypingEvent) + Send + Sync + 'static,
    {
        self.typing_stopped.add(Arc::new(callback));
    }

    pub fn on_user_online<F>(&self, callback: F)
    where
        F: Fn(&PresenceEntry) + Send + Sync + 'static,
    {
        self.user_online.add(Arc::new(callback));
    }

    pub fn on_user_offline<F>(&self, callback: F)
    where
        F: Fn(&PresenceEntry) + Send + Sync + 'static,
    {
        self.user_offline.add(Arc::new(callback));
    }

    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&RealtimeError) + Send + Sync + 'static,
    {
        self.error.add(Arc::new(callback));
    }

    pub(crate) fn emit_message(&self, message: &Message) {
        self.message.emit(message);
    }

    pub(crate) fn emit_status(&self, status: &ConnectionStatus) {
        self.status.emit(status);
    }

    pub(crate) fn emit_typing_started(&self, event: &TypingEvent) {
        self.typing_started.emit(event);
    }

    pub(crate) fn emit_typing_stopped(&self, event: &TypingEvent) {
        self.typing_stopped.emit(event);
    }

    pub(crate) fn emit_user_online(&self, entry: &PresenceEntry) {
        self.user_online.emit(entry);
    }

    pub(crate) fn emit_user_offline(&self, entry: &PresenceEntry) {
        self.user_offline.emit(entry);
    }

    pub(crate) fn emit_error(&self, error: &RealtimeError) {
        self.error.emit(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_every_registered_callback_fires() {
        let handlers = EventHandlers::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let count = Arc::clone(&count);
            handlers.on_message(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        handlers.emit_message(&Message::new(MessageType::Data, serde_json::Value::Null, "a"));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_callback_may_register_another_callback() {
        let handlers = Arc::new(EventHandlers::new());
        let inner = Arc::clone(&handlers);
        handlers.on_error(move |_| inner.on_error(|_| {}));

        // Would deadlock if the lock were held while calling out.
        handlers.emit_error(&RealtimeError::NotConnected);
        handlers.emit_error(&RealtimeError::NotConnected);
    }
}
