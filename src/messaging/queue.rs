use crate::client::ConnectionManager;
use crate::types::{Message, RealtimeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// What to do with a new message when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued message to make room
    #[default]
    DropOldest,
    /// Refuse the new message with [`RealtimeError::QueueFull`]
    Reject,
}

/// Bounded FIFO buffer of messages awaiting transmission.
pub struct OutboundQueue {
    entries: Mutex<VecDeque<Message>>,
    capacity: usize,
    policy: OverflowPolicy,
    // Serializes flushes so batches never interleave on the wire
    flush_lock: tokio::sync::Mutex<()>,
}

impl OutboundQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity,
            policy,
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Appends a message at the tail.
    pub fn enqueue(&self, message: Message) -> Result<()> {
        let mut entries = self.entries();
        if entries.len() >= self.capacity {
            match self.policy {
                OverflowPolicy::Reject => {
                    tracing::warn!(
                        "Outbound queue full, rejecting message {}",
                        message.id()
                    );
                    return Err(RealtimeError::QueueFull(self.capacity));
                }
                OverflowPolicy::DropOldest => {
                    if let Some(dropped) = entries.pop_front() {
                        tracing::warn!(
                            "Outbound queue full, dropping oldest message {}",
                            dropped.id()
                        );
                    }
                }
            }
        }
        entries.push_back(message);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Copies of the queued messages, oldest first.
    pub fn snapshot(&self) -> Vec<Message> {
        self.entries().iter().cloned().collect()
    }

    /// Drops every queued message and returns how many were discarded.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries();
        let count = entries.len();
        entries.clear();
        count
    }

    /// Sends everything queued so far, oldest first.
    ///
    /// Messages enqueued while the flush runs wait for the next flush.
    /// Messages whose send fails go back to the tail in their original
    /// order. If the flush is cancelled, the messages it had not yet sent
    /// return to the head of the queue. Returns the number of messages sent.
    pub async fn flush(&self, connection: &ConnectionManager) -> usize {
        let _guard = self.flush_lock.lock().await;
        if !connection.is_connected() {
            return 0;
        }

        let mut batch = FlushBatch {
            queue: self,
            unsent: self.entries().drain(..).collect(),
            failed: Vec::new(),
        };

        let mut sent = 0;
        while let Some(message) = batch.unsent.front() {
            if !connection.is_connected() {
                break;
            }
            match connection.send_message(message).await {
                Ok(()) => {
                    batch.unsent.pop_front();
                    sent += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to send message {}: {}", message.id(), e);
                    if let Some(message) = batch.unsent.pop_front() {
                        batch.failed.push(message);
                    }
                }
            }
        }

        if !batch.failed.is_empty() {
            tracing::debug!("Requeueing {} unsent messages", batch.failed.len());
        }
        sent
    }

    /// Evicts from the head until the queue fits again. Only `DropOldest` evicts.
    fn trim(&self, entries: &mut VecDeque<Message>) {
        if self.policy != OverflowPolicy::DropOldest {
            return;
        }
        while entries.len() > self.capacity {
            if let Some(dropped) = entries.pop_front() {
                tracing::warn!(
                    "Outbound queue full, dropping oldest message {}",
                    dropped.id()
                );
            }
        }
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<Message>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Messages taken out of the queue by a running flush.
///
/// Whatever is left when the flush ends, normally or by cancellation, is
/// put back: unsent messages at the head, failed ones at the tail.
struct FlushBatch<'a> {
    queue: &'a OutboundQueue,
    unsent: VecDeque<Message>,
    failed: Vec<Message>,
}

impl Drop for FlushBatch<'_> {
    fn drop(&mut self) {
        if self.unsent.is_empty() && self.failed.is_empty() {
            return;
        }
        let mut entries = self.queue.entries();
        for message in self.unsent.drain(..).rev() {
            entries.push_front(message);
        }
        entries.extend(self.failed.drain(..));
        self.queue.trim(&mut entries);
    }
}
