//! Message history store for Courier.
//!
//! An append-only, insertion-ordered log of chat messages, decoupled
//! from routing. Reads hand back copies, so results never alias internal
//! storage and concurrent appends cannot race with callers holding them.
//!
//! The log is unbounded; long-running services that need eviction must
//! layer it on top.

use crate::message::{unix_now, Message};
use std::sync::RwLock;
use tracing::trace;

/// Concurrent-safe, append-only message log.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: RwLock<Vec<Message>>,
}

impl MessageStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.read().unwrap().len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.read().unwrap().is_empty()
    }

    /// Append a message to the log.
    ///
    /// Assigns the current time when the message carries no timestamp;
    /// an existing timestamp is never touched.
    pub fn add(&self, mut message: Message) {
        if message.timestamp.is_none() {
            message.timestamp = Some(unix_now());
        }
        trace!(sender = %message.sender, "Storing message");
        self.messages.write().unwrap().push(message);
    }

    /// Messages in insertion order.
    ///
    /// With a sender filter, only that sender's messages are returned,
    /// relative order preserved.
    #[must_use]
    pub fn messages(&self, sender: Option<&str>) -> Vec<Message> {
        let messages = self.messages.read().unwrap();
        match sender {
            None => messages.clone(),
            Some(sender) => messages
                .iter()
                .filter(|message| message.sender == sender)
                .cloned()
                .collect(),
        }
    }
}
