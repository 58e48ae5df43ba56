//! Chat message types for Courier.
//!
//! A [`Message`] is an immutable value describing a single chat event.
//! Ownership flows from the producer through the broker to subscriber
//! mailboxes; the history store keeps its own copies.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A user identifier.
pub type UserId = String;

/// Current wall-clock time in seconds since the Unix epoch.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// A single chat event.
///
/// A direct message targets one recipient; a broadcast fans out to every
/// registered subscriber and its `recipient` field is ignored. Messages
/// are immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier of the producer.
    pub sender: UserId,
    /// Target subscriber; only meaningful when `broadcast` is false.
    pub recipient: Option<UserId>,
    /// Opaque text payload.
    pub content: String,
    /// Whether this message fans out to all subscribers.
    pub broadcast: bool,
    /// Seconds since the Unix epoch. Assigned by the store at insertion
    /// when unset, and never mutated once assigned.
    pub timestamp: Option<u64>,
}

impl Message {
    /// Create a direct message for a single recipient.
    #[must_use]
    pub fn direct(
        sender: impl Into<UserId>,
        recipient: impl Into<UserId>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            recipient: Some(recipient.into()),
            content: content.into(),
            broadcast: false,
            timestamp: None,
        }
    }

    /// Create a broadcast message for every currently registered subscriber.
    #[must_use]
    pub fn broadcast(sender: impl Into<UserId>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            recipient: None,
            content: content.into(),
            broadcast: true,
            timestamp: None,
        }
    }

    /// Attach an explicit timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_message() {
        let msg = Message::direct("alice", "bob", "hello");
        assert_eq!(msg.sender, "alice");
        assert_eq!(msg.recipient.as_deref(), Some("bob"));
        assert_eq!(msg.content, "hello");
        assert!(!msg.broadcast);
        assert!(msg.timestamp.is_none());
    }

    #[test]
    fn test_broadcast_message() {
        let msg = Message::broadcast("sys", "hi all");
        assert!(msg.broadcast);
        assert!(msg.recipient.is_none());
    }

    #[test]
    fn test_with_timestamp() {
        let msg = Message::direct("alice", "bob", "hello").with_timestamp(1234);
        assert_eq!(msg.timestamp, Some(1234));
    }

    #[test]
    fn test_unix_now_is_nonzero() {
        assert!(unix_now() > 0);
    }
}
