//! Subscriber registry for Courier.
//!
//! Maps a user identifier to the sending half of that user's mailbox.
//! Registration and lookup may race freely with delivery: the map is
//! sharded behind reader/writer locks, so a broadcast fan-out iterating
//! the registry never corrupts or is corrupted by a concurrent
//! register/unregister.

use crate::message::{Message, UserId};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// The sending half of a subscriber's mailbox.
///
/// Mailboxes are bounded; delivery uses a non-blocking `try_send` and
/// drops on a full mailbox.
pub type Mailbox = mpsc::Sender<Arc<Message>>;

/// Concurrent map of registered subscribers.
///
/// At most one mailbox per user. Re-registering a user replaces the
/// previous mapping and hands the displaced mailbox back to the caller;
/// the registry never closes a displaced mailbox on its own.
#[derive(Debug, Default)]
pub struct Registry {
    users: DashMap<UserId, Mailbox>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Check if no subscribers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Check whether a user is currently registered.
    #[must_use]
    pub fn contains(&self, user_id: &str) -> bool {
        self.users.contains_key(user_id)
    }

    /// Associate a user with a mailbox, replacing any prior mapping.
    ///
    /// Returns the displaced mailbox, if any. Dropping the returned
    /// sender closes the old mailbox once no other clones of it remain.
    pub fn register(&self, user_id: impl Into<UserId>, mailbox: Mailbox) -> Option<Mailbox> {
        let user_id = user_id.into();
        debug!(user = %user_id, "Registering subscriber");
        self.users.insert(user_id, mailbox)
    }

    /// Remove a user's mailbox.
    ///
    /// The registry's sender is dropped, so a consumer blocked on the
    /// receive side observes end-of-stream once no other senders remain.
    /// Unregistering an unknown user is a no-op.
    ///
    /// Returns `true` if the user was registered.
    pub fn unregister(&self, user_id: &str) -> bool {
        let removed = self.users.remove(user_id).is_some();
        if removed {
            debug!(user = %user_id, "Unregistered subscriber");
        }
        removed
    }

    /// Look up a user's mailbox.
    #[must_use]
    pub fn get(&self, user_id: &str) -> Option<Mailbox> {
        self.users.get(user_id).map(|entry| entry.value().clone())
    }

    /// All registered user identifiers.
    #[must_use]
    pub fn user_ids(&self) -> Vec<UserId> {
        self.users.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Visit every registered mailbox.
    ///
    /// Holds shard read locks while visiting, so the callback must not
    /// block.
    pub fn for_each(&self, mut f: impl FnMut(&str, &Mailbox)) {
        for entry in self.users.iter() {
            f(entry.key(), entry.value());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mailbox() -> (Mailbox, mpsc::Receiver<Arc<Message>>) {
        mpsc::channel(4)
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = Registry::new();
        let (tx, _rx) = mailbox();

        assert!(registry.register("alice", tx).is_none());
        assert!(registry.contains("alice"));
        assert!(registry.get("alice").is_some());
        assert!(registry.get("bob").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reregister_returns_displaced_mailbox() {
        let registry = Registry::new();
        let (tx1, _rx1) = mailbox();
        let (tx2, _rx2) = mailbox();

        registry.register("alice", tx1);
        let displaced = registry.register("alice", tx2);
        assert!(displaced.is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let registry = Registry::new();
        assert!(!registry.unregister("ghost"));
    }

    #[tokio::test]
    async fn test_unregister_closes_mailbox() {
        let registry = Registry::new();
        let (tx, mut rx) = mailbox();

        registry.register("alice", tx);
        assert!(registry.unregister("alice"));
        assert!(!registry.contains("alice"));

        // The registry held the only sender, so the receiver sees
        // end-of-stream.
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_user_ids() {
        let registry = Registry::new();
        let (tx1, _rx1) = mailbox();
        let (tx2, _rx2) = mailbox();

        registry.register("alice", tx1);
        registry.register("bob", tx2);

        let mut ids = registry.user_ids();
        ids.sort();
        assert_eq!(ids, vec!["alice".to_string(), "bob".to_string()]);
    }
}
