//! Message broker for Courier.
//!
//! The broker owns the inbound queue, the subscriber registry, and the
//! single routing loop that drains the queue. Producers publish into the
//! queue with backpressure; the loop fans each message out to subscriber
//! mailboxes without ever blocking on a slow consumer.

use crate::message::{Message, UserId};
use crate::registry::{Mailbox, Registry};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Broker errors.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The shutdown signal fired; the message was not enqueued.
    #[error("broker is shut down")]
    Shutdown,
}

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Capacity of the shared inbound queue. Must be non-zero.
    pub queue_capacity: usize,
    /// Capacity of mailboxes created by [`Broker::subscribe`].
    pub mailbox_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            mailbox_capacity: 64,
        }
    }
}

/// Broker lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BrokerState {
    /// Constructed, routing loop not yet started.
    Created = 0,
    /// Routing loop draining the inbound queue.
    Running = 1,
    /// Shutdown observed, loop winding down.
    ShuttingDown = 2,
    /// Routing loop exited.
    Stopped = 3,
}

impl BrokerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => BrokerState::Created,
            1 => BrokerState::Running,
            2 => BrokerState::ShuttingDown,
            _ => BrokerState::Stopped,
        }
    }
}

/// Snapshot of broker delivery statistics.
#[derive(Debug, Clone, Copy)]
pub struct BrokerStats {
    /// Messages placed into subscriber mailboxes.
    pub delivered: u64,
    /// Delivery attempts dropped because a mailbox was full.
    pub dropped_full: u64,
    /// Delivery attempts dropped because a mailbox was closed.
    pub dropped_closed: u64,
    /// Direct messages dropped because the recipient was not registered.
    pub dropped_unrouted: u64,
}

/// Delivery counters, updated by the routing loop.
#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    dropped_full: AtomicU64,
    dropped_closed: AtomicU64,
    dropped_unrouted: AtomicU64,
}

/// Receiving half of the queue and the completion signal, handed to the
/// routing loop by the first `run()` call.
struct Inbox {
    queue: mpsc::Receiver<Message>,
    done: watch::Sender<bool>,
}

/// The central message broker.
///
/// Owns the bounded inbound queue and the subscriber registry, and runs
/// exactly one routing loop started by [`Broker::run`]. Shutdown is
/// triggered by cancelling the token passed at construction; the loop
/// observes it, finishes routing the message in hand, and exits.
pub struct Broker {
    input: mpsc::Sender<Message>,
    inbox: Mutex<Option<Inbox>>,
    registry: Arc<Registry>,
    counters: Arc<Counters>,
    state: Arc<AtomicU8>,
    shutdown: CancellationToken,
    done: watch::Receiver<bool>,
    config: BrokerConfig,
}

impl Broker {
    /// Create a broker bound to a shutdown token, with default configuration.
    #[must_use]
    pub fn new(shutdown: CancellationToken) -> Self {
        Self::with_config(shutdown, BrokerConfig::default())
    }

    /// Create a broker bound to a shutdown token, with custom configuration.
    #[must_use]
    pub fn with_config(shutdown: CancellationToken, config: BrokerConfig) -> Self {
        info!(
            queue_capacity = config.queue_capacity,
            mailbox_capacity = config.mailbox_capacity,
            "Creating broker"
        );
        let (input, queue) = mpsc::channel(config.queue_capacity);
        let (done_tx, done_rx) = watch::channel(false);
        Self {
            input,
            inbox: Mutex::new(Some(Inbox {
                queue,
                done: done_tx,
            })),
            registry: Arc::new(Registry::new()),
            counters: Arc::new(Counters::default()),
            state: Arc::new(AtomicU8::new(BrokerState::Created as u8)),
            shutdown,
            done: done_rx,
            config,
        }
    }

    /// Start the routing loop.
    ///
    /// Call exactly once; a second call logs a warning and does nothing.
    pub fn run(&self) {
        let Some(Inbox { queue, done }) = self.inbox.lock().unwrap().take() else {
            warn!("Broker routing loop already started");
            return;
        };
        self.state.store(BrokerState::Running as u8, Ordering::SeqCst);
        debug!("Starting routing loop");
        tokio::spawn(run_loop(
            queue,
            Arc::clone(&self.registry),
            Arc::clone(&self.counters),
            Arc::clone(&self.state),
            self.shutdown.clone(),
            done,
        ));
    }

    /// Enqueue a message for routing.
    ///
    /// Waits for a free queue slot when the queue is full; no message is
    /// silently dropped on the publish side. Fails fast with
    /// [`BrokerError::Shutdown`] once the shutdown token is cancelled or
    /// the routing loop has exited, in which case the message is dropped.
    /// Messages published before [`Broker::run`] buffer up to the queue
    /// capacity.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Shutdown`] when the broker is shut down.
    pub async fn publish(&self, message: Message) -> Result<(), BrokerError> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(BrokerError::Shutdown),
            sent = self.input.send(message) => sent.map_err(|_| BrokerError::Shutdown),
        }
    }

    /// Associate a user with a mailbox, replacing any prior mapping.
    ///
    /// Returns the displaced mailbox, if any; the caller decides whether
    /// to close it.
    pub fn register(&self, user_id: impl Into<UserId>, mailbox: Mailbox) -> Option<Mailbox> {
        self.registry.register(user_id, mailbox)
    }

    /// Create a mailbox for a user, register it, and return the receive side.
    ///
    /// The registry holds the only sender, so a later
    /// [`Broker::unregister`] (or a replacing `subscribe`) closes the
    /// mailbox and the receiver observes end-of-stream.
    pub fn subscribe(&self, user_id: impl Into<UserId>) -> mpsc::Receiver<Arc<Message>> {
        let (mailbox, receiver) = mpsc::channel(self.config.mailbox_capacity);
        self.registry.register(user_id, mailbox);
        receiver
    }

    /// Remove a user's mailbox, closing it.
    ///
    /// Unregistering an unknown user is a no-op. Returns `true` if the
    /// user was registered.
    pub fn unregister(&self, user_id: &str) -> bool {
        self.registry.unregister(user_id)
    }

    /// The subscriber registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> BrokerState {
        BrokerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Snapshot of delivery statistics.
    #[must_use]
    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped_full: self.counters.dropped_full.load(Ordering::Relaxed),
            dropped_closed: self.counters.dropped_closed.load(Ordering::Relaxed),
            dropped_unrouted: self.counters.dropped_unrouted.load(Ordering::Relaxed),
        }
    }

    /// Wait until the routing loop has exited.
    ///
    /// Completes immediately if the loop already stopped. Pends forever
    /// if [`Broker::run`] was never called.
    pub async fn stopped(&self) {
        let mut done = self.done.clone();
        let _ = done.wait_for(|stopped| *stopped).await;
    }
}

/// The routing loop: dequeue one message at a time until shutdown.
async fn run_loop(
    mut queue: mpsc::Receiver<Message>,
    registry: Arc<Registry>,
    counters: Arc<Counters>,
    state: Arc<AtomicU8>,
    shutdown: CancellationToken,
    done: watch::Sender<bool>,
) {
    debug!("Routing loop started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                state.store(BrokerState::ShuttingDown as u8, Ordering::SeqCst);
                break;
            }
            received = queue.recv() => match received {
                Some(message) => route_message(&registry, &counters, message),
                // Every input sender is gone; nothing left to route.
                None => break,
            },
        }
    }
    state.store(BrokerState::Stopped as u8, Ordering::SeqCst);
    let _ = done.send(true);
    debug!("Routing loop stopped");
}

/// Deliver one dequeued message to its target mailboxes.
fn route_message(registry: &Registry, counters: &Counters, message: Message) {
    let message = Arc::new(message);

    if message.broadcast {
        registry.for_each(|user_id, mailbox| {
            deliver(user_id, mailbox, Arc::clone(&message), counters);
        });
        return;
    }

    let Some(recipient) = message.recipient.as_deref() else {
        counters.dropped_unrouted.fetch_add(1, Ordering::Relaxed);
        trace!(sender = %message.sender, "Direct message without recipient, dropping");
        return;
    };

    match registry.get(recipient) {
        Some(mailbox) => deliver(recipient, &mailbox, Arc::clone(&message), counters),
        None => {
            counters.dropped_unrouted.fetch_add(1, Ordering::Relaxed);
            trace!(user = %recipient, "Recipient not registered, dropping");
        }
    }
}

/// Non-blocking delivery attempt to a single mailbox.
fn deliver(user_id: &str, mailbox: &Mailbox, message: Arc<Message>, counters: &Counters) {
    match mailbox.try_send(message) {
        Ok(()) => {
            counters.delivered.fetch_add(1, Ordering::Relaxed);
        }
        Err(TrySendError::Full(_)) => {
            counters.dropped_full.fetch_add(1, Ordering::Relaxed);
            trace!(user = %user_id, "Mailbox full, dropping");
        }
        Err(TrySendError::Closed(_)) => {
            counters.dropped_closed.fetch_add(1, Ordering::Relaxed);
            debug!(user = %user_id, "Mailbox closed, dropping");
        }
    }
}
