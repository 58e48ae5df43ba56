//! # courier-core
//!
//! In-process chat message broker and history store for Courier.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Broker** - Bounded inbound queue drained by a single routing loop
//! - **Registry** - Concurrent map of subscriber mailboxes
//! - **Message** - Immutable chat events
//! - **MessageStore** - Append-only, queryable message history
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Producer │────▶│   Broker    │────▶│  Registry   │
//! └──────────┘     └─────────────┘     └─────────────┘
//!       │                                     │
//!       ▼                                     ▼
//! ┌──────────────┐                     ┌─────────────┐
//! │ MessageStore │                     │  Mailboxes  │
//! └──────────────┘                     └─────────────┘
//! ```
//!
//! Producers publish into the broker's bounded queue with backpressure;
//! the routing loop fans each message out to subscriber mailboxes with
//! best-effort, non-blocking delivery. The store keeps an independent,
//! queryable record of messages.

pub mod broker;
pub mod message;
pub mod registry;
pub mod store;

pub use broker::{Broker, BrokerConfig, BrokerError, BrokerState, BrokerStats};
pub use message::{Message, UserId};
pub use registry::{Mailbox, Registry};
pub use store::MessageStore;
