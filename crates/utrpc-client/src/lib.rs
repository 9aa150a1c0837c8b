//! Client connection management for utrpc.
//!
//! One [`Client`] owns one logical connection to a server: a connection
//! state machine with reconnect-and-backoff, an outgoing queue flushed in
//! coalesced batches, and inbound dispatch into the request registry and
//! the subscription/receiver listeners. Subscriptions survive reconnects
//! transparently — every transition to open re-sends their start envelopes.

pub mod backoff;
pub mod client;
pub mod connection;
pub mod error;
pub mod receiver;
pub mod subscription;

pub use backoff::{default_backoff, Backoff};
pub use client::Client;
pub use connection::{ClientOptions, ConnectionManager, ConnectionState, Lifecycle};
pub use error::{ClientError, Result};
pub use receiver::RequestListener;
pub use subscription::Subscription;
