//! Bidirectional RPC and topic pub/sub over one persistent connection.
//!
//! utrpc runs three call shapes over a single message-oriented socket:
//! transfer (client calls the server and awaits a result), receiver (the
//! server calls one specific connected client — direction reversed), and
//! subscribe (topic-addressed server push with client-managed lifecycle).
//!
//! # Crate Structure
//!
//! - [`wire`] — Envelope format, request correlation, event dispatch
//! - [`socket`] — Host socket contracts and the in-memory loopback hub
//! - [`schema`] — JSON Schema validators (behind the `schema` feature)
//! - [`client`] — Connection manager, subscriptions, client facade
//! - [`server`] — Method router, dispatcher, pulls, broadcast

/// Re-export wire types.
pub mod wire {
    pub use utrpc_wire::*;
}

/// Re-export socket contracts.
pub mod socket {
    pub use utrpc_socket::*;
}

/// Re-export schema validation types (requires `schema` feature).
#[cfg(feature = "schema")]
pub mod schema {
    pub use utrpc_schema::*;
}

/// Re-export client types.
pub mod client {
    pub use utrpc_client::*;
}

/// Re-export server types.
pub mod server {
    pub use utrpc_server::*;
}
