use std::sync::Arc;

use bytes::Bytes;

use crate::error::Result;

/// Client side of one live connection.
///
/// `recv` blocks until a message arrives and returns
/// [`TransportError::Closed`](crate::TransportError::Closed) once the
/// connection is gone — the connection manager runs it in a reader loop.
pub trait ClientSocket: Send + Sync {
    fn send(&self, raw: Bytes) -> Result<()>;
    fn recv(&self) -> Result<Bytes>;
    fn close(&self);
}

/// Factory for client connections. Each call dials a fresh connection;
/// the connection manager calls it again after every loss.
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Arc<dyn ClientSocket>>;
}

/// Server side of one live connection, as the host socket server exposes it.
///
/// `id` must be stable for the connection's lifetime. A reconnecting client
/// is a new connection and gets a new id.
pub trait SessionSocket: Send + Sync {
    fn id(&self) -> &str;
    fn send(&self, raw: Bytes) -> Result<()>;
    fn subscribe(&self, topic: &str);
    fn unsubscribe(&self, topic: &str);
    fn is_subscribed(&self, topic: &str) -> bool;
}

/// Topic fan-out owned by the host socket server. Best-effort: delivery to
/// any individual subscriber may silently fail.
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, raw: Bytes);
}
