/// Errors that can occur at the host socket boundary.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection is gone. Reads and writes will never succeed again.
    #[error("connection closed")]
    Closed,

    /// No connection has been established yet.
    #[error("not connected")]
    NotConnected,

    /// The connect attempt failed.
    #[error("failed to connect: {0}")]
    Connect(String),

    /// An I/O error surfaced by the host socket implementation.
    #[error("socket I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;
