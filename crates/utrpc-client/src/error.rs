use std::time::Duration;

/// Errors surfaced by client calls.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Host socket failure.
    #[error("transport error: {0}")]
    Transport(#[from] utrpc_socket::TransportError),

    /// Envelope codec failure.
    #[error("wire error: {0}")]
    Wire(#[from] utrpc_wire::WireError),

    /// The correlated call was not settled within its timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The server answered with a structured error.
    #[error("call failed: {0}")]
    Call(utrpc_wire::SocketError),
}

pub type Result<T> = std::result::Result<T, ClientError>;
