/// Errors surfaced by server-side operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Host socket failure.
    #[error("transport error: {0}")]
    Transport(#[from] utrpc_socket::TransportError),

    /// Envelope codec failure.
    #[error("wire error: {0}")]
    Wire(#[from] utrpc_wire::WireError),

    /// A server-initiated pull failed or timed out.
    #[error("pull failed: {0}")]
    Call(utrpc_wire::SocketError),
}

pub type Result<T> = std::result::Result<T, ServerError>;
