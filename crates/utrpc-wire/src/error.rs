/// Errors that can occur while encoding or decoding envelopes.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The payload is not a valid serialized envelope or envelope batch.
    #[error("envelope codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Serialization was requested for an empty batch.
    #[error("cannot serialize an empty envelope batch")]
    EmptyBatch,
}

pub type Result<T> = std::result::Result<T, WireError>;
