use serde_json::Value;

use crate::envelope::SocketError;

/// Capability interface for runtime payload validation.
///
/// Method descriptors carry validators as `Arc<dyn Validator>`; the
/// dispatcher depends only on this interface and knows nothing about the
/// validation library behind it. A failed validation carries a structured
/// wire error ready to travel on an envelope.
pub trait Validator: Send + Sync {
    fn validate(&self, value: &Value) -> Result<(), SocketError>;
}
