use bytes::Bytes;
use serde_json::Value;

use crate::envelope::Envelope;
use crate::error::{Result, WireError};

/// Host-pluggable wire codec.
///
/// A batch of length one serializes as a single envelope; longer batches
/// serialize as an ordered sequence. Deserialization is symmetric — one
/// payload yields one envelope or the batch it contained, in order.
pub trait Transformer: Send + Sync {
    fn serialize(&self, batch: &[Envelope]) -> Result<Bytes>;
    fn deserialize(&self, raw: &[u8]) -> Result<Vec<Envelope>>;
}

/// Default transformer: plain-text JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTransformer;

impl Transformer for JsonTransformer {
    fn serialize(&self, batch: &[Envelope]) -> Result<Bytes> {
        let raw = match batch {
            [] => return Err(WireError::EmptyBatch),
            [single] => serde_json::to_vec(single)?,
            many => serde_json::to_vec(many)?,
        };
        Ok(Bytes::from(raw))
    }

    fn deserialize(&self, raw: &[u8]) -> Result<Vec<Envelope>> {
        let value: Value = serde_json::from_slice(raw)?;
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| serde_json::from_value(item).map_err(WireError::from))
                .collect(),
            other => Ok(vec![serde_json::from_value(other)?]),
        }
    }
}
