use serde_json::Value;

use crate::error::RestError;

/// JSON encode/decode pair used by the transport envelope.
///
/// Replaceable so callers can trace every document on the wire without
/// touching anything else about request handling.
pub trait Codec: Send + Sync {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, RestError>;
    fn decode(&self, bytes: &[u8]) -> Result<Value, RestError>;
}

/// Default passthrough codec.
pub struct PlainCodec;

impl Codec for PlainCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, RestError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, RestError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Codec that logs every request and response document.
pub struct VerboseCodec;

impl Codec for VerboseCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, RestError> {
        tracing::debug!(request = %value, "sending document");
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, RestError> {
        let value: Value = serde_json::from_slice(bytes)?;
        tracing::debug!(response = %value, "received document");
        Ok(value)
    }
}
