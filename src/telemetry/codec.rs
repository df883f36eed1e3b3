//! # Payload codec.
//!
//! [`Codec`] turns measurement batches (and auxiliary JSON values) into transport
//! payloads and decodes inbound command bodies into a structured [`Value`].
//! [`JsonCodec`] is the default.
//!
//! ## Rules
//! - `decode_batch(encode(batch)) == batch` for any batch, including the empty one.
//! - An empty body decodes to [`Value::Null`] (commands without arguments).
//! - Batches holding a NaN or infinite time or value are refused with
//!   [`CodecError::Encode`]; JSON has no representation for them.
//! - Invalid bytes produce [`CodecError::MalformedPayload`], never a panic.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use super::record::MeasurementBatch;

/// Shared handle to a codec.
pub type CodecRef = Arc<dyn Codec>;

/// Errors produced by a [`Codec`].
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Bytes are not valid serialized structured data (or have the wrong shape).
    #[error("malformed payload: {reason}")]
    MalformedPayload {
        /// Parser message.
        reason: String,
    },

    /// A value could not be serialized.
    #[error("encode failed: {reason}")]
    Encode {
        /// Serializer message.
        reason: String,
    },
}

/// Pluggable payload serializer.
pub trait Codec: Send + Sync + 'static {
    /// Serializes an arbitrary structured value.
    fn encode_value(&self, value: &Value) -> Result<Vec<u8>, CodecError>;

    /// Parses a payload into a structured value.
    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError>;

    /// Serializes a measurement batch.
    fn encode(&self, batch: &MeasurementBatch) -> Result<Vec<u8>, CodecError> {
        ensure_finite(batch)?;
        let value = serde_json::to_value(batch).map_err(|e| CodecError::Encode {
            reason: e.to_string(),
        })?;
        self.encode_value(&value)
    }

    /// Parses a payload back into a measurement batch.
    fn decode_batch(&self, bytes: &[u8]) -> Result<MeasurementBatch, CodecError> {
        let value = self.decode(bytes)?;
        serde_json::from_value(value).map_err(|e| CodecError::MalformedPayload {
            reason: e.to_string(),
        })
    }
}

fn ensure_finite(batch: &MeasurementBatch) -> Result<(), CodecError> {
    match batch
        .records()
        .iter()
        .find(|r| !r.time().is_finite() || !r.value().is_finite())
    {
        Some(r) => Err(CodecError::Encode {
            reason: format!("{}: non-finite t={} v={}", r.name(), r.time(), r.value()),
        }),
        None => Ok(()),
    }
}

/// JSON codec (UTF-8 bytes).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode_value(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode {
            reason: e.to_string(),
        })
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(bytes).map_err(|e| CodecError::MalformedPayload {
            reason: e.to_string(),
        })
    }

    fn encode(&self, batch: &MeasurementBatch) -> Result<Vec<u8>, CodecError> {
        ensure_finite(batch)?;
        serde_json::to_vec(batch).map_err(|e| CodecError::Encode {
            reason: e.to_string(),
        })
    }
}
