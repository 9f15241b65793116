//! Envelope serialization

use crate::error::PublishError;
use stockfeed_common::types::Envelope;

/// Turns an envelope into a message payload
pub trait EnvelopeSerializer: Send + Sync {
    fn serialize(&self, envelope: &Envelope<'_>) -> Result<Vec<u8>, PublishError>;
}

/// UTF-8 JSON with non-ASCII characters written as-is
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl EnvelopeSerializer for JsonSerializer {
    fn serialize(&self, envelope: &Envelope<'_>) -> Result<Vec<u8>, PublishError> {
        Ok(serde_json::to_vec(envelope)?)
    }
}
