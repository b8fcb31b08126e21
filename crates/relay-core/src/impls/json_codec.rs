//! JsonCodec - serde_json による TaskDescriptor のエンコード

use crate::domain::TaskDescriptor;
use crate::ports::{CodecError, TaskCodec};

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl TaskCodec for JsonCodec {
    fn encode(&self, descriptor: &TaskDescriptor) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(descriptor).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<TaskDescriptor, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
