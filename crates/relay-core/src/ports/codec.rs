//! TaskCodec port - TaskDescriptor と bytes の相互変換
//!
//! # 実装
//! - **JsonCodec**（`impls::json_codec`）

use crate::domain::TaskDescriptor;

#[derive(Debug, Clone, thiserror::Error)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),
}

/// Producers encode, handlers decode. Both sides must use the same codec.
pub trait TaskCodec: Send + Sync {
    fn encode(&self, descriptor: &TaskDescriptor) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, bytes: &[u8]) -> Result<TaskDescriptor, CodecError>;
}
