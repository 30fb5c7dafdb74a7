//! Route log decode errors.

use thiserror::Error;

/// Why a raw packet could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// The packet ends before a field it declares.
    #[error("Decode error at offset {offset}: {message}")]
    DecodeError { offset: usize, message: String },
}

impl PacketError {
    pub fn decode_at(offset: usize, message: impl Into<String>) -> Self {
        PacketError::DecodeError {
            offset,
            message: message.into(),
        }
    }

    /// Byte offset of the failure.
    pub fn offset(&self) -> usize {
        match self {
            PacketError::DecodeError { offset, .. } => *offset,
        }
    }
}
