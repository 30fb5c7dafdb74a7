//! Protocol error types.

use thiserror::Error;

/// Failure to encode or decode a companion frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Fewer bytes than the frame kind requires.
    #[error("{kind} frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Frame kind being decoded.
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Unknown response or push code.
    #[error("unknown frame code: 0x{0:02X}")]
    UnknownCode(u8),

    /// Unknown statistics sub-type.
    #[error("unknown stats type: {0}")]
    UnknownStatsType(u8),

    /// Caller supplied a value the encoder cannot represent.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A field holds a value the protocol does not allow.
    #[error("invalid frame data: {0}")]
    InvalidData(String),
}

impl ProtocolError {
    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        ProtocolError::InvalidInput(message.into())
    }
}

/// Error byte carried by an error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FirmwareErrorCode {
    UnsupportedCommand,
    NotFound,
    /// Contact or channel table has no free slot.
    TableFull,
    BadState,
    /// File I/O error.
    FileIoError,
    /// Illegal argument.
    IllegalArg,
    /// Unknown error code.
    Unknown(u8),
}

impl std::fmt::Display for FirmwareErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FirmwareErrorCode::UnsupportedCommand => write!(f, "unsupported command"),
            FirmwareErrorCode::NotFound => write!(f, "not found"),
            FirmwareErrorCode::TableFull => write!(f, "table full"),
            FirmwareErrorCode::BadState => write!(f, "bad state"),
            FirmwareErrorCode::FileIoError => write!(f, "file I/O error"),
            FirmwareErrorCode::IllegalArg => write!(f, "illegal argument"),
            FirmwareErrorCode::Unknown(code) => write!(f, "unknown error (0x{:02X})", code),
        }
    }
}

impl From<u8> for FirmwareErrorCode {
    fn from(code: u8) -> Self {
        use crate::constants::*;
        match code {
            ERR_CODE_UNSUPPORTED_CMD => FirmwareErrorCode::UnsupportedCommand,
            ERR_CODE_NOT_FOUND => FirmwareErrorCode::NotFound,
            ERR_CODE_TABLE_FULL => FirmwareErrorCode::TableFull,
            ERR_CODE_BAD_STATE => FirmwareErrorCode::BadState,
            ERR_CODE_FILE_IO_ERROR => FirmwareErrorCode::FileIoError,
            ERR_CODE_ILLEGAL_ARG => FirmwareErrorCode::IllegalArg,
            _ => FirmwareErrorCode::Unknown(code),
        }
    }
}

impl From<FirmwareErrorCode> for u8 {
    fn from(code: FirmwareErrorCode) -> Self {
        use crate::constants::*;
        match code {
            FirmwareErrorCode::UnsupportedCommand => ERR_CODE_UNSUPPORTED_CMD,
            FirmwareErrorCode::NotFound => ERR_CODE_NOT_FOUND,
            FirmwareErrorCode::TableFull => ERR_CODE_TABLE_FULL,
            FirmwareErrorCode::BadState => ERR_CODE_BAD_STATE,
            FirmwareErrorCode::FileIoError => ERR_CODE_FILE_IO_ERROR,
            FirmwareErrorCode::IllegalArg => ERR_CODE_ILLEGAL_ARG,
            FirmwareErrorCode::Unknown(code) => code,
        }
    }
}
