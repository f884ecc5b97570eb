//! Protocol error types.

use crate::codec::DecodeError;
use crate::crypto::CryptoError;
use thiserror::Error;

/// Errors related to protocol message handling.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid message type: 0x{0:02x}")]
    InvalidMessageType(u8),

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// A protocol branch this peer intentionally does not implement.
    #[error("not supported: {0}")]
    Unsupported(&'static str),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("envelope digest mismatch")]
    DigestMismatch,

    #[error("unknown extension: {0}")]
    UnknownExtension(String),

    #[error("compression error: {0}")]
    Compression(#[from] snap::Error),

    #[error("message too long: max {max}, got {got}")]
    MessageTooLong { max: usize, got: usize },
}

impl ProtocolError {
    /// Check if this error marks an intentionally unimplemented branch.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, ProtocolError::Unsupported(_))
    }
}
