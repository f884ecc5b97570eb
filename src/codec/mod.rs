//! Wire Encoding
//!
//! Two layers share the same length-prefix convention:
//!
//! - **Records** (`frame`): the TCP byte stream is cut into complete list
//!   items. Every envelope exchanged with the node is exactly one record.
//! - **Items** (`rlp`): the recursive length-prefix encoding used for every
//!   field inside a record, and for the canonical consensus digests.
//!
//! ## Prefix Table
//!
//! | Leading byte | Meaning                                              |
//! |--------------|------------------------------------------------------|
//! | 0x00-0x7f    | single byte, itself                                  |
//! | 0x80-0xb7    | string, length = byte - 0x80                         |
//! | 0xb8-0xbf    | string, (byte - 0xb7) big-endian length bytes follow |
//! | 0xc0-0xf7    | list, payload length = byte - 0xc0                   |
//! | 0xf8-0xff    | list, (byte - 0xf7) big-endian length bytes follow   |

mod frame;
mod rlp;

use thiserror::Error;

pub use frame::{encode_frame, parse_record_header, FrameBuffer, MAX_RECORD_SIZE};
pub use rlp::{
    decode, encode, Decodable, Encodable, Rlp, RlpStream, LIST_OFFSET, LONG_LIST_OFFSET,
    LONG_STRING_OFFSET, MAX_SHORT_LENGTH, STRING_OFFSET,
};

/// Errors raised while cutting the byte stream into records.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid record leading byte: 0x{0:02x}")]
    InvalidLeadingByte(u8),

    #[error("non-canonical record length prefix")]
    NonCanonicalLength,

    #[error("record too large: {size} > {max}")]
    TooLarge { size: u64, max: usize },
}

/// Errors raised while decoding items.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty input")]
    Empty,

    #[error("item too short: expected {expected} bytes, got {got}")]
    TooShort { expected: usize, got: usize },

    #[error("{0} trailing bytes after item")]
    TrailingBytes(usize),

    #[error("expected a list")]
    ExpectedList,

    #[error("expected a byte string")]
    ExpectedData,

    #[error("wrong item count: expected {expected}, got {got}")]
    WrongItemCount { expected: usize, got: usize },

    #[error("missing list item at index {0}")]
    MissingItem(usize),

    #[error("integer does not fit in {0} bytes")]
    IntegerOverflow(usize),

    #[error("non-canonical leading zero")]
    LeadingZero,

    #[error("length prefix too wide")]
    LengthOverflow,

    #[error("invalid length: expected {expected}, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("invalid utf-8 string")]
    InvalidUtf8,

    #[error("invalid value: {0}")]
    InvalidValue(String),
}
