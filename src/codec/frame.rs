//! Record framing over a byte stream.
//!
//! Every record is a single list item. Short records carry their payload
//! length in the leading byte (0xc0 + len, len <= 55); long records carry
//! the width of a big-endian length field instead (0xf7 + width).

use super::rlp::{write_header, LIST_OFFSET, LONG_LIST_OFFSET};
use super::FrameError;

/// Upper bound on a single record (header excluded).
pub const MAX_RECORD_SIZE: usize = 64 * 1024 * 1024;

/// Parse a record header from the start of `buf`.
///
/// Returns `Ok(None)` when not enough bytes are buffered to know the
/// payload length yet, otherwise `(header_len, payload_len)`.
pub fn parse_record_header(buf: &[u8]) -> Result<Option<(usize, usize)>, FrameError> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };

    match first {
        0x00..=0xbf => Err(FrameError::InvalidLeadingByte(first)),
        0xc0..=0xf7 => Ok(Some((1, (first - LIST_OFFSET) as usize))),
        0xf8..=0xff => {
            let width = (first - LONG_LIST_OFFSET) as usize;
            if buf.len() < 1 + width {
                return Ok(None);
            }
            let field = &buf[1..1 + width];
            if field[0] == 0 {
                return Err(FrameError::NonCanonicalLength);
            }
            let len = field.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64);
            if len > MAX_RECORD_SIZE as u64 {
                return Err(FrameError::TooLarge {
                    size: len,
                    max: MAX_RECORD_SIZE,
                });
            }
            Ok(Some((1 + width, len as usize)))
        }
    }
}

/// Wrap an already-encoded sequence of items into a record.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 9);
    write_header(&mut out, LIST_OFFSET, payload.len());
    out.extend_from_slice(payload);
    out
}

/// Accumulates stream bytes and yields complete records.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the stream.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of buffered bytes not yet returned as records.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Check if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drop all buffered bytes (used after an unrecoverable framing error).
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Remove and return the next complete record, header included.
    ///
    /// Incomplete records stay buffered and yield `Ok(None)`.
    pub fn next_record(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let Some((header_len, payload_len)) = parse_record_header(&self.buf)? else {
            return Ok(None);
        };
        let total = header_len + payload_len;
        if self.buf.len() < total {
            return Ok(None);
        }
        Ok(Some(self.buf.drain(..total).collect()))
    }
}
