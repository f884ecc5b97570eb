//! Snappy block compression for bulky payloads (block bodies, proposals).

use super::ProtocolError;
use crate::codec::MAX_RECORD_SIZE;

/// Compress a payload.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    Ok(snap::raw::Encoder::new().compress_vec(data)?)
}

/// Decompress a payload, refusing anything that would expand past a record.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let len = snap::raw::decompress_len(data)?;
    if len > MAX_RECORD_SIZE {
        return Err(ProtocolError::MessageTooLong {
            max: MAX_RECORD_SIZE,
            got: len,
        });
    }
    Ok(snap::raw::Decoder::new().decompress_vec(data)?)
}
