//! Block header and block model.
//!
//! ```text
//! Header: [parent_hash, author, state_root, transactions_root,
//!          next_validator_set_hash, score, number, timestamp, extra_data,
//!          seal_0, seal_1, ...]
//! Block:  [Header, [tx...]]
//! ```
//!
//! Seal fields are carried as already-encoded items. The block hash is
//! blake2b-256 over the full header encoding, seal included.

use super::compress::{compress, decompress};
use super::ProtocolError;
use crate::codec::{DecodeError, Decodable, Encodable, Rlp, RlpStream};
use crate::crypto::{blake256, H160, H256};

/// Number of header fields preceding the seal.
const HEADER_FIELDS: usize = 9;

/// Immutable block header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    pub parent_hash: H256,
    pub author: H160,
    pub state_root: H256,
    pub transactions_root: H256,
    pub next_validator_set_hash: H256,
    /// Block score. Scores wider than 128 bits fail to decode.
    pub score: u128,
    pub number: u64,
    pub timestamp: u64,
    pub extra_data: Vec<u8>,
    /// Raw encoded seal items.
    pub seal: Vec<Vec<u8>>,
}

impl Header {
    /// Block hash.
    pub fn hash(&self) -> H256 {
        blake256(&self.rlp_bytes())
    }

    /// A copy of this header with a different timestamp.
    pub fn with_timestamp(&self, timestamp: u64) -> Self {
        Self {
            timestamp,
            ..self.clone()
        }
    }

    /// Encode as a standalone item.
    pub fn encode(&self) -> Vec<u8> {
        self.rlp_bytes()
    }

    /// Decode a standalone item.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        crate::codec::decode(bytes)
    }
}

impl Encodable for Header {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.list(|s| {
            s.append(&self.parent_hash)
                .append(&self.author)
                .append(&self.state_root)
                .append(&self.transactions_root)
                .append(&self.next_validator_set_hash)
                .append(&self.score)
                .append(&self.number)
                .append(&self.timestamp)
                .append(&self.extra_data);
            for field in &self.seal {
                s.append_raw(field);
            }
        });
    }
}

impl Decodable for Header {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecodeError> {
        let items = rlp.items()?;
        if items.len() < HEADER_FIELDS {
            return Err(DecodeError::WrongItemCount {
                expected: HEADER_FIELDS,
                got: items.len(),
            });
        }
        Ok(Self {
            parent_hash: items[0].as_val()?,
            author: items[1].as_val()?,
            state_root: items[2].as_val()?,
            transactions_root: items[3].as_val()?,
            next_validator_set_hash: items[4].as_val()?,
            score: items[5].as_val()?,
            number: items[6].as_val()?,
            timestamp: items[7].as_val()?,
            extra_data: items[8].as_val()?,
            seal: items[HEADER_FIELDS..]
                .iter()
                .map(|item| item.as_raw().to_vec())
                .collect(),
        })
    }
}

/// A header with its raw encoded transactions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Vec<u8>>,
}

impl Block {
    pub fn new(header: Header, transactions: Vec<Vec<u8>>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        self.rlp_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        crate::codec::decode(bytes)
    }

    /// Encode and snappy-compress.
    pub fn compress(&self) -> Result<Vec<u8>, ProtocolError> {
        compress(&self.encode())
    }

    /// Decompress and decode.
    pub fn decompress(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self::decode(&decompress(bytes)?)?)
    }
}

impl Encodable for Block {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.list(|s| {
            s.append(&self.header).append_raw_list(&self.transactions);
        });
    }
}

impl Decodable for Block {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecodeError> {
        let items = rlp.expect_items(2)?;
        Ok(Self {
            header: items[0].as_val()?,
            transactions: items[1].as_raw_list()?,
        })
    }
}
