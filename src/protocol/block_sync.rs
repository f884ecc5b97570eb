//! Block synchronization extension messages.
//!
//! ## Wire Format
//!
//! ```text
//! Status:   [1, total_score, best_hash, genesis_hash]
//! Request:  [id, request_id, body]
//! Response: [id, request_id, body]
//! ```
//!
//! | Id | Message       | Body                                  |
//! |----|---------------|---------------------------------------|
//! | 2  | GetHeaders    | [start_number, max_count]             |
//! | 3  | Headers       | [header...] (encoded headers)         |
//! | 4  | GetBodies     | [hash...]                             |
//! | 5  | Bodies        | [snappy(encode([[tx...]...]))]        |
//! | 6-9| State sync    | not supported                         |

use std::fmt;

use super::compress::{compress, decompress};
use super::ProtocolError;
use crate::codec::{DecodeError, Rlp, RlpStream};
use crate::crypto::H256;

/// Block sync message identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockSyncMessageId {
    Status = 1,
    GetHeaders = 2,
    Headers = 3,
    GetBodies = 4,
    Bodies = 5,
    GetStateHead = 6,
    StateHead = 7,
    GetStateChunk = 8,
    StateChunk = 9,
}

impl BlockSyncMessageId {
    /// Try to convert from a byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(BlockSyncMessageId::Status),
            2 => Some(BlockSyncMessageId::GetHeaders),
            3 => Some(BlockSyncMessageId::Headers),
            4 => Some(BlockSyncMessageId::GetBodies),
            5 => Some(BlockSyncMessageId::Bodies),
            6 => Some(BlockSyncMessageId::GetStateHead),
            7 => Some(BlockSyncMessageId::StateHead),
            8 => Some(BlockSyncMessageId::GetStateChunk),
            9 => Some(BlockSyncMessageId::StateChunk),
            _ => None,
        }
    }

    /// Convert to a byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Check if this id belongs to state synchronization.
    pub fn is_state_sync(self) -> bool {
        matches!(
            self,
            BlockSyncMessageId::GetStateHead
                | BlockSyncMessageId::StateHead
                | BlockSyncMessageId::GetStateChunk
                | BlockSyncMessageId::StateChunk
        )
    }
}

impl fmt::Display for BlockSyncMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlockSyncMessageId::Status => "Status",
            BlockSyncMessageId::GetHeaders => "GetHeaders",
            BlockSyncMessageId::Headers => "Headers",
            BlockSyncMessageId::GetBodies => "GetBodies",
            BlockSyncMessageId::Bodies => "Bodies",
            BlockSyncMessageId::GetStateHead => "GetStateHead",
            BlockSyncMessageId::StateHead => "StateHead",
            BlockSyncMessageId::GetStateChunk => "GetStateChunk",
            BlockSyncMessageId::StateChunk => "StateChunk",
        };
        write!(f, "{}", name)
    }
}

/// Body of an outbound or inbound request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestMessage {
    Headers { start_number: u64, max_count: u64 },
    Bodies(Vec<H256>),
}

impl RequestMessage {
    pub fn message_id(&self) -> BlockSyncMessageId {
        match self {
            RequestMessage::Headers { .. } => BlockSyncMessageId::GetHeaders,
            RequestMessage::Bodies(_) => BlockSyncMessageId::GetBodies,
        }
    }

    fn append_body(&self, s: &mut RlpStream) {
        match self {
            RequestMessage::Headers {
                start_number,
                max_count,
            } => {
                s.list(|s| {
                    s.append(start_number).append(max_count);
                });
            }
            RequestMessage::Bodies(hashes) => {
                s.append_list(hashes);
            }
        }
    }
}

/// Body of a response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponseMessage {
    /// Encoded headers, passed through untouched.
    Headers(Vec<Vec<u8>>),
    /// Encoded transactions per block.
    Bodies(Vec<Vec<Vec<u8>>>),
}

impl ResponseMessage {
    pub fn message_id(&self) -> BlockSyncMessageId {
        match self {
            ResponseMessage::Headers(_) => BlockSyncMessageId::Headers,
            ResponseMessage::Bodies(_) => BlockSyncMessageId::Bodies,
        }
    }

    fn append_body(&self, s: &mut RlpStream) -> Result<(), ProtocolError> {
        match self {
            ResponseMessage::Headers(headers) => {
                s.append_raw_list(headers);
            }
            ResponseMessage::Bodies(bodies) => {
                let compressed = compress(&encode_bodies(bodies))?;
                s.list(|s| {
                    s.append(&compressed);
                });
            }
        }
        Ok(())
    }
}

/// Encode block bodies before compression.
pub fn encode_bodies(bodies: &[Vec<Vec<u8>>]) -> Vec<u8> {
    let mut s = RlpStream::new();
    s.list(|s| {
        for body in bodies {
            s.append_raw_list(body);
        }
    });
    s.out()
}

fn decode_bodies(bytes: &[u8]) -> Result<Vec<Vec<Vec<u8>>>, DecodeError> {
    let rlp = Rlp::new(bytes);
    rlp.ensure_exact()?;
    rlp.items()?.iter().map(|body| body.as_raw_list()).collect()
}

/// A block sync extension message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockSyncMessage {
    Status {
        /// Chain score; values wider than 128 bits are rejected on decode.
        total_score: u128,
        best_hash: H256,
        genesis_hash: H256,
    },
    Request(u64, RequestMessage),
    Response(u64, ResponseMessage),
}

impl BlockSyncMessage {
    pub fn message_id(&self) -> BlockSyncMessageId {
        match self {
            BlockSyncMessage::Status { .. } => BlockSyncMessageId::Status,
            BlockSyncMessage::Request(_, request) => request.message_id(),
            BlockSyncMessage::Response(_, response) => response.message_id(),
        }
    }

    /// Encode as an extension payload.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut s = RlpStream::new();
        let mut body_result = Ok(());
        s.list(|s| {
            s.append(&self.message_id().to_byte());
            match self {
                BlockSyncMessage::Status {
                    total_score,
                    best_hash,
                    genesis_hash,
                } => {
                    s.append(total_score).append(best_hash).append(genesis_hash);
                }
                BlockSyncMessage::Request(request_id, request) => {
                    s.append(request_id);
                    request.append_body(s);
                }
                BlockSyncMessage::Response(request_id, response) => {
                    s.append(request_id);
                    body_result = response.append_body(s);
                }
            }
        });
        body_result?;
        Ok(s.out())
    }

    /// Decode an extension payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let rlp = Rlp::new(bytes);
        rlp.ensure_exact()?;
        let id: u8 = rlp.val_at(0)?;
        let message_id =
            BlockSyncMessageId::from_byte(id).ok_or(ProtocolError::InvalidMessageType(id))?;
        if message_id.is_state_sync() {
            return Err(ProtocolError::Unsupported("state synchronization"));
        }

        if message_id == BlockSyncMessageId::Status {
            let items = rlp.expect_items(4)?;
            return Ok(BlockSyncMessage::Status {
                total_score: items[1].as_val()?,
                best_hash: items[2].as_val()?,
                genesis_hash: items[3].as_val()?,
            });
        }

        let items = rlp.expect_items(3)?;
        let request_id: u64 = items[1].as_val()?;
        let body = &items[2];
        let message = match message_id {
            BlockSyncMessageId::GetHeaders => {
                let fields = body.expect_items(2)?;
                BlockSyncMessage::Request(
                    request_id,
                    RequestMessage::Headers {
                        start_number: fields[0].as_val()?,
                        max_count: fields[1].as_val()?,
                    },
                )
            }
            BlockSyncMessageId::GetBodies => {
                BlockSyncMessage::Request(request_id, RequestMessage::Bodies(body.as_list()?))
            }
            BlockSyncMessageId::Headers => BlockSyncMessage::Response(
                request_id,
                ResponseMessage::Headers(body.as_raw_list()?),
            ),
            BlockSyncMessageId::Bodies => {
                let compressed: Vec<u8> = body.expect_items(1)?[0].as_val()?;
                let bodies = decode_bodies(&decompress(&compressed)?)?;
                BlockSyncMessage::Response(request_id, ResponseMessage::Bodies(bodies))
            }
            _ => return Err(ProtocolError::InvalidMessageType(id)),
        };
        Ok(message)
    }
}
