//! Handshake and extension envelopes.
//!
//! ## Wire Format
//!
//! ```text
//! Envelope:        [version, protocol_id, fields...]
//! SignedEnvelope:  [Envelope, digest]
//! ```
//!
//! | Id   | Envelope            | Fields                              |
//! |------|---------------------|-------------------------------------|
//! | 0x01 | Sync1               | public_key, network_id, port        |
//! | 0x02 | Sync2               | public_key, network_id, port        |
//! | 0x03 | Ack                 | public_key, encrypted_nonce         |
//! | 0x04 | Nack                | (none)                              |
//! | 0x05 | NegotiationRequest  | extension, version                  |
//! | 0x06 | NegotiationResponse | extension, version                  |
//! | 0x07 | Encrypted           | extension, ciphertext               |
//! | 0x08 | Unencrypted         | extension, data                     |
//!
//! The digest is keyed blake2b-256 over the encoded envelope with the
//! session nonce as key. Handshake envelopes (Sync1/Sync2/Ack/Nack) travel
//! unsigned because no nonce exists yet.

use std::fmt;

use super::ProtocolError;
use crate::codec::{encode_frame, Encodable, Rlp, RlpStream};
use crate::crypto::{blake256_with_key, Nonce, H256, PUBLIC_KEY_SIZE};

/// Envelope format version.
pub const ENVELOPE_VERSION: u8 = 0;

/// Envelope protocol identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ProtocolId {
    Sync1 = 0x01,
    Sync2 = 0x02,
    Ack = 0x03,
    Nack = 0x04,
    NegotiationRequest = 0x05,
    NegotiationResponse = 0x06,
    Encrypted = 0x07,
    Unencrypted = 0x08,
}

impl ProtocolId {
    /// Try to convert from a byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(ProtocolId::Sync1),
            0x02 => Some(ProtocolId::Sync2),
            0x03 => Some(ProtocolId::Ack),
            0x04 => Some(ProtocolId::Nack),
            0x05 => Some(ProtocolId::NegotiationRequest),
            0x06 => Some(ProtocolId::NegotiationResponse),
            0x07 => Some(ProtocolId::Encrypted),
            0x08 => Some(ProtocolId::Unencrypted),
            _ => None,
        }
    }

    /// Convert to a byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtocolId::Sync1 => "Sync1",
            ProtocolId::Sync2 => "Sync2",
            ProtocolId::Ack => "Ack",
            ProtocolId::Nack => "Nack",
            ProtocolId::NegotiationRequest => "NegotiationRequest",
            ProtocolId::NegotiationResponse => "NegotiationResponse",
            ProtocolId::Encrypted => "Encrypted",
            ProtocolId::Unencrypted => "Unencrypted",
        };
        write!(f, "{}", name)
    }
}

/// Outer wrapper around every handshake and extension payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Envelope {
    Sync1 {
        public_key: [u8; PUBLIC_KEY_SIZE],
        network_id: String,
        port: u16,
    },
    Sync2 {
        public_key: [u8; PUBLIC_KEY_SIZE],
        network_id: String,
        port: u16,
    },
    Ack {
        public_key: [u8; PUBLIC_KEY_SIZE],
        encrypted_nonce: Vec<u8>,
    },
    Nack,
    NegotiationRequest {
        extension: String,
        version: u64,
    },
    NegotiationResponse {
        extension: String,
        version: u64,
    },
    Encrypted {
        extension: String,
        ciphertext: Vec<u8>,
    },
    Unencrypted {
        extension: String,
        data: Vec<u8>,
    },
}

impl Envelope {
    /// Protocol identifier of this envelope.
    pub fn protocol_id(&self) -> ProtocolId {
        match self {
            Envelope::Sync1 { .. } => ProtocolId::Sync1,
            Envelope::Sync2 { .. } => ProtocolId::Sync2,
            Envelope::Ack { .. } => ProtocolId::Ack,
            Envelope::Nack => ProtocolId::Nack,
            Envelope::NegotiationRequest { .. } => ProtocolId::NegotiationRequest,
            Envelope::NegotiationResponse { .. } => ProtocolId::NegotiationResponse,
            Envelope::Encrypted { .. } => ProtocolId::Encrypted,
            Envelope::Unencrypted { .. } => ProtocolId::Unencrypted,
        }
    }

    /// Encode as a standalone record.
    pub fn encode(&self) -> Vec<u8> {
        self.rlp_bytes()
    }

    /// Decode a record.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let rlp = Rlp::new(bytes);
        rlp.ensure_exact()?;
        Self::decode_rlp(&rlp)
    }

    fn decode_rlp(rlp: &Rlp<'_>) -> Result<Self, ProtocolError> {
        let items = rlp.items()?;
        if items.len() < 2 {
            return Err(crate::codec::DecodeError::WrongItemCount {
                expected: 2,
                got: items.len(),
            }
            .into());
        }
        let version: u8 = items[0].as_val()?;
        if version != ENVELOPE_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }
        let id: u8 = items[1].as_val()?;
        let protocol_id = ProtocolId::from_byte(id).ok_or(ProtocolError::InvalidMessageType(id))?;
        let fields = rlp.expect_items(2 + field_count(protocol_id))?;

        let envelope = match protocol_id {
            ProtocolId::Sync1 => Envelope::Sync1 {
                public_key: fields[2].as_val()?,
                network_id: fields[3].as_val()?,
                port: fields[4].as_val()?,
            },
            ProtocolId::Sync2 => Envelope::Sync2 {
                public_key: fields[2].as_val()?,
                network_id: fields[3].as_val()?,
                port: fields[4].as_val()?,
            },
            ProtocolId::Ack => Envelope::Ack {
                public_key: fields[2].as_val()?,
                encrypted_nonce: fields[3].as_val()?,
            },
            ProtocolId::Nack => Envelope::Nack,
            ProtocolId::NegotiationRequest => Envelope::NegotiationRequest {
                extension: fields[2].as_val()?,
                version: fields[3].as_val()?,
            },
            ProtocolId::NegotiationResponse => Envelope::NegotiationResponse {
                extension: fields[2].as_val()?,
                version: fields[3].as_val()?,
            },
            ProtocolId::Encrypted => Envelope::Encrypted {
                extension: fields[2].as_val()?,
                ciphertext: fields[3].as_val()?,
            },
            ProtocolId::Unencrypted => Envelope::Unencrypted {
                extension: fields[2].as_val()?,
                data: fields[3].as_val()?,
            },
        };
        Ok(envelope)
    }
}

/// Number of fields following the version and protocol id.
fn field_count(id: ProtocolId) -> usize {
    match id {
        ProtocolId::Sync1 | ProtocolId::Sync2 => 3,
        ProtocolId::Nack => 0,
        _ => 2,
    }
}

impl Encodable for Envelope {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.list(|s| {
            s.append(&ENVELOPE_VERSION)
                .append(&self.protocol_id().to_byte());
            match self {
                Envelope::Sync1 {
                    public_key,
                    network_id,
                    port,
                }
                | Envelope::Sync2 {
                    public_key,
                    network_id,
                    port,
                } => {
                    s.append(public_key).append(network_id).append(port);
                }
                Envelope::Ack {
                    public_key,
                    encrypted_nonce,
                } => {
                    s.append(public_key).append(encrypted_nonce);
                }
                Envelope::Nack => {}
                Envelope::NegotiationRequest { extension, version }
                | Envelope::NegotiationResponse { extension, version } => {
                    s.append(extension).append(version);
                }
                Envelope::Encrypted {
                    extension,
                    ciphertext,
                } => {
                    s.append(extension).append(ciphertext);
                }
                Envelope::Unencrypted { extension, data } => {
                    s.append(extension).append(data);
                }
            }
        });
    }
}

/// Keyed digest binding an encoded envelope to a session.
pub fn envelope_digest(encoded: &[u8], nonce: &Nonce) -> Result<H256, ProtocolError> {
    Ok(blake256_with_key(encoded, &nonce.key_bytes())?)
}

/// An envelope plus its session-keyed digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedEnvelope {
    envelope: Envelope,
    digest: H256,
}

impl SignedEnvelope {
    /// Sign an envelope for the session identified by `nonce`.
    pub fn seal(envelope: Envelope, nonce: &Nonce) -> Result<Self, ProtocolError> {
        let digest = envelope_digest(&envelope.encode(), nonce)?;
        Ok(Self { envelope, digest })
    }

    /// Verify and unwrap a received record.
    ///
    /// The digest is recomputed over the envelope bytes exactly as received.
    pub fn open(record: &[u8], nonce: &Nonce) -> Result<Envelope, ProtocolError> {
        let rlp = Rlp::new(record);
        rlp.ensure_exact()?;
        let items = rlp.expect_items(2)?;
        let carried: H256 = items[1].as_val()?;
        let expected = envelope_digest(items[0].as_raw(), nonce)?;
        if carried != expected {
            return Err(ProtocolError::DigestMismatch);
        }
        Envelope::decode_rlp(&items[0])
    }

    /// The wrapped envelope.
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// The carried digest.
    pub fn digest(&self) -> &H256 {
        &self.digest
    }

    /// Encode as a standalone record.
    pub fn encode(&self) -> Vec<u8> {
        let mut s = RlpStream::new();
        s.append(&self.envelope).append(&self.digest);
        encode_frame(s.as_bytes())
    }
}
