//! Recoverable ECDSA signatures.

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use std::fmt;

use super::{CryptoError, H256};
use crate::codec::{DecodeError, Decodable, Encodable, Rlp, RlpStream};

/// Wire size: r (32) || s (32) || recovery id (1).
pub const SIGNATURE_SIZE: usize = 65;

/// A recoverable secp256k1 signature over a 32-byte digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; SIGNATURE_SIZE]);

impl Signature {
    /// Wrap raw signature bytes.
    pub fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw signature bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }

    /// Recover the signer's public key.
    pub fn recover(&self, digest: &H256) -> Result<PublicKey, CryptoError> {
        let recovery_id = RecoveryId::from_i32(self.0[64] as i32)?;
        let signature = RecoverableSignature::from_compact(&self.0[..64], recovery_id)?;
        let message = Message::from_digest(*digest.as_bytes());
        Ok(Secp256k1::verification_only().recover_ecdsa(&message, &signature)?)
    }

    /// Check whether this signature over `digest` was made by `public`.
    pub fn is_signed_by(&self, digest: &H256, public: &PublicKey) -> bool {
        matches!(self.recover(digest), Ok(recovered) if recovered == *public)
    }
}

/// Sign a digest.
pub fn sign(secret: &SecretKey, digest: &H256) -> Signature {
    let message = Message::from_digest(*digest.as_bytes());
    let signature = Secp256k1::signing_only().sign_ecdsa_recoverable(&message, secret);
    let (recovery_id, compact) = signature.serialize_compact();
    let mut bytes = [0u8; SIGNATURE_SIZE];
    bytes[..64].copy_from_slice(&compact);
    bytes[64] = recovery_id.to_i32() as u8;
    Signature(bytes)
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature(0x{})", hex::encode(self.0))
    }
}

impl Encodable for Signature {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.append_bytes(&self.0);
    }
}

impl Decodable for Signature {
    fn decode(rlp: &Rlp<'_>) -> Result<Self, DecodeError> {
        <[u8; SIGNATURE_SIZE]>::decode(rlp).map(Self)
    }
}
