//! Signing Identities
//!
//! A secp256k1 key pair used either as the ephemeral handshake key of a
//! session or as a validator key handed to the Byzantine injector. Secrets
//! are loaded from hex strings (optionally `0x`-prefixed).

use secp256k1::{PublicKey, Secp256k1, SecretKey};
use std::fmt;
use thiserror::Error;

use crate::crypto::{public_to_bytes, sign, Signature, H256, PUBLIC_KEY_SIZE};

/// Errors that can occur in identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid secret key: {0}")]
    InvalidSecretKey(#[from] secp256k1::Error),

    #[error("invalid secret length: expected 32 bytes, got {0}")]
    InvalidSecretLength(usize),

    #[error("invalid hex encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// A key pair with signing capability.
#[derive(Clone)]
pub struct Identity {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl Identity {
    /// Create a new random identity.
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut rand::thread_rng());
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create an identity from a secret key.
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::signing_only();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create an identity from secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, IdentityError> {
        let secret_key = SecretKey::from_slice(bytes)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Create an identity from a hex-encoded secret.
    pub fn from_secret_str(s: &str) -> Result<Self, IdentityError> {
        Ok(Self::from_secret_key(decode_secret(s)?))
    }

    /// Return the secret key.
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    /// Return the public key.
    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// Return the public key in wire form.
    pub fn public_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        public_to_bytes(&self.public_key)
    }

    /// Sign a 32-byte digest.
    pub fn sign(&self, digest: &H256) -> Signature {
        sign(&self.secret_key, digest)
    }

    /// Check whether `signature` over `digest` recovers to this identity.
    pub fn signed(&self, signature: &Signature, digest: &H256) -> bool {
        signature.is_signed_by(digest, &self.public_key)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &hex::encode(self.public_bytes()))
            .finish_non_exhaustive()
    }
}

/// Decode a hex-encoded secret key.
pub fn decode_secret(s: &str) -> Result<SecretKey, IdentityError> {
    let trimmed = s.trim();
    let hex_str = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(hex_str)?;
    if bytes.len() != 32 {
        return Err(IdentityError::InvalidSecretLength(bytes.len()));
    }
    Ok(SecretKey::from_slice(&bytes)?)
}
