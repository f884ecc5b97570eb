//! Cryptographic Primitives
//!
//! Everything the node protocol needs from cryptography:
//!
//! - blake2b-256 hashing, plain and keyed (envelope digests, block hashes,
//!   consensus digests)
//! - recoverable secp256k1 ECDSA signatures over 32-byte digests
//! - secp256k1 ECDH plus AES-256-CBC for the handshake nonce

mod exchange;
mod hash;
mod signature;

use thiserror::Error;

pub use exchange::{
    decrypt_nonce, encrypt_nonce, public_from_bytes, public_to_bytes, shared_secret, Nonce,
    NONCE_IV, PUBLIC_KEY_SIZE,
};
pub use hash::{blake256, blake256_with_key, H160, H256};
pub use signature::{sign, Signature, SIGNATURE_SIZE};

/// Errors from cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("secp256k1 error: {0}")]
    Secp256k1(#[from] secp256k1::Error),

    #[error("invalid public key length: expected 64, got {0}")]
    InvalidPublicKeyLength(usize),

    #[error("nonce decryption failed")]
    NonceDecryption,

    #[error("decrypted nonce too long: {0} bytes")]
    NonceTooLong(usize),

    #[error("invalid digest key length: {0}")]
    InvalidKeyLength(usize),
}
