//! Handshake key agreement and nonce cipher.
//!
//! The node encrypts a random 128-bit session nonce under the ECDH shared
//! secret (raw x coordinate) with AES-256-CBC, PKCS#7 padding and an
//! all-zero IV.

use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use secp256k1::ecdh::shared_secret_point;
use secp256k1::{PublicKey, SecretKey};
use std::fmt;

use super::CryptoError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Size of a public key on the wire (uncompressed, prefix byte dropped).
pub const PUBLIC_KEY_SIZE: usize = 64;

/// Initialization vector used for the nonce cipher.
pub const NONCE_IV: [u8; 16] = [0u8; 16];

/// Per-session nonce; also the key for envelope digests.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nonce(u128);

impl Nonce {
    /// Wrap a raw nonce value.
    pub const fn new(value: u128) -> Self {
        Self(value)
    }

    /// Raw value.
    pub fn value(&self) -> u128 {
        self.0
    }

    /// Key material for keyed digests (big-endian).
    pub fn key_bytes(&self) -> [u8; 16] {
        self.0.to_be_bytes()
    }
}

impl fmt::Debug for Nonce {
    // The nonce authenticates every envelope; keep it out of logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Nonce(..)")
    }
}

/// Serialize a public key for the wire.
pub fn public_to_bytes(public: &PublicKey) -> [u8; PUBLIC_KEY_SIZE] {
    let full = public.serialize_uncompressed();
    let mut out = [0u8; PUBLIC_KEY_SIZE];
    out.copy_from_slice(&full[1..]);
    out
}

/// Parse a wire public key.
pub fn public_from_bytes(bytes: &[u8]) -> Result<PublicKey, CryptoError> {
    if bytes.len() != PUBLIC_KEY_SIZE {
        return Err(CryptoError::InvalidPublicKeyLength(bytes.len()));
    }
    let mut full = [0u8; PUBLIC_KEY_SIZE + 1];
    full[0] = 0x04;
    full[1..].copy_from_slice(bytes);
    Ok(PublicKey::from_slice(&full)?)
}

/// ECDH shared secret: the x coordinate of `local * remote`.
pub fn shared_secret(local: &SecretKey, remote: &PublicKey) -> [u8; 32] {
    let point = shared_secret_point(remote, local);
    let mut secret = [0u8; 32];
    secret.copy_from_slice(&point[..32]);
    secret
}

/// Decrypt the nonce carried by a handshake Ack.
pub fn decrypt_nonce(secret: &[u8; 32], ciphertext: &[u8]) -> Result<Nonce, CryptoError> {
    let plaintext = Aes256CbcDec::new(secret.into(), &NONCE_IV.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::NonceDecryption)?;
    if plaintext.len() > 16 {
        return Err(CryptoError::NonceTooLong(plaintext.len()));
    }
    let mut bytes = [0u8; 16];
    bytes[16 - plaintext.len()..].copy_from_slice(&plaintext);
    Ok(Nonce(u128::from_be_bytes(bytes)))
}

/// Encrypt a nonce the way the node does when answering Sync1.
pub fn encrypt_nonce(secret: &[u8; 32], nonce: Nonce) -> Vec<u8> {
    Aes256CbcEnc::new(secret.into(), &NONCE_IV.into())
        .encrypt_padded_vec_mut::<Pkcs7>(&nonce.key_bytes())
}
