//! Fixed-size hashes and blake2b-256.

use blake2::digest::consts::U32;
use blake2::digest::{KeyInit, Mac};
use blake2::{Blake2b, Blake2bMac, Digest};
use std::fmt;

use super::CryptoError;
use crate::codec::{DecodeError, Decodable, Encodable, Rlp, RlpStream};

type Blake2b256 = Blake2b<U32>;
type Blake2b256Mac = Blake2bMac<U32>;

macro_rules! fixed_hash {
    ($name:ident, $size:expr) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; $size]);

        impl $name {
            /// Size in bytes.
            pub const SIZE: usize = $size;

            /// Create from raw bytes.
            pub const fn new(bytes: [u8; $size]) -> Self {
                Self(bytes)
            }

            /// The all-zero value.
            pub const fn zero() -> Self {
                Self([0u8; $size])
            }

            /// Check if every byte is zero.
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            /// Create from a slice of exactly the right length.
            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                <[u8; $size]>::try_from(bytes).ok().map(Self)
            }

            /// Raw bytes.
            pub fn as_bytes(&self) -> &[u8; $size] {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::zero()
            }
        }

        impl From<[u8; $size]> for $name {
            fn from(bytes: [u8; $size]) -> Self {
                Self(bytes)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl Encodable for $name {
            fn rlp_append(&self, s: &mut RlpStream) {
                s.append_bytes(&self.0);
            }
        }

        impl Decodable for $name {
            fn decode(rlp: &Rlp<'_>) -> Result<Self, DecodeError> {
                <[u8; $size]>::decode(rlp).map(Self)
            }
        }
    };
}

fixed_hash!(H256, 32);
fixed_hash!(H160, 20);

/// blake2b with a 256-bit output.
pub fn blake256(data: &[u8]) -> H256 {
    let mut hasher = Blake2b256::new();
    Digest::update(&mut hasher, data);
    H256(hasher.finalize().into())
}

/// Keyed blake2b with a 256-bit output (RFC 7693 keyed mode).
///
/// Keys longer than 64 bytes are rejected.
pub fn blake256_with_key(data: &[u8], key: &[u8]) -> Result<H256, CryptoError> {
    let mut mac = <Blake2b256Mac as KeyInit>::new_from_slice(key)
        .map_err(|_| CryptoError::InvalidKeyLength(key.len()))?;
    Mac::update(&mut mac, data);
    Ok(H256(mac.finalize().into_bytes().into()))
}
