//! Hash primitives
//!
//! Transaction and block identifiers are double BLAKE2b-256 digests. Address
//! payloads are `RIPEMD160(BLAKE2b-256(data))`.

use crate::{Error, Result};
use ripemd::{Digest, Ripemd160};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Size of a [`Hash256`] in bytes
pub const HASH_SIZE: usize = 32;

/// Size of a hash160 digest in bytes
pub const HASH160_SIZE: usize = 20;

/// 32-byte digest used for transaction and block identifiers
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash256(pub [u8; HASH_SIZE]);

impl Hash256 {
    /// All-zero hash
    pub const ZERO: Hash256 = Hash256([0u8; HASH_SIZE]);

    /// Create from a byte slice
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; HASH_SIZE] = bytes
            .try_into()
            .map_err(|_| Error::Codec(format!("hash must be 32 bytes, got {}", bytes.len())))?;
        Ok(Self(arr))
    }

    /// Double BLAKE2b-256 of `data`
    pub fn double_hash(data: &[u8]) -> Self {
        Self(blake2b_256(&blake2b_256(data)))
    }

    /// Borrow the raw bytes
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Whether every byte is zero
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_SIZE]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self)
    }
}

impl FromStr for Hash256 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut out = [0u8; HASH_SIZE];
        hex::decode_to_slice(s, &mut out)
            .map_err(|e| Error::InvalidArgument(format!("invalid hash {}: {}", s, e)))?;
        Ok(Self(out))
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// BLAKE2b with a 32-byte output
pub fn blake2b_256(data: &[u8]) -> [u8; HASH_SIZE] {
    let hash = blake2b_simd::Params::new().hash_length(HASH_SIZE).hash(data);
    let mut out = [0u8; HASH_SIZE];
    out.copy_from_slice(hash.as_bytes());
    out
}

/// `RIPEMD160(BLAKE2b-256(data))`
pub fn hash160(data: &[u8]) -> [u8; HASH160_SIZE] {
    let mut hasher = Ripemd160::new();
    hasher.update(blake2b_256(data));
    let digest = hasher.finalize();
    let mut out = [0u8; HASH160_SIZE];
    out.copy_from_slice(&digest);
    out
}
