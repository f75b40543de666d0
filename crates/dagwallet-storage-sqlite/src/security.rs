//! Security and encryption primitives
//!
//! AES-256-GCM and ChaCha20-Poly1305 for wrapping secrets, Argon2id for
//! passphrase derivation, salted SHA-512 for passphrase comparison.

use crate::{Error, Result};
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use argon2::{Argon2, ParamsBuilder, Version};
use chacha20poly1305::ChaCha20Poly1305;
use dagwallet_core::codec::{Codec, Decoder, Encoder};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use zeroize::Zeroizing;

const CIPHERTEXT_VERSION: u8 = 1;
const NONCE_LEN: usize = 12;
const HEADER_LEN: usize = 2 + NONCE_LEN;

/// Encryption algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EncryptionAlgorithm {
    /// AES-256-GCM
    AesGcm,
    /// ChaCha20-Poly1305
    #[default]
    ChaCha20Poly1305,
}

impl EncryptionAlgorithm {
    fn id(self) -> u8 {
        match self {
            EncryptionAlgorithm::AesGcm => 0,
            EncryptionAlgorithm::ChaCha20Poly1305 => 1,
        }
    }

    fn from_id(id: u8) -> Result<Self> {
        match id {
            0 => Ok(EncryptionAlgorithm::AesGcm),
            1 => Ok(EncryptionAlgorithm::ChaCha20Poly1305),
            other => Err(Error::Crypto(format!("unknown cipher id {}", other))),
        }
    }
}

/// 256-bit symmetric key, zeroed on drop
#[derive(Clone)]
pub struct SymmetricKey {
    key: Zeroizing<[u8; 32]>,
    algorithm: EncryptionAlgorithm,
}

impl SymmetricKey {
    /// Generate new random key
    pub fn generate(algorithm: EncryptionAlgorithm) -> Self {
        let mut key = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(key.as_mut());
        Self { key, algorithm }
    }

    /// Create from bytes
    pub fn from_bytes(bytes: &[u8], algorithm: EncryptionAlgorithm) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(Error::Crypto("Invalid key length".to_string()));
        }
        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(bytes);
        Ok(Self { key, algorithm })
    }

    /// Get key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }

    /// Algorithm used for new ciphertexts
    pub fn algorithm(&self) -> EncryptionAlgorithm {
        self.algorithm
    }

    /// Encrypt data
    ///
    /// Format: `[version(1)][algorithm(1)][nonce(12)][ciphertext]`
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = match self.algorithm {
            EncryptionAlgorithm::AesGcm => Aes256Gcm::new(self.key.as_ref().into())
                .encrypt(Nonce::from_slice(&nonce_bytes), plaintext),
            EncryptionAlgorithm::ChaCha20Poly1305 => {
                ChaCha20Poly1305::new(self.key.as_ref().into()).encrypt(
                    chacha20poly1305::Nonce::from_slice(&nonce_bytes),
                    plaintext,
                )
            }
        }
        .map_err(|e| Error::Crypto(e.to_string()))?;

        let mut result = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        result.push(CIPHERTEXT_VERSION);
        result.push(self.algorithm.id());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// Decrypt data produced by [`SymmetricKey::encrypt`]
    ///
    /// The algorithm is taken from the ciphertext header. A wrong key fails
    /// authentication and yields [`Error::Crypto`].
    pub fn decrypt(&self, data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if data.len() < HEADER_LEN {
            return Err(Error::Crypto("Invalid ciphertext length".to_string()));
        }
        if data[0] != CIPHERTEXT_VERSION {
            return Err(Error::Crypto(format!(
                "Unsupported encryption version: {}",
                data[0]
            )));
        }
        let nonce = &data[2..HEADER_LEN];
        let ciphertext = &data[HEADER_LEN..];

        let plaintext = match EncryptionAlgorithm::from_id(data[1])? {
            EncryptionAlgorithm::AesGcm => Aes256Gcm::new(self.key.as_ref().into())
                .decrypt(Nonce::from_slice(nonce), ciphertext),
            EncryptionAlgorithm::ChaCha20Poly1305 => {
                ChaCha20Poly1305::new(self.key.as_ref().into())
                    .decrypt(chacha20poly1305::Nonce::from_slice(nonce), ciphertext)
            }
        }
        .map_err(|_| Error::Crypto("decryption failed".to_string()))?;

        Ok(Zeroizing::new(plaintext))
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Argon2id cost parameters, persisted next to each salt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
    /// Degree of parallelism
    pub lanes: u32,
}

impl KdfParams {
    /// Create parameters
    pub const fn new(memory_kib: u32, iterations: u32, lanes: u32) -> Self {
        Self {
            memory_kib,
            iterations,
            lanes,
        }
    }
}

impl Default for KdfParams {
    /// 64 MiB, 3 iterations, 4 lanes
    fn default() -> Self {
        Self::new(65536, 3, 4)
    }
}

impl Codec for KdfParams {
    fn encode(&self, enc: &mut Encoder) {
        enc.put_u32(self.memory_kib);
        enc.put_u32(self.iterations);
        enc.put_u32(self.lanes);
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            memory_kib: dec.u32()?,
            iterations: dec.u32()?,
            lanes: dec.u32()?,
        })
    }
}

/// Derive a key from a passphrase using Argon2id
pub fn derive_key(
    passphrase: &[u8],
    salt: &[u8],
    params: &KdfParams,
    algorithm: EncryptionAlgorithm,
) -> Result<SymmetricKey> {
    if salt.len() < 16 {
        return Err(Error::Crypto("Salt too short".to_string()));
    }

    let argon_params = ParamsBuilder::new()
        .m_cost(params.memory_kib)
        .t_cost(params.iterations)
        .p_cost(params.lanes)
        .output_len(32)
        .build()
        .map_err(|e| Error::Crypto(e.to_string()))?;

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(passphrase, salt, key.as_mut())
        .map_err(|e| Error::Crypto(e.to_string()))?;

    SymmetricKey::from_bytes(key.as_ref(), algorithm)
}

/// Generate secure random salt
pub fn generate_salt() -> [u8; 32] {
    let mut salt = [0u8; 32];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Salted SHA-512 of a passphrase, for cheap equality checks
pub fn hash_passphrase(salt: &[u8], passphrase: &[u8]) -> Zeroizing<[u8; 64]> {
    let mut hasher = Sha512::new();
    hasher.update(salt);
    hasher.update(passphrase);
    let mut out = Zeroizing::new([0u8; 64]);
    out.copy_from_slice(&hasher.finalize());
    out
}
