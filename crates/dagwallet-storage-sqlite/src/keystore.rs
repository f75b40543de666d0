//! Encrypted key store
//!
//! Three random crypto keys protect everything the manager persists:
//!
//! - **public**: account xpubs, imported public keys, the watch-only scripts;
//! - **private**: the master HD key, coin-type and account xprvs, imported
//!   private keys;
//! - **script**: redeem scripts.
//!
//! The public crypto key is wrapped by a master key derived from the public
//! passphrase, the private and script keys by one derived from the private
//! passphrase. [`KeyStoreRecord`] is the persisted form; [`KeyStore`] holds
//! the unwrapped keys in memory and is the only place lock transitions
//! happen.

use crate::security::{
    derive_key, generate_salt, hash_passphrase, EncryptionAlgorithm, KdfParams, SymmetricKey,
};
use crate::{Error, Result};
use dagwallet_core::codec::{Codec, Decoder, Encoder};
use parking_lot::RwLock;
use zeroize::Zeroizing;

/// Key store layout version understood by this build
pub const MANAGER_VERSION: u32 = 1;

const RECORD_VERSION: u8 = 1;

/// Which crypto key protects a secret
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoKeyType {
    /// Public material
    Public,
    /// Private keys
    Private,
    /// Redeem scripts
    Script,
}

/// Salt and KDF cost used to derive one master key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterKeyParams {
    /// Random salt
    pub salt: [u8; 32],
    /// Argon2id cost
    pub kdf: KdfParams,
}

impl MasterKeyParams {
    fn generate(kdf: KdfParams) -> Self {
        Self {
            salt: generate_salt(),
            kdf,
        }
    }

    fn derive(&self, passphrase: &[u8], algorithm: EncryptionAlgorithm) -> Result<SymmetricKey> {
        derive_key(passphrase, &self.salt, &self.kdf, algorithm)
    }
}

impl Codec for MasterKeyParams {
    fn encode(&self, enc: &mut Encoder) {
        enc.put_fixed(&self.salt);
        self.kdf.encode(enc);
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            salt: dec.fixed()?,
            kdf: KdfParams::decode(dec)?,
        })
    }
}

/// Persisted key store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStoreRecord {
    /// Cipher used for every wrapped secret
    pub algorithm: EncryptionAlgorithm,
    /// Derivation parameters of the public master key
    pub public_master: MasterKeyParams,
    /// Derivation parameters of the private master key, absent when watch-only
    pub private_master: Option<MasterKeyParams>,
    /// Public crypto key wrapped by the public master key
    pub crypto_public: Vec<u8>,
    /// Private crypto key wrapped by the private master key
    pub crypto_private: Option<Vec<u8>>,
    /// Script crypto key wrapped by the private master key
    pub crypto_script: Option<Vec<u8>>,
    /// Salt for the in-memory private passphrase hash
    pub passphrase_hash_salt: [u8; 32],
    /// Master extended private key, encrypted with the private crypto key
    pub master_hd_private: Option<Vec<u8>>,
}

/// Unwrapped crypto keys, as produced by [`KeyStoreRecord::create`]
pub struct CryptoKeys {
    /// Public crypto key
    pub public: SymmetricKey,
    /// Private crypto key
    pub private: SymmetricKey,
    /// Script crypto key
    pub script: SymmetricKey,
}

impl KeyStoreRecord {
    /// Create a new record with fresh crypto keys
    pub fn create(
        public_passphrase: &[u8],
        private_passphrase: &[u8],
        kdf: KdfParams,
        algorithm: EncryptionAlgorithm,
    ) -> Result<(Self, CryptoKeys)> {
        let public_master = MasterKeyParams::generate(kdf);
        let private_master = MasterKeyParams::generate(kdf);
        let master_pub = public_master.derive(public_passphrase, algorithm)?;
        let master_priv = private_master.derive(private_passphrase, algorithm)?;

        let keys = CryptoKeys {
            public: SymmetricKey::generate(algorithm),
            private: SymmetricKey::generate(algorithm),
            script: SymmetricKey::generate(algorithm),
        };

        let record = Self {
            algorithm,
            crypto_public: master_pub.encrypt(keys.public.as_bytes())?,
            crypto_private: Some(master_priv.encrypt(keys.private.as_bytes())?),
            crypto_script: Some(master_priv.encrypt(keys.script.as_bytes())?),
            public_master,
            private_master: Some(private_master),
            passphrase_hash_salt: generate_salt(),
            master_hd_private: None,
        };
        Ok((record, keys))
    }

    /// Whether private material has been removed
    pub fn is_watch_only(&self) -> bool {
        self.private_master.is_none()
    }

    /// Unwrap the public crypto key
    pub fn open_public(&self, public_passphrase: &[u8]) -> Result<SymmetricKey> {
        let master = self.public_master.derive(public_passphrase, self.algorithm)?;
        let bytes = master
            .decrypt(&self.crypto_public)
            .map_err(|_| Error::Crypto("invalid public passphrase".to_string()))?;
        SymmetricKey::from_bytes(&bytes, self.algorithm)
    }

    /// Unwrap the private and script crypto keys
    pub fn open_private(&self, private_passphrase: &[u8]) -> Result<(SymmetricKey, SymmetricKey)> {
        let (Some(params), Some(wrapped_priv), Some(wrapped_script)) = (
            &self.private_master,
            &self.crypto_private,
            &self.crypto_script,
        ) else {
            return Err(Error::WatchingOnly("no private keys".to_string()));
        };
        let master = params.derive(private_passphrase, self.algorithm)?;
        let private = master
            .decrypt(wrapped_priv)
            .map_err(|_| Error::Crypto("invalid private passphrase".to_string()))?;
        let script = master
            .decrypt(wrapped_script)
            .map_err(|_| Error::Crypto("invalid private passphrase".to_string()))?;
        Ok((
            SymmetricKey::from_bytes(&private, self.algorithm)?,
            SymmetricKey::from_bytes(&script, self.algorithm)?,
        ))
    }

    /// Re-wrap the public crypto key under a new passphrase
    pub fn change_public_passphrase(&mut self, old: &[u8], new: &[u8]) -> Result<()> {
        let key = self.open_public(old)?;
        let params = MasterKeyParams::generate(self.public_master.kdf);
        let master = params.derive(new, self.algorithm)?;
        self.crypto_public = master.encrypt(key.as_bytes())?;
        self.public_master = params;
        Ok(())
    }

    /// Re-wrap the private and script crypto keys under a new passphrase
    pub fn change_private_passphrase(&mut self, old: &[u8], new: &[u8]) -> Result<()> {
        let (private, script) = self.open_private(old)?;
        let kdf = self
            .private_master
            .as_ref()
            .map(|p| p.kdf)
            .unwrap_or(self.public_master.kdf);
        let params = MasterKeyParams::generate(kdf);
        let master = params.derive(new, self.algorithm)?;
        self.crypto_private = Some(master.encrypt(private.as_bytes())?);
        self.crypto_script = Some(master.encrypt(script.as_bytes())?);
        self.private_master = Some(params);
        self.passphrase_hash_salt = generate_salt();
        Ok(())
    }

    /// Drop every private secret
    pub fn strip_private(&mut self) {
        self.private_master = None;
        self.crypto_private = None;
        self.crypto_script = None;
        self.master_hd_private = None;
    }
}

fn put_opt_bytes(enc: &mut Encoder, bytes: &Option<Vec<u8>>) {
    enc.put_bool(bytes.is_some());
    if let Some(bytes) = bytes {
        enc.put_var_bytes(bytes);
    }
}

fn opt_bytes(dec: &mut Decoder<'_>) -> Result<Option<Vec<u8>>> {
    Ok(if dec.bool()? {
        Some(dec.var_bytes()?)
    } else {
        None
    })
}

impl Codec for KeyStoreRecord {
    fn encode(&self, enc: &mut Encoder) {
        enc.put_u8(RECORD_VERSION);
        enc.put_u8(match self.algorithm {
            EncryptionAlgorithm::AesGcm => 0,
            EncryptionAlgorithm::ChaCha20Poly1305 => 1,
        });
        self.public_master.encode(enc);
        enc.put_bool(self.private_master.is_some());
        if let Some(params) = &self.private_master {
            params.encode(enc);
        }
        enc.put_var_bytes(&self.crypto_public);
        put_opt_bytes(enc, &self.crypto_private);
        put_opt_bytes(enc, &self.crypto_script);
        enc.put_fixed(&self.passphrase_hash_salt);
        put_opt_bytes(enc, &self.master_hd_private);
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        dec.expect_version("key store", RECORD_VERSION)?;
        let algorithm = match dec.u8()? {
            0 => EncryptionAlgorithm::AesGcm,
            1 => EncryptionAlgorithm::ChaCha20Poly1305,
            other => return Err(Error::Codec(format!("unknown cipher id {}", other))),
        };
        let public_master = MasterKeyParams::decode(dec)?;
        let private_master = if dec.bool()? {
            Some(MasterKeyParams::decode(dec)?)
        } else {
            None
        };
        Ok(Self {
            algorithm,
            public_master,
            private_master,
            crypto_public: dec.var_bytes()?,
            crypto_private: opt_bytes(dec)?,
            crypto_script: opt_bytes(dec)?,
            passphrase_hash_salt: dec.fixed()?,
            master_hd_private: opt_bytes(dec)?,
        })
    }
}

struct UnlockedKeys {
    private: SymmetricKey,
    script: SymmetricKey,
    passphrase_hash: Zeroizing<[u8; 64]>,
}

enum KeyState {
    Closed,
    Locked {
        public: SymmetricKey,
    },
    Unlocked {
        public: SymmetricKey,
        keys: UnlockedKeys,
    },
}

/// Observable lock state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// No keys in memory; every operation is refused
    Closed,
    /// Public key only
    Locked,
    /// Private and script keys available
    Unlocked,
}

fn closed_error() -> Error {
    Error::Storage("manager closed".to_string())
}

/// In-memory crypto keys and their lock state
pub struct KeyStore {
    state: RwLock<KeyState>,
}

impl KeyStore {
    /// A closed key store
    pub fn closed() -> Self {
        Self {
            state: RwLock::new(KeyState::Closed),
        }
    }

    /// A locked key store holding `public`
    pub fn locked(public: SymmetricKey) -> Self {
        Self {
            state: RwLock::new(KeyState::Locked { public }),
        }
    }

    /// Open with the public passphrase
    pub fn open(&self, record: &KeyStoreRecord, public_passphrase: &[u8]) -> Result<()> {
        let public = record.open_public(public_passphrase)?;
        *self.state.write() = KeyState::Locked { public };
        Ok(())
    }

    /// Current state
    pub fn state(&self) -> LockState {
        match &*self.state.read() {
            KeyState::Closed => LockState::Closed,
            KeyState::Locked { .. } => LockState::Locked,
            KeyState::Unlocked { .. } => LockState::Unlocked,
        }
    }

    /// Whether private keys are unavailable
    pub fn is_locked(&self) -> bool {
        self.state() != LockState::Unlocked
    }

    /// Unlock with the private passphrase
    ///
    /// Unlocking again with the same passphrase is answered from the salted
    /// hash without running the KDF. A failed attempt leaves the store
    /// locked.
    pub fn unlock(&self, record: &KeyStoreRecord, private_passphrase: &[u8]) -> Result<()> {
        if record.is_watch_only() {
            return Err(Error::WatchingOnly("cannot unlock".to_string()));
        }
        let hash = hash_passphrase(&record.passphrase_hash_salt, private_passphrase);

        let mut state = self.state.write();
        let public = match &*state {
            KeyState::Closed => return Err(closed_error()),
            KeyState::Unlocked { keys, .. } if keys.passphrase_hash.as_ref() == hash.as_ref() => {
                return Ok(());
            }
            KeyState::Locked { public } | KeyState::Unlocked { public, .. } => public.clone(),
        };

        match record.open_private(private_passphrase) {
            Ok((private, script)) => {
                *state = KeyState::Unlocked {
                    public,
                    keys: UnlockedKeys {
                        private,
                        script,
                        passphrase_hash: hash,
                    },
                };
                tracing::info!("Key store unlocked");
                Ok(())
            }
            Err(e) => {
                *state = KeyState::Locked { public };
                Err(e)
            }
        }
    }

    /// Drop private and script keys from memory
    pub fn lock(&self) -> Result<()> {
        let mut state = self.state.write();
        let public = match &*state {
            KeyState::Closed => return Err(closed_error()),
            KeyState::Locked { .. } => return Ok(()),
            KeyState::Unlocked { public, .. } => public.clone(),
        };
        *state = KeyState::Locked { public };
        tracing::info!("Key store locked");
        Ok(())
    }

    /// Drop every key; the store refuses all operations afterwards
    pub fn close(&self) {
        *self.state.write() = KeyState::Closed;
    }

    /// Refresh the cached passphrase hash after a private passphrase change
    pub fn passphrase_changed(&self, record: &KeyStoreRecord, new_passphrase: &[u8]) {
        if let KeyState::Unlocked { keys, .. } = &mut *self.state.write() {
            keys.passphrase_hash = hash_passphrase(&record.passphrase_hash_salt, new_passphrase);
        }
    }

    /// Run `f` with the requested crypto key
    ///
    /// The public key is available while locked; the others need an unlock.
    pub fn with_key<T, F>(&self, key_type: CryptoKeyType, f: F) -> Result<T>
    where
        F: FnOnce(&SymmetricKey) -> Result<T>,
    {
        let state = self.state.read();
        match (&*state, key_type) {
            (KeyState::Closed, _) => Err(closed_error()),
            (KeyState::Locked { public } | KeyState::Unlocked { public, .. }, CryptoKeyType::Public) => {
                f(public)
            }
            (KeyState::Locked { .. }, _) => Err(Error::Locked(format!(
                "{:?} key unavailable",
                key_type
            ))),
            (KeyState::Unlocked { keys, .. }, CryptoKeyType::Private) => f(&keys.private),
            (KeyState::Unlocked { keys, .. }, CryptoKeyType::Script) => f(&keys.script),
        }
    }

    /// Run `f` with the public, private and script keys
    pub fn with_unlocked<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&SymmetricKey, &SymmetricKey, &SymmetricKey) -> Result<T>,
    {
        match &*self.state.read() {
            KeyState::Closed => Err(closed_error()),
            KeyState::Locked { .. } => Err(Error::Locked("private keys unavailable".to_string())),
            KeyState::Unlocked { public, keys } => f(public, &keys.private, &keys.script),
        }
    }

    /// Encrypt with the requested crypto key
    pub fn encrypt(&self, key_type: CryptoKeyType, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.with_key(key_type, |key| key.encrypt(plaintext))
    }

    /// Decrypt with the requested crypto key
    pub fn decrypt(&self, key_type: CryptoKeyType, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        self.with_key(key_type, |key| key.decrypt(ciphertext))
    }
}
