//! Key derivation and key encodings
//!
//! Hierarchical keys follow BIP-32 over secp256k1. Account keys live at
//! `m/purpose'/coin_type'/account'`, addresses at `.../branch/index`.

use crate::hash::hash160;
use crate::{Error, Result};
use bip32::{ChildNumber, Prefix, XPrv, XPub};
use bip39::{Language, Mnemonic};
use dagwallet_params::{ChainParams, NetworkType};
use rand::RngCore;
use secp256k1::{ecdsa, Message, PublicKey, Secp256k1, SecretKey};
use std::str::FromStr;
use zeroize::Zeroizing;

/// First hardened child index
pub const HARDENED_KEY_START: u32 = 0x8000_0000;

/// Branch for receiving addresses
pub const EXTERNAL_BRANCH: u32 = 0;

/// Branch for change addresses
pub const INTERNAL_BRANCH: u32 = 1;

/// Serialized size of a compressed public key
pub const PUBKEY_COMPRESSED_SIZE: usize = 33;

fn child(index: u32, hardened: bool) -> Result<ChildNumber> {
    ChildNumber::new(index, hardened)
        .map_err(|e| Error::InvalidKey(format!("child index {}: {}", index, e)))
}

fn key_prefix(network: NetworkType, private: bool) -> Prefix {
    match (network == NetworkType::Mainnet, private) {
        (true, true) => Prefix::XPRV,
        (true, false) => Prefix::XPUB,
        (false, true) => Prefix::TPRV,
        (false, false) => Prefix::TPUB,
    }
}

/// BIP-32 extended private key
#[derive(Clone)]
pub struct ExtendedPrivateKey {
    inner: XPrv,
}

impl ExtendedPrivateKey {
    /// Master key from a seed
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let inner = XPrv::new(seed).map_err(|e| Error::InvalidKey(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Derive a child key
    pub fn derive_child(&self, index: u32, hardened: bool) -> Result<Self> {
        let inner = self
            .inner
            .derive_child(child(index, hardened)?)
            .map_err(|e| Error::InvalidKey(format!("derive {}: {}", index, e)))?;
        Ok(Self { inner })
    }

    /// Account key at `m/purpose'/coin_type'/account'`
    pub fn derive_account(&self, purpose: u32, coin_type: u32, account: u32) -> Result<Self> {
        self.derive_child(purpose, true)?
            .derive_child(coin_type, true)?
            .derive_child(account, true)
    }

    /// Neutered counterpart
    pub fn public_key(&self) -> ExtendedPublicKey {
        ExtendedPublicKey {
            inner: self.inner.public_key(),
        }
    }

    /// Leaf private key
    pub fn private_key(&self) -> Result<PrivateKey> {
        let bytes = Zeroizing::new(self.inner.to_bytes());
        PrivateKey::from_bytes(bytes.as_ref())
    }

    /// Serialized `xprv` / `tprv` string
    pub fn to_string_for(&self, network: NetworkType) -> Zeroizing<String> {
        self.inner.to_string(key_prefix(network, true))
    }

    /// Parse a serialized extended private key
    pub fn parse(s: &str) -> Result<Self> {
        let inner = XPrv::from_str(s).map_err(|e| Error::InvalidKey(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Derivation depth
    pub fn depth(&self) -> u8 {
        self.inner.attrs().depth
    }
}

impl std::fmt::Debug for ExtendedPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtendedPrivateKey")
            .field("depth", &self.depth())
            .finish_non_exhaustive()
    }
}

/// BIP-32 extended public key
#[derive(Clone)]
pub struct ExtendedPublicKey {
    inner: XPub,
}

impl ExtendedPublicKey {
    /// Derive a non-hardened child
    pub fn derive_child(&self, index: u32) -> Result<Self> {
        let inner = self
            .inner
            .derive_child(child(index, false)?)
            .map_err(|e| Error::InvalidKey(format!("derive {}: {}", index, e)))?;
        Ok(Self { inner })
    }

    /// Compressed SEC1 public key of this node
    pub fn pubkey_bytes(&self) -> [u8; PUBKEY_COMPRESSED_SIZE] {
        self.inner.to_bytes()
    }

    /// hash160 of the compressed public key
    pub fn pubkey_hash(&self) -> [u8; 20] {
        hash160(&self.pubkey_bytes())
    }

    /// Serialized `xpub` / `tpub` string
    pub fn to_string_for(&self, network: NetworkType) -> String {
        self.inner.to_string(key_prefix(network, false))
    }

    /// Parse a serialized extended public key
    pub fn parse(s: &str) -> Result<Self> {
        let inner = XPub::from_str(s).map_err(|e| Error::InvalidKey(e.to_string()))?;
        Ok(Self { inner })
    }
}

impl std::fmt::Debug for ExtendedPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExtendedPublicKey({})", hex::encode(self.pubkey_bytes()))
    }
}

/// A single secp256k1 private key
#[derive(Clone)]
pub struct PrivateKey {
    secret: SecretKey,
}

impl PrivateKey {
    /// Create from 32 raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let secret =
            SecretKey::from_slice(bytes).map_err(|e| Error::InvalidKey(e.to_string()))?;
        Ok(Self { secret })
    }

    /// Fresh random key
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; 32]);
        loop {
            rand::rngs::OsRng.fill_bytes(bytes.as_mut());
            if let Ok(secret) = SecretKey::from_slice(bytes.as_ref()) {
                return Self { secret };
            }
        }
    }

    /// Raw scalar
    pub fn to_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.secret.secret_bytes())
    }

    /// Compressed public key
    pub fn public_key_bytes(&self) -> [u8; PUBKEY_COMPRESSED_SIZE] {
        let secp = Secp256k1::signing_only();
        PublicKey::from_secret_key(&secp, &self.secret).serialize()
    }

    /// DER signature over a 32-byte digest
    pub fn sign(&self, digest: &[u8; 32]) -> Result<Vec<u8>> {
        let secp = Secp256k1::signing_only();
        let msg = Message::from_slice(digest).map_err(|e| Error::Crypto(e.to_string()))?;
        Ok(secp.sign_ecdsa(&msg, &self.secret).serialize_der().to_vec())
    }

    /// Wallet import format for `network`
    pub fn to_wif(&self, network: NetworkType) -> Zeroizing<String> {
        let mut payload = Zeroizing::new(Vec::with_capacity(34));
        payload.push(ChainParams::from_type(network).wif_id);
        payload.extend_from_slice(&self.secret.secret_bytes());
        payload.push(0x01);
        Zeroizing::new(bs58::encode(payload.as_slice()).with_check().into_string())
    }

    /// Decode a WIF key that must belong to `params`
    pub fn decode_wif(wif: &str, params: &ChainParams) -> Result<Self> {
        let payload = Zeroizing::new(
            bs58::decode(wif)
                .with_check(None)
                .into_vec()
                .map_err(|e| Error::InvalidKey(format!("malformed WIF: {}", e)))?,
        );
        let body = match payload.len() {
            34 if payload[33] == 0x01 => &payload[1..33],
            33 => &payload[1..33],
            n => return Err(Error::InvalidKey(format!("WIF payload is {} bytes", n))),
        };
        if payload[0] != params.wif_id {
            let known = NetworkType::ALL
                .into_iter()
                .any(|n| ChainParams::from_type(n).wif_id == payload[0]);
            return Err(if known {
                Error::WrongNetwork(format!("WIF key is not for {}", params.network_type))
            } else {
                Error::InvalidKey(format!("unknown WIF version {:#04x}", payload[0]))
            });
        }
        Self::from_bytes(body)
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

/// Check a DER signature over `digest` against a compressed public key
pub fn verify_signature(pubkey: &[u8], digest: &[u8; 32], der: &[u8]) -> bool {
    let secp = Secp256k1::verification_only();
    let (Ok(pk), Ok(sig), Ok(msg)) = (
        PublicKey::from_slice(pubkey),
        ecdsa::Signature::from_der(der),
        Message::from_slice(digest),
    ) else {
        return false;
    };
    secp.verify_ecdsa(&msg, &sig, &pk).is_ok()
}

/// BIP-39 seed from a mnemonic phrase
pub fn seed_from_mnemonic(mnemonic: &str, passphrase: &str) -> Result<Zeroizing<[u8; 64]>> {
    let mnemonic = Mnemonic::parse_in_normalized(Language::English, mnemonic)
        .map_err(|e| Error::InvalidKey(format!("mnemonic: {}", e)))?;
    Ok(Zeroizing::new(mnemonic.to_seed(passphrase)))
}

/// Generate a new mnemonic phrase of 12, 18 or 24 words
pub fn generate_mnemonic(word_count: usize) -> Result<Zeroizing<String>> {
    let entropy_size = match word_count {
        12 => 16,
        18 => 24,
        24 => 32,
        n => {
            return Err(Error::InvalidArgument(format!(
                "mnemonic must have 12, 18 or 24 words, not {}",
                n
            )))
        }
    };
    let mut entropy = Zeroizing::new(vec![0u8; entropy_size]);
    rand::rngs::OsRng.fill_bytes(&mut entropy);
    let mnemonic =
        Mnemonic::from_entropy(&entropy).map_err(|e| Error::InvalidKey(e.to_string()))?;
    Ok(Zeroizing::new(mnemonic.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn master() -> ExtendedPrivateKey {
        let seed = seed_from_mnemonic(PHRASE, "").unwrap();
        ExtendedPrivateKey::from_seed(seed.as_ref()).unwrap()
    }

    #[test]
    fn test_public_derivation_matches_private() {
        let account = master().derive_account(44, 1, 0).unwrap();
        let via_private = account
            .derive_child(EXTERNAL_BRANCH, false)
            .unwrap()
            .derive_child(5, false)
            .unwrap()
            .public_key();
        let via_public = account
            .public_key()
            .derive_child(EXTERNAL_BRANCH)
            .unwrap()
            .derive_child(5)
            .unwrap();
        assert_eq!(via_private.pubkey_bytes(), via_public.pubkey_bytes());
        assert_eq!(account.depth(), 3);
    }

    #[test]
    fn test_extended_key_strings() {
        let account = master().derive_account(44, 1, 0).unwrap();
        let s = account.to_string_for(NetworkType::Testnet);
        assert!(s.starts_with("tprv"));
        let parsed = ExtendedPrivateKey::parse(&s).unwrap();
        assert_eq!(
            parsed.public_key().pubkey_bytes(),
            account.public_key().pubkey_bytes()
        );
        let xpub = account.public_key().to_string_for(NetworkType::Mainnet);
        assert!(xpub.starts_with("xpub"));
        assert!(ExtendedPublicKey::parse(&xpub).is_ok());
    }

    #[test]
    fn test_leaf_key_matches_extended_pubkey() {
        let leaf = master().derive_child(0, true).unwrap();
        let pk = leaf.private_key().unwrap();
        assert_eq!(pk.public_key_bytes(), leaf.public_key().pubkey_bytes());
    }

    #[test]
    fn test_wif_network_check() {
        let key = PrivateKey::generate();
        let wif = key.to_wif(NetworkType::Testnet);
        let back = PrivateKey::decode_wif(&wif, &ChainParams::testnet()).unwrap();
        assert_eq!(back.public_key_bytes(), key.public_key_bytes());
        let err = PrivateKey::decode_wif(&wif, &ChainParams::mainnet()).unwrap_err();
        assert!(matches!(err, Error::WrongNetwork(_)));
        assert!(PrivateKey::decode_wif("notakey", &ChainParams::mainnet()).is_err());
    }

    #[test]
    fn test_sign_and_verify() {
        let key = PrivateKey::generate();
        let digest = [7u8; 32];
        let sig = key.sign(&digest).unwrap();
        assert!(verify_signature(&key.public_key_bytes(), &digest, &sig));
        assert!(!verify_signature(&key.public_key_bytes(), &[8u8; 32], &sig));
    }

    #[test]
    fn test_mnemonic_generation() {
        let phrase = generate_mnemonic(12).unwrap();
        assert_eq!(phrase.split_whitespace().count(), 12);
        assert!(seed_from_mnemonic(&phrase, "pw").is_ok());
        assert!(generate_mnemonic(13).is_err());
        assert!(seed_from_mnemonic("not a phrase", "").is_err());
    }
}
