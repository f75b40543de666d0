//! Payment addresses
//!
//! String form is base58check of `version(2) || hash160(20)`. The version
//! bytes identify both the network and the address kind.

use crate::hash::{hash160, HASH160_SIZE};
use crate::script::{self, ScriptClass};
use crate::{Error, Result};
use dagwallet_params::{ChainParams, NetworkType};
use std::fmt;
use std::str::FromStr;

const ADDRESS_PAYLOAD_LEN: usize = 2 + HASH160_SIZE;

/// A decoded address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    /// Pays to the hash160 of a compressed public key
    PubKeyHash {
        /// hash160 of the public key
        hash: [u8; HASH160_SIZE],
        /// Network the address belongs to
        network: NetworkType,
    },
    /// Pays to the hash160 of a redeem script
    ScriptHash {
        /// hash160 of the script
        hash: [u8; HASH160_SIZE],
        /// Network the address belongs to
        network: NetworkType,
    },
}

impl Address {
    /// Address for a serialized public key
    pub fn from_pubkey(pubkey: &[u8], network: NetworkType) -> Self {
        Address::PubKeyHash {
            hash: hash160(pubkey),
            network,
        }
    }

    /// Address for a redeem script
    pub fn from_script(redeem_script: &[u8], network: NetworkType) -> Self {
        Address::ScriptHash {
            hash: hash160(redeem_script),
            network,
        }
    }

    /// Address an output script pays to, if it is a standard template
    pub fn from_pk_script(pk_script: &[u8], network: NetworkType) -> Option<Self> {
        match script::classify(pk_script) {
            ScriptClass::PubKeyHash(hash) => Some(Address::PubKeyHash { hash, network }),
            ScriptClass::ScriptHash(hash) => Some(Address::ScriptHash { hash, network }),
            ScriptClass::NullData | ScriptClass::NonStandard => None,
        }
    }

    /// Decode and require the address to belong to `params`
    pub fn decode(s: &str, params: &ChainParams) -> Result<Self> {
        let addr: Address = s.parse()?;
        if addr.network() != params.network_type {
            return Err(Error::WrongNetwork(format!(
                "address {} is for {}, wallet is on {}",
                s,
                addr.network(),
                params.network_type
            )));
        }
        Ok(addr)
    }

    /// The hash160 payload
    pub fn hash160(&self) -> &[u8; HASH160_SIZE] {
        match self {
            Address::PubKeyHash { hash, .. } | Address::ScriptHash { hash, .. } => hash,
        }
    }

    /// Network of this address
    pub fn network(&self) -> NetworkType {
        match self {
            Address::PubKeyHash { network, .. } | Address::ScriptHash { network, .. } => *network,
        }
    }

    /// Whether this is a script-hash address
    pub fn is_script_hash(&self) -> bool {
        matches!(self, Address::ScriptHash { .. })
    }

    /// Locking script paying to this address
    pub fn pay_script(&self) -> Vec<u8> {
        match self {
            Address::PubKeyHash { hash, .. } => script::pay_to_pubkey_hash(hash),
            Address::ScriptHash { hash, .. } => script::pay_to_script_hash(hash),
        }
    }

    fn version(&self) -> [u8; 2] {
        let params = ChainParams::from_type(self.network());
        match self {
            Address::PubKeyHash { .. } => params.pubkey_hash_addr_id,
            Address::ScriptHash { .. } => params.script_hash_addr_id,
        }
    }

    /// Base58check string form
    pub fn encode(&self) -> String {
        let mut payload = Vec::with_capacity(ADDRESS_PAYLOAD_LEN);
        payload.extend_from_slice(&self.version());
        payload.extend_from_slice(self.hash160());
        bs58::encode(payload).with_check().into_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let payload = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", s, e)))?;
        if payload.len() != ADDRESS_PAYLOAD_LEN {
            return Err(Error::InvalidAddress(format!(
                "{}: payload is {} bytes",
                s,
                payload.len()
            )));
        }
        let version = [payload[0], payload[1]];
        let network = ChainParams::network_of_addr_id(version)
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", s, e)))?;
        let mut hash = [0u8; HASH160_SIZE];
        hash.copy_from_slice(&payload[2..]);

        if ChainParams::from_type(network).pubkey_hash_addr_id == version {
            Ok(Address::PubKeyHash { hash, network })
        } else {
            Ok(Address::ScriptHash { hash, network })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_pubkey_hash() {
        let addr = Address::from_pubkey(&[2u8; 33], NetworkType::Testnet);
        let s = addr.to_string();
        let parsed = Address::decode(&s, &ChainParams::testnet()).unwrap();
        assert_eq!(parsed, addr);
        assert!(!parsed.is_script_hash());
    }

    #[test]
    fn test_script_hash_kind_preserved() {
        let addr = Address::from_script(&[0x51], NetworkType::Privnet);
        let parsed: Address = addr.to_string().parse().unwrap();
        assert!(parsed.is_script_hash());
        assert_eq!(parsed.network(), NetworkType::Privnet);
    }

    #[test]
    fn test_wrong_network() {
        let addr = Address::from_pubkey(&[2u8; 33], NetworkType::Mainnet);
        let err = Address::decode(&addr.to_string(), &ChainParams::testnet()).unwrap_err();
        assert!(matches!(err, Error::WrongNetwork(_)));
    }

    #[test]
    fn test_bad_checksum() {
        let mut s = Address::from_pubkey(&[2u8; 33], NetworkType::Mainnet).to_string();
        let last = s.pop().unwrap();
        s.push(if last == '1' { '2' } else { '1' });
        assert!(matches!(s.parse::<Address>(), Err(Error::InvalidAddress(_))));
        assert!(matches!("".parse::<Address>(), Err(Error::InvalidAddress(_))));
    }

    #[test]
    fn test_from_pk_script() {
        let addr = Address::from_pubkey(&[3u8; 33], NetworkType::Mainnet);
        let script = addr.pay_script();
        assert_eq!(
            Address::from_pk_script(&script, NetworkType::Mainnet),
            Some(addr)
        );
        assert_eq!(Address::from_pk_script(&[0x6a], NetworkType::Mainnet), None);
    }
}
