//! Network definitions

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Network type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// Mainnet
    Mainnet,
    /// Public testnet
    Testnet,
    /// Mixed-consensus test network
    Mixnet,
    /// Private network (local development)
    Privnet,
}

impl NetworkType {
    /// All known networks, in declaration order.
    pub const ALL: [NetworkType; 4] = [
        NetworkType::Mainnet,
        NetworkType::Testnet,
        NetworkType::Mixnet,
        NetworkType::Privnet,
    ];

    /// Lowercase network name
    pub const fn name(&self) -> &'static str {
        match self {
            NetworkType::Mainnet => "mainnet",
            NetworkType::Testnet => "testnet",
            NetworkType::Mixnet => "mixnet",
            NetworkType::Privnet => "privnet",
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NetworkType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        NetworkType::ALL
            .into_iter()
            .find(|n| n.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidNetwork(s.to_string()))
    }
}

/// Chain parameters the wallet needs for key and address handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainParams {
    /// Network type
    pub network_type: NetworkType,
    /// Human-readable name
    pub name: &'static str,
    /// Coin type (BIP-44)
    pub coin_type: u32,
    /// Version bytes of pay-to-pubkey-hash addresses
    pub pubkey_hash_addr_id: [u8; 2],
    /// Version bytes of pay-to-script-hash addresses
    pub script_hash_addr_id: [u8; 2],
    /// Version byte of WIF-encoded private keys
    pub wif_id: u8,
    /// Hash of the genesis block
    pub genesis_hash: [u8; 32],
    /// Default node RPC port
    pub rpc_port: u16,
}

impl ChainParams {
    /// Get mainnet parameters
    pub const fn mainnet() -> Self {
        Self {
            network_type: NetworkType::Mainnet,
            name: "mainnet",
            coin_type: 813,
            pubkey_hash_addr_id: [0x0b, 0xb1],
            script_hash_addr_id: [0x0b, 0x9c],
            wif_id: 0x80,
            genesis_hash: [
                0x7e, 0x2a, 0x01, 0xd3, 0x45, 0x9b, 0xc1, 0x0f, 0x62, 0x8c, 0x3a, 0x55, 0x20,
                0xe4, 0x17, 0x91, 0xa8, 0x3d, 0x6b, 0xf0, 0x12, 0x9e, 0x77, 0x04, 0xc5, 0x38,
                0xd6, 0x4f, 0x81, 0x2b, 0x00, 0x00,
            ],
            rpc_port: 8131,
        }
    }

    /// Get testnet parameters
    pub const fn testnet() -> Self {
        Self {
            network_type: NetworkType::Testnet,
            name: "testnet",
            coin_type: 1,
            pubkey_hash_addr_id: [0x0f, 0x0f],
            script_hash_addr_id: [0x0e, 0xe2],
            wif_id: 0xef,
            genesis_hash: [
                0x19, 0xc4, 0x7e, 0x60, 0x02, 0xdb, 0x83, 0x5a, 0x9f, 0x11, 0x4c, 0xe8, 0x26,
                0x70, 0xb3, 0x0d, 0x5e, 0xa1, 0x94, 0x2c, 0x6f, 0x38, 0xbd, 0x47, 0x01, 0xe9,
                0x72, 0xaa, 0x3c, 0x15, 0x00, 0x00,
            ],
            rpc_port: 18131,
        }
    }

    /// Get mixnet parameters
    pub const fn mixnet() -> Self {
        Self {
            network_type: NetworkType::Mixnet,
            name: "mixnet",
            coin_type: 1,
            pubkey_hash_addr_id: [0x0d, 0xd4],
            script_hash_addr_id: [0x0d, 0xbf],
            wif_id: 0xe8,
            genesis_hash: [
                0x55, 0x0e, 0xb2, 0x93, 0xca, 0x1d, 0x40, 0x7f, 0x03, 0xe6, 0x28, 0x9b, 0x71,
                0x4a, 0x0c, 0xd2, 0x36, 0x85, 0xf8, 0x61, 0x1b, 0xa7, 0x5c, 0x90, 0x2e, 0x44,
                0xb9, 0x07, 0xee, 0x33, 0x00, 0x00,
            ],
            rpc_port: 28131,
        }
    }

    /// Get private network parameters
    pub const fn privnet() -> Self {
        Self {
            network_type: NetworkType::Privnet,
            name: "privnet",
            coin_type: 1,
            pubkey_hash_addr_id: [0x0d, 0xf1],
            script_hash_addr_id: [0x0d, 0xda],
            wif_id: 0x22,
            genesis_hash: [
                0xa1, 0x5b, 0x09, 0xc7, 0x3e, 0x64, 0xf2, 0x18, 0x8d, 0x20, 0x99, 0x4b, 0xe0,
                0x13, 0x7a, 0xcf, 0x52, 0x06, 0xbb, 0x81, 0x3d, 0x6e, 0x24, 0xf5, 0x0a, 0x97,
                0x48, 0xd1, 0x61, 0x2f, 0x00, 0x00,
            ],
            rpc_port: 38131,
        }
    }

    /// Get parameters by network type
    pub const fn from_type(network_type: NetworkType) -> Self {
        match network_type {
            NetworkType::Mainnet => Self::mainnet(),
            NetworkType::Testnet => Self::testnet(),
            NetworkType::Mixnet => Self::mixnet(),
            NetworkType::Privnet => Self::privnet(),
        }
    }

    /// Genesis hash as lowercase hex
    pub fn genesis_hash_hex(&self) -> String {
        hex::encode(self.genesis_hash)
    }

    /// Whether the given address version bytes belong to this network
    pub fn is_own_addr_id(&self, id: [u8; 2]) -> bool {
        id == self.pubkey_hash_addr_id || id == self.script_hash_addr_id
    }

    /// Find the network whose address version bytes are `id`
    pub fn network_of_addr_id(id: [u8; 2]) -> Result<NetworkType> {
        NetworkType::ALL
            .into_iter()
            .find(|n| Self::from_type(*n).is_own_addr_id(id))
            .ok_or_else(|| Error::UnknownVersion(hex::encode(id)))
    }

    /// Whether this network uses mainnet-style extended key prefixes
    pub const fn is_mainnet(&self) -> bool {
        matches!(self.network_type, NetworkType::Mainnet)
    }
}

impl Default for ChainParams {
    fn default() -> Self {
        Self::mainnet()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mainnet_params() {
        let net = ChainParams::mainnet();
        assert_eq!(net.network_type, NetworkType::Mainnet);
        assert_eq!(net.coin_type, 813);
        assert!(net.is_mainnet());
        assert!(net.is_own_addr_id(net.pubkey_hash_addr_id));
    }

    #[test]
    fn test_network_from_type() {
        for network_type in NetworkType::ALL {
            let net = ChainParams::from_type(network_type);
            assert_eq!(net.network_type, network_type);
            assert_eq!(net.name, network_type.name());
        }
    }

    #[test]
    fn test_version_bytes_are_unique() {
        let mut ids = Vec::new();
        let mut wifs = Vec::new();
        for network_type in NetworkType::ALL {
            let net = ChainParams::from_type(network_type);
            ids.push(net.pubkey_hash_addr_id);
            ids.push(net.script_hash_addr_id);
            wifs.push(net.wif_id);
        }
        ids.sort();
        ids.dedup();
        wifs.sort();
        wifs.dedup();
        assert_eq!(ids.len(), 8);
        assert_eq!(wifs.len(), 4);
    }

    #[test]
    fn test_network_of_addr_id() {
        let testnet = ChainParams::testnet();
        assert_eq!(
            ChainParams::network_of_addr_id(testnet.script_hash_addr_id).unwrap(),
            NetworkType::Testnet
        );
        assert!(ChainParams::network_of_addr_id([0xff, 0xff]).is_err());
    }

    #[test]
    fn test_network_type_parse() {
        assert_eq!("MixNet".parse::<NetworkType>().unwrap(), NetworkType::Mixnet);
        assert!("regtest".parse::<NetworkType>().is_err());
        let json = serde_json::to_string(&NetworkType::Privnet).unwrap();
        assert_eq!(json, "\"privnet\"");
    }
}
