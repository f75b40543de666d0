//! Consensus parameters relevant to the wallet

use crate::network::{ChainParams, NetworkType};

/// Atoms (smallest indivisible units) per coin
pub const ATOMS_PER_COIN: i64 = 100_000_000;

/// Maximum representable monetary amount, in atoms
pub const MAX_ATOMS: i64 = 21_000_000 * ATOMS_PER_COIN;

/// Consensus parameters
#[derive(Debug, Clone)]
pub struct ConsensusParams {
    /// Chain parameters
    pub chain: ChainParams,
    /// Target block time in seconds
    pub block_time_target: u32,
    /// Coinbase maturity (blocks)
    pub coinbase_maturity: u32,
    /// Maximum supply (atoms)
    pub max_money: i64,
}

impl ConsensusParams {
    /// Create consensus params for mainnet
    pub fn mainnet() -> Self {
        Self {
            chain: ChainParams::mainnet(),
            block_time_target: 30,
            coinbase_maturity: 720,
            max_money: MAX_ATOMS,
        }
    }

    /// Create consensus params for testnet
    pub fn testnet() -> Self {
        Self {
            chain: ChainParams::testnet(),
            block_time_target: 30,
            coinbase_maturity: 720,
            max_money: MAX_ATOMS,
        }
    }

    /// Create consensus params for mixnet
    pub fn mixnet() -> Self {
        Self {
            chain: ChainParams::mixnet(),
            block_time_target: 30,
            coinbase_maturity: 16,
            max_money: MAX_ATOMS,
        }
    }

    /// Create consensus params for privnet
    pub fn privnet() -> Self {
        Self {
            chain: ChainParams::privnet(),
            block_time_target: 1, // 1 second for testing
            coinbase_maturity: 16,
            max_money: MAX_ATOMS,
        }
    }

    /// Get consensus params by network type
    pub fn from_network(network_type: NetworkType) -> Self {
        match network_type {
            NetworkType::Mainnet => Self::mainnet(),
            NetworkType::Testnet => Self::testnet(),
            NetworkType::Mixnet => Self::mixnet(),
            NetworkType::Privnet => Self::privnet(),
        }
    }

    /// Check if amount is valid (within max supply)
    pub fn is_valid_amount(&self, amount: i64) -> bool {
        (0..=self.max_money).contains(&amount)
    }

    /// Whether a coinbase output mined at `height` is spendable at `tip`
    pub fn is_coinbase_mature(&self, height: i32, tip: i32) -> bool {
        if height < 0 || tip < height {
            return false;
        }
        (tip - height) as i64 + 1 > self.coinbase_maturity as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mainnet_consensus() {
        let params = ConsensusParams::mainnet();
        assert_eq!(params.coinbase_maturity, 720);
        assert_eq!(params.chain.network_type, NetworkType::Mainnet);
    }

    #[test]
    fn test_valid_amount() {
        let params = ConsensusParams::mainnet();
        assert!(params.is_valid_amount(1_000_000));
        assert!(params.is_valid_amount(params.max_money));
        assert!(!params.is_valid_amount(params.max_money + 1));
        assert!(!params.is_valid_amount(-1));
    }

    #[test]
    fn test_coinbase_maturity() {
        let params = ConsensusParams::privnet();
        assert!(!params.is_coinbase_mature(100, 100));
        assert!(!params.is_coinbase_mature(100, 114));
        assert!(params.is_coinbase_mature(100, 116));
        assert!(!params.is_coinbase_mature(-1, 500));
    }
}
