//! Wallet configuration

use dagwallet_core::DEFAULT_RELAY_FEE_PER_KB;
use dagwallet_params::{ChainParams, ConsensusParams, NetworkType};
use dagwallet_storage_sqlite::{EncryptionAlgorithm, KdfParams, ManagerOptions};
use dagwallet_sync::SyncConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default confirmation depth for spendable balances
pub const DEFAULT_MIN_CONFIRMATIONS: i32 = 1;

/// Everything needed to open a wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Network the wallet lives on
    pub network: NetworkType,
    /// SQLite database file
    pub db_path: PathBuf,
    /// Confirmations for a credit to count as spendable
    pub min_confirmations: i32,
    /// Relay fee rate in atoms per 1000 bytes
    pub fee_per_kb: i64,
    /// Argon2id cost for new key stores
    pub kdf: KdfParams,
    /// Cipher for new key stores
    pub algorithm: EncryptionAlgorithm,
    /// Lock again this long after an unlock that names no timeout
    pub auto_lock: Option<Duration>,
    /// Node sync behaviour
    pub sync: SyncConfig,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            network: NetworkType::Mainnet,
            db_path: PathBuf::from("wallet.db"),
            min_confirmations: DEFAULT_MIN_CONFIRMATIONS,
            fee_per_kb: DEFAULT_RELAY_FEE_PER_KB,
            kdf: KdfParams::default(),
            algorithm: EncryptionAlgorithm::default(),
            auto_lock: None,
            sync: SyncConfig::default(),
        }
    }
}

impl WalletConfig {
    /// Defaults for `network` with the database at `db_path`
    pub fn new(network: NetworkType, db_path: impl Into<PathBuf>) -> Self {
        Self {
            network,
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    /// Chain parameters of the configured network
    pub fn chain_params(&self) -> ChainParams {
        ChainParams::from_type(self.network)
    }

    /// Consensus parameters of the configured network
    pub fn consensus_params(&self) -> ConsensusParams {
        ConsensusParams::from_network(self.network)
    }

    /// Key store options for a new wallet
    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            kdf: self.kdf,
            algorithm: self.algorithm,
        }
    }
}
