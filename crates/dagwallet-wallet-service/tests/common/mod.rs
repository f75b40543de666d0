//! Fixtures for the wallet service suites

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use dagwallet_core::keys::seed_from_mnemonic;
use dagwallet_core::test_helpers::TEST_MNEMONIC;
use dagwallet_core::{Address, Amount, CoinId, PrivateKey};
use dagwallet_params::NetworkType;
use dagwallet_storage_sqlite::{Balance, Balances, KdfParams};
use dagwallet_wallet_service::{Wallet, WalletConfig};
use tempfile::TempDir;

pub const PUBLIC: &[u8] = b"public";
pub const PRIVATE: &[u8] = b"private";

/// Testnet config with a cheap KDF
pub fn fast_config(dir: &TempDir) -> WalletConfig {
    let mut config = WalletConfig::new(NetworkType::Testnet, dir.path().join("wallet.db"));
    config.kdf = KdfParams::new(64, 1, 1);
    config
}

/// Fresh wallet from the test mnemonic, locked
pub fn new_wallet() -> (TempDir, Wallet) {
    let dir = tempfile::tempdir().unwrap();
    let seed = seed_from_mnemonic(TEST_MNEMONIC, "").unwrap();
    let wallet = Wallet::create(
        fast_config(&dir),
        seed.as_ref(),
        PUBLIC,
        PRIVATE,
        Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
    )
    .unwrap();
    (dir, wallet)
}

/// Next receiving address of the default account
pub fn receive_address(wallet: &Wallet) -> Address {
    wallet
        .new_address(wallet.default_scope(), 0)
        .unwrap()
        .address
}

/// Address nobody in the test owns
pub fn foreign_address() -> Address {
    Address::from_pubkey(&PrivateKey::generate().public_key_bytes(), NetworkType::Testnet)
}

/// Native coin balance, zero when the coin never appeared
pub fn meer(balances: &Balances) -> Balance {
    balances.get(&CoinId::MEER).copied().unwrap_or_default()
}

pub fn atoms(n: i64) -> Amount {
    Amount::from_atoms(n)
}
