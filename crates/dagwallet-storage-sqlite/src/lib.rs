//! SQLite storage for the DAG wallet
//!
//! One database file holds the encrypted key store, the hierarchical
//! address manager, the transaction ledger and the sync cursor. WAL mode
//! with a single writer and a small reader pool; every mutation runs inside
//! one `BEGIN IMMEDIATE` transaction.
//!
//! ## Key protection
//!
//! - **Passphrase KDF**: Argon2id, salted per passphrase
//! - **Key wrapping**: ChaCha20-Poly1305 (default) or AES-256-GCM
//! - **Three crypto keys**: public data, private keys and scripts each have
//!   their own key; only the public one is available while locked
//! - **Watch-only**: private material can be stripped irreversibly

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod accounts;
pub mod addresses;
pub mod database;
pub mod error;
pub mod keystore;
pub mod ledger;
pub mod manager;
pub mod migrations;
pub mod security;
pub mod sync_state;

pub use accounts::{AccountInfo, KeyScope};
pub use addresses::{AddressKind, ManagedAddress, SyncStatus};
pub use database::{Database, BASE_BACKOFF_MS, MAX_BACKOFF_MS, MAX_BUSY_RETRIES};
pub use error::{Error, Result, SqlResultExt};
pub use keystore::{CryptoKeyType, KeyStore, KeyStoreRecord, LockState};
pub use ledger::{
    confirmations, Balance, Balances, CreditRecord, DebitRecord, LedgerStore, OutputFilter,
    Payment, SpendInfo, TxDetails, TxRecord,
};
pub use manager::{
    AddressManager, ManagerOptions, BIP44_PURPOSE, DEFAULT_ACCOUNT, DEFAULT_ACCOUNT_NAME,
    IMPORTED_ACCOUNT, IMPORTED_ACCOUNT_NAME,
};
pub use security::{EncryptionAlgorithm, KdfParams, SymmetricKey};
pub use sync_state::{SyncState, SyncStateStorage};
