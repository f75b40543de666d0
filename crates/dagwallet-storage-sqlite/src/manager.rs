//! Address manager lifecycle
//!
//! Owns the key store, the key scopes and the sync cursor. Account and
//! address operations live in [`crate::accounts`] and [`crate::addresses`].
//!
//! ```text
//! Uninitialized --create--> Closed --load--> Locked <--unlock/lock--> Unlocked
//!                                              \                       /
//!                                               +------ close ------->+--> Closed
//! ```

use crate::accounts::{AccountRow, KeyScope};
use crate::addresses::{AddressKindTag, AddressRow};
use crate::error::SqlResultExt;
use crate::keystore::{KeyStore, KeyStoreRecord, LockState, MANAGER_VERSION};
use crate::security::{EncryptionAlgorithm, KdfParams, SymmetricKey};
use crate::sync_state::{SyncState, SyncStateStorage};
use crate::{Database, Error, Result};
use chrono::{DateTime, Duration, Utc};
use dagwallet_core::codec::Codec;
use dagwallet_core::keys::ExtendedPrivateKey;
use dagwallet_core::{BlockStamp, Hash256};
use dagwallet_params::ChainParams;
use parking_lot::RwLock;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// BIP-44 purpose
pub const BIP44_PURPOSE: u32 = 44;

/// Account created with every scope
pub const DEFAULT_ACCOUNT: u32 = 0;

/// Name of [`DEFAULT_ACCOUNT`]
pub const DEFAULT_ACCOUNT_NAME: &str = "default";

/// Account holding imported keys and scripts
pub const IMPORTED_ACCOUNT: u32 = u32::MAX;

/// Reserved name of [`IMPORTED_ACCOUNT`]
pub const IMPORTED_ACCOUNT_NAME: &str = "imported";

/// Seed length bounds accepted by BIP-32
pub const MIN_SEED_LEN: usize = 16;
/// Seed length bounds accepted by BIP-32
pub const MAX_SEED_LEN: usize = 64;

/// Blocks mined slightly before the stated birthday still count
fn birthday_slack() -> Duration {
    Duration::hours(48)
}

/// Key store cost and cipher for a new manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ManagerOptions {
    /// Argon2id cost for both master keys
    pub kdf: KdfParams,
    /// Cipher for wrapped secrets
    pub algorithm: EncryptionAlgorithm,
}

/// Hierarchical key and address manager
pub struct AddressManager {
    db: Arc<Database>,
    params: ChainParams,
    keys: KeyStore,
    record: RwLock<KeyStoreRecord>,
}

impl AddressManager {
    /// Whether a manager has been created in `db`
    pub fn exists(db: &Database) -> Result<bool> {
        db.read(|conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM manager_meta WHERE id = 1)",
                [],
                |row| row.get(0),
            )
            .storage()
        })
    }

    /// Create a new manager from `seed`
    ///
    /// Writes the key store, the default BIP-44 scope with its `default` and
    /// `imported` accounts, and a sync cursor sitting on the genesis block.
    /// The stored birthday is `birthday` minus 48 hours.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        db: &Database,
        seed: &[u8],
        public_passphrase: &[u8],
        private_passphrase: &[u8],
        params: &ChainParams,
        birthday: DateTime<Utc>,
        options: &ManagerOptions,
    ) -> Result<()> {
        if !(MIN_SEED_LEN..=MAX_SEED_LEN).contains(&seed.len()) {
            return Err(Error::InvalidArgument(format!(
                "seed must be {}..={} bytes, got {}",
                MIN_SEED_LEN,
                MAX_SEED_LEN,
                seed.len()
            )));
        }
        if Self::exists(db)? {
            return Err(Error::AlreadyExists("address manager".to_string()));
        }

        let (mut record, crypto) = KeyStoreRecord::create(
            public_passphrase,
            private_passphrase,
            options.kdf,
            options.algorithm,
        )?;
        let master = ExtendedPrivateKey::from_seed(seed)?;
        let network = params.network_type;
        record.master_hd_private =
            Some(crypto.private.encrypt(master.to_string_for(network).as_bytes())?);

        let genesis = BlockStamp::new(0, Hash256(params.genesis_hash), 0);
        let state = SyncState::new(genesis, birthday - birthday_slack());
        let scope = KeyScope::bip44(params.coin_type);

        db.write(|tx| {
            tx.execute(
                r#"
                INSERT INTO manager_meta (id, version, network, watch_only, created_at, key_store)
                VALUES (1, ?1, ?2, 0, ?3, ?4)
                "#,
                params![
                    MANAGER_VERSION,
                    params.name,
                    Utc::now().timestamp(),
                    record.to_bytes()
                ],
            )
            .storage()?;
            insert_scope_tx(tx, &master, scope, &crypto.public, &crypto.private, params)?;
            SyncStateStorage::save_sync_state_tx(tx, &state)?;
            SyncStateStorage::record_block_tx(tx, &genesis)?;
            Ok(())
        })?;

        tracing::info!(
            "Created address manager on {} (scope {}, birthday {})",
            params.name,
            scope,
            state.birthday
        );
        Ok(())
    }

    /// Open an existing manager with the public passphrase
    ///
    /// The manager comes up locked.
    pub fn load(db: Arc<Database>, public_passphrase: &[u8], params: &ChainParams) -> Result<Self> {
        let meta: Option<(u32, String, Vec<u8>)> = db.read(|conn| {
            conn.query_row(
                "SELECT version, network, key_store FROM manager_meta WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .storage()
        })?;
        let Some((version, network, key_store)) = meta else {
            return Err(Error::NoExist("address manager".to_string()));
        };

        if version != MANAGER_VERSION {
            return Err(Error::Upgrade(format!(
                "manager version {} (supported {})",
                version, MANAGER_VERSION
            )));
        }
        if network != params.name {
            return Err(Error::WrongNetwork(format!(
                "store belongs to {}, requested {}",
                network, params.name
            )));
        }

        let record = KeyStoreRecord::from_bytes(&key_store)?;
        let keys = KeyStore::closed();
        keys.open(&record, public_passphrase)?;

        tracing::info!(
            "Loaded address manager on {}{}",
            params.name,
            if record.is_watch_only() { " (watch-only)" } else { "" }
        );
        Ok(Self {
            db,
            params: params.clone(),
            keys,
            record: RwLock::new(record),
        })
    }

    /// Chain parameters
    pub fn chain_params(&self) -> &ChainParams {
        &self.params
    }

    /// Underlying database
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Default BIP-44 scope of this chain
    pub fn default_scope(&self) -> KeyScope {
        KeyScope::bip44(self.params.coin_type)
    }

    /// Current lock state
    pub fn lock_state(&self) -> LockState {
        self.keys.state()
    }

    /// Whether private keys are unavailable
    pub fn is_locked(&self) -> bool {
        self.keys.is_locked()
    }

    /// Whether private material has been removed
    pub fn is_watch_only(&self) -> bool {
        self.record.read().is_watch_only()
    }

    /// Unlock with the private passphrase
    pub fn unlock(&self, private_passphrase: &[u8]) -> Result<()> {
        self.keys.unlock(&self.record.read(), private_passphrase)
    }

    /// Drop private keys from memory
    pub fn lock(&self) -> Result<()> {
        self.keys.lock()
    }

    /// Drop every key; the manager refuses all further operations
    pub fn close(&self) {
        self.keys.close();
        tracing::info!("Address manager closed");
    }

    /// Re-wrap the public or private crypto keys under `new`
    pub fn change_passphrase(&self, old: &[u8], new: &[u8], private: bool) -> Result<()> {
        self.ensure_open()?;
        let mut record = self.record.read().clone();
        if private {
            if record.is_watch_only() {
                return Err(Error::WatchingOnly("no private passphrase".to_string()));
            }
            record.change_private_passphrase(old, new)?;
        } else {
            record.change_public_passphrase(old, new)?;
        }

        self.db.write(|tx| save_record_tx(tx, &record))?;
        if private {
            self.keys.passphrase_changed(&record, new);
        }
        *self.record.write() = record;

        tracing::info!(
            "Changed {} passphrase",
            if private { "private" } else { "public" }
        );
        Ok(())
    }

    /// Irreversibly remove every private secret
    ///
    /// The manager must be unlocked so stored scripts can be moved under the
    /// public key. It is locked afterwards.
    pub fn convert_to_watch_only(&self) -> Result<()> {
        self.ensure_open()?;
        if self.is_watch_only() {
            return Ok(());
        }
        let mut record = self.record.read().clone();
        record.strip_private();

        self.db.write(|tx| {
            self.keys.with_unlocked(|public, _, script| {
                tx.execute("UPDATE scopes SET coin_priv = NULL", [])
                    .storage()?;

                let accounts = {
                    let mut stmt = tx
                        .prepare("SELECT purpose, coin_type, number, row FROM accounts")
                        .storage()?;
                    let rows = stmt
                        .query_map([], |row| {
                            Ok((
                                row.get::<_, u32>(0)?,
                                row.get::<_, u32>(1)?,
                                row.get::<_, u32>(2)?,
                                row.get::<_, Vec<u8>>(3)?,
                            ))
                        })
                        .storage()?
                        .collect::<std::result::Result<Vec<_>, _>>()
                        .storage()?;
                    rows
                };
                for (purpose, coin_type, number, bytes) in accounts {
                    let mut row = AccountRow::from_bytes(&bytes)?;
                    row.enc_xprv = None;
                    tx.execute(
                        "UPDATE accounts SET row = ?1 WHERE purpose = ?2 AND coin_type = ?3 AND number = ?4",
                        params![row.to_bytes(), purpose, coin_type, number],
                    )
                    .storage()?;
                }

                let addresses = {
                    let mut stmt = tx
                        .prepare("SELECT id, row FROM addresses WHERE kind != ?1")
                        .storage()?;
                    let rows = stmt
                        .query_map([AddressKindTag::Chained as i64], |row| {
                            Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
                        })
                        .storage()?
                        .collect::<std::result::Result<Vec<_>, _>>()
                        .storage()?;
                    rows
                };
                for (id, bytes) in addresses {
                    let row = match AddressRow::from_bytes(&bytes)? {
                        AddressRow::Imported { enc_pubkey, .. } => AddressRow::Imported {
                            enc_pubkey,
                            enc_privkey: None,
                        },
                        AddressRow::Script {
                            enc_script,
                            under_public: false,
                        } => AddressRow::Script {
                            enc_script: public.encrypt(&script.decrypt(&enc_script)?)?,
                            under_public: true,
                        },
                        other => other,
                    };
                    tx.execute(
                        "UPDATE addresses SET row = ?1 WHERE id = ?2",
                        params![row.to_bytes(), id],
                    )
                    .storage()?;
                }

                save_record_tx(tx, &record)?;
                tx.execute("UPDATE manager_meta SET watch_only = 1 WHERE id = 1", [])
                    .storage()?;
                Ok(())
            })
        })?;

        *self.record.write() = record;
        self.keys.lock()?;
        tracing::info!("Converted address manager to watch-only");
        Ok(())
    }

    /// Register an additional key scope
    ///
    /// Needs the private keys to derive the coin-type key from the master.
    pub fn new_scoped_manager(&self, scope: KeyScope) -> Result<()> {
        self.ensure_open()?;
        if self.is_watch_only() {
            return Err(Error::WatchingOnly("cannot derive new scopes".to_string()));
        }
        let enc_master = self
            .record
            .read()
            .master_hd_private
            .clone()
            .ok_or_else(|| Error::WatchingOnly("no master key".to_string()))?;

        self.db.write(|tx| {
            if scope_exists_tx(tx, scope)? {
                return Err(Error::AlreadyExists(format!("scope {}", scope)));
            }
            self.keys.with_unlocked(|public, private, _| {
                let master = ExtendedPrivateKey::parse(&utf8(&private.decrypt(&enc_master)?)?)?;
                insert_scope_tx(tx, &master, scope, public, private, &self.params)
            })
        })?;

        tracing::info!("Registered key scope {}", scope);
        Ok(())
    }

    /// Registered scopes
    pub fn scopes(&self) -> Result<Vec<KeyScope>> {
        self.ensure_open()?;
        self.db.read(|conn| {
            let mut stmt = conn
                .prepare("SELECT purpose, coin_type FROM scopes ORDER BY purpose, coin_type")
                .storage()?;
            let scopes = stmt
                .query_map([], |row| {
                    Ok(KeyScope {
                        purpose: row.get(0)?,
                        coin_type: row.get(1)?,
                    })
                })
                .storage()?
                .collect::<std::result::Result<Vec<_>, _>>()
                .storage()?;
            Ok(scopes)
        })
    }

    /// Full sync cursor
    pub fn sync_state(&self) -> Result<SyncState> {
        self.ensure_open()?;
        SyncStateStorage::new(&self.db).load()
    }

    /// Last block applied to the ledger
    pub fn synced_to(&self) -> Result<BlockStamp> {
        Ok(self.sync_state()?.synced_to)
    }

    /// Move the sync cursor
    pub fn set_synced_to(&self, stamp: &BlockStamp) -> Result<()> {
        self.ensure_open()?;
        self.db
            .write(|tx| SyncStateStorage::set_synced_to_tx(tx, stamp))
    }

    /// Wallet birthday
    pub fn birthday(&self) -> Result<DateTime<Utc>> {
        Ok(self.sync_state()?.birthday)
    }

    /// Replace the wallet birthday
    pub fn set_birthday(&self, birthday: DateTime<Utc>) -> Result<()> {
        self.update_sync_state(|state| state.birthday = birthday)
    }

    /// First block at or after the birthday, once known
    pub fn birthday_block(&self) -> Result<Option<BlockStamp>> {
        Ok(self.sync_state()?.birthday_block)
    }

    /// Record the birthday block
    pub fn set_birthday_block(&self, stamp: &BlockStamp) -> Result<()> {
        let stamp = *stamp;
        self.update_sync_state(|state| state.birthday_block = Some(stamp))
    }

    /// Hash of the applied block at `height`
    pub fn block_hash(&self, height: i32) -> Result<Option<Hash256>> {
        self.ensure_open()?;
        SyncStateStorage::new(&self.db).block_hash(height)
    }

    fn update_sync_state<F: FnOnce(&mut SyncState)>(&self, f: F) -> Result<()> {
        self.ensure_open()?;
        self.db.write(|tx| {
            let mut state = SyncStateStorage::load_tx(tx)?;
            f(&mut state);
            SyncStateStorage::save_sync_state_tx(tx, &state)
        })
    }

    pub(crate) fn keys(&self) -> &KeyStore {
        &self.keys
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.keys.state() == LockState::Closed {
            return Err(Error::Storage("manager closed".to_string()));
        }
        Ok(())
    }
}

fn save_record_tx(tx: &Transaction<'_>, record: &KeyStoreRecord) -> Result<()> {
    tx.execute(
        "UPDATE manager_meta SET key_store = ?1 WHERE id = 1",
        params![record.to_bytes()],
    )
    .storage()?;
    Ok(())
}

pub(crate) fn scope_exists_tx(conn: &Connection, scope: KeyScope) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM scopes WHERE purpose = ?1 AND coin_type = ?2)",
        params![scope.purpose, scope.coin_type],
        |row| row.get(0),
    )
    .storage()
}

pub(crate) fn utf8(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| Error::Codec(format!("invalid utf-8: {}", e)))
}

/// Write a scope with its coin-type keys, default account and imported account
fn insert_scope_tx(
    tx: &Transaction<'_>,
    master: &ExtendedPrivateKey,
    scope: KeyScope,
    public: &SymmetricKey,
    private: &SymmetricKey,
    params: &ChainParams,
) -> Result<()> {
    let network = params.network_type;
    let coin_key = master
        .derive_child(scope.purpose, true)?
        .derive_child(scope.coin_type, true)?;
    let coin_pub = public.encrypt(coin_key.public_key().to_string_for(network).as_bytes())?;
    let coin_priv = private.encrypt(coin_key.to_string_for(network).as_bytes())?;

    tx.execute(
        r#"
        INSERT INTO scopes (purpose, coin_type, coin_pub, coin_priv, last_account)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![scope.purpose, scope.coin_type, coin_pub, coin_priv, DEFAULT_ACCOUNT],
    )
    .storage()?;

    let account_key = coin_key.derive_child(DEFAULT_ACCOUNT, true)?;
    crate::accounts::insert_account_tx(
        tx,
        scope,
        DEFAULT_ACCOUNT,
        DEFAULT_ACCOUNT_NAME,
        &AccountRow::derived(&account_key, public, private, network)?,
    )?;
    crate::accounts::insert_account_tx(
        tx,
        scope,
        IMPORTED_ACCOUNT,
        IMPORTED_ACCOUNT_NAME,
        &AccountRow::imported(),
    )?;
    Ok(())
}
