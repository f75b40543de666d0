//! Managed addresses
//!
//! Every address the wallet owns is one row keyed by its hash160. Chained
//! rows only carry their derivation position; imported keys and scripts
//! carry their encrypted material.

use crate::accounts::{load_account_tx, save_account_tx, KeyScope};
use crate::error::{is_constraint_error, SqlResultExt};
use crate::keystore::CryptoKeyType;
use crate::manager::{utf8, AddressManager, IMPORTED_ACCOUNT};
use crate::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use dagwallet_core::codec::{Codec, Decoder, Encoder};
use dagwallet_core::keys::{
    ExtendedPrivateKey, ExtendedPublicKey, PrivateKey, EXTERNAL_BRANCH, HARDENED_KEY_START,
    INTERNAL_BRANCH,
};
use dagwallet_core::{Address, HASH160_SIZE};
use dagwallet_params::NetworkType;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use zeroize::Zeroizing;

const ADDRESS_ROW_VERSION: u8 = 1;

/// Value of the `kind` column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub(crate) enum AddressKindTag {
    Chained = 0,
    Imported = 1,
    Script = 2,
}

/// Stored form of an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AddressRow {
    Chained {
        branch: u32,
        index: u32,
    },
    Imported {
        enc_pubkey: Vec<u8>,
        enc_privkey: Option<Vec<u8>>,
    },
    Script {
        enc_script: Vec<u8>,
        /// Encrypted with the public key instead of the script key
        under_public: bool,
    },
}

impl AddressRow {
    fn tag(&self) -> AddressKindTag {
        match self {
            AddressRow::Chained { .. } => AddressKindTag::Chained,
            AddressRow::Imported { .. } => AddressKindTag::Imported,
            AddressRow::Script { .. } => AddressKindTag::Script,
        }
    }
}

impl Codec for AddressRow {
    fn encode(&self, enc: &mut Encoder) {
        enc.put_u8(ADDRESS_ROW_VERSION);
        enc.put_u8(self.tag() as u8);
        match self {
            AddressRow::Chained { branch, index } => {
                enc.put_u32(*branch);
                enc.put_u32(*index);
            }
            AddressRow::Imported {
                enc_pubkey,
                enc_privkey,
            } => {
                enc.put_var_bytes(enc_pubkey);
                enc.put_bool(enc_privkey.is_some());
                if let Some(privkey) = enc_privkey {
                    enc.put_var_bytes(privkey);
                }
            }
            AddressRow::Script {
                enc_script,
                under_public,
            } => {
                enc.put_var_bytes(enc_script);
                enc.put_bool(*under_public);
            }
        }
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        dec.expect_version("address", ADDRESS_ROW_VERSION)?;
        match dec.u8()? {
            0 => Ok(AddressRow::Chained {
                branch: dec.u32()?,
                index: dec.u32()?,
            }),
            1 => {
                let enc_pubkey = dec.var_bytes()?;
                let enc_privkey = if dec.bool()? {
                    Some(dec.var_bytes()?)
                } else {
                    None
                };
                Ok(AddressRow::Imported {
                    enc_pubkey,
                    enc_privkey,
                })
            }
            2 => Ok(AddressRow::Script {
                enc_script: dec.var_bytes()?,
                under_public: dec.bool()?,
            }),
            other => Err(Error::Codec(format!("unknown address kind {}", other))),
        }
    }
}

/// How the wallet came to own an address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    /// Derived from an account key
    Chained {
        /// 0 external, 1 internal
        branch: u32,
        /// Child index on the branch
        index: u32,
    },
    /// Imported private or public key
    Imported,
    /// Imported redeem script
    Script,
}

/// Address history sync progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Never scanned
    None,
    /// Scanned from some point after creation
    Partial,
    /// History complete
    Full,
}

impl SyncStatus {
    fn to_i64(self) -> i64 {
        match self {
            SyncStatus::None => 0,
            SyncStatus::Partial => 1,
            SyncStatus::Full => 2,
        }
    }

    fn from_i64(v: i64) -> Result<Self> {
        match v {
            0 => Ok(SyncStatus::None),
            1 => Ok(SyncStatus::Partial),
            2 => Ok(SyncStatus::Full),
            other => Err(Error::Codec(format!("unknown sync status {}", other))),
        }
    }
}

/// An address owned by the wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedAddress {
    /// The address
    pub address: Address,
    /// Scope of the owning account
    pub scope: KeyScope,
    /// Owning account
    pub account: u32,
    /// Origin
    pub kind: AddressKind,
    /// When the wallet started owning it
    pub created_at: DateTime<Utc>,
    /// History sync progress
    pub sync_status: SyncStatus,
}

impl ManagedAddress {
    /// Whether this is a change address
    pub fn is_change(&self) -> bool {
        matches!(
            self.kind,
            AddressKind::Chained {
                branch: INTERNAL_BRANCH,
                ..
            }
        )
    }
}

const ADDRESS_COLUMNS: &str =
    "addr_hash, purpose, coin_type, account, kind, row, created_at, sync_status";

struct RawAddress {
    hash: Vec<u8>,
    scope: KeyScope,
    account: u32,
    row: Vec<u8>,
    created_at: i64,
    sync_status: i64,
}

fn raw_address(row: &Row<'_>) -> rusqlite::Result<RawAddress> {
    Ok(RawAddress {
        hash: row.get(0)?,
        scope: KeyScope {
            purpose: row.get(1)?,
            coin_type: row.get(2)?,
        },
        account: row.get(3)?,
        row: row.get(5)?,
        created_at: row.get(6)?,
        sync_status: row.get(7)?,
    })
}

fn to_hash(bytes: &[u8]) -> Result<[u8; HASH160_SIZE]> {
    bytes
        .try_into()
        .map_err(|_| Error::Codec(format!("address hash of {} bytes", bytes.len())))
}

impl RawAddress {
    fn into_managed(self, network: NetworkType) -> Result<(ManagedAddress, AddressRow)> {
        let hash = to_hash(&self.hash)?;
        let row = AddressRow::from_bytes(&self.row)?;
        let (address, kind) = match &row {
            AddressRow::Chained { branch, index } => (
                Address::PubKeyHash { hash, network },
                AddressKind::Chained {
                    branch: *branch,
                    index: *index,
                },
            ),
            AddressRow::Imported { .. } => {
                (Address::PubKeyHash { hash, network }, AddressKind::Imported)
            }
            AddressRow::Script { .. } => {
                (Address::ScriptHash { hash, network }, AddressKind::Script)
            }
        };
        let created_at = Utc
            .timestamp_opt(self.created_at, 0)
            .single()
            .ok_or_else(|| Error::Codec(format!("created_at {}", self.created_at)))?;
        Ok((
            ManagedAddress {
                address,
                scope: self.scope,
                account: self.account,
                kind,
                created_at,
                sync_status: SyncStatus::from_i64(self.sync_status)?,
            },
            row,
        ))
    }
}

fn load_address_tx(
    conn: &Connection,
    hash: &[u8; HASH160_SIZE],
    network: NetworkType,
) -> Result<Option<(ManagedAddress, AddressRow)>> {
    conn.query_row(
        &format!("SELECT {} FROM addresses WHERE addr_hash = ?1", ADDRESS_COLUMNS),
        [hash.to_vec()],
        raw_address,
    )
    .optional()
    .storage()?
    .map(|raw| raw.into_managed(network))
    .transpose()
}

fn insert_address_tx(
    tx: &Transaction<'_>,
    address: &Address,
    scope: KeyScope,
    account: u32,
    row: &AddressRow,
    sync_status: SyncStatus,
) -> Result<DateTime<Utc>> {
    let created_at = Utc::now();
    tx.execute(
        r#"
        INSERT INTO addresses (addr_hash, purpose, coin_type, account, kind, row, created_at, sync_status)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            address.hash160().to_vec(),
            scope.purpose,
            scope.coin_type,
            account,
            row.tag() as i64,
            row.to_bytes(),
            created_at.timestamp(),
            sync_status.to_i64()
        ],
    )
    .map_err(|e| {
        if is_constraint_error(&e) {
            Error::DuplicateAddress(address.to_string())
        } else {
            Error::storage(e)
        }
    })?;
    Ok(Utc.timestamp_opt(created_at.timestamp(), 0).single().unwrap_or(created_at))
}

impl AddressManager {
    /// Next external address of an account
    ///
    /// Derived from the account xpub, so it works while locked.
    pub fn new_address(&self, scope: KeyScope, account: u32) -> Result<ManagedAddress> {
        self.database()
            .write(|tx| self.next_address_tx(tx, scope, account, EXTERNAL_BRANCH))
    }

    /// Next internal (change) address of an account
    pub fn new_change_address(&self, scope: KeyScope, account: u32) -> Result<ManagedAddress> {
        self.database()
            .write(|tx| self.next_address_tx(tx, scope, account, INTERNAL_BRANCH))
    }

    /// Derive and store the next address on `branch` inside `tx`
    pub fn next_address_tx(
        &self,
        tx: &Transaction<'_>,
        scope: KeyScope,
        account: u32,
        branch: u32,
    ) -> Result<ManagedAddress> {
        self.ensure_open()?;
        if account == IMPORTED_ACCOUNT {
            return Err(Error::InvalidArgument(
                "the imported account has no key chain".to_string(),
            ));
        }
        let network = self.chain_params().network_type;
        let mut row = load_account_tx(tx, scope, account)?;
        let enc_xpub = row
            .enc_xpub
            .as_ref()
            .ok_or_else(|| Error::InvalidArgument(format!("account {} has no xpub", account)))?;
        let xpub = ExtendedPublicKey::parse(&utf8(
            &self.keys().decrypt(CryptoKeyType::Public, enc_xpub)?,
        )?)?;

        let counter = if branch == INTERNAL_BRANCH {
            &mut row.next_internal
        } else {
            &mut row.next_external
        };
        let index = *counter;
        if index >= HARDENED_KEY_START {
            return Err(Error::InvalidArgument(format!(
                "branch {} of account {} exhausted",
                branch, account
            )));
        }
        *counter += 1;

        let child = xpub.derive_child(branch)?.derive_child(index)?;
        let address = Address::from_pubkey(&child.pubkey_bytes(), network);
        let address_row = AddressRow::Chained { branch, index };
        let created_at =
            insert_address_tx(tx, &address, scope, account, &address_row, SyncStatus::Full)?;
        save_account_tx(tx, scope, account, &row)?;

        tracing::debug!(
            "Issued {} (account {}, branch {}, index {})",
            address,
            account,
            branch,
            index
        );
        Ok(ManagedAddress {
            address,
            scope,
            account,
            kind: AddressKind::Chained { branch, index },
            created_at,
            sync_status: SyncStatus::Full,
        })
    }

    /// Addresses of an account in issuance order
    pub fn account_addresses(&self, scope: KeyScope, account: u32) -> Result<Vec<ManagedAddress>> {
        self.ensure_open()?;
        let network = self.chain_params().network_type;
        self.database().read(|conn| {
            load_account_tx(conn, scope, account)?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM addresses WHERE purpose = ?1 AND coin_type = ?2 AND account = ?3 ORDER BY id",
                    ADDRESS_COLUMNS
                ))
                .storage()?;
            let rows = stmt
                .query_map(params![scope.purpose, scope.coin_type, account], raw_address)
                .storage()?
                .collect::<std::result::Result<Vec<_>, _>>()
                .storage()?;
            rows.into_iter()
                .map(|raw| Ok(raw.into_managed(network)?.0))
                .collect()
        })
    }

    /// Look up a managed address
    pub fn address(&self, address: &Address) -> Result<ManagedAddress> {
        self.ensure_open()?;
        self.check_network(address)?;
        self.database()
            .read(|conn| self.lookup_address_tx(conn, address.hash160()))?
            .ok_or_else(|| Error::AddressNotFound(address.to_string()))
    }

    /// Look up the address paying to `hash` inside a transaction
    pub fn lookup_address_tx(
        &self,
        conn: &Connection,
        hash: &[u8; HASH160_SIZE],
    ) -> Result<Option<ManagedAddress>> {
        let network = self.chain_params().network_type;
        Ok(load_address_tx(conn, hash, network)?.map(|(managed, _)| managed))
    }

    /// Scope and account owning `address`
    pub fn account_of_address(&self, address: &Address) -> Result<(KeyScope, u32)> {
        let managed = self.address(address)?;
        Ok((managed.scope, managed.account))
    }

    /// Import a WIF private key into the imported account
    ///
    /// A watch-only manager keeps the public key only.
    pub fn import_private_key(&self, scope: KeyScope, wif: &str) -> Result<ManagedAddress> {
        self.ensure_open()?;
        let key = PrivateKey::decode_wif(wif, self.chain_params())?;
        let pubkey = key.public_key_bytes();
        let address = Address::from_pubkey(&pubkey, self.chain_params().network_type);
        let watch_only = self.is_watch_only();

        let row = AddressRow::Imported {
            enc_pubkey: self.keys().encrypt(CryptoKeyType::Public, &pubkey)?,
            enc_privkey: if watch_only {
                None
            } else {
                Some(
                    self.keys()
                        .encrypt(CryptoKeyType::Private, key.to_bytes().as_ref())?,
                )
            },
        };
        let managed = self.store_imported(scope, address, row)?;
        tracing::info!("Imported key for {}", address);
        Ok(managed)
    }

    /// Import a redeem script; its P2SH address joins the imported account
    pub fn import_script(&self, scope: KeyScope, redeem_script: &[u8]) -> Result<ManagedAddress> {
        self.ensure_open()?;
        let address = Address::from_script(redeem_script, self.chain_params().network_type);
        let row = if self.is_watch_only() {
            AddressRow::Script {
                enc_script: self.keys().encrypt(CryptoKeyType::Public, redeem_script)?,
                under_public: true,
            }
        } else {
            AddressRow::Script {
                enc_script: self.keys().encrypt(CryptoKeyType::Script, redeem_script)?,
                under_public: false,
            }
        };
        let managed = self.store_imported(scope, address, row)?;
        tracing::info!("Imported script {}", address);
        Ok(managed)
    }

    fn store_imported(
        &self,
        scope: KeyScope,
        address: Address,
        row: AddressRow,
    ) -> Result<ManagedAddress> {
        self.database().write(|tx| {
            load_account_tx(tx, scope, IMPORTED_ACCOUNT)?;
            let created_at =
                insert_address_tx(tx, &address, scope, IMPORTED_ACCOUNT, &row, SyncStatus::None)?;
            Ok(ManagedAddress {
                address,
                scope,
                account: IMPORTED_ACCOUNT,
                kind: match row {
                    AddressRow::Script { .. } => AddressKind::Script,
                    _ => AddressKind::Imported,
                },
                created_at,
                sync_status: SyncStatus::None,
            })
        })
    }

    /// Redeem script of an imported script address
    pub fn script(&self, address: &Address) -> Result<Zeroizing<Vec<u8>>> {
        self.ensure_open()?;
        self.check_network(address)?;
        let network = self.chain_params().network_type;
        let (_, row) = self
            .database()
            .read(|conn| load_address_tx(conn, address.hash160(), network))?
            .ok_or_else(|| Error::AddressNotFound(address.to_string()))?;
        match row {
            AddressRow::Script {
                enc_script,
                under_public,
            } => {
                let key = if under_public {
                    CryptoKeyType::Public
                } else {
                    CryptoKeyType::Script
                };
                self.keys().decrypt(key, &enc_script)
            }
            _ => Err(Error::InvalidArgument(format!("{} is not a script address", address))),
        }
    }

    /// WIF private key of an owned address
    pub fn dump_private_key(&self, address: &Address) -> Result<Zeroizing<String>> {
        self.ensure_open()?;
        self.check_network(address)?;
        if self.is_watch_only() {
            return Err(Error::WatchingOnly("no private keys".to_string()));
        }
        if self.is_locked() {
            return Err(Error::Locked("dump private key".to_string()));
        }
        let key = self
            .database()
            .read(|conn| self.private_key_tx(conn, address.hash160()))?;
        Ok(key.to_wif(self.chain_params().network_type))
    }

    /// Private key for the address paying to `hash`
    pub fn private_key_tx(&self, conn: &Connection, hash: &[u8; HASH160_SIZE]) -> Result<PrivateKey> {
        let network = self.chain_params().network_type;
        let (managed, row) = load_address_tx(conn, hash, network)?
            .ok_or_else(|| Error::AddressNotFound(hex::encode(hash)))?;

        match row {
            AddressRow::Chained { branch, index } => {
                let account = load_account_tx(conn, managed.scope, managed.account)?;
                let enc_xprv = account
                    .enc_xprv
                    .ok_or_else(|| Error::WatchingOnly("account has no xprv".to_string()))?;
                let xprv = Zeroizing::new(utf8(
                    &self.keys().decrypt(CryptoKeyType::Private, &enc_xprv)?,
                )?);
                ExtendedPrivateKey::parse(&xprv)?
                    .derive_child(branch, false)?
                    .derive_child(index, false)?
                    .private_key()
            }
            AddressRow::Imported {
                enc_privkey: Some(enc),
                ..
            } => PrivateKey::from_bytes(&self.keys().decrypt(CryptoKeyType::Private, &enc)?),
            AddressRow::Imported {
                enc_privkey: None, ..
            } => Err(Error::WatchingOnly(format!(
                "{} was imported without its private key",
                managed.address
            ))),
            AddressRow::Script { .. } => Err(Error::InvalidKey(format!(
                "{} is a script address",
                managed.address
            ))),
        }
    }

    fn check_network(&self, address: &Address) -> Result<()> {
        let network = self.chain_params().network_type;
        if address.network() != network {
            return Err(Error::WrongNetwork(format!(
                "{} is for {}, wallet is on {}",
                address,
                address.network(),
                network
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::tests::{test_manager, PRIV};
    use crate::manager::DEFAULT_ACCOUNT;
    use dagwallet_core::keys::seed_from_mnemonic;
    use dagwallet_core::test_helpers::TEST_MNEMONIC;
    use dagwallet_params::ChainParams;

    #[test]
    fn test_address_row_layout() {
        for row in [
            AddressRow::Chained {
                branch: 1,
                index: 7,
            },
            AddressRow::Imported {
                enc_pubkey: vec![1; 40],
                enc_privkey: None,
            },
            AddressRow::Script {
                enc_script: vec![2; 30],
                under_public: true,
            },
        ] {
            let bytes = row.to_bytes();
            assert_eq!(bytes[0], ADDRESS_ROW_VERSION);
            assert_eq!(bytes[1], row.tag() as u8);
            assert_eq!(AddressRow::from_bytes(&bytes).unwrap(), row);
        }
        assert!(AddressRow::from_bytes(&[ADDRESS_ROW_VERSION, 9]).is_err());
    }

    #[test]
    fn test_new_address_while_locked() {
        let (_file, manager) = test_manager();
        let scope = manager.default_scope();
        assert!(manager.is_locked());

        let first = manager.new_address(scope, DEFAULT_ACCOUNT).unwrap();
        let second = manager.new_address(scope, DEFAULT_ACCOUNT).unwrap();
        let change = manager.new_change_address(scope, DEFAULT_ACCOUNT).unwrap();
        assert_ne!(first.address, second.address);
        assert_eq!(first.kind, AddressKind::Chained { branch: 0, index: 0 });
        assert_eq!(second.kind, AddressKind::Chained { branch: 0, index: 1 });
        assert!(change.is_change());
        assert_eq!(first.sync_status, SyncStatus::Full);

        let listed = manager.account_addresses(scope, DEFAULT_ACCOUNT).unwrap();
        let listed: Vec<_> = listed.into_iter().map(|m| m.address).collect();
        assert_eq!(listed, vec![first.address, second.address, change.address]);

        let seed = seed_from_mnemonic(TEST_MNEMONIC, "").unwrap();
        let expected = ExtendedPrivateKey::from_seed(seed.as_ref())
            .unwrap()
            .derive_account(44, 1, 0)
            .unwrap()
            .derive_child(0, false)
            .unwrap()
            .derive_child(0, false)
            .unwrap()
            .public_key();
        assert_eq!(first.address.hash160(), &expected.pubkey_hash());
    }

    #[test]
    fn test_lookup_and_ownership() {
        let (_file, manager) = test_manager();
        let scope = manager.default_scope();
        let issued = manager.new_address(scope, DEFAULT_ACCOUNT).unwrap();

        assert_eq!(manager.address(&issued.address).unwrap(), issued);
        assert_eq!(
            manager.account_of_address(&issued.address).unwrap(),
            (scope, DEFAULT_ACCOUNT)
        );

        let stranger = Address::from_pubkey(&[2u8; 33], NetworkType::Testnet);
        assert!(matches!(
            manager.address(&stranger),
            Err(Error::AddressNotFound(_))
        ));
        let foreign = Address::from_pubkey(&[2u8; 33], NetworkType::Mainnet);
        assert!(matches!(
            manager.address(&foreign),
            Err(Error::WrongNetwork(_))
        ));
    }

    #[test]
    fn test_import_and_dump_private_key() {
        let (_file, manager) = test_manager();
        let scope = manager.default_scope();
        let key = PrivateKey::generate();
        let wif = key.to_wif(NetworkType::Testnet);

        assert!(matches!(
            manager.import_private_key(scope, &wif),
            Err(Error::Locked(_))
        ));
        manager.unlock(PRIV).unwrap();
        let imported = manager.import_private_key(scope, &wif).unwrap();
        assert_eq!(imported.account, IMPORTED_ACCOUNT);
        assert_eq!(imported.sync_status, SyncStatus::None);
        assert!(matches!(
            manager.import_private_key(scope, &wif),
            Err(Error::DuplicateAddress(_))
        ));

        let dumped = manager.dump_private_key(&imported.address).unwrap();
        assert_eq!(dumped.as_str(), wif.as_str());

        let mainnet_wif = key.to_wif(NetworkType::Mainnet);
        assert!(matches!(
            manager.import_private_key(scope, &mainnet_wif),
            Err(Error::WrongNetwork(_))
        ));

        manager.lock().unwrap();
        assert!(matches!(
            manager.dump_private_key(&imported.address),
            Err(Error::Locked(_))
        ));
    }

    #[test]
    fn test_dump_chained_key_matches_address() {
        let (_file, manager) = test_manager();
        let scope = manager.default_scope();
        let issued = manager.new_address(scope, DEFAULT_ACCOUNT).unwrap();
        manager.unlock(PRIV).unwrap();

        let wif = manager.dump_private_key(&issued.address).unwrap();
        let key = PrivateKey::decode_wif(&wif, &ChainParams::testnet()).unwrap();
        let derived = Address::from_pubkey(&key.public_key_bytes(), NetworkType::Testnet);
        assert_eq!(derived, issued.address);

        let stranger = Address::from_pubkey(&[3u8; 33], NetworkType::Testnet);
        assert!(matches!(
            manager.dump_private_key(&stranger),
            Err(Error::AddressNotFound(_))
        ));
    }

    #[test]
    fn test_import_script() {
        let (_file, manager) = test_manager();
        let scope = manager.default_scope();
        let script = vec![0x51, 0x21, 0x02, 0x52, 0xae];
        manager.unlock(PRIV).unwrap();

        let imported = manager.import_script(scope, &script).unwrap();
        assert!(imported.address.is_script_hash());
        assert_eq!(imported.kind, AddressKind::Script);
        assert_eq!(manager.script(&imported.address).unwrap().as_slice(), &script[..]);
        assert!(matches!(
            manager.dump_private_key(&imported.address),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_convert_to_watch_only() {
        let (_file, manager) = test_manager();
        let scope = manager.default_scope();
        manager.unlock(PRIV).unwrap();
        let script = vec![0x51, 0x52, 0xae];
        let script_addr = manager.import_script(scope, &script).unwrap();
        let key_addr = manager
            .import_private_key(scope, &PrivateKey::generate().to_wif(NetworkType::Testnet))
            .unwrap();

        manager.convert_to_watch_only().unwrap();
        assert!(manager.is_watch_only());
        assert!(manager.is_locked());
        assert!(matches!(manager.unlock(PRIV), Err(Error::WatchingOnly(_))));

        assert_eq!(manager.script(&script_addr.address).unwrap().as_slice(), &script[..]);
        assert!(matches!(
            manager.dump_private_key(&key_addr.address),
            Err(Error::WatchingOnly(_))
        ));
        assert!(manager.new_address(scope, DEFAULT_ACCOUNT).is_ok());
        assert!(matches!(
            manager.next_account(scope, "more"),
            Err(Error::WatchingOnly(_))
        ));

        let watched = manager
            .import_private_key(scope, &PrivateKey::generate().to_wif(NetworkType::Testnet))
            .unwrap();
        assert_eq!(watched.kind, AddressKind::Imported);
    }
}
