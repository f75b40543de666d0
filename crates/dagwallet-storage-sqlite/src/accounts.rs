//! Key scopes and accounts

use crate::error::{is_constraint_error, SqlResultExt};
use crate::keystore::CryptoKeyType;
use crate::manager::{scope_exists_tx, utf8, AddressManager, IMPORTED_ACCOUNT, IMPORTED_ACCOUNT_NAME};
use crate::security::SymmetricKey;
use crate::{Error, Result};
use dagwallet_core::codec::{Codec, Decoder, Encoder};
use dagwallet_core::keys::{ExtendedPrivateKey, ExtendedPublicKey, HARDENED_KEY_START};
use dagwallet_params::NetworkType;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

const ACCOUNT_ROW_VERSION: u8 = 1;

/// Name no account may take
const WILDCARD_ACCOUNT_NAME: &str = "*";

/// BIP-44 style `purpose' / coin_type'` derivation scope
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct KeyScope {
    /// Purpose field
    pub purpose: u32,
    /// Coin type field
    pub coin_type: u32,
}

impl KeyScope {
    /// BIP-44 scope for `coin_type`
    pub const fn bip44(coin_type: u32) -> Self {
        Self {
            purpose: crate::manager::BIP44_PURPOSE,
            coin_type,
        }
    }
}

impl fmt::Display for KeyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m/{}'/{}'", self.purpose, self.coin_type)
    }
}

/// Stored account keys and branch counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AccountRow {
    /// Account xpub, encrypted with the public key
    pub enc_xpub: Option<Vec<u8>>,
    /// Account xprv, encrypted with the private key
    pub enc_xprv: Option<Vec<u8>>,
    pub next_external: u32,
    pub next_internal: u32,
}

impl AccountRow {
    pub(crate) fn derived(
        account_key: &ExtendedPrivateKey,
        public: &SymmetricKey,
        private: &SymmetricKey,
        network: NetworkType,
    ) -> Result<Self> {
        Ok(Self {
            enc_xpub: Some(
                public.encrypt(account_key.public_key().to_string_for(network).as_bytes())?,
            ),
            enc_xprv: Some(private.encrypt(account_key.to_string_for(network).as_bytes())?),
            next_external: 0,
            next_internal: 0,
        })
    }

    pub(crate) fn imported() -> Self {
        Self {
            enc_xpub: None,
            enc_xprv: None,
            next_external: 0,
            next_internal: 0,
        }
    }
}

fn put_opt(enc: &mut Encoder, bytes: &Option<Vec<u8>>) {
    enc.put_bool(bytes.is_some());
    if let Some(bytes) = bytes {
        enc.put_var_bytes(bytes);
    }
}

fn get_opt(dec: &mut Decoder<'_>) -> Result<Option<Vec<u8>>> {
    Ok(if dec.bool()? {
        Some(dec.var_bytes()?)
    } else {
        None
    })
}

impl Codec for AccountRow {
    fn encode(&self, enc: &mut Encoder) {
        enc.put_u8(ACCOUNT_ROW_VERSION);
        put_opt(enc, &self.enc_xpub);
        put_opt(enc, &self.enc_xprv);
        enc.put_u32(self.next_external);
        enc.put_u32(self.next_internal);
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        dec.expect_version("account", ACCOUNT_ROW_VERSION)?;
        Ok(Self {
            enc_xpub: get_opt(dec)?,
            enc_xprv: get_opt(dec)?,
            next_external: dec.u32()?,
            next_internal: dec.u32()?,
        })
    }
}

/// Account summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Scope the account lives in
    pub scope: KeyScope,
    /// Account number
    pub number: u32,
    /// Account name
    pub name: String,
    /// External addresses issued
    pub external_count: u32,
    /// Internal (change) addresses issued
    pub internal_count: u32,
}

fn validate_account_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidAccountName("empty name".to_string()));
    }
    if name == WILDCARD_ACCOUNT_NAME || name == IMPORTED_ACCOUNT_NAME {
        return Err(Error::InvalidAccountName(format!("{:?} is reserved", name)));
    }
    Ok(())
}

pub(crate) fn insert_account_tx(
    tx: &Transaction<'_>,
    scope: KeyScope,
    number: u32,
    name: &str,
    row: &AccountRow,
) -> Result<()> {
    tx.execute(
        "INSERT INTO accounts (purpose, coin_type, number, name, row) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![scope.purpose, scope.coin_type, number, name, row.to_bytes()],
    )
    .map_err(|e| {
        if is_constraint_error(&e) {
            Error::DuplicateAccount(format!("{} in {}", name, scope))
        } else {
            Error::storage(e)
        }
    })?;
    Ok(())
}

pub(crate) fn load_account_tx(
    conn: &Connection,
    scope: KeyScope,
    number: u32,
) -> Result<AccountRow> {
    let bytes: Option<Vec<u8>> = conn
        .query_row(
            "SELECT row FROM accounts WHERE purpose = ?1 AND coin_type = ?2 AND number = ?3",
            params![scope.purpose, scope.coin_type, number],
            |row| row.get(0),
        )
        .optional()
        .storage()?;
    match bytes {
        Some(bytes) => AccountRow::from_bytes(&bytes),
        None => Err(Error::AccountNotFound(format!("{} in {}", number, scope))),
    }
}

pub(crate) fn save_account_tx(
    tx: &Transaction<'_>,
    scope: KeyScope,
    number: u32,
    row: &AccountRow,
) -> Result<()> {
    tx.execute(
        "UPDATE accounts SET row = ?1 WHERE purpose = ?2 AND coin_type = ?3 AND number = ?4",
        params![row.to_bytes(), scope.purpose, scope.coin_type, number],
    )
    .storage()?;
    Ok(())
}

fn account_number_tx(conn: &Connection, scope: KeyScope, name: &str) -> Result<Option<u32>> {
    conn.query_row(
        "SELECT number FROM accounts WHERE purpose = ?1 AND coin_type = ?2 AND name = ?3",
        params![scope.purpose, scope.coin_type, name],
        |row| row.get(0),
    )
    .optional()
    .storage()
}

impl AddressManager {
    /// Create the next hardened account in `scope`
    ///
    /// The account counter moves in the same transaction as the account row,
    /// so a rejected name consumes no number.
    pub fn next_account(&self, scope: KeyScope, name: &str) -> Result<u32> {
        self.ensure_open()?;
        validate_account_name(name)?;
        if self.is_watch_only() {
            return Err(Error::WatchingOnly("cannot derive accounts".to_string()));
        }
        let network = self.chain_params().network_type;

        let number = self.database().write(|tx| {
            let scope_row: Option<(Option<Vec<u8>>, u32)> = tx
                .query_row(
                    "SELECT coin_priv, last_account FROM scopes WHERE purpose = ?1 AND coin_type = ?2",
                    params![scope.purpose, scope.coin_type],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .storage()?;
            let Some((coin_priv, last_account)) = scope_row else {
                return Err(Error::InvalidArgument(format!("unknown scope {}", scope)));
            };
            let coin_priv =
                coin_priv.ok_or_else(|| Error::WatchingOnly(format!("scope {}", scope)))?;

            if account_number_tx(tx, scope, name)?.is_some() {
                return Err(Error::DuplicateAccount(format!("{} in {}", name, scope)));
            }
            let number = last_account + 1;
            if number >= HARDENED_KEY_START {
                return Err(Error::InvalidArgument(format!(
                    "account limit reached in {}",
                    scope
                )));
            }

            self.keys().with_unlocked(|public, private, _| {
                let coin_key = Zeroizing::new(utf8(&private.decrypt(&coin_priv)?)?);
                let account_key =
                    ExtendedPrivateKey::parse(&coin_key)?.derive_child(number, true)?;
                let row = AccountRow::derived(&account_key, public, private, network)?;
                insert_account_tx(tx, scope, number, name, &row)
            })?;

            tx.execute(
                "UPDATE scopes SET last_account = ?1 WHERE purpose = ?2 AND coin_type = ?3",
                params![number, scope.purpose, scope.coin_type],
            )
            .storage()?;
            Ok(number)
        })?;

        tracing::info!("Created account {} ({}) in {}", number, name, scope);
        Ok(number)
    }

    /// Rename an account
    pub fn rename_account(&self, scope: KeyScope, number: u32, name: &str) -> Result<()> {
        self.ensure_open()?;
        validate_account_name(name)?;
        if number == IMPORTED_ACCOUNT {
            return Err(Error::InvalidAccountName(
                "the imported account cannot be renamed".to_string(),
            ));
        }

        self.database().write(|tx| {
            load_account_tx(tx, scope, number)?;
            if account_number_tx(tx, scope, name)?.is_some() {
                return Err(Error::DuplicateAccount(format!("{} in {}", name, scope)));
            }
            tx.execute(
                "UPDATE accounts SET name = ?1 WHERE purpose = ?2 AND coin_type = ?3 AND number = ?4",
                params![name, scope.purpose, scope.coin_type, number],
            )
            .storage()?;
            Ok(())
        })
    }

    /// Accounts of `scope` ordered by number
    pub fn accounts(&self, scope: KeyScope) -> Result<Vec<AccountInfo>> {
        self.ensure_open()?;
        self.database().read(|conn| {
            if !scope_exists_tx(conn, scope)? {
                return Err(Error::InvalidArgument(format!("unknown scope {}", scope)));
            }
            let mut stmt = conn
                .prepare(
                    "SELECT number, name, row FROM accounts WHERE purpose = ?1 AND coin_type = ?2 ORDER BY number",
                )
                .storage()?;
            let rows = stmt
                .query_map(params![scope.purpose, scope.coin_type], |row| {
                    Ok((
                        row.get::<_, u32>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                    ))
                })
                .storage()?
                .collect::<std::result::Result<Vec<_>, _>>()
                .storage()?;

            rows.into_iter()
                .map(|(number, name, bytes)| {
                    let row = AccountRow::from_bytes(&bytes)?;
                    Ok(AccountInfo {
                        scope,
                        number,
                        name,
                        external_count: row.next_external,
                        internal_count: row.next_internal,
                    })
                })
                .collect()
        })
    }

    /// Name of account `number`
    pub fn account_name(&self, scope: KeyScope, number: u32) -> Result<String> {
        self.ensure_open()?;
        self.database().read(|conn| {
            conn.query_row(
                "SELECT name FROM accounts WHERE purpose = ?1 AND coin_type = ?2 AND number = ?3",
                params![scope.purpose, scope.coin_type, number],
                |row| row.get(0),
            )
            .optional()
            .storage()?
            .ok_or_else(|| Error::AccountNotFound(format!("{} in {}", number, scope)))
        })
    }

    /// Number of the account called `name`
    pub fn account_number(&self, scope: KeyScope, name: &str) -> Result<u32> {
        self.ensure_open()?;
        self.database().read(|conn| {
            account_number_tx(conn, scope, name)?
                .ok_or_else(|| Error::AccountNotFound(format!("{} in {}", name, scope)))
        })
    }

    /// Account extended public key, available while locked
    pub fn account_xpub(&self, scope: KeyScope, number: u32) -> Result<ExtendedPublicKey> {
        self.ensure_open()?;
        let row = self
            .database()
            .read(|conn| load_account_tx(conn, scope, number))?;
        let enc = row
            .enc_xpub
            .ok_or_else(|| Error::InvalidArgument("imported account has no xpub".to_string()))?;
        let plain = self.keys().decrypt(CryptoKeyType::Public, &enc)?;
        ExtendedPublicKey::parse(&utf8(&plain)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::tests::{test_manager, PRIV};
    use crate::manager::{DEFAULT_ACCOUNT, DEFAULT_ACCOUNT_NAME};

    #[test]
    fn test_account_row_layout() {
        let row = AccountRow {
            enc_xpub: Some(vec![1, 2]),
            enc_xprv: None,
            next_external: 5,
            next_internal: 2,
        };
        let bytes = row.to_bytes();
        assert_eq!(bytes[0], ACCOUNT_ROW_VERSION);
        assert_eq!(AccountRow::from_bytes(&bytes).unwrap(), row);
    }

    #[test]
    fn test_default_accounts() {
        let (_file, manager) = test_manager();
        let scope = manager.default_scope();
        let accounts = manager.accounts(scope).unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].number, DEFAULT_ACCOUNT);
        assert_eq!(accounts[0].name, DEFAULT_ACCOUNT_NAME);
        assert_eq!(accounts[1].number, IMPORTED_ACCOUNT);
        assert_eq!(manager.account_number(scope, "imported").unwrap(), IMPORTED_ACCOUNT);
    }

    #[test]
    fn test_next_account_numbering() {
        let (_file, manager) = test_manager();
        let scope = manager.default_scope();
        assert!(matches!(
            manager.next_account(scope, "savings"),
            Err(Error::Locked(_))
        ));

        manager.unlock(PRIV).unwrap();
        assert_eq!(manager.next_account(scope, "savings").unwrap(), 1);
        assert!(matches!(
            manager.next_account(scope, "savings"),
            Err(Error::DuplicateAccount(_))
        ));
        assert_eq!(manager.next_account(scope, "spending").unwrap(), 2);

        for bad in ["", "*", "imported"] {
            assert!(matches!(
                manager.next_account(scope, bad),
                Err(Error::InvalidAccountName(_))
            ));
        }
        assert_eq!(manager.account_name(scope, 2).unwrap(), "spending");
    }

    #[test]
    fn test_rename_account() {
        let (_file, manager) = test_manager();
        let scope = manager.default_scope();
        manager.unlock(PRIV).unwrap();
        manager.next_account(scope, "savings").unwrap();

        manager.rename_account(scope, 1, "rainy-day").unwrap();
        assert_eq!(manager.account_number(scope, "rainy-day").unwrap(), 1);
        assert!(matches!(
            manager.account_number(scope, "savings"),
            Err(Error::AccountNotFound(_))
        ));
        assert!(matches!(
            manager.rename_account(scope, 1, DEFAULT_ACCOUNT_NAME),
            Err(Error::DuplicateAccount(_))
        ));
        assert!(matches!(
            manager.rename_account(scope, IMPORTED_ACCOUNT, "other"),
            Err(Error::InvalidAccountName(_))
        ));
        assert!(matches!(
            manager.rename_account(scope, 9, "other"),
            Err(Error::AccountNotFound(_))
        ));
    }

    #[test]
    fn test_account_keys_match_seed_derivation() {
        use dagwallet_core::keys::seed_from_mnemonic;
        use dagwallet_core::test_helpers::TEST_MNEMONIC;

        let (_file, manager) = test_manager();
        let seed = seed_from_mnemonic(TEST_MNEMONIC, "").unwrap();
        let expected = ExtendedPrivateKey::from_seed(seed.as_ref())
            .unwrap()
            .derive_account(44, 1, 0)
            .unwrap()
            .public_key();
        let stored = manager.account_xpub(manager.default_scope(), 0).unwrap();
        assert_eq!(stored.pubkey_bytes(), expected.pubkey_bytes());
    }
}
