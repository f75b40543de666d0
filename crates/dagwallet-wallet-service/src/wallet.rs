//! Balance and sync engine
//!
//! [`Wallet`] keeps the address manager and the ledger in step with the
//! node feed. Every block or mempool transaction is tested for relevance and
//! written together with the sync cursor in one storage transaction; sends
//! select, sign and record in one transaction too, so a failure never leaves
//! half a payment behind.

use crate::config::WalletConfig;
use chrono::{DateTime, Utc};
use dagwallet_core::keys::INTERNAL_BRANCH;
use dagwallet_core::script::{self, P2PKH_PK_SCRIPT_SIZE};
use dagwallet_core::signer::{self, SecretsSource};
use dagwallet_core::{
    txrules, Address, Amount, Block, BlockMeta, BlockStamp, CoinId, Error, Hash256,
    PrivateKey, Result, Transaction, TxInput, TxOutput, UtxoSelector, HASH160_SIZE,
};
use dagwallet_params::{ChainParams, ConsensusParams};
use dagwallet_storage_sqlite::{
    AccountInfo, AddressManager, Balances, Database, KeyScope, LedgerStore, ManagedAddress,
    OutputFilter, SpendInfo, SyncStateStorage, TxDetails, TxRecord, DEFAULT_ACCOUNT,
    IMPORTED_ACCOUNT,
};
use parking_lot::Mutex;
use rusqlite::{Connection, Transaction as SqlTransaction};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Balances of one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    /// Account number
    pub number: u32,
    /// Account name
    pub name: String,
    /// Per-coin balances over every address of the account
    pub balances: Balances,
}

/// A wallet bound to one database
pub struct Wallet {
    manager: Arc<AddressManager>,
    config: WalletConfig,
    consensus: ConsensusParams,
    /// Serialises ingestion, sends and rollbacks so the ledger and the
    /// cursor move together
    update_lock: Mutex<()>,
    /// Bumped by every lock and unlock; an auto-lock timer only fires while
    /// its generation is current
    lock_generation: Arc<AtomicU64>,
}

impl Wallet {
    /// Create a wallet from `seed` and open it
    ///
    /// Fails with [`Error::AlreadyExists`] when the database already holds
    /// a wallet. The wallet comes up locked.
    pub fn create(
        config: WalletConfig,
        seed: &[u8],
        public_passphrase: &[u8],
        private_passphrase: &[u8],
        birthday: DateTime<Utc>,
    ) -> Result<Self> {
        let db = Arc::new(Database::open(&config.db_path)?);
        AddressManager::create(
            &db,
            seed,
            public_passphrase,
            private_passphrase,
            &config.chain_params(),
            birthday,
            &config.manager_options(),
        )?;
        Self::load(config, db, public_passphrase)
    }

    /// Open an existing wallet with the public passphrase
    pub fn open(config: WalletConfig, public_passphrase: &[u8]) -> Result<Self> {
        if !config.db_path.exists() {
            return Err(Error::NoExist(format!(
                "no wallet at {}",
                config.db_path.display()
            )));
        }
        let db = Arc::new(Database::open(&config.db_path)?);
        Self::load(config, db, public_passphrase)
    }

    fn load(config: WalletConfig, db: Arc<Database>, public_passphrase: &[u8]) -> Result<Self> {
        let manager = AddressManager::load(db, public_passphrase, &config.chain_params())?;
        info!(
            "Opened wallet {} on {} (synced to {})",
            config.db_path.display(),
            config.network,
            manager.synced_to()?.height
        );
        Ok(Self {
            manager: Arc::new(manager),
            consensus: config.consensus_params(),
            config,
            update_lock: Mutex::new(()),
            lock_generation: Arc::new(AtomicU64::new(0)),
        })
    }

    /// The address manager
    pub fn manager(&self) -> &AddressManager {
        &self.manager
    }

    /// Configuration the wallet was opened with
    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    /// Chain parameters
    pub fn chain_params(&self) -> &ChainParams {
        self.manager.chain_params()
    }

    /// Default key scope
    pub fn default_scope(&self) -> KeyScope {
        self.manager.default_scope()
    }

    pub(crate) fn ledger(&self) -> LedgerStore<'_> {
        LedgerStore::new(self.manager.database())
    }

    // Lock state

    /// Unlock private keys
    ///
    /// With a `timeout` (or a configured auto-lock) the wallet locks itself
    /// again once it elapses. A later lock or unlock cancels the timer.
    pub fn unlock(&self, private_passphrase: &[u8], timeout: Option<Duration>) -> Result<()> {
        self.manager.unlock(private_passphrase)?;
        let generation = self.lock_generation.fetch_add(1, Ordering::SeqCst) + 1;

        let Some(timeout) = timeout.or(self.config.auto_lock) else {
            return Ok(());
        };
        let Ok(handle) = Handle::try_current() else {
            warn!("No tokio runtime, unlock timeout of {:?} not armed", timeout);
            return Ok(());
        };

        let manager = Arc::clone(&self.manager);
        let current = Arc::clone(&self.lock_generation);
        handle.spawn(async move {
            tokio::time::sleep(timeout).await;
            if current.load(Ordering::SeqCst) != generation {
                return;
            }
            match manager.lock() {
                Ok(()) => info!("Wallet locked after {:?}", timeout),
                Err(e) => warn!("Auto-lock failed: {}", e),
            }
        });
        Ok(())
    }

    /// Drop private keys from memory
    pub fn lock(&self) -> Result<()> {
        self.lock_generation.fetch_add(1, Ordering::SeqCst);
        self.manager.lock()
    }

    /// Whether private keys are unavailable
    pub fn is_locked(&self) -> bool {
        self.manager.is_locked()
    }

    /// Lock and release every key; the wallet refuses all work afterwards
    pub fn close(&self) {
        self.lock_generation.fetch_add(1, Ordering::SeqCst);
        self.manager.close();
        info!("Closed wallet {}", self.config.db_path.display());
    }

    // Accounts and addresses

    /// Create the next account in `scope`
    pub fn next_account(&self, scope: KeyScope, name: &str) -> Result<u32> {
        self.manager.next_account(scope, name)
    }

    /// Accounts of `scope`
    pub fn accounts(&self, scope: KeyScope) -> Result<Vec<AccountInfo>> {
        self.manager.accounts(scope)
    }

    /// Name of an account
    pub fn account_name(&self, scope: KeyScope, number: u32) -> Result<String> {
        self.manager.account_name(scope, number)
    }

    /// Number of a named account
    pub fn account_number(&self, scope: KeyScope, name: &str) -> Result<u32> {
        self.manager.account_number(scope, name)
    }

    /// Next receiving address of an account
    pub fn new_address(&self, scope: KeyScope, account: u32) -> Result<ManagedAddress> {
        self.manager.new_address(scope, account)
    }

    /// Next change address of an account
    pub fn new_change_address(&self, scope: KeyScope, account: u32) -> Result<ManagedAddress> {
        self.manager.new_change_address(scope, account)
    }

    /// Issued addresses of an account
    pub fn account_addresses(&self, scope: KeyScope, account: u32) -> Result<Vec<ManagedAddress>> {
        self.manager.account_addresses(scope, account)
    }

    /// Scope and account owning `address`
    pub fn account_of_address(&self, address: &Address) -> Result<(KeyScope, u32)> {
        self.manager.account_of_address(address)
    }

    /// Import a WIF key
    ///
    /// Importing a key the wallet already holds returns the existing address.
    pub fn import_private_key(&self, scope: KeyScope, wif: &str) -> Result<ManagedAddress> {
        match self.manager.import_private_key(scope, wif) {
            Err(Error::DuplicateAddress(_)) => {
                let key = PrivateKey::decode_wif(wif, self.chain_params())?;
                let address = Address::from_pubkey(
                    &key.public_key_bytes(),
                    self.chain_params().network_type,
                );
                debug!("Key for {} already imported", address);
                self.manager.address(&address)
            }
            other => other,
        }
    }

    /// WIF private key of an owned address
    pub fn dump_private_key(&self, address: &Address) -> Result<Zeroizing<String>> {
        self.manager.dump_private_key(address)
    }

    /// Block the wallet is synced to
    pub fn synced_to(&self) -> Result<BlockStamp> {
        self.manager.synced_to()
    }

    fn current_height(&self) -> Result<i32> {
        Ok(self.manager.synced_to()?.height)
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

    // Ingestion

    /// Record the relevant transactions of `block` and advance the cursor
    ///
    /// Returns how many transactions touched the wallet. A block at or below
    /// the cursor is applied again without moving the cursor.
    pub fn process_block(&self, block: &Block) -> Result<usize> {
        let _guard = self.update_lock.lock();
        let received = Utc::now();
        let stamp = block.meta.stamp();

        let relevant = self.manager.database().write(|tx| {
            let mut relevant = 0;
            for transaction in &block.transactions {
                let rec = TxRecord::new(transaction.clone(), received);
                if self.add_tx_tx(tx, &rec, Some(&block.meta))? {
                    relevant += 1;
                }
            }
            if stamp.height > SyncStateStorage::load_tx(tx)?.synced_to.height {
                SyncStateStorage::set_synced_to_tx(tx, &stamp)?;
            }
            Ok(relevant)
        })?;

        debug!(
            "Applied block {} ({}): {} of {} transactions relevant",
            stamp.height,
            stamp.hash,
            relevant,
            block.transactions.len()
        );
        Ok(relevant)
    }

    /// Record an unmined transaction if it touches the wallet
    ///
    /// Returns `false` for irrelevant or already known transactions.
    pub fn process_mempool_tx(&self, transaction: &Transaction) -> Result<bool> {
        let _guard = self.update_lock.lock();
        let rec = TxRecord::new(transaction.clone(), Utc::now());
        let added = self
            .manager
            .database()
            .write(|tx| self.add_tx_tx(tx, &rec, None))?;
        if added {
            debug!("Recorded mempool transaction {}", rec.hash);
        }
        Ok(added)
    }

    /// Record `rec` with its credits and debits if any output pays an owned
    /// address or any input spends an owned credit
    fn add_tx_tx(
        &self,
        tx: &SqlTransaction<'_>,
        rec: &TxRecord,
        block: Option<&BlockMeta>,
    ) -> Result<bool> {
        let mut credits = Vec::new();
        for (index, output) in rec.tx.outputs.iter().enumerate() {
            let Some(hash) = script::classify(&output.pk_script).payee_hash() else {
                continue;
            };
            let Some(managed) = self.manager.lookup_address_tx(tx, &hash)? else {
                continue;
            };
            // a P2SH script over a P2PKH hash is not ours
            if managed.address.pay_script() != output.pk_script {
                continue;
            }
            credits.push((index as u32, managed));
        }

        let mut debits = Vec::new();
        if !rec.tx.is_coinbase() {
            for (index, input) in rec.tx.inputs.iter().enumerate() {
                if LedgerStore::credit_exists_tx(tx, &input.previous_output)? {
                    debits.push(index as u32);
                }
            }
        }

        if credits.is_empty() && debits.is_empty() {
            return Ok(false);
        }
        if !debits.is_empty() {
            if let Some((outpoint, spender)) = LedgerStore::conflicting_spend_tx(tx, rec, block)? {
                warn!(
                    "Skipping {}: {} already spent by {}",
                    rec.hash,
                    outpoint,
                    spender
                );
                return Ok(false);
            }
        }

        let inserted = LedgerStore::insert_transaction_tx(tx, rec, block)?;
        if !inserted && block.is_none() {
            return Ok(false);
        }
        for (index, managed) in &credits {
            LedgerStore::add_credit_tx(
                tx,
                rec,
                block,
                *index,
                managed.is_change(),
                &managed.address,
            )?;
        }
        for index in debits {
            LedgerStore::add_debit_tx(tx, rec, block, index)?;
        }
        Ok(true)
    }

    // Sending

    /// Pay `destinations` from `account` and record the signed transaction
    /// as unmined
    ///
    /// Spends credits of the default scope with at least `min_conf`
    /// confirmations. Change goes to a fresh internal address of the
    /// account, or of the default account when spending imported keys;
    /// change below the dust threshold is left to the fee. Nothing is
    /// recorded unless the whole send succeeds.
    pub fn send_pairs(
        &self,
        destinations: &[(Address, Amount)],
        account: u32,
        min_conf: i32,
        fee_per_kb: i64,
    ) -> Result<Hash256> {
        if destinations.is_empty() {
            return Err(Error::InvalidArgument("no destinations".to_string()));
        }
        let mut outputs = Vec::with_capacity(destinations.len());
        for (address, amount) in destinations {
            self.check_network(address)?;
            let output = TxOutput::new(*amount, address.pay_script());
            txrules::check_output(&output, fee_per_kb)?;
            outputs.push(output);
        }
        let target = outputs
            .iter()
            .try_fold(Amount::ZERO, |sum, o| sum.try_add(o.amount))?;

        if self.manager.is_watch_only() {
            return Err(Error::WatchingOnly("cannot sign".to_string()));
        }
        if self.manager.is_locked() {
            return Err(Error::Locked("send".to_string()));
        }

        let _guard = self.update_lock.lock();
        let scope = self.manager.default_scope();
        let current = self.current_height()?;
        let available = self
            .ledger()
            .unspent_outputs(
                OutputFilter::Account(scope, account),
                min_conf,
                current,
                &self.consensus,
            )?
            .into_iter()
            .filter(|o| o.coin_id == CoinId::MEER)
            .collect();
        let selection = UtxoSelector::default().select(available, target, |inputs| {
            txrules::fee_for_serialize_size(
                fee_per_kb,
                txrules::estimate_serialize_size(inputs, &outputs, true),
            )
        })?;

        let change_account = if account == IMPORTED_ACCOUNT {
            DEFAULT_ACCOUNT
        } else {
            account
        };
        let dust = txrules::dust_threshold(P2PKH_PK_SCRIPT_SIZE, fee_per_kb);

        let (hash, fee) = self.manager.database().write(|sqltx| {
            let mut tx = Transaction::new();
            tx.timestamp = Utc::now().timestamp();
            tx.inputs = selection
                .inputs
                .iter()
                .map(|o| TxInput::new(o.outpoint))
                .collect();
            tx.outputs = outputs.clone();

            let mut fee = selection.fee;
            if selection.change >= dust {
                let change = self
                    .manager
                    .next_address_tx(sqltx, scope, change_account, INTERNAL_BRANCH)?;
                tx.outputs
                    .push(TxOutput::new(selection.change, change.address.pay_script()));
            } else {
                fee = fee.try_add(selection.change)?;
            }

            let prev_scripts: Vec<Vec<u8>> =
                selection.inputs.iter().map(|o| o.pk_script.clone()).collect();
            let secrets = TxSecrets {
                manager: &self.manager,
                conn: sqltx,
            };
            signer::sign_transaction(&mut tx, &prev_scripts, &secrets)?;

            let rec = TxRecord::new(tx, Utc::now());
            self.add_tx_tx(sqltx, &rec, None)?;
            Ok((rec.hash, fee))
        })?;

        info!(
            "Sent {} to {} destinations in {} (fee {})",
            target,
            destinations.len(),
            hash,
            fee
        );
        Ok(hash)
    }

    // Queries

    /// Balance of one address at the synced height
    pub fn balance(&self, address: &Address, min_conf: i32) -> Result<Balances> {
        self.check_network(address)?;
        self.ledger()
            .balance(address.hash160(), min_conf, self.current_height()?, &self.consensus)
    }

    /// Balance of one account at the synced height
    pub fn account_balance(&self, scope: KeyScope, account: u32, min_conf: i32) -> Result<Balances> {
        self.ledger()
            .account_balance(scope, account, min_conf, self.current_height()?, &self.consensus)
    }

    /// Balances of every account of `scope`
    pub fn account_balances(&self, scope: KeyScope, min_conf: i32) -> Result<Vec<AccountBalance>> {
        let current = self.current_height()?;
        let ledger = self.ledger();
        self.manager
            .accounts(scope)?
            .into_iter()
            .map(|info| {
                Ok(AccountBalance {
                    balances: ledger.account_balance(
                        scope,
                        info.number,
                        min_conf,
                        current,
                        &self.consensus,
                    )?,
                    number: info.number,
                    name: info.name,
                })
            })
            .collect()
    }

    /// Details of a recorded transaction
    pub fn tx_details(&self, hash: &Hash256) -> Result<Option<TxDetails>> {
        self.ledger().tx_details(hash)
    }

    /// Owned outputs of a recorded transaction and what spends them
    pub fn spend_info(&self, hash: &Hash256) -> Result<Option<Vec<SpendInfo>>> {
        self.ledger().spend_info(hash)
    }

    /// Visit recorded transactions block by block, see
    /// [`LedgerStore::range_transactions_tx`]
    pub fn range_transactions<F>(&self, begin: i32, end: i32, visitor: F) -> Result<()>
    where
        F: FnMut(Vec<TxDetails>) -> Result<bool>,
    {
        self.ledger().range_transactions(begin, end, visitor)
    }

    // Maintenance

    /// Undo everything mined above `height` and rewind the cursor
    pub fn rollback(&self, height: i32) -> Result<BlockStamp> {
        let _guard = self.update_lock.lock();
        self.ledger().rollback(height)
    }

    /// Forget the whole ledger and restart sync from the birthday block
    pub fn clear_ledger(&self) -> Result<BlockStamp> {
        let _guard = self.update_lock.lock();
        let stamp = self.ledger().clear_ledger()?;
        info!("Ledger cleared, resyncing from height {}", stamp.height);
        Ok(stamp)
    }
}

/// Private keys read through the send transaction
struct TxSecrets<'a> {
    manager: &'a AddressManager,
    conn: &'a Connection,
}

impl SecretsSource for TxSecrets<'_> {
    fn private_key(&self, pubkey_hash: &[u8; HASH160_SIZE]) -> Result<PrivateKey> {
        self.manager.private_key_tx(self.conn, pubkey_hash)
    }
}
