//! Transaction ledger
//!
//! Mined and unmined transactions relevant to the wallet, the credits they
//! pay to owned addresses and the debits they take from owned credits.
//! Unmined rows are stored at block height -1. Mining a known unmined
//! transaction re-points its rows (and every spend link to them) in place,
//! so no record ever exists in both partitions.
//!
//! The `_tx` functions run inside a caller-supplied transaction so the
//! wallet can combine ledger writes with the sync cursor update.

mod query;

pub use query::{confirmations, OutputFilter};

use crate::error::SqlResultExt;
use crate::sync_state::SyncStateStorage;
use crate::{Database, Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use dagwallet_core::codec::Codec;
use dagwallet_core::{
    Address, Amount, BlockMeta, BlockStamp, CoinId, Hash256, OutPoint, Transaction,
    UNMINED_HEIGHT,
};
use rusqlite::{params, Connection, OptionalExtension, Transaction as SqlTransaction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A transaction as recorded by the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    /// Transaction hash
    pub hash: Hash256,
    /// Decoded transaction
    pub tx: Transaction,
    /// Wire bytes
    pub serialized: Vec<u8>,
    /// When the wallet first saw it
    pub received: DateTime<Utc>,
}

impl TxRecord {
    /// Record for `tx` received at `received`
    pub fn new(tx: Transaction, received: DateTime<Utc>) -> Self {
        Self {
            hash: tx.tx_hash(),
            serialized: tx.to_bytes(),
            tx,
            received,
        }
    }

    /// Record from wire bytes
    pub fn from_serialized(serialized: &[u8], received: DateTime<Utc>) -> Result<Self> {
        let tx = Transaction::from_bytes(serialized)?;
        Ok(Self {
            hash: tx.tx_hash(),
            tx,
            serialized: serialized.to_vec(),
            received,
        })
    }
}

/// Output of a wallet transaction paying an owned address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditRecord {
    /// Output index
    pub index: u32,
    /// Value
    pub amount: Amount,
    /// Coin kind
    pub coin_id: CoinId,
    /// Whether a recorded transaction spends it
    pub spent: bool,
    /// Whether it pays a change address
    pub is_change: bool,
    /// Encoded address it pays
    pub address: String,
}

/// Input of a wallet transaction spending an owned credit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebitRecord {
    /// Input index
    pub index: u32,
    /// Value of the spent credit
    pub amount: Amount,
    /// Coin kind of the spent credit
    pub coin_id: CoinId,
}

/// A recorded transaction with its block, credits and debits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxDetails {
    /// The transaction
    pub record: TxRecord,
    /// Containing block, `None` while unmined
    pub block: Option<BlockMeta>,
    /// Owned outputs
    pub credits: Vec<CreditRecord>,
    /// Inputs spending owned outputs
    pub debits: Vec<DebitRecord>,
}

impl TxDetails {
    /// Block height, -1 while unmined
    pub fn height(&self) -> i32 {
        self.block.map_or(UNMINED_HEIGHT, |b| b.height)
    }

    /// Total credited per coin
    pub fn credited(&self, coin_id: CoinId) -> Amount {
        self.credits
            .iter()
            .filter(|c| c.coin_id == coin_id)
            .map(|c| c.amount)
            .sum()
    }

    /// Total debited per coin
    pub fn debited(&self, coin_id: CoinId) -> Amount {
        self.debits
            .iter()
            .filter(|d| d.coin_id == coin_id)
            .map(|d| d.amount)
            .sum()
    }
}

/// Balance of one coin
///
/// `unspent + unconfirmed + locked + spent == total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Unspent with at least the requested confirmations
    pub unspent: Amount,
    /// Unspent below the requested confirmations, mempool included
    pub unconfirmed: Amount,
    /// Unspent coinbase below maturity
    pub locked: Amount,
    /// Spent by a recorded transaction
    pub spent: Amount,
    /// Every credit
    pub total: Amount,
}

/// Balances keyed by coin
pub type Balances = BTreeMap<CoinId, Balance>;

/// Net effect of one transaction on one address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Transaction hash
    pub tx_hash: Hash256,
    /// Coin kind
    pub coin_id: CoinId,
    /// Credits minus debits
    pub variation: Amount,
    /// Block height, -1 while unmined
    pub block_height: i32,
    /// Block hash, once mined
    pub block_hash: Option<Hash256>,
}

/// Owned output of a wallet transaction and what spends it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendInfo {
    /// Output index
    pub index: u32,
    /// Value
    pub amount: Amount,
    /// Coin kind
    pub coin_id: CoinId,
    /// Encoded address
    pub address: String,
    /// Spending transaction and input index
    pub spent_by: Option<(Hash256, u32)>,
}

pub(crate) fn hash_from_sql(bytes: &[u8]) -> Result<Hash256> {
    Hash256::from_slice(bytes).map_err(|e| Error::CorruptLedger(e.to_string()))
}

pub(crate) fn time_from_sql(secs: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| Error::CorruptLedger(format!("timestamp {} out of range", secs)))
}

fn height_of(block: Option<&BlockMeta>) -> i32 {
    block.map_or(UNMINED_HEIGHT, |b| b.height)
}

fn tx_exists_at(conn: &Connection, hash: &Hash256, height: i32) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM ledger_txs WHERE hash = ?1 AND block_height = ?2)",
        params![hash.as_bytes().to_vec(), height],
        |row| row.get(0),
    )
    .storage()
}

/// Ledger operations
pub struct LedgerStore<'a> {
    db: &'a Database,
}

impl<'a> LedgerStore<'a> {
    /// Create new ledger storage
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Record a transaction, see [`LedgerStore::insert_transaction_tx`]
    pub fn insert_tx(&self, rec: &TxRecord, block: Option<&BlockMeta>) -> Result<bool> {
        self.db
            .write(|tx| Self::insert_transaction_tx(tx, rec, block))
    }

    /// Record a credit, see [`LedgerStore::add_credit_tx`]
    pub fn add_credit(
        &self,
        rec: &TxRecord,
        block: Option<&BlockMeta>,
        index: u32,
        is_change: bool,
        address: &Address,
    ) -> Result<bool> {
        self.db
            .write(|tx| Self::add_credit_tx(tx, rec, block, index, is_change, address))
    }

    /// Record a debit, see [`LedgerStore::add_debit_tx`]
    pub fn add_debit(&self, rec: &TxRecord, block: Option<&BlockMeta>, index: u32) -> Result<bool> {
        self.db
            .write(|tx| Self::add_debit_tx(tx, rec, block, index))
    }

    /// Move everything mined above `height` back to unmined, drop coinbase
    /// records above it and rewind the sync cursor, atomically
    pub fn rollback(&self, height: i32) -> Result<BlockStamp> {
        self.db.write(|tx| {
            Self::rollback_tx(tx, height)?;
            SyncStateStorage::truncate_above_height_tx(tx, height)
        })
    }

    /// Empty the ledger and reset the sync cursor to the birthday block,
    /// atomically
    pub fn clear_ledger(&self) -> Result<BlockStamp> {
        self.db.write(|tx| {
            Self::clear_tx(tx)?;
            SyncStateStorage::reset_to_birthday_tx(tx)
        })
    }

    /// Record `rec` as mined in `block`, or unmined when `block` is `None`
    ///
    /// Returns whether anything changed. Recording an unmined transaction
    /// whose hash is already known is a no-op. Recording a mined copy of a
    /// known unmined transaction moves it and its credits, debits and spend
    /// links to the block.
    pub fn insert_transaction_tx(
        tx: &SqlTransaction<'_>,
        rec: &TxRecord,
        block: Option<&BlockMeta>,
    ) -> Result<bool> {
        let hash = rec.hash.as_bytes().to_vec();

        let Some(meta) = block else {
            let known: bool = tx
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM ledger_txs WHERE hash = ?1)",
                    [&hash],
                    |row| row.get(0),
                )
                .storage()?;
            if known {
                return Ok(false);
            }
            insert_tx_row(tx, rec, UNMINED_HEIGHT)?;
            tracing::debug!("Recorded unmined transaction {}", rec.hash);
            return Ok(true);
        };

        record_block_tx(tx, meta)?;
        if tx_exists_at(tx, &rec.hash, meta.height)? {
            return Ok(false);
        }

        if tx_exists_at(tx, &rec.hash, UNMINED_HEIGHT)? {
            for sql in [
                "UPDATE ledger_txs SET block_height = ?2 WHERE hash = ?1 AND block_height = -1",
                "UPDATE ledger_credits SET block_height = ?2 WHERE tx_hash = ?1 AND block_height = -1",
                "UPDATE ledger_debits SET block_height = ?2 WHERE tx_hash = ?1 AND block_height = -1",
                "UPDATE ledger_credits SET spent_by_height = ?2 WHERE spent_by_hash = ?1 AND spent_by_height = -1",
                "UPDATE ledger_debits SET credit_height = ?2 WHERE credit_hash = ?1 AND credit_height = -1",
            ] {
                tx.execute(sql, params![&hash, meta.height]).storage()?;
            }
            tracing::debug!(
                "Moved transaction {} from mempool to block {}",
                rec.hash,
                meta.height
            );
            return Ok(true);
        }

        insert_tx_row(tx, rec, meta.height)?;
        tracing::debug!("Recorded transaction {} in block {}", rec.hash, meta.height);
        Ok(true)
    }

    /// Record output `index` of `rec` as a credit to `address`
    ///
    /// New credits are unspent; re-adding an existing credit changes nothing
    /// and returns `false`.
    pub fn add_credit_tx(
        tx: &SqlTransaction<'_>,
        rec: &TxRecord,
        block: Option<&BlockMeta>,
        index: u32,
        is_change: bool,
        address: &Address,
    ) -> Result<bool> {
        let output = rec.tx.outputs.get(index as usize).ok_or_else(|| {
            Error::CorruptLedger(format!(
                "output {} of {} outside {} outputs",
                index,
                rec.hash,
                rec.tx.outputs.len()
            ))
        })?;
        let height = height_of(block);
        if !tx_exists_at(tx, &rec.hash, height)? {
            return Err(Error::CorruptLedger(format!(
                "credit for unrecorded transaction {}",
                rec.hash
            )));
        }

        let inserted = tx
            .execute(
                r#"
                INSERT OR IGNORE INTO ledger_credits
                    (tx_hash, block_height, output_index, amount, coin_id, is_change,
                     address, address_hash, pk_script)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    rec.hash.as_bytes().to_vec(),
                    height,
                    index,
                    output.amount.atoms(),
                    output.coin_id.as_u16(),
                    is_change,
                    address.to_string(),
                    address.hash160().to_vec(),
                    output.pk_script
                ],
            )
            .storage()?;
        Ok(inserted > 0)
    }

    /// Record input `index` of `rec` as spending an owned credit
    ///
    /// A mined spend of a credit held by a different unmined spender removes
    /// that double spend and everything unmined depending on it. Any other
    /// conflicting spend is logged and not recorded; callers check
    /// [`LedgerStore::conflicting_spend_tx`] first so such a transaction
    /// never lands half recorded.
    pub fn add_debit_tx(
        tx: &SqlTransaction<'_>,
        rec: &TxRecord,
        block: Option<&BlockMeta>,
        index: u32,
    ) -> Result<bool> {
        let input = rec.tx.inputs.get(index as usize).ok_or_else(|| {
            Error::CorruptLedger(format!(
                "input {} of {} outside {} inputs",
                index,
                rec.hash,
                rec.tx.inputs.len()
            ))
        })?;
        let spent = input.previous_output;
        let height = height_of(block);

        let credit = find_credit_tx(tx, &spent)?
            .ok_or_else(|| Error::UnknownOutpoint(spent.to_string()))?;

        let debit_known: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM ledger_debits WHERE tx_hash = ?1 AND block_height = ?2 AND input_index = ?3)",
                params![rec.hash.as_bytes().to_vec(), height, index],
                |row| row.get(0),
            )
            .storage()?;
        if debit_known {
            return Ok(false);
        }

        if let Some((spender, spender_height)) = credit.spent_by {
            if spender != rec.hash {
                if !evicts(spender_height, height) {
                    tracing::warn!(
                        "Ignoring spend of {} by {}: already spent by {}",
                        spent,
                        rec.hash,
                        spender
                    );
                    return Ok(false);
                }
                tracing::warn!(
                    "Removing unmined double spend {} of {} (mined spender {})",
                    spender,
                    spent,
                    rec.hash
                );
                Self::remove_unmined_transaction_tx(tx, &spender)?;
            }
        }

        tx.execute(
            r#"
            UPDATE ledger_credits
            SET spent_by_hash = ?1, spent_by_height = ?2, spent_by_input = ?3
            WHERE tx_hash = ?4 AND block_height = ?5 AND output_index = ?6
            "#,
            params![
                rec.hash.as_bytes().to_vec(),
                height,
                index,
                spent.hash.as_bytes().to_vec(),
                credit.height,
                spent.index
            ],
        )
        .storage()?;
        tx.execute(
            r#"
            INSERT INTO ledger_debits
                (tx_hash, block_height, input_index, amount, coin_id,
                 credit_hash, credit_height, credit_index)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                rec.hash.as_bytes().to_vec(),
                height,
                index,
                credit.amount.atoms(),
                credit.coin_id.as_u16(),
                spent.hash.as_bytes().to_vec(),
                credit.height,
                spent.index
            ],
        )
        .storage()?;
        Ok(true)
    }

    /// Remove an unmined transaction and, first, every unmined transaction
    /// spending its outputs
    pub fn remove_unmined_transaction_tx(tx: &SqlTransaction<'_>, hash: &Hash256) -> Result<()> {
        let key = hash.as_bytes().to_vec();
        let spenders = {
            let mut stmt = tx
                .prepare(
                    r#"
                    SELECT DISTINCT spent_by_hash FROM ledger_credits
                    WHERE tx_hash = ?1 AND block_height = -1
                      AND spent_by_hash IS NOT NULL AND spent_by_height = -1
                    "#,
                )
                .storage()?;
            let rows = stmt
                .query_map([&key], |row| row.get::<_, Vec<u8>>(0))
                .storage()?
                .collect::<std::result::Result<Vec<_>, _>>()
                .storage()?;
            rows
        };
        for spender in spenders {
            let spender = hash_from_sql(&spender)?;
            if spender != *hash {
                Self::remove_unmined_transaction_tx(tx, &spender)?;
            }
        }

        tx.execute(
            r#"
            UPDATE ledger_credits
            SET spent_by_hash = NULL, spent_by_height = NULL, spent_by_input = NULL
            WHERE spent_by_hash = ?1 AND spent_by_height = -1
            "#,
            [&key],
        )
        .storage()?;
        for sql in [
            "DELETE FROM ledger_debits WHERE tx_hash = ?1 AND block_height = -1",
            "DELETE FROM ledger_credits WHERE tx_hash = ?1 AND block_height = -1",
            "DELETE FROM ledger_txs WHERE hash = ?1 AND block_height = -1",
        ] {
            tx.execute(sql, [&key]).storage()?;
        }
        tracing::debug!("Removed unmined transaction {}", hash);
        Ok(())
    }

    /// Move records mined above `height` back to unmined and drop the
    /// coinbase transactions among them with their unmined spenders
    pub fn rollback_tx(tx: &SqlTransaction<'_>, height: i32) -> Result<()> {
        for sql in [
            "UPDATE ledger_txs SET block_height = -1 WHERE block_height > ?1",
            "UPDATE ledger_credits SET block_height = -1 WHERE block_height > ?1",
            "UPDATE ledger_credits SET spent_by_height = -1 WHERE spent_by_height > ?1",
            "UPDATE ledger_debits SET block_height = -1 WHERE block_height > ?1",
            "UPDATE ledger_debits SET credit_height = -1 WHERE credit_height > ?1",
            "DELETE FROM ledger_blocks WHERE height > ?1",
        ] {
            tx.execute(sql, [height]).storage()?;
        }

        let coinbases = {
            let mut stmt = tx
                .prepare("SELECT hash FROM ledger_txs WHERE block_height = -1 AND is_coinbase = 1")
                .storage()?;
            let rows = stmt
                .query_map([], |row| row.get::<_, Vec<u8>>(0))
                .storage()?
                .collect::<std::result::Result<Vec<_>, _>>()
                .storage()?;
            rows
        };
        for hash in &coinbases {
            Self::remove_unmined_transaction_tx(tx, &hash_from_sql(hash)?)?;
        }

        tracing::info!(
            "Rolled ledger back to height {} ({} coinbase transactions dropped)",
            height,
            coinbases.len()
        );
        Ok(())
    }

    /// Delete every ledger row
    pub fn clear_tx(tx: &SqlTransaction<'_>) -> Result<()> {
        tx.execute_batch(
            r#"
            DELETE FROM ledger_debits;
            DELETE FROM ledger_credits;
            DELETE FROM ledger_txs;
            DELETE FROM ledger_blocks;
            "#,
        )
        .storage()?;
        tracing::info!("Cleared ledger");
        Ok(())
    }

    /// First input of `rec` spending a credit that another transaction
    /// already holds and that recording `rec` at `block` would not evict
    ///
    /// Returns the outpoint and its current spender. Only a mined `rec`
    /// evicts, and only unmined spenders.
    pub fn conflicting_spend_tx(
        conn: &Connection,
        rec: &TxRecord,
        block: Option<&BlockMeta>,
    ) -> Result<Option<(OutPoint, Hash256)>> {
        if rec.tx.is_coinbase() {
            return Ok(None);
        }
        let height = height_of(block);
        for input in &rec.tx.inputs {
            let spent = input.previous_output;
            let Some(credit) = find_credit_tx(conn, &spent)? else {
                continue;
            };
            if let Some((spender, spender_height)) = credit.spent_by {
                if spender != rec.hash && !evicts(spender_height, height) {
                    return Ok(Some((spent, spender)));
                }
            }
        }
        Ok(None)
    }

    /// Whether `outpoint` is a recorded credit
    pub fn credit_exists_tx(conn: &Connection, outpoint: &OutPoint) -> Result<bool> {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM ledger_credits WHERE tx_hash = ?1 AND output_index = ?2)",
            params![outpoint.hash.as_bytes().to_vec(), outpoint.index],
            |row| row.get(0),
        )
        .storage()
    }
}

fn insert_tx_row(tx: &SqlTransaction<'_>, rec: &TxRecord, height: i32) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO ledger_txs (hash, block_height, raw, received, is_coinbase)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            rec.hash.as_bytes().to_vec(),
            height,
            rec.serialized,
            rec.received.timestamp(),
            rec.tx.is_coinbase()
        ],
    )
    .storage()?;
    Ok(())
}

fn record_block_tx(tx: &SqlTransaction<'_>, meta: &BlockMeta) -> Result<()> {
    let existing: Option<Vec<u8>> = tx
        .query_row(
            "SELECT hash FROM ledger_blocks WHERE height = ?1",
            [meta.height],
            |row| row.get(0),
        )
        .optional()
        .storage()?;
    match existing {
        Some(hash) if hash_from_sql(&hash)? != meta.hash => Err(Error::InvalidArgument(format!(
            "block {} at height {} conflicts with recorded block {}; roll back first",
            meta.hash,
            meta.height,
            hex::encode(hash)
        ))),
        Some(_) => Ok(()),
        None => {
            tx.execute(
                "INSERT INTO ledger_blocks (height, hash, time) VALUES (?1, ?2, ?3)",
                params![meta.height, meta.hash.as_bytes().to_vec(), meta.time],
            )
            .storage()?;
            Ok(())
        }
    }
}

/// Whether a spend recorded at `height` replaces one at `spender_height`
fn evicts(spender_height: i32, height: i32) -> bool {
    spender_height == UNMINED_HEIGHT && height != UNMINED_HEIGHT
}

struct CreditRef {
    height: i32,
    amount: Amount,
    coin_id: CoinId,
    spent_by: Option<(Hash256, i32)>,
}

/// Newest recorded copy of the credit at `outpoint`
fn find_credit_tx(conn: &Connection, outpoint: &OutPoint) -> Result<Option<CreditRef>> {
    let row: Option<(i32, i64, u16, Option<Vec<u8>>, Option<i32>)> = conn
        .query_row(
            r#"
            SELECT block_height, amount, coin_id, spent_by_hash, spent_by_height
            FROM ledger_credits
            WHERE tx_hash = ?1 AND output_index = ?2
            ORDER BY block_height DESC
            LIMIT 1
            "#,
            params![outpoint.hash.as_bytes().to_vec(), outpoint.index],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .optional()
        .storage()?;

    row.map(|(height, amount, coin_id, spender, spender_height)| {
        let spent_by = match (spender, spender_height) {
            (Some(hash), Some(h)) => Some((hash_from_sql(&hash)?, h)),
            _ => None,
        };
        Ok(CreditRef {
            height,
            amount: Amount::from_atoms(amount),
            coin_id: CoinId(coin_id),
            spent_by,
        })
    })
    .transpose()
}
