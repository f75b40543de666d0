//! Ledger read paths: details, ranges, balances, bills and spendable outputs

use super::{
    hash_from_sql, time_from_sql, Balance, Balances, CreditRecord, DebitRecord, LedgerStore,
    Payment, SpendInfo, TxDetails, TxRecord,
};
use crate::accounts::KeyScope;
use crate::error::SqlResultExt;
use crate::{Error, Result};
use dagwallet_core::codec::Codec;
use dagwallet_core::{
    Amount, BlockMeta, CoinId, Hash256, OutPoint, SelectableOutput, Transaction, HASH160_SIZE,
    UNMINED_HEIGHT,
};
use dagwallet_params::ConsensusParams;
use rusqlite::{params, Connection, OptionalExtension};

/// Confirmations of a record at `height` seen from `current`
///
/// Unmined records and blocks above `current` have none.
pub fn confirmations(height: i32, current: i32) -> i32 {
    if height < 0 || height > current {
        return 0;
    }
    current - height + 1
}

/// Which credits to offer for spending
#[derive(Debug, Clone, Copy)]
pub enum OutputFilter<'f> {
    /// Credits paying any of these hash160s
    Addresses(&'f [[u8; HASH160_SIZE]]),
    /// Credits paying addresses of one account
    Account(KeyScope, u32),
}

type BalanceRow = (Amount, CoinId, i32, bool, bool);

fn fold_balances(
    rows: &[BalanceRow],
    min_conf: i32,
    current: i32,
    consensus: &ConsensusParams,
) -> Result<Balances> {
    let mut balances = Balances::new();
    for &(amount, coin_id, height, spent, coinbase) in rows {
        let entry = balances.entry(coin_id).or_insert_with(Balance::default);
        entry.total = entry.total.try_add(amount)?;
        if spent {
            entry.spent = entry.spent.try_add(amount)?;
        } else if coinbase && !consensus.is_coinbase_mature(height, current) {
            entry.locked = entry.locked.try_add(amount)?;
        } else if confirmations(height, current) >= min_conf {
            entry.unspent = entry.unspent.try_add(amount)?;
        } else {
            entry.unconfirmed = entry.unconfirmed.try_add(amount)?;
        }
    }
    Ok(balances)
}

fn balance_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BalanceRow> {
    Ok((
        Amount::from_atoms(row.get(0)?),
        CoinId(row.get(1)?),
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

impl<'a> LedgerStore<'a> {
    /// Details of a recorded transaction, preferring the mined copy
    pub fn tx_details(&self, hash: &Hash256) -> Result<Option<TxDetails>> {
        self.db.read(|conn| Self::tx_details_tx(conn, hash))
    }

    /// Visit recorded transactions by block, see
    /// [`LedgerStore::range_transactions_tx`]
    pub fn range_transactions<F>(&self, begin: i32, end: i32, visitor: F) -> Result<()>
    where
        F: FnMut(Vec<TxDetails>) -> Result<bool>,
    {
        self.db
            .read(|conn| Self::range_transactions_tx(conn, begin, end, visitor))
    }

    /// Balance of one address, see [`LedgerStore::balance_tx`]
    pub fn balance(
        &self,
        address_hash: &[u8; HASH160_SIZE],
        min_conf: i32,
        current: i32,
        consensus: &ConsensusParams,
    ) -> Result<Balances> {
        self.db
            .read(|conn| Self::balance_tx(conn, address_hash, min_conf, current, consensus))
    }

    /// Balance of every address of an account
    pub fn account_balance(
        &self,
        scope: KeyScope,
        account: u32,
        min_conf: i32,
        current: i32,
        consensus: &ConsensusParams,
    ) -> Result<Balances> {
        self.db.read(|conn| {
            Self::account_balance_tx(conn, scope, account, min_conf, current, consensus)
        })
    }

    /// Spendable credits, see [`LedgerStore::unspent_outputs_tx`]
    pub fn unspent_outputs(
        &self,
        filter: OutputFilter<'_>,
        min_conf: i32,
        current: i32,
        consensus: &ConsensusParams,
    ) -> Result<Vec<SelectableOutput>> {
        self.db
            .read(|conn| Self::unspent_outputs_tx(conn, filter, min_conf, current, consensus))
    }

    /// Payments touching one address, see [`LedgerStore::bill_tx`]
    pub fn bill(&self, address_hash: &[u8; HASH160_SIZE]) -> Result<Vec<Payment>> {
        self.db.read(|conn| Self::bill_tx(conn, address_hash))
    }

    /// Owned outputs of a transaction and their spenders
    pub fn spend_info(&self, hash: &Hash256) -> Result<Option<Vec<SpendInfo>>> {
        self.db.read(|conn| Self::spend_info_tx(conn, hash))
    }

    /// Details of a recorded transaction, preferring the mined copy
    ///
    /// Fails with [`Error::CorruptLedger`] when a stored credit or debit
    /// index lies outside the transaction.
    pub fn tx_details_tx(conn: &Connection, hash: &Hash256) -> Result<Option<TxDetails>> {
        let row: Option<(i32, Vec<u8>, i64)> = conn
            .query_row(
                r#"
                SELECT block_height, raw, received FROM ledger_txs
                WHERE hash = ?1
                ORDER BY block_height DESC
                LIMIT 1
                "#,
                [hash.as_bytes().to_vec()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .storage()?;
        row.map(|(height, raw, received)| details_at(conn, height, &raw, received))
            .transpose()
    }

    /// Visit recorded transactions grouped by block
    ///
    /// - a negative `begin` visits unmined transactions first;
    /// - negative bounds stand for the highest possible height when scanning
    ///   blocks;
    /// - blocks are visited ascending when `begin <= end`, descending
    ///   otherwise, one call per block holding wallet transactions;
    /// - a non-negative `begin` with a negative `end` visits unmined
    ///   transactions last.
    ///
    /// The visitor returns `Ok(true)` to stop early; its errors are returned.
    pub fn range_transactions_tx<F>(conn: &Connection, begin: i32, end: i32, mut visitor: F) -> Result<()>
    where
        F: FnMut(Vec<TxDetails>) -> Result<bool>,
    {
        if begin < 0 {
            let batch = batch_at(conn, UNMINED_HEIGHT)?;
            if !batch.is_empty() && visitor(batch)? {
                return Ok(());
            }
        }

        let clamp = |h: i32| if h < 0 { i32::MAX } else { h };
        let (from, to) = (clamp(begin), clamp(end));
        let sql = if from <= to {
            "SELECT DISTINCT block_height FROM ledger_txs WHERE block_height BETWEEN ?1 AND ?2 ORDER BY block_height ASC"
        } else {
            "SELECT DISTINCT block_height FROM ledger_txs WHERE block_height BETWEEN ?1 AND ?2 ORDER BY block_height DESC"
        };
        let heights = {
            let mut stmt = conn.prepare(sql).storage()?;
            let rows = stmt
                .query_map(params![from.min(to), from.max(to)], |row| row.get::<_, i32>(0))
                .storage()?
                .collect::<std::result::Result<Vec<_>, _>>()
                .storage()?;
            rows
        };
        for height in heights {
            let batch = batch_at(conn, height)?;
            if !batch.is_empty() && visitor(batch)? {
                return Ok(());
            }
        }

        if begin >= 0 && end < 0 {
            let batch = batch_at(conn, UNMINED_HEIGHT)?;
            if !batch.is_empty() {
                visitor(batch)?;
            }
        }
        Ok(())
    }

    /// Per-coin balance of the credits paying `address_hash`
    ///
    /// Unspent credits with at least `min_conf` confirmations at `current`
    /// count as unspent, younger ones (mempool included) as unconfirmed.
    /// Coinbase credits below maturity count as locked whatever their depth.
    pub fn balance_tx(
        conn: &Connection,
        address_hash: &[u8; HASH160_SIZE],
        min_conf: i32,
        current: i32,
        consensus: &ConsensusParams,
    ) -> Result<Balances> {
        let mut stmt = conn
            .prepare(
                r#"
                SELECT c.amount, c.coin_id, c.block_height, c.spent_by_hash IS NOT NULL,
                       t.is_coinbase
                FROM ledger_credits c
                JOIN ledger_txs t ON t.hash = c.tx_hash AND t.block_height = c.block_height
                WHERE c.address_hash = ?1
                "#,
            )
            .storage()?;
        let rows = stmt
            .query_map([address_hash.to_vec()], balance_row)
            .storage()?
            .collect::<std::result::Result<Vec<_>, _>>()
            .storage()?;
        fold_balances(&rows, min_conf, current, consensus)
    }

    /// Per-coin balance of every address of an account
    pub fn account_balance_tx(
        conn: &Connection,
        scope: KeyScope,
        account: u32,
        min_conf: i32,
        current: i32,
        consensus: &ConsensusParams,
    ) -> Result<Balances> {
        let mut stmt = conn
            .prepare(
                r#"
                SELECT c.amount, c.coin_id, c.block_height, c.spent_by_hash IS NOT NULL,
                       t.is_coinbase
                FROM ledger_credits c
                JOIN ledger_txs t ON t.hash = c.tx_hash AND t.block_height = c.block_height
                JOIN addresses a ON a.addr_hash = c.address_hash
                WHERE a.purpose = ?1 AND a.coin_type = ?2 AND a.account = ?3
                "#,
            )
            .storage()?;
        let rows = stmt
            .query_map(params![scope.purpose, scope.coin_type, account], balance_row)
            .storage()?
            .collect::<std::result::Result<Vec<_>, _>>()
            .storage()?;
        fold_balances(&rows, min_conf, current, consensus)
    }

    /// Unspent credits with at least `min_conf` confirmations
    ///
    /// Credits spent by unmined transactions and immature coinbase outputs
    /// are excluded. Oldest first.
    pub fn unspent_outputs_tx(
        conn: &Connection,
        filter: OutputFilter<'_>,
        min_conf: i32,
        current: i32,
        consensus: &ConsensusParams,
    ) -> Result<Vec<SelectableOutput>> {
        const SELECT: &str = r#"
            SELECT c.tx_hash, c.block_height, c.output_index, c.amount, c.coin_id,
                   c.address_hash, c.pk_script, t.is_coinbase
            FROM ledger_credits c
            JOIN ledger_txs t ON t.hash = c.tx_hash AND t.block_height = c.block_height
        "#;
        type RawOutput = (Vec<u8>, i32, u32, i64, u16, Vec<u8>, Vec<u8>, bool);
        let map = |row: &rusqlite::Row<'_>| -> rusqlite::Result<RawOutput> {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
            ))
        };

        let mut raw: Vec<RawOutput> = Vec::new();
        match filter {
            OutputFilter::Addresses(hashes) => {
                let mut stmt = conn
                    .prepare(&format!(
                        "{} WHERE c.spent_by_hash IS NULL AND c.address_hash = ?1",
                        SELECT
                    ))
                    .storage()?;
                for hash in hashes {
                    let rows = stmt
                        .query_map([hash.to_vec()], map)
                        .storage()?
                        .collect::<std::result::Result<Vec<_>, _>>()
                        .storage()?;
                    raw.extend(rows);
                }
            }
            OutputFilter::Account(scope, account) => {
                let mut stmt = conn
                    .prepare(&format!(
                        r#"{}
                        JOIN addresses a ON a.addr_hash = c.address_hash
                        WHERE c.spent_by_hash IS NULL
                          AND a.purpose = ?1 AND a.coin_type = ?2 AND a.account = ?3"#,
                        SELECT
                    ))
                    .storage()?;
                let rows = stmt
                    .query_map(params![scope.purpose, scope.coin_type, account], map)
                    .storage()?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .storage()?;
                raw.extend(rows);
            }
        }

        let mut outputs = Vec::with_capacity(raw.len());
        for (tx_hash, height, index, amount, coin_id, address_hash, pk_script, coinbase) in raw {
            if confirmations(height, current) < min_conf {
                continue;
            }
            if coinbase && !consensus.is_coinbase_mature(height, current) {
                continue;
            }
            let address_hash: [u8; HASH160_SIZE] = address_hash
                .as_slice()
                .try_into()
                .map_err(|_| Error::CorruptLedger("address hash length".to_string()))?;
            outputs.push(SelectableOutput {
                outpoint: OutPoint::new(hash_from_sql(&tx_hash)?, index),
                amount: Amount::from_atoms(amount),
                coin_id: CoinId(coin_id),
                height,
                address_hash,
                pk_script,
            });
        }
        outputs.sort_by_key(|o| (o.height < 0, o.height, o.outpoint));
        Ok(outputs)
    }

    /// Net effect of every recorded transaction on `address_hash`, per coin
    ///
    /// Unmined payments come first, then mined ones by height descending.
    pub fn bill_tx(conn: &Connection, address_hash: &[u8; HASH160_SIZE]) -> Result<Vec<Payment>> {
        let mut stmt = conn
            .prepare(
                r#"
                SELECT p.tx_hash, p.block_height, p.coin_id, SUM(p.amount), MAX(b.hash)
                FROM (
                    SELECT tx_hash, block_height, coin_id, amount
                    FROM ledger_credits WHERE address_hash = ?1
                    UNION ALL
                    SELECT d.tx_hash, d.block_height, d.coin_id, -d.amount
                    FROM ledger_debits d
                    JOIN ledger_credits c
                      ON c.tx_hash = d.credit_hash
                     AND c.block_height = d.credit_height
                     AND c.output_index = d.credit_index
                    WHERE c.address_hash = ?1
                ) p
                LEFT JOIN ledger_blocks b ON b.height = p.block_height
                GROUP BY p.tx_hash, p.block_height, p.coin_id
                ORDER BY (p.block_height < 0) DESC, p.block_height DESC, p.tx_hash
                "#,
            )
            .storage()?;
        let rows = stmt
            .query_map([address_hash.to_vec()], |row| {
                Ok((
                    row.get::<_, Vec<u8>>(0)?,
                    row.get::<_, i32>(1)?,
                    row.get::<_, u16>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<Vec<u8>>>(4)?,
                ))
            })
            .storage()?
            .collect::<std::result::Result<Vec<_>, _>>()
            .storage()?;

        rows.into_iter()
            .map(|(tx_hash, height, coin_id, variation, block_hash)| {
                Ok(Payment {
                    tx_hash: hash_from_sql(&tx_hash)?,
                    coin_id: CoinId(coin_id),
                    variation: Amount::from_atoms(variation),
                    block_height: height,
                    block_hash: block_hash.as_deref().map(hash_from_sql).transpose()?,
                })
            })
            .collect()
    }

    /// Owned outputs of a transaction and what spends them, `None` if the
    /// transaction is unknown
    pub fn spend_info_tx(conn: &Connection, hash: &Hash256) -> Result<Option<Vec<SpendInfo>>> {
        let height: Option<i32> = conn
            .query_row(
                "SELECT MAX(block_height) FROM ledger_txs WHERE hash = ?1",
                [hash.as_bytes().to_vec()],
                |row| row.get(0),
            )
            .storage()?;
        let Some(height) = height else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare(
                r#"
                SELECT output_index, amount, coin_id, address, spent_by_hash, spent_by_input
                FROM ledger_credits
                WHERE tx_hash = ?1 AND block_height = ?2
                ORDER BY output_index
                "#,
            )
            .storage()?;
        let rows = stmt
            .query_map(params![hash.as_bytes().to_vec(), height], |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, u16>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<Vec<u8>>>(4)?,
                    row.get::<_, Option<u32>>(5)?,
                ))
            })
            .storage()?
            .collect::<std::result::Result<Vec<_>, _>>()
            .storage()?;

        rows.into_iter()
            .map(|(index, amount, coin_id, address, spender, input)| {
                let spent_by = match (spender, input) {
                    (Some(spender), Some(input)) => Some((hash_from_sql(&spender)?, input)),
                    _ => None,
                };
                Ok(SpendInfo {
                    index,
                    amount: Amount::from_atoms(amount),
                    coin_id: CoinId(coin_id),
                    address,
                    spent_by,
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}

/// Every transaction recorded at `height`, in recording order
fn batch_at(conn: &Connection, height: i32) -> Result<Vec<TxDetails>> {
    let sql = if height == UNMINED_HEIGHT {
        "SELECT raw, received FROM ledger_txs WHERE block_height = ?1 ORDER BY received, rowid"
    } else {
        "SELECT raw, received FROM ledger_txs WHERE block_height = ?1 ORDER BY rowid"
    };
    let rows = {
        let mut stmt = conn.prepare(sql).storage()?;
        let rows = stmt
            .query_map([height], |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, i64>(1)?)))
            .storage()?
            .collect::<std::result::Result<Vec<_>, _>>()
            .storage()?;
        rows
    };
    rows.into_iter()
        .map(|(raw, received)| details_at(conn, height, &raw, received))
        .collect()
}

fn details_at(conn: &Connection, height: i32, raw: &[u8], received: i64) -> Result<TxDetails> {
    let tx = Transaction::from_bytes(raw)
        .map_err(|e| Error::CorruptLedger(format!("stored transaction: {}", e)))?;
    let record = TxRecord {
        hash: tx.tx_hash(),
        serialized: raw.to_vec(),
        tx,
        received: time_from_sql(received)?,
    };
    let key = record.hash.as_bytes().to_vec();

    let block = if height == UNMINED_HEIGHT {
        None
    } else {
        let (hash, time): (Vec<u8>, i64) = conn
            .query_row(
                "SELECT hash, time FROM ledger_blocks WHERE height = ?1",
                [height],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .storage()?
            .ok_or_else(|| Error::CorruptLedger(format!("no block recorded at {}", height)))?;
        Some(BlockMeta::new(height, hash_from_sql(&hash)?, time))
    };

    let credits = {
        let mut stmt = conn
            .prepare(
                r#"
                SELECT output_index, amount, coin_id, spent_by_hash IS NOT NULL, is_change, address
                FROM ledger_credits WHERE tx_hash = ?1 AND block_height = ?2
                ORDER BY output_index
                "#,
            )
            .storage()?;
        let rows = stmt
            .query_map(params![&key, height], |row| {
                Ok(CreditRecord {
                    index: row.get(0)?,
                    amount: Amount::from_atoms(row.get(1)?),
                    coin_id: CoinId(row.get(2)?),
                    spent: row.get(3)?,
                    is_change: row.get(4)?,
                    address: row.get(5)?,
                })
            })
            .storage()?
            .collect::<std::result::Result<Vec<_>, _>>()
            .storage()?;
        rows
    };
    if let Some(bad) = credits
        .iter()
        .find(|c| c.index as usize >= record.tx.outputs.len())
    {
        return Err(Error::CorruptLedger(format!(
            "credit index {} outside {} outputs of {}",
            bad.index,
            record.tx.outputs.len(),
            record.hash
        )));
    }

    let debits = {
        let mut stmt = conn
            .prepare(
                r#"
                SELECT input_index, amount, coin_id
                FROM ledger_debits WHERE tx_hash = ?1 AND block_height = ?2
                ORDER BY input_index
                "#,
            )
            .storage()?;
        let rows = stmt
            .query_map(params![&key, height], |row| {
                Ok(DebitRecord {
                    index: row.get(0)?,
                    amount: Amount::from_atoms(row.get(1)?),
                    coin_id: CoinId(row.get(2)?),
                })
            })
            .storage()?
            .collect::<std::result::Result<Vec<_>, _>>()
            .storage()?;
        rows
    };
    if let Some(bad) = debits
        .iter()
        .find(|d| d.index as usize >= record.tx.inputs.len())
    {
        return Err(Error::CorruptLedger(format!(
            "debit index {} outside {} inputs of {}",
            bad.index,
            record.tx.inputs.len(),
            record.hash
        )));
    }

    Ok(TxDetails {
        record,
        block,
        credits,
        debits,
    })
}
