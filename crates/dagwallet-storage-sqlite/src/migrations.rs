//! Database schema migrations

use crate::error::SqlResultExt;
use crate::{Error, Result};
use rusqlite::Connection;

/// Schema version this build reads and writes
pub const SCHEMA_VERSION: i32 = 2;

/// Run all migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    tracing::debug!(
        "Running migrations: current_version={}, target_version={}",
        current_version,
        SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    if current_version < 2 {
        migrate_v2(conn)?;
    }

    if current_version != SCHEMA_VERSION {
        set_schema_version(conn, SCHEMA_VERSION)?;
    }

    Ok(())
}

/// Reject databases written by another schema version
pub fn check_schema_version(version: i32) -> Result<()> {
    if version < SCHEMA_VERSION {
        return Err(Error::Upgrade(format!(
            "database schema v{} is older than supported v{}",
            version, SCHEMA_VERSION
        )));
    }
    if version > SCHEMA_VERSION {
        return Err(Error::Upgrade(format!(
            "database schema v{} is newer than supported v{}",
            version, SCHEMA_VERSION
        )));
    }
    Ok(())
}

/// Current schema version, 0 for an empty database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
            [],
            |row| row.get(0),
        )
        .storage()?;
    if !exists {
        return Ok(0);
    }

    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .storage()
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
        [],
    )
    .storage()?;

    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
            [version],
        )
        .storage()?;
    if inserted > 0 {
        tracing::debug!("Inserted schema version {}", version);
    }
    Ok(())
}

/// Key store, scopes, accounts, addresses and the sync cursor
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE manager_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL,
            network TEXT NOT NULL,
            watch_only INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            key_store BLOB NOT NULL
        );

        CREATE TABLE scopes (
            purpose INTEGER NOT NULL,
            coin_type INTEGER NOT NULL,
            coin_pub BLOB NOT NULL,
            coin_priv BLOB,
            last_account INTEGER NOT NULL,
            PRIMARY KEY (purpose, coin_type)
        );

        CREATE TABLE accounts (
            purpose INTEGER NOT NULL,
            coin_type INTEGER NOT NULL,
            number INTEGER NOT NULL,
            name TEXT NOT NULL,
            row BLOB NOT NULL,
            PRIMARY KEY (purpose, coin_type, number),
            UNIQUE (purpose, coin_type, name),
            FOREIGN KEY (purpose, coin_type) REFERENCES scopes(purpose, coin_type)
        );

        CREATE TABLE addresses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            addr_hash BLOB NOT NULL UNIQUE,
            purpose INTEGER NOT NULL,
            coin_type INTEGER NOT NULL,
            account INTEGER NOT NULL,
            kind INTEGER NOT NULL,
            row BLOB NOT NULL,
            created_at INTEGER NOT NULL,
            sync_status INTEGER NOT NULL,
            FOREIGN KEY (purpose, coin_type, account)
                REFERENCES accounts(purpose, coin_type, number)
        );

        CREATE TABLE sync_state (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            row BLOB NOT NULL
        );

        CREATE TABLE sync_blocks (
            height INTEGER PRIMARY KEY,
            hash BLOB NOT NULL,
            time INTEGER NOT NULL
        );

        CREATE INDEX idx_addresses_account ON addresses(purpose, coin_type, account);
        "#,
    )
    .map_err(|e| Error::Storage(format!("migration v1: {}", e)))?;

    Ok(())
}

/// Ledger: blocks, mined/unmined transactions, credits and debits
///
/// Unmined rows use block_height = -1.
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE ledger_blocks (
            height INTEGER PRIMARY KEY,
            hash BLOB NOT NULL,
            time INTEGER NOT NULL
        );

        CREATE TABLE ledger_txs (
            hash BLOB NOT NULL,
            block_height INTEGER NOT NULL,
            raw BLOB NOT NULL,
            received INTEGER NOT NULL,
            is_coinbase INTEGER NOT NULL,
            PRIMARY KEY (hash, block_height)
        );

        CREATE TABLE ledger_credits (
            tx_hash BLOB NOT NULL,
            block_height INTEGER NOT NULL,
            output_index INTEGER NOT NULL,
            amount INTEGER NOT NULL,
            coin_id INTEGER NOT NULL,
            is_change INTEGER NOT NULL,
            address TEXT NOT NULL,
            address_hash BLOB NOT NULL,
            pk_script BLOB NOT NULL,
            spent_by_hash BLOB,
            spent_by_height INTEGER,
            spent_by_input INTEGER,
            PRIMARY KEY (tx_hash, block_height, output_index)
        );

        CREATE TABLE ledger_debits (
            tx_hash BLOB NOT NULL,
            block_height INTEGER NOT NULL,
            input_index INTEGER NOT NULL,
            amount INTEGER NOT NULL,
            coin_id INTEGER NOT NULL,
            credit_hash BLOB NOT NULL,
            credit_height INTEGER NOT NULL,
            credit_index INTEGER NOT NULL,
            PRIMARY KEY (tx_hash, block_height, input_index)
        );

        CREATE INDEX idx_ledger_txs_height ON ledger_txs(block_height);
        CREATE INDEX idx_ledger_credits_address ON ledger_credits(address_hash);
        CREATE INDEX idx_ledger_credits_spender ON ledger_credits(spent_by_hash, spent_by_height);
        CREATE INDEX idx_ledger_debits_credit ON ledger_debits(credit_hash, credit_height, credit_index);
        "#,
    )
    .map_err(|e| Error::Storage(format!("migration v2: {}", e)))?;

    Ok(())
}
