//! Database connection and initialization
//!
//! One writer connection behind a mutex plus a small pool of reader
//! connections. WAL mode lets readers proceed while the writer holds its
//! transaction. Every mutation is a single `BEGIN IMMEDIATE` transaction.

use crate::error::{is_busy_error, SqlResultExt};
use crate::{migrations, Error, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Maximum retry attempts for SQLITE_BUSY
pub const MAX_BUSY_RETRIES: u32 = 5;

/// Base backoff duration in milliseconds
pub const BASE_BACKOFF_MS: u64 = 50;

/// Maximum backoff duration in milliseconds
pub const MAX_BACKOFF_MS: u64 = 1000;

/// SQLite's own wait before it reports SQLITE_BUSY
const BUSY_TIMEOUT_MS: u64 = 2_000;

/// Idle reader connections kept open
const READER_POOL_SIZE: usize = 4;

/// Database connection wrapper
pub struct Database {
    path: PathBuf,
    writer: Mutex<Connection>,
    readers: Mutex<Vec<Connection>>,
}

impl Database {
    /// Open (creating if needed) the wallet database
    ///
    /// A fresh file gets the current schema. An existing file must already be
    /// at the current schema version; anything else fails with
    /// [`Error::Upgrade`] and is left untouched until [`Database::upgrade`]
    /// is called explicitly.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let writer = open_connection(&path)?;
        writer.execute_batch("PRAGMA journal_mode=WAL;").storage()?;
        writer.execute_batch("PRAGMA foreign_keys=ON;").storage()?;

        let version = migrations::get_schema_version(&writer)?;
        if version == 0 {
            migrations::run_migrations(&writer)?;
        } else {
            migrations::check_schema_version(version)?;
        }

        tracing::debug!("Opened wallet database at {}", path.display());
        Ok(Self {
            path,
            writer: Mutex::new(writer),
            readers: Mutex::new(Vec::new()),
        })
    }

    /// Apply pending schema migrations to an existing database
    pub fn upgrade<P: AsRef<Path>>(path: P) -> Result<()> {
        let conn = open_connection(path.as_ref())?;
        let version = migrations::get_schema_version(&conn)?;
        if version > migrations::SCHEMA_VERSION {
            return migrations::check_schema_version(version);
        }
        migrations::run_migrations(&conn)?;
        tracing::info!(
            "Upgraded {} from schema v{} to v{}",
            path.as_ref().display(),
            version,
            migrations::SCHEMA_VERSION
        );
        Ok(())
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` on a reader connection
    pub fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let pooled = self.readers.lock().pop();
        let conn = match pooled {
            Some(conn) => conn,
            None => {
                let conn = open_connection(&self.path)?;
                conn.execute_batch("PRAGMA query_only=ON;").storage()?;
                conn
            }
        };

        let result = f(&conn);

        let mut pool = self.readers.lock();
        if pool.len() < READER_POOL_SIZE {
            pool.push(conn);
        }
        result
    }

    /// Run `f` inside one immediate write transaction
    ///
    /// The transaction commits only if `f` succeeds; any error rolls back
    /// every change `f` made.
    pub fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let conn = self.writer.lock();
        let tx = begin_immediate(&conn)?;
        let value = f(&tx)?;
        tx.commit().storage()?;
        Ok(value)
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .storage()?;
    conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))
        .storage()?;
    Ok(conn)
}

/// Begin an immediate transaction with retry on SQLITE_BUSY
///
/// The caller holds the writer mutex, so no other transaction can be open on
/// this connection.
fn begin_immediate(conn: &Connection) -> Result<Transaction<'_>> {
    let mut attempts = 0;

    loop {
        match Transaction::new_unchecked(conn, TransactionBehavior::Immediate) {
            Ok(tx) => return Ok(tx),
            Err(ref e) if is_busy_error(e) && attempts < MAX_BUSY_RETRIES => {
                attempts += 1;
                let backoff = calculate_backoff(attempts);
                tracing::debug!(
                    "SQLITE_BUSY (attempt {}/{}), retrying in {}ms",
                    attempts,
                    MAX_BUSY_RETRIES,
                    backoff
                );
                thread::sleep(Duration::from_millis(backoff));
            }
            Err(e) => {
                if is_busy_error(&e) {
                    tracing::warn!("Database still busy after {} retries", MAX_BUSY_RETRIES);
                }
                return Err(Error::storage(e));
            }
        }
    }
}

/// Calculate exponential backoff with jitter
pub(crate) fn calculate_backoff(attempt: u32) -> u64 {
    let base = BASE_BACKOFF_MS * (1 << attempt.min(6));
    let jitter = rand::random::<u64>() % (base / 4 + 1);
    (base + jitter).min(MAX_BACKOFF_MS)
}
