//! Sync cursor persistence
//!
//! The cursor records how far the wallet has applied the observed chain, the
//! block it started from, and the wallet birthday. A height to hash history
//! of applied blocks lets a rollback rewind the cursor to a known stamp.

use crate::error::SqlResultExt;
use crate::{Database, Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use dagwallet_core::codec::{Codec, Decoder, Encoder};
use dagwallet_core::{BlockStamp, Hash256};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

const SYNC_STATE_VERSION: u8 = 1;

/// Persisted sync cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    /// Block the wallet was created at
    pub start_block: BlockStamp,
    /// Last block applied to the ledger
    pub synced_to: BlockStamp,
    /// Earliest time a wallet transaction can appear
    pub birthday: DateTime<Utc>,
    /// First block at or after the birthday, once known
    pub birthday_block: Option<BlockStamp>,
}

impl SyncState {
    /// Fresh cursor sitting on `start`
    pub fn new(start: BlockStamp, birthday: DateTime<Utc>) -> Self {
        Self {
            start_block: start,
            synced_to: start,
            birthday,
            birthday_block: None,
        }
    }
}

impl Codec for SyncState {
    fn encode(&self, enc: &mut Encoder) {
        enc.put_u8(SYNC_STATE_VERSION);
        self.start_block.encode(enc);
        self.synced_to.encode(enc);
        enc.put_i64(self.birthday.timestamp());
        enc.put_bool(self.birthday_block.is_some());
        if let Some(stamp) = &self.birthday_block {
            stamp.encode(enc);
        }
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        dec.expect_version("sync state", SYNC_STATE_VERSION)?;
        let start_block = BlockStamp::decode(dec)?;
        let synced_to = BlockStamp::decode(dec)?;
        let secs = dec.i64()?;
        let birthday = Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| Error::Codec(format!("birthday out of range: {}", secs)))?;
        let birthday_block = if dec.bool()? {
            Some(BlockStamp::decode(dec)?)
        } else {
            None
        };
        Ok(Self {
            start_block,
            synced_to,
            birthday,
            birthday_block,
        })
    }
}

/// Sync cursor storage operations
pub struct SyncStateStorage<'a> {
    db: &'a Database,
}

impl<'a> SyncStateStorage<'a> {
    /// Create new sync state storage
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Load the cursor
    pub fn load(&self) -> Result<SyncState> {
        self.db.read(Self::load_tx)
    }

    /// Hash of the applied block at `height`
    pub fn block_hash(&self, height: i32) -> Result<Option<Hash256>> {
        self.db.read(|conn| Ok(Self::block_stamp_tx(conn, height)?.map(|s| s.hash)))
    }

    /// Load the cursor inside a transaction or on a reader
    pub fn load_tx(conn: &Connection) -> Result<SyncState> {
        let bytes: Option<Vec<u8>> = conn
            .query_row("SELECT row FROM sync_state WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()
            .storage()?;
        match bytes {
            Some(bytes) => SyncState::from_bytes(&bytes),
            None => Err(Error::NoExist("sync state".to_string())),
        }
    }

    /// Save the cursor within a transaction
    pub fn save_sync_state_tx(tx: &Transaction<'_>, state: &SyncState) -> Result<()> {
        tx.execute(
            "INSERT OR REPLACE INTO sync_state (id, row) VALUES (1, ?1)",
            params![state.to_bytes()],
        )
        .storage()?;
        Ok(())
    }

    /// Record an applied block in the height history
    pub fn record_block_tx(tx: &Transaction<'_>, stamp: &BlockStamp) -> Result<()> {
        tx.execute(
            "INSERT OR REPLACE INTO sync_blocks (height, hash, time) VALUES (?1, ?2, ?3)",
            params![stamp.height, stamp.hash.as_bytes().to_vec(), stamp.timestamp],
        )
        .storage()?;
        Ok(())
    }

    /// Move the cursor to `stamp` and remember it in the history
    ///
    /// History rows above the new cursor are dropped so a lower stamp acts
    /// as a rewind.
    pub fn set_synced_to_tx(tx: &Transaction<'_>, stamp: &BlockStamp) -> Result<()> {
        let mut state = Self::load_tx(tx)?;
        state.synced_to = *stamp;
        Self::save_sync_state_tx(tx, &state)?;
        tx.execute("DELETE FROM sync_blocks WHERE height > ?1", [stamp.height])
            .storage()?;
        Self::record_block_tx(tx, stamp)?;
        tracing::debug!("Sync cursor at height {} ({})", stamp.height, stamp.hash);
        Ok(())
    }

    /// Applied block at `height`, if any
    pub fn block_stamp_tx(conn: &Connection, height: i32) -> Result<Option<BlockStamp>> {
        conn.query_row(
            "SELECT hash, time FROM sync_blocks WHERE height = ?1",
            [height],
            |row| {
                let hash: Vec<u8> = row.get(0)?;
                let time: i64 = row.get(1)?;
                Ok((hash, time))
            },
        )
        .optional()
        .storage()?
        .map(|(hash, time)| Ok(BlockStamp::new(height, Hash256::from_slice(&hash)?, time)))
        .transpose()
    }

    /// Rewind the cursor to the newest recorded block at or below `height`
    ///
    /// Falls back to the start block when nothing that old was recorded.
    pub fn truncate_above_height_tx(tx: &Transaction<'_>, height: i32) -> Result<BlockStamp> {
        tx.execute("DELETE FROM sync_blocks WHERE height > ?1", [height])
            .storage()?;
        let newest: Option<i32> = tx
            .query_row("SELECT MAX(height) FROM sync_blocks", [], |row| row.get(0))
            .storage()?;

        let mut state = Self::load_tx(tx)?;
        let stamp = match newest {
            Some(h) => Self::block_stamp_tx(tx, h)?.unwrap_or(state.start_block),
            None => state.start_block,
        };
        state.synced_to = stamp;
        Self::save_sync_state_tx(tx, &state)?;

        tracing::info!("Sync cursor rewound to height {}", stamp.height);
        Ok(stamp)
    }

    /// Reset the cursor to the birthday block, or the start block if none
    pub fn reset_to_birthday_tx(tx: &Transaction<'_>) -> Result<BlockStamp> {
        let mut state = Self::load_tx(tx)?;
        let stamp = state.birthday_block.unwrap_or(state.start_block);
        state.synced_to = stamp;
        Self::save_sync_state_tx(tx, &state)?;
        tx.execute("DELETE FROM sync_blocks", []).storage()?;
        Self::record_block_tx(tx, &stamp)?;
        Ok(stamp)
    }
}
