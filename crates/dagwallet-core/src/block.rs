//! Block identifiers as observed from the node

use crate::codec::{Codec, Decoder, Encoder};
use crate::hash::Hash256;
use crate::transaction::Transaction;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Height used for records that are not in any block
pub const UNMINED_HEIGHT: i32 = -1;

const BLOCK_STAMP_VERSION: u8 = 1;

/// A point on the observed chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockStamp {
    /// Chain position (block order); -1 for unmined
    pub height: i32,
    /// Block hash
    pub hash: Hash256,
    /// Block time (unix seconds)
    pub timestamp: i64,
}

impl BlockStamp {
    /// Create a stamp
    pub const fn new(height: i32, hash: Hash256, timestamp: i64) -> Self {
        Self {
            height,
            hash,
            timestamp,
        }
    }

    /// Whether this refers to a mined block
    pub const fn is_mined(&self) -> bool {
        self.height >= 0
    }
}

impl Codec for BlockStamp {
    fn encode(&self, enc: &mut Encoder) {
        enc.put_u8(BLOCK_STAMP_VERSION);
        enc.put_i32(self.height);
        enc.put_fixed(self.hash.as_bytes());
        enc.put_i64(self.timestamp);
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        dec.expect_version("block stamp", BLOCK_STAMP_VERSION)?;
        Ok(Self {
            height: dec.i32()?,
            hash: Hash256(dec.fixed()?),
            timestamp: dec.i64()?,
        })
    }
}

/// Block header fields the wallet records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMeta {
    /// Chain position (block order)
    pub height: i32,
    /// Block hash
    pub hash: Hash256,
    /// Block time (unix seconds)
    pub time: i64,
}

impl BlockMeta {
    /// Create block metadata
    pub const fn new(height: i32, hash: Hash256, time: i64) -> Self {
        Self { height, hash, time }
    }

    /// Sync-cursor stamp for this block
    pub const fn stamp(&self) -> BlockStamp {
        BlockStamp::new(self.height, self.hash, self.time)
    }
}

/// A confirmed block delivered by the node feed
#[derive(Debug, Clone)]
pub struct Block {
    /// Header fields
    pub meta: BlockMeta,
    /// Transactions in block order
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Create a block
    pub fn new(meta: BlockMeta, transactions: Vec<Transaction>) -> Self {
        Self { meta, transactions }
    }
}
