//! The two ends of a sync: the node feeding blocks and the ledger absorbing
//! them

use crate::Result;
use async_trait::async_trait;
use dagwallet_core::{Block, Hash256, Transaction};

/// Blocks and mempool transactions observed through a full node
///
/// Blocks are delivered in chain order; a transaction is never delivered as
/// mined before its inputs are mined or already known.
#[async_trait]
pub trait NodeSource: Send + Sync {
    /// Height of the node's best block
    async fn tip_height(&self) -> Result<i32>;

    /// Block at `height` on the node's best chain
    async fn block_at(&self, height: i32) -> Result<Block>;

    /// Hash of the block at `height` on the node's best chain
    async fn block_hash(&self, height: i32) -> Result<Hash256> {
        Ok(self.block_at(height).await?.meta.hash)
    }

    /// Transactions currently in the node's mempool
    async fn mempool(&self) -> Result<Vec<Transaction>>;
}

/// Wallet side of a sync
#[async_trait]
pub trait LedgerSink: Send + Sync {
    /// Height of the last applied block
    async fn synced_height(&self) -> Result<i32>;

    /// Hash of the applied block at `height`, if the wallet remembers it
    async fn block_hash(&self, height: i32) -> Result<Option<Hash256>>;

    /// Apply a block and advance the cursor to it, atomically
    async fn apply_block(&self, block: &Block) -> Result<()>;

    /// Apply an unmined transaction; returns whether it was relevant
    async fn apply_mempool_tx(&self, tx: &Transaction) -> Result<bool>;

    /// Undo everything above `height` and rewind the cursor
    async fn rollback(&self, height: i32) -> Result<()>;
}
