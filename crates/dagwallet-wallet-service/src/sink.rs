//! The wallet as the ledger end of a node sync

use crate::wallet::Wallet;
use async_trait::async_trait;
use dagwallet_core::{Block, Hash256, Transaction};
use dagwallet_sync::{
    CancelToken, LedgerSink, NodeSource, Result, SyncProgress, SyncSupervisor,
};
use std::sync::Arc;
use tokio::task::JoinHandle;

#[async_trait]
impl LedgerSink for Wallet {
    async fn synced_height(&self) -> Result<i32> {
        Ok(self.synced_to()?.height)
    }

    async fn block_hash(&self, height: i32) -> Result<Option<Hash256>> {
        Ok(self.manager().block_hash(height)?)
    }

    async fn apply_block(&self, block: &Block) -> Result<()> {
        self.process_block(block)?;
        Ok(())
    }

    async fn apply_mempool_tx(&self, tx: &Transaction) -> Result<bool> {
        Ok(self.process_mempool_tx(tx)?)
    }

    async fn rollback(&self, height: i32) -> Result<()> {
        Wallet::rollback(self, height)?;
        Ok(())
    }
}

/// Start following `source` with the wallet's sync settings
///
/// The task runs until `cancel` fires or the configured restart limit is
/// exhausted.
pub fn spawn_sync<S>(
    wallet: Arc<Wallet>,
    source: Arc<S>,
    cancel: CancelToken,
) -> (SyncProgress, JoinHandle<anyhow::Result<()>>)
where
    S: NodeSource + 'static,
{
    let config = wallet.config().sync.clone();
    let supervisor = SyncSupervisor::new(source, wallet, config);
    let progress = supervisor.progress();
    (progress, supervisor.spawn(cancel))
}
