//! Supervisor behaviour against in-memory node and ledger doubles

use async_trait::async_trait;
use dagwallet_core::test_helpers::{block, funding_tx};
use dagwallet_core::{Block, BlockMeta, Hash256, Transaction};
use dagwallet_sync::{
    CancelToken, Error, LedgerSink, NodeSource, Result, RetryConfig, SyncConfig, SyncStage,
    SyncSupervisor,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct MockNode {
    chain: Mutex<Vec<Block>>,
    mempool: Vec<Transaction>,
    failures_left: AtomicU32,
}

impl MockNode {
    fn new(tip: i32) -> Self {
        Self {
            chain: Mutex::new((0..=tip).map(|h| block(h, vec![])).collect()),
            mempool: vec![funding_tx(1, vec![])],
            failures_left: AtomicU32::new(0),
        }
    }

    fn failing(tip: i32, failures: u32) -> Self {
        let node = Self::new(tip);
        node.failures_left.store(failures, Ordering::SeqCst);
        node
    }

    /// Replace every block from `height` up with a fork
    fn fork_from(&self, height: i32) {
        let mut chain = self.chain.lock();
        for b in chain.iter_mut().skip(height as usize) {
            let h = b.meta.height;
            *b = Block::new(BlockMeta::new(h, Hash256([0xee; 32]), b.meta.time), vec![]);
        }
    }
}

#[async_trait]
impl NodeSource for MockNode {
    async fn tip_height(&self) -> Result<i32> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(Error::node("connection refused"));
        }
        Ok(self.chain.lock().len() as i32 - 1)
    }

    async fn block_at(&self, height: i32) -> Result<Block> {
        self.chain
            .lock()
            .get(height as usize)
            .cloned()
            .ok_or_else(|| Error::node(format!("no block at {}", height)))
    }

    async fn mempool(&self) -> Result<Vec<Transaction>> {
        Ok(self.mempool.clone())
    }
}

#[derive(Default)]
struct MockLedger {
    applied: Mutex<Vec<(i32, Hash256)>>,
    mempool: Mutex<Vec<Hash256>>,
    rollbacks: Mutex<Vec<i32>>,
}

impl MockLedger {
    fn synced_through(blocks: &[Block]) -> Self {
        let ledger = Self::default();
        *ledger.applied.lock() = blocks.iter().map(|b| (b.meta.height, b.meta.hash)).collect();
        ledger
    }

    fn heights(&self) -> Vec<i32> {
        self.applied.lock().iter().map(|(h, _)| *h).collect()
    }
}

#[async_trait]
impl LedgerSink for MockLedger {
    async fn synced_height(&self) -> Result<i32> {
        Ok(self.applied.lock().last().map_or(0, |(h, _)| *h))
    }

    async fn block_hash(&self, height: i32) -> Result<Option<Hash256>> {
        Ok(self
            .applied
            .lock()
            .iter()
            .find(|(h, _)| *h == height)
            .map(|(_, hash)| *hash))
    }

    async fn apply_block(&self, block: &Block) -> Result<()> {
        self.applied.lock().push((block.meta.height, block.meta.hash));
        Ok(())
    }

    async fn apply_mempool_tx(&self, tx: &Transaction) -> Result<bool> {
        let mut mempool = self.mempool.lock();
        let hash = tx.tx_hash();
        if mempool.contains(&hash) {
            return Ok(false);
        }
        mempool.push(hash);
        Ok(true)
    }

    async fn rollback(&self, height: i32) -> Result<()> {
        self.applied.lock().retain(|(h, _)| *h <= height);
        self.rollbacks.lock().push(height);
        Ok(())
    }
}

fn fast_config() -> SyncConfig {
    SyncConfig {
        poll_interval: Duration::from_secs(1),
        retry: RetryConfig {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 2.0,
        },
        restart_limit: None,
        max_reorg_depth: 10,
    }
}

async fn wait_for_stage(progress: &dagwallet_sync::SyncProgress, stage: SyncStage) {
    while progress.stage() != stage {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_catches_up_and_offers_mempool() {
    let node = Arc::new(MockNode::new(5));
    let ledger = Arc::new(MockLedger::synced_through(&[block(0, vec![])]));
    let supervisor = SyncSupervisor::new(node, ledger.clone(), fast_config());
    let progress = supervisor.progress();

    let cancel = CancelToken::new();
    let handle = supervisor.spawn(cancel.clone());
    wait_for_stage(&progress, SyncStage::Synced).await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(ledger.heights(), vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(ledger.mempool.lock().len(), 1);
    assert_eq!(progress.blocks_applied(), 5);
    assert_eq!(progress.stage(), SyncStage::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_restarts_after_failures() {
    let node = Arc::new(MockNode::failing(3, 2));
    let ledger = Arc::new(MockLedger::synced_through(&[block(0, vec![])]));
    let supervisor = SyncSupervisor::new(node, ledger.clone(), fast_config());
    let progress = supervisor.progress();

    let cancel = CancelToken::new();
    let handle = supervisor.spawn(cancel.clone());
    wait_for_stage(&progress, SyncStage::Synced).await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(progress.restarts(), 2);
    assert_eq!(progress.last_error(), None);
    assert_eq!(ledger.heights(), vec![0, 1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_restart_limit() {
    let node = Arc::new(MockNode::failing(3, u32::MAX));
    let ledger = Arc::new(MockLedger::default());
    let config = SyncConfig {
        restart_limit: Some(2),
        ..fast_config()
    };
    let supervisor = SyncSupervisor::new(node, ledger, config);

    let started = tokio::time::Instant::now();
    let err = supervisor.run(&CancelToken::new()).await.unwrap_err();
    assert!(err.to_string().contains("3 consecutive failures"));
    assert_eq!(supervisor.progress().restarts(), 3);
    assert_eq!(supervisor.progress().stage(), SyncStage::Stopped);
    // Two backoffs of roughly 100ms and 200ms
    assert!(started.elapsed() >= Duration::from_millis(240));
}

#[tokio::test(start_paused = true)]
async fn test_rolls_back_over_reorg() {
    let node = MockNode::new(6);
    let seen: Vec<Block> = node.chain.lock()[..=4].to_vec();
    node.fork_from(3);
    let ledger = Arc::new(MockLedger::synced_through(&seen));
    let supervisor = SyncSupervisor::new(Arc::new(node), ledger.clone(), fast_config());

    supervisor.sync_once(&CancelToken::new()).await.unwrap();

    assert_eq!(*ledger.rollbacks.lock(), vec![2]);
    assert_eq!(ledger.heights(), vec![0, 1, 2, 3, 4, 5, 6]);
    assert_eq!(ledger.block_hash(3).await.unwrap(), Some(Hash256([0xee; 32])));
    assert_eq!(supervisor.progress().rollbacks(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reorg_too_deep_is_an_error() {
    let node = MockNode::new(6);
    let seen: Vec<Block> = node.chain.lock()[..=6].to_vec();
    node.fork_from(1);
    let ledger = Arc::new(MockLedger::synced_through(&seen));
    let config = SyncConfig {
        max_reorg_depth: 3,
        ..fast_config()
    };
    let supervisor = SyncSupervisor::new(Arc::new(node), ledger.clone(), config);

    let result = supervisor.sync_once(&CancelToken::new()).await;
    assert!(matches!(result, Err(Error::ReorgTooDeep(3))));
    assert!(ledger.rollbacks.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_start_returns_immediately() {
    let node = Arc::new(MockNode::new(3));
    let ledger = Arc::new(MockLedger::default());
    let supervisor = SyncSupervisor::new(node, ledger.clone(), fast_config());

    let cancel = CancelToken::new();
    cancel.cancel();
    supervisor.run(&cancel).await.unwrap();
    assert!(ledger.heights().is_empty());
}
