//! Sync progress tracking

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sync stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    /// Not started
    Idle,
    /// Applying blocks up to the node tip
    CatchingUp,
    /// Applying mempool transactions
    Mempool,
    /// Waiting out a backoff after a failed pass
    Backoff,
    /// At the node tip, waiting for the next poll
    Synced,
    /// Supervisor stopped
    Stopped,
}

impl SyncStage {
    /// Get display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::CatchingUp => "Catching Up",
            Self::Mempool => "Scanning Mempool",
            Self::Backoff => "Retrying",
            Self::Synced => "Synced",
            Self::Stopped => "Stopped",
        }
    }
}

/// Shared view of the supervisor's progress
#[derive(Debug, Clone)]
pub struct SyncProgress {
    inner: Arc<RwLock<ProgressInner>>,
}

#[derive(Debug, Clone)]
struct ProgressInner {
    current_height: i32,
    target_height: i32,
    stage: SyncStage,
    start_time: Option<Instant>,
    blocks_applied: u64,
    mempool_txs_applied: u64,
    rollbacks: u64,
    restarts: u32,
    last_error: Option<String>,
}

impl SyncProgress {
    /// Create new progress tracker
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(ProgressInner {
                current_height: 0,
                target_height: 0,
                stage: SyncStage::Idle,
                start_time: None,
                blocks_applied: 0,
                mempool_txs_applied: 0,
                rollbacks: 0,
                restarts: 0,
                last_error: None,
            })),
        }
    }

    pub(crate) fn start(&self) {
        self.inner.write().start_time = Some(Instant::now());
    }

    pub(crate) fn set_stage(&self, stage: SyncStage) {
        self.inner.write().stage = stage;
    }

    pub(crate) fn set_heights(&self, current: i32, target: i32) {
        let mut inner = self.inner.write();
        inner.current_height = current;
        inner.target_height = target;
    }

    pub(crate) fn block_applied(&self, height: i32) {
        let mut inner = self.inner.write();
        inner.current_height = height;
        inner.blocks_applied += 1;
    }

    pub(crate) fn mempool_tx_applied(&self) {
        self.inner.write().mempool_txs_applied += 1;
    }

    pub(crate) fn rolled_back(&self, height: i32) {
        let mut inner = self.inner.write();
        inner.current_height = height;
        inner.rollbacks += 1;
    }

    pub(crate) fn record_failure(&self, error: String) {
        let mut inner = self.inner.write();
        inner.restarts += 1;
        inner.last_error = Some(error);
    }

    pub(crate) fn record_success(&self) {
        self.inner.write().last_error = None;
    }

    /// Current stage
    pub fn stage(&self) -> SyncStage {
        self.inner.read().stage
    }

    /// Height of the last applied block
    pub fn current_height(&self) -> i32 {
        self.inner.read().current_height
    }

    /// Node tip at the last poll
    pub fn target_height(&self) -> i32 {
        self.inner.read().target_height
    }

    /// Blocks applied since start
    pub fn blocks_applied(&self) -> u64 {
        self.inner.read().blocks_applied
    }

    /// Relevant mempool transactions applied since start
    pub fn mempool_txs_applied(&self) -> u64 {
        self.inner.read().mempool_txs_applied
    }

    /// Reorg rollbacks performed since start
    pub fn rollbacks(&self) -> u64 {
        self.inner.read().rollbacks
    }

    /// Failed passes since start
    pub fn restarts(&self) -> u32 {
        self.inner.read().restarts
    }

    /// Error of the last failed pass, cleared by a successful one
    pub fn last_error(&self) -> Option<String> {
        self.inner.read().last_error.clone()
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Option<Duration> {
        self.inner.read().start_time.map(|start| start.elapsed())
    }

    /// Get progress percentage
    pub fn percentage(&self) -> f64 {
        let inner = self.inner.read();
        if inner.target_height <= 0 {
            return 0.0;
        }
        if inner.current_height >= inner.target_height {
            return 100.0;
        }
        (inner.current_height.max(0) as f64 / inner.target_height as f64) * 100.0
    }

    /// Get summary string
    pub fn summary(&self) -> String {
        let inner = self.inner.read();
        format!(
            "{} | {}/{} | {} blocks, {} mempool txs, {} restarts",
            inner.stage.name(),
            inner.current_height,
            inner.target_height,
            inner.blocks_applied,
            inner.mempool_txs_applied,
            inner.restarts
        )
    }
}

impl Default for SyncProgress {
    fn default() -> Self {
        Self::new()
    }
}
