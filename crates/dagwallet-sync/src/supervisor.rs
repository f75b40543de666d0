//! Supervised periodic sync
//!
//! Each pass rewinds over any reorg, applies the node's blocks above the
//! wallet cursor one at a time and then offers the mempool. A failed pass is
//! retried after an exponential backoff with jitter; the task only ends on
//! cancellation or once the restart limit is exhausted.

use crate::cancel::CancelToken;
use crate::progress::{SyncProgress, SyncStage};
use crate::source::{LedgerSink, NodeSource};
use crate::{Error, Result};
use anyhow::Context;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Backoff between failed passes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Backoff following `current`
    pub fn next_backoff(&self, current: Duration) -> Duration {
        std::cmp::min(
            Duration::from_millis((current.as_millis() as f64 * self.backoff_multiplier) as u64),
            self.max_backoff,
        )
    }
}

/// Sync configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Pause between passes once at the tip
    pub poll_interval: Duration,
    /// Backoff after failed passes
    pub retry: RetryConfig,
    /// Consecutive failed passes tolerated before giving up, `None` for no limit
    pub restart_limit: Option<u32>,
    /// Deepest reorg followed automatically
    pub max_reorg_depth: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            retry: RetryConfig::default(),
            restart_limit: None,
            max_reorg_depth: 100,
        }
    }
}

fn jitter_duration(duration: Duration) -> Duration {
    let millis = duration.as_millis() as u64;
    if millis == 0 {
        return duration;
    }
    let jitter = rand::thread_rng().gen_range(0.8..1.2);
    let jittered = (millis as f64 * jitter) as u64;
    Duration::from_millis(jittered.max(1))
}

/// Drives a [`LedgerSink`] from a [`NodeSource`]
pub struct SyncSupervisor<S, L> {
    source: Arc<S>,
    sink: Arc<L>,
    config: SyncConfig,
    progress: SyncProgress,
}

impl<S, L> SyncSupervisor<S, L>
where
    S: NodeSource + 'static,
    L: LedgerSink + 'static,
{
    /// Create a supervisor
    pub fn new(source: Arc<S>, sink: Arc<L>, config: SyncConfig) -> Self {
        Self {
            source,
            sink,
            config,
            progress: SyncProgress::new(),
        }
    }

    /// Shared progress handle
    pub fn progress(&self) -> SyncProgress {
        self.progress.clone()
    }

    /// Run on the current tokio runtime until cancelled or given up
    pub fn spawn(self, cancel: CancelToken) -> JoinHandle<anyhow::Result<()>> {
        tokio::spawn(async move { self.run(&cancel).await })
    }

    /// Pass after pass until cancelled or the restart limit is exhausted
    pub async fn run(&self, cancel: &CancelToken) -> anyhow::Result<()> {
        self.progress.start();
        info!(
            "Sync supervisor started (poll every {:?}, restart limit {:?})",
            self.config.poll_interval, self.config.restart_limit
        );

        let mut backoff = self.config.retry.initial_backoff;
        let mut consecutive_failures = 0u32;

        while !cancel.is_cancelled() {
            match self.sync_once(cancel).await {
                Ok(()) => {
                    consecutive_failures = 0;
                    backoff = self.config.retry.initial_backoff;
                    self.progress.record_success();
                    self.progress.set_stage(SyncStage::Synced);
                    if !cancel.sleep(self.config.poll_interval).await {
                        break;
                    }
                }
                Err(Error::Cancelled) => break,
                Err(e) => {
                    consecutive_failures += 1;
                    self.progress.record_failure(e.to_string());
                    if let Some(limit) = self.config.restart_limit {
                        if consecutive_failures > limit {
                            self.progress.set_stage(SyncStage::Stopped);
                            return Err(e).with_context(|| {
                                format!(
                                    "sync gave up after {} consecutive failures",
                                    consecutive_failures
                                )
                            });
                        }
                    }

                    warn!(
                        "Sync pass failed (attempt {}), retrying in {:?}: {}",
                        consecutive_failures, backoff, e
                    );
                    self.progress.set_stage(SyncStage::Backoff);
                    if !cancel.sleep(jitter_duration(backoff)).await {
                        break;
                    }
                    backoff = self.config.retry.next_backoff(backoff);
                }
            }
        }

        self.progress.set_stage(SyncStage::Stopped);
        info!("Sync supervisor stopped: {}", self.progress.summary());
        Ok(())
    }

    /// One pass: reorg check, catch up to the node tip, then the mempool
    pub async fn sync_once(&self, cancel: &CancelToken) -> Result<()> {
        let tip = self.source.tip_height().await?;
        let mut synced = self.sink.synced_height().await?;

        if tip < synced {
            debug!("Node at {} is behind the wallet at {}", tip, synced);
        } else {
            synced = self.reconcile(synced).await?;
        }

        self.progress.set_heights(synced, tip);
        self.progress.set_stage(SyncStage::CatchingUp);
        for height in (synced + 1)..=tip {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let block = self.source.block_at(height).await?;
            self.sink.apply_block(&block).await?;
            self.progress.block_applied(height);
            debug!(
                "Applied block {} ({} transactions)",
                height,
                block.transactions.len()
            );
        }

        self.progress.set_stage(SyncStage::Mempool);
        for tx in self.source.mempool().await? {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if self.sink.apply_mempool_tx(&tx).await? {
                self.progress.mempool_tx_applied();
            }
        }
        Ok(())
    }

    /// Walk back from `synced` to the newest block both sides agree on and
    /// roll the wallet back to it
    async fn reconcile(&self, synced: i32) -> Result<i32> {
        let mut height = synced;
        let mut depth = 0u32;
        while height > 0 {
            let Some(ours) = self.sink.block_hash(height).await? else {
                break;
            };
            if self.source.block_hash(height).await? == ours {
                break;
            }
            depth += 1;
            if depth > self.config.max_reorg_depth {
                return Err(Error::ReorgTooDeep(self.config.max_reorg_depth));
            }
            height -= 1;
        }

        if height < synced {
            warn!("Reorg detected: rolling back from {} to {}", synced, height);
            self.sink.rollback(height).await?;
            self.progress.rolled_back(height);
        }
        Ok(height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_growth_is_capped() {
        let retry = RetryConfig {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
        };
        let mut backoff = retry.initial_backoff;
        let mut seen = Vec::new();
        for _ in 0..4 {
            backoff = retry.next_backoff(backoff);
            seen.push(backoff.as_millis());
        }
        assert_eq!(seen, vec![200, 400, 500, 500]);
    }

    #[test]
    fn test_jitter_stays_near_base() {
        for _ in 0..100 {
            let d = jitter_duration(Duration::from_millis(1000)).as_millis();
            assert!((800..=1200).contains(&d));
        }
        assert_eq!(jitter_duration(Duration::ZERO), Duration::ZERO);
    }
}
