//! Node-to-wallet sync
//!
//! A supervised tokio task that keeps a wallet ledger in step with a full
//! node: follows the node tip block by block, rewinds over reorgs, offers
//! mempool transactions, and restarts failed passes with exponential
//! backoff.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cancel;
pub mod error;
pub mod progress;
pub mod source;
pub mod supervisor;

pub use cancel::CancelToken;
pub use error::{Error, Result};
pub use progress::{SyncProgress, SyncStage};
pub use source::{LedgerSink, NodeSource};
pub use supervisor::{RetryConfig, SyncConfig, SyncSupervisor};
