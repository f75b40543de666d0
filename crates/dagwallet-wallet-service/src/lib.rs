//! Wallet service
//!
//! The [`Wallet`] façade over the address manager and the ledger: block and
//! mempool ingestion, balances and per-address history, the send path, the
//! unlock timer and the node sync hookup.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod history;
pub mod logging;
pub mod sink;
pub mod wallet;

pub use config::{WalletConfig, DEFAULT_MIN_CONFIRMATIONS};
pub use history::{paginate, Page, TxFilter, TxStatus, TxSummary, DEFAULT_PAGE_SIZE};
pub use logging::init_tracing;
pub use sink::spawn_sync;
pub use wallet::{AccountBalance, Wallet};
