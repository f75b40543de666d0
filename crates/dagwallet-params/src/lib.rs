//! Chain parameters for the DAG wallet
//!
//! Network-specific constants the wallet needs to recognise its own
//! addresses and keys: BIP-44 coin type, address and WIF version bytes,
//! genesis block identity and the consensus limits that shape monetary
//! policy.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod consensus;
pub mod network;

pub use consensus::{ConsensusParams, ATOMS_PER_COIN, MAX_ATOMS};
pub use network::{ChainParams, NetworkType};

/// Error types for parameter operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid network specified
    #[error("Invalid network: {0}")]
    InvalidNetwork(String),

    /// Unknown address or key version bytes
    #[error("Unknown version bytes: {0}")]
    UnknownVersion(String),
}

/// Result type for parameter operations
pub type Result<T> = std::result::Result<T, Error>;
