//! Error types for sync operations

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The node feed failed
    #[error("Node error: {0}")]
    Node(String),

    /// The wallet rejected a block or transaction
    #[error("Ledger error: {0}")]
    Ledger(#[from] dagwallet_core::Error),

    /// The node reorganised deeper than the wallet is willing to follow
    #[error("Reorg deeper than {0} blocks")]
    ReorgTooDeep(u32),

    /// Operation cancelled
    #[error("Cancelled")]
    Cancelled,
}

impl Error {
    /// Wrap a node feed failure
    pub fn node(err: impl std::fmt::Display) -> Self {
        Error::Node(err.to_string())
    }
}
