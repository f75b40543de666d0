//! Error types for the wallet core
//!
//! A single taxonomy shared by every layer of the wallet. Storage engine
//! failures are flattened into [`Error::Storage`] at the storage boundary so
//! callers only ever branch on the kinds below.

use std::fmt;

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Wallet errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Operation needs private key material while the manager is locked
    #[error("Wallet is locked: {0}")]
    Locked(String),

    /// Store already initialized at the target location
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Store has not been initialized
    #[error("Does not exist: {0}")]
    NoExist(String),

    /// On-disk version differs from the supported version
    #[error("Upgrade required: {0}")]
    Upgrade(String),

    /// Passphrase or decryption failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Operation needs private material but the wallet is watch-only
    #[error("Watching-only wallet: {0}")]
    WatchingOnly(String),

    /// Address is not managed by this wallet
    #[error("Address not found: {0}")]
    AddressNotFound(String),

    /// Account does not exist in the scope
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Address is already stored
    #[error("Duplicate address: {0}")]
    DuplicateAddress(String),

    /// Account name already used in the scope
    #[error("Duplicate account: {0}")]
    DuplicateAccount(String),

    /// Account name is reserved or malformed
    #[error("Invalid account name: {0}")]
    InvalidAccountName(String),

    /// Key or address belongs to another network
    #[error("Wrong network: {0}")]
    WrongNetwork(String),

    /// Ledger index points outside its transaction
    #[error("Corrupt ledger: {0}")]
    CorruptLedger(String),

    /// Debit references an outpoint the ledger does not own
    #[error("Unknown outpoint: {0}")]
    UnknownOutpoint(String),

    /// Negative output amount
    #[error("Negative amount: {0}")]
    NegativeAmount(String),

    /// Output amount above the monetary maximum
    #[error("Amount exceeds maximum: {0}")]
    AmountExceedsMax(String),

    /// Output below the dust threshold
    #[error("Output is dust: {0}")]
    OutputIsDust(String),

    /// Not enough spendable funds
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Malformed address string
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Malformed or unusable key
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Caller supplied an out-of-range argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Binary record could not be decoded
    #[error("Codec error: {0}")]
    Codec(String),

    /// Storage I/O failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Wrap a storage engine failure
    pub fn storage(err: impl fmt::Display) -> Self {
        Error::Storage(err.to_string())
    }

    /// Recoverable by retrying after `unlock`
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Locked(_) | Error::Crypto(_))
    }

    /// The store must be closed rather than retried
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Upgrade(_) | Error::CorruptLedger(_))
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Locked(_) | Error::Crypto(_) | Error::WatchingOnly(_) | Error::InvalidKey(_) => {
                ErrorCategory::Keys
            }
            Error::AlreadyExists(_) | Error::NoExist(_) | Error::Upgrade(_) => {
                ErrorCategory::Lifecycle
            }
            Error::AddressNotFound(_)
            | Error::DuplicateAddress(_)
            | Error::WrongNetwork(_)
            | Error::InvalidAddress(_) => ErrorCategory::Address,
            Error::AccountNotFound(_)
            | Error::DuplicateAccount(_)
            | Error::InvalidAccountName(_) => ErrorCategory::Account,
            Error::CorruptLedger(_) | Error::UnknownOutpoint(_) => ErrorCategory::Ledger,
            Error::NegativeAmount(_)
            | Error::AmountExceedsMax(_)
            | Error::OutputIsDust(_)
            | Error::InsufficientFunds(_) => ErrorCategory::Amount,
            Error::Storage(_) => ErrorCategory::Storage,
            Error::Codec(_) | Error::InvalidArgument(_) => ErrorCategory::Internal,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Key material and lock state
    Keys,
    /// Store lifecycle
    Lifecycle,
    /// Address-related errors
    Address,
    /// Account-related errors
    Account,
    /// Ledger integrity
    Ledger,
    /// Monetary policy
    Amount,
    /// Storage-related errors
    Storage,
    /// Internal/system errors
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Keys => write!(f, "Keys"),
            ErrorCategory::Lifecycle => write!(f, "Lifecycle"),
            ErrorCategory::Address => write!(f, "Address"),
            ErrorCategory::Account => write!(f, "Account"),
            ErrorCategory::Ledger => write!(f, "Ledger"),
            ErrorCategory::Amount => write!(f, "Amount"),
            ErrorCategory::Storage => write!(f, "Storage"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}
