//! Error types
//!
//! The storage crate reports through the core taxonomy. SQLite failures are
//! flattened into [`Error::Storage`] here, at the crate boundary.

pub use dagwallet_core::{Error, Result};
use rusqlite::ErrorCode;

/// Flatten SQLite results into the wallet taxonomy
pub trait SqlResultExt<T> {
    /// Map a SQLite error to [`Error::Storage`]
    fn storage(self) -> Result<T>;
}

impl<T> SqlResultExt<T> for std::result::Result<T, rusqlite::Error> {
    fn storage(self) -> Result<T> {
        self.map_err(Error::storage)
    }
}

/// Check if error is SQLITE_BUSY
pub(crate) fn is_busy_error(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: ErrorCode::DatabaseBusy,
                ..
            },
            _
        )
    )
}

/// Check if error is a UNIQUE / PRIMARY KEY violation
pub(crate) fn is_constraint_error(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: ErrorCode::ConstraintViolation,
                ..
            },
            _
        )
    )
}
