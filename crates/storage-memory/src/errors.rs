//! Storage-specific error types for the in-memory adapter.

use stratfolio_core::errors::{DatabaseError, Error};
use thiserror::Error;

/// Errors raised inside the adapter.
///
/// These are converted to `stratfolio_core::Error` before being returned to callers.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Table lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Failed to read seed file: {0}")]
    SeedRead(#[from] std::io::Error),

    #[error("Failed to parse seed file: {0}")]
    SeedParse(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::LockPoisoned(e) => Error::Database(DatabaseError::Internal(e)),
            StorageError::SeedRead(e) => Error::Repository(format!("seed file: {}", e)),
            StorageError::SeedParse(e) => Error::Repository(format!("seed file: {}", e)),
            StorageError::NotFound(e) => Error::Database(DatabaseError::NotFound(e)),
            StorageError::Duplicate(e) => Error::Database(DatabaseError::UniqueViolation(e)),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for StorageError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        StorageError::LockPoisoned(err.to_string())
    }
}
