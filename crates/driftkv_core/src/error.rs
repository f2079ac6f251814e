//! Error types for the storage engine.

use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors surfaced by the storage engine.
#[derive(Debug, Error)]
pub enum DbError {
    /// The key is not present in the index.
    #[error("record does not exist")]
    NotFound,

    /// The stored record's value type differs from the requested accessor.
    #[error("value type does not match expected type")]
    TypeMismatch,

    /// A segment contains bytes that do not decode as a record.
    #[error("corrupt record: {message}")]
    Corrupt {
        /// Description of what failed to decode.
        message: String,
    },

    /// A filesystem or I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A mutation was submitted after `close` began.
    #[error("database is shut down")]
    Shutdown,

    /// Another handle holds the data directory lock.
    #[error("data directory is locked by another handle")]
    Locked,
}

impl DbError {
    /// Creates a corrupt-record error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }
}
