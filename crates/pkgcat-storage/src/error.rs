//! Storage error types

use pkgcat_formats::FormatError;
use thiserror::Error;

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur while building or reading a store
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Source document or index entry could not be decoded
    #[error(transparent)]
    Format(#[from] FormatError),

    /// No record with this name
    #[error("record not found: {0}")]
    NotFound(String),

    /// Stored bytes do not decompress or point outside the data file
    #[error("corrupt record data: {0}")]
    Corrupt(String),

    /// The store was closed
    #[error("store is closed")]
    Closed,

    /// SQLite backend error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// redb backend error
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    /// Invalid store configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StorageError {
    /// Whether this error is a lookup miss
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

// redb reports each operation with its own error type.
macro_rules! from_redb {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StorageError {
                fn from(err: $ty) -> Self {
                    Self::Redb(err.into())
                }
            }
        )*
    };
}

from_redb!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_predicate() {
        assert!(StorageError::NotFound("hello".to_string()).is_not_found());
        assert!(!StorageError::Closed.is_not_found());
    }

    #[test]
    fn test_format_errors_pass_through() {
        let err = StorageError::from(FormatError::Malformed("missing field `packages`".into()));
        assert_eq!(err.to_string(), "malformed document: missing field `packages`");
    }
}
