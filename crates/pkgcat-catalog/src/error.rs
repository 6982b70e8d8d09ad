//! Error types for catalog indexing and lookup

use pkgcat_formats::FormatError;
use pkgcat_storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

/// Opaque error returned by a fetch collaborator
pub type FetchError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors that can occur while indexing or reading a catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Asking the source for its latest release failed
    #[error("get latest release: {0}")]
    LatestRelease(#[source] FetchError),

    /// Downloading a release failed
    #[error("download release {release}: {source}")]
    Download {
        /// Release that was being downloaded
        release: String,
        /// Error from the fetch collaborator
        source: FetchError,
    },

    /// Indexing was cancelled before the download started
    #[error("indexing cancelled")]
    Cancelled,

    /// Store build or lookup failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A record could not be parsed or inspected
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Metadata file could not be read or written
    #[error("metadata {path:?}: {source}")]
    Metadata {
        /// Metadata file path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// A loaded record does not match the requested type
    #[error("decode record {name}: {source}")]
    Decode {
        /// Record name
        name: String,
        /// Deserialization error
        source: serde_json::Error,
    },

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An indexing task panicked or was aborted
    #[error("indexing task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

impl CatalogError {
    /// Whether this error is a record lookup miss
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage(StorageError::NotFound(_)))
    }
}
