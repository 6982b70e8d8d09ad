//! Compressed keyed record storage for pkgcat catalogs.
//!
//! Every catalog keeps its records in one [`KeyedStore`]. A rebuild feeds
//! the whole source document through [`KeyedStore::index`], which replaces
//! all previous content and writes the record names to a key log. Lookups
//! return the original JSON bytes of one record.
//!
//! Records are small and look alike, so each one is compressed on its own
//! with zstd and a bundled dictionary ([`RecordCodec`]) instead of
//! compressing the store as a whole.
//!
//! # Backends
//!
//! - **Flat** ([`FlatStore`]): an index file and a data file written once
//!   per rebuild. Lookups scan the index linearly.
//! - **SQLite** ([`SqliteStore`]): one `WITHOUT ROWID` table keyed by name.
//! - **redb** ([`RedbStore`]): one B-tree table keyed by name.
//!
//! The backend is chosen from a [`StoreConfig`] with [`open_store`].
//!
//! # Example
//!
//! ```rust,no_run
//! use pkgcat_storage::{open_store, BackendKind, StoreConfig};
//!
//! # fn example() -> pkgcat_storage::Result<()> {
//! let config = StoreConfig::new("/tmp/pkgcat/nixpkgs/flat").with_backend(BackendKind::Flat);
//! let mut store = open_store(&config)?;
//!
//! let mut source = &br#"{"packages":{"hello":{"version":"2.12"}}}"#[..];
//! let mut keys = Vec::new();
//! store.index(&mut source, &mut keys)?;
//!
//! let record = store.load("hello")?;
//! assert_eq!(record, br#"{"version":"2.12"}"#);
//! store.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![allow(clippy::return_self_not_must_use)] // Builder patterns

// Error types
pub mod error;

// Dictionary compression
pub mod codec;

// Backend contract and key log
mod key_log;
pub mod store;

// Backends
pub mod flat;
pub mod redb_store;
pub mod sqlite;

// Backend selection
pub mod config;

// Temp-file-and-rename writes
pub mod atomic;

pub use atomic::{AtomicFile, write_atomic};
pub use codec::{DictionaryKind, RecordCodec, RecordCompressor};
pub use config::{BackendKind, StoreConfig, open_store};
pub use error::{Result, StorageError};
pub use flat::FlatStore;
pub use redb_store::RedbStore;
pub use sqlite::SqliteStore;
pub use store::{IndexStats, KeyedStore};
