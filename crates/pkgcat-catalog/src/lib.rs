//! Per-catalog indexing and lookup for pkgcat.
//!
//! A catalog is one independently managed source of package records: its
//! own directory under the cache root, its own [`Fetcher`], and its own
//! freshness [`CatalogMetadata`]. This crate decides which catalogs are
//! stale, rebuilds them concurrently, and serves single records to
//! presentation code.
//!
//! # Indexing
//!
//! ```rust,no_run
//! use pkgcat_catalog::{
//!     CancellationToken, Catalog, IndexerConfig, catalogs_needing_indexing, run_indexing,
//! };
//! # use pkgcat_catalog::{CatalogMetadata, FetchError, Fetcher, ReleaseStream};
//! # struct Channel;
//! # #[async_trait::async_trait]
//! # impl Fetcher for Channel {
//! #     async fn latest_release(&self, _: &CancellationToken, _: &CatalogMetadata) -> Result<String, FetchError> { todo!() }
//! #     async fn download_release(&self, _: &CancellationToken, _: &str) -> Result<ReleaseStream, FetchError> { todo!() }
//! # }
//!
//! # async fn example() -> pkgcat_catalog::Result<()> {
//! let config = IndexerConfig::load("/etc/pkgcat/config.json")?;
//! let stale = catalogs_needing_indexing(&config, &config.catalogs, config.update_interval).await?;
//!
//! let catalogs = stale.into_iter().map(|name| Catalog::new(name, Channel)).collect();
//! let mut results = run_indexing(&config, catalogs, CancellationToken::new());
//! while let Some(done) = results.recv().await {
//!     match done.result {
//!         Ok(outcome) => println!("{}: {outcome:?}", done.catalog),
//!         Err(e) => eprintln!("{}: {e}", done.catalog),
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Lookup
//!
//! [`load_record`] returns one record decoded into the caller's type, with
//! the record name available as the `_key` field. [`open_key_log`] gives the
//! plain-text list of names from the last successful rebuild.

#![warn(missing_docs)]
#![allow(clippy::return_self_not_must_use)] // Builder patterns

// Error types
pub mod error;

// Configuration and on-disk state
pub mod config;
pub mod metadata;

// Fetch collaborator contract
pub mod cancel;
pub mod catalog;
pub mod fetch;

// Indexing
pub mod orchestrator;

// Record access
pub mod lookup;

pub use cancel::CancellationToken;
pub use catalog::Catalog;
pub use config::{DEFAULT_UPDATE_INTERVAL, IndexerConfig, KEY_LOG_FILE, default_cache_dir};
pub use error::{CatalogError, FetchError, Result};
pub use fetch::{Fetcher, ReleaseStream};
pub use lookup::{KEY_FIELD, inject_key, load_raw, load_record, open_key_log, scan_records};
pub use metadata::{CatalogMetadata, METADATA_FILE};
pub use orchestrator::{
    CompletionStream, IndexOutcome, IndexingResult, catalogs_needing_indexing, run_indexing,
};

// Storage types that appear in this crate's API
pub use pkgcat_storage::{BackendKind, DictionaryKind, IndexStats};
