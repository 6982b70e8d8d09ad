//! Fetch collaborator contract
//!
//! Each source (a package set channel, an options dump, a user repository
//! index, ...) implements [`Fetcher`] outside this crate. The orchestrator
//! only asks two things of it: which release is current, and the bytes of
//! that release.

use crate::cancel::CancellationToken;
use crate::error::FetchError;
use crate::metadata::CatalogMetadata;
use async_trait::async_trait;
use std::io::Read;

/// Raw release document.
///
/// A JSON document whose top level has a `"packages"` object mapping record
/// names to arbitrary JSON values. It is consumed on a blocking thread.
pub type ReleaseStream = Box<dyn Read + Send>;

/// Source-specific access to releases.
///
/// Both calls must give up promptly once `cancel` is cancelled. Retries,
/// paging and authentication are the implementation's business.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Identifier of the newest release.
    ///
    /// A pure query: `current` is what the catalog holds now, for sources
    /// that can answer cheaply relative to it.
    async fn latest_release(
        &self,
        cancel: &CancellationToken,
        current: &CatalogMetadata,
    ) -> Result<String, FetchError>;

    /// Open the document of `release`.
    async fn download_release(
        &self,
        cancel: &CancellationToken,
        release: &str,
    ) -> Result<ReleaseStream, FetchError>;
}
