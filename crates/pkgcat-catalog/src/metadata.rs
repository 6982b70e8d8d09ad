//! Per-catalog freshness metadata
//!
//! Stored as `metadata.json` in the catalog directory:
//!
//! ```json
//! { "last_indexed_at": "2024-11-02T09:13:44.118Z", "curr_release": "nixos-24.05.6463" }
//! ```
//!
//! The file is read before deciding staleness and written only after a
//! successful rebuild, or after finding that the source has not changed.

use crate::error::{CatalogError, Result};
use chrono::{DateTime, TimeDelta, Utc};
use pkgcat_storage::write_atomic;
use serde::{Deserialize, Serialize};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Metadata file name inside a catalog directory
pub const METADATA_FILE: &str = "metadata.json";

/// Freshness record of one catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogMetadata {
    /// When the catalog was last indexed or confirmed unchanged
    pub last_indexed_at: DateTime<Utc>,
    /// Opaque release identifier of the indexed content
    pub curr_release: String,
}

impl Default for CatalogMetadata {
    /// A catalog that was never indexed
    fn default() -> Self {
        Self {
            last_indexed_at: DateTime::UNIX_EPOCH,
            curr_release: String::new(),
        }
    }
}

impl CatalogMetadata {
    /// Metadata for `release`, indexed now
    pub fn fresh(release: impl Into<String>) -> Self {
        Self {
            last_indexed_at: Utc::now(),
            curr_release: release.into(),
        }
    }

    /// Whether more than `interval` has passed since the last indexing at
    /// time `now`
    pub fn is_stale(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        let interval = TimeDelta::from_std(interval).unwrap_or(TimeDelta::MAX);
        now.signed_duration_since(self.last_indexed_at) > interval
    }

    /// Read the metadata file at `path`.
    ///
    /// A missing file means the catalog was never indexed.
    pub async fn read(path: &Path) -> Result<Self> {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| metadata_error(path, e.into())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No metadata at {}", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(metadata_error(path, e)),
        }
    }

    /// Replace the metadata file at `path`.
    pub async fn write(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec(self).map_err(|e| metadata_error(path, e.into()))?;
        let target = path.to_path_buf();

        tokio::task::spawn_blocking(move || write_atomic(&target, &bytes))
            .await?
            .map_err(|e| metadata_error(path, e))?;

        debug!(
            "Wrote metadata {} (release {:?})",
            path.display(),
            self.curr_release
        );
        Ok(())
    }
}

fn metadata_error(path: &Path, source: io::Error) -> CatalogError {
    CatalogError::Metadata {
        path: PathBuf::from(path),
        source,
    }
}
