//! Indexer configuration
//!
//! Everything the orchestrator and the lookup API need to find a catalog on
//! disk: the cache root, the staleness interval, the enabled catalogs and the
//! storage backend. Each catalog owns `<cache_dir>/<name>/`:
//!
//! ```text
//! <cache_dir>/<name>/
//!     metadata.json       freshness metadata
//!     keys.txt            key log, one record name per line
//!     <backend>/          store files (flat, sqlite or redb)
//! ```

use crate::error::{CatalogError, Result};
use crate::metadata::METADATA_FILE;
use pkgcat_storage::{BackendKind, DictionaryKind, StoreConfig};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Key log file name inside a catalog directory
pub const KEY_LOG_FILE: &str = "keys.txt";

/// Default staleness interval (one week)
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Base cache directory.
///
/// Returns a path like:
/// - Linux: `~/.cache/pkgcat`
/// - macOS: `~/Library/Caches/pkgcat`
/// - Windows: `C:\Users\{user}\AppData\Local\pkgcat`
///
/// Falls back to the system temp directory when the platform has none.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("pkgcat")
}

/// Indexer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Root of all catalog directories
    pub cache_dir: PathBuf,
    /// How long a catalog stays fresh after indexing
    #[serde(with = "duration_secs")]
    pub update_interval: Duration,
    /// Enabled catalogs
    pub catalogs: Vec<String>,
    /// Storage backend for every catalog
    pub backend: BackendKind,
    /// Dictionary per catalog; unlisted catalogs use the package dictionary
    pub dictionaries: BTreeMap<String, DictionaryKind>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            update_interval: DEFAULT_UPDATE_INTERVAL,
            catalogs: Vec::new(),
            backend: BackendKind::default(),
            dictionaries: BTreeMap::new(),
        }
    }
}

impl IndexerConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache directory
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    /// Set the staleness interval
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    /// Set the enabled catalogs
    pub fn with_catalogs<I, S>(mut self, catalogs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.catalogs = catalogs.into_iter().map(Into::into).collect();
        self
    }

    /// Set the storage backend
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Use a specific dictionary for one catalog
    pub fn with_dictionary(mut self, catalog: impl Into<String>, kind: DictionaryKind) -> Self {
        self.dictionaries.insert(catalog.into(), kind);
        self
    }

    /// Load the configuration from a JSON file.
    ///
    /// A missing file yields the defaults. The result is validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| CatalogError::Config(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };

        config.validate().map_err(CatalogError::Config)?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err("cache_dir must not be empty".to_string());
        }

        let mut seen = HashSet::new();
        for name in &self.catalogs {
            validate_catalog_name(name)?;
            if !seen.insert(name.as_str()) {
                return Err(format!("catalog {name} is listed twice"));
            }
        }

        Ok(())
    }

    /// Directory owned by one catalog
    pub fn catalog_dir(&self, catalog: &str) -> PathBuf {
        self.cache_dir.join(catalog)
    }

    /// Metadata file of one catalog
    pub fn metadata_path(&self, catalog: &str) -> PathBuf {
        self.catalog_dir(catalog).join(METADATA_FILE)
    }

    /// Key log of one catalog
    pub fn key_log_path(&self, catalog: &str) -> PathBuf {
        self.catalog_dir(catalog).join(KEY_LOG_FILE)
    }

    /// Dictionary used for one catalog
    pub fn dictionary_for(&self, catalog: &str) -> DictionaryKind {
        self.dictionaries.get(catalog).copied().unwrap_or_default()
    }

    /// Store configuration of one catalog
    pub fn store_config(&self, catalog: &str) -> StoreConfig {
        StoreConfig::new(self.catalog_dir(catalog).join(self.backend.as_str()))
            .with_backend(self.backend)
            .with_dictionary(self.dictionary_for(catalog))
    }
}

/// Catalog names become directory names.
fn validate_catalog_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(format!("invalid catalog name {name:?}"));
    }
    if name.contains(['/', '\\']) {
        return Err(format!("catalog name {name:?} must not contain path separators"));
    }
    Ok(())
}

/// Serialize a [`Duration`] as whole seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
