//! Backend selection
//!
//! A catalog picks its backend and dictionary once, when it is constructed.
//! [`open_store`] turns that choice into a boxed [`KeyedStore`] with its own
//! freshly prepared [`RecordCodec`].

use crate::codec::{DEFAULT_LEVEL, DictionaryKind, RecordCodec};
use crate::error::{Result, StorageError};
use crate::flat::FlatStore;
use crate::redb_store::RedbStore;
use crate::sqlite::SqliteStore;
use crate::store::KeyedStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

/// Available storage backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Index file plus data file, linear lookup
    #[default]
    Flat,
    /// SQLite table keyed by name
    Sqlite,
    /// redb B-tree keyed by name
    Redb,
}

impl BackendKind {
    /// Lowercase name, also used as the store's directory name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Sqlite => "sqlite",
            Self::Redb => "redb",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "flat" => Ok(Self::Flat),
            "sqlite" => Ok(Self::Sqlite),
            "redb" => Ok(Self::Redb),
            other => Err(StorageError::Config(format!("unknown backend: {other}"))),
        }
    }
}

/// Where and how one catalog stores its records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory owned by the store
    pub dir: PathBuf,
    /// Backend implementation
    pub backend: BackendKind,
    /// Compression dictionary for this record family
    pub dictionary: DictionaryKind,
    /// zstd compression level
    pub compression_level: i32,
}

impl StoreConfig {
    /// Flat store with the package dictionary in `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            backend: BackendKind::default(),
            dictionary: DictionaryKind::default(),
            compression_level: DEFAULT_LEVEL,
        }
    }

    /// Set the backend
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Set the dictionary
    pub fn with_dictionary(mut self, dictionary: DictionaryKind) -> Self {
        self.dictionary = dictionary;
        self
    }

    /// Set the compression level
    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.dir.as_os_str().is_empty() {
            return Err("dir must not be empty".to_string());
        }

        if !zstd::compression_level_range().contains(&self.compression_level) {
            return Err(format!(
                "compression_level {} is outside {:?}",
                self.compression_level,
                zstd::compression_level_range()
            ));
        }

        Ok(())
    }
}

/// Open the configured backend.
pub fn open_store(config: &StoreConfig) -> Result<Box<dyn KeyedStore>> {
    config.validate().map_err(StorageError::Config)?;

    let codec = RecordCodec::with_level(config.dictionary, config.compression_level);
    debug!(
        "Opening {} store in {} ({} dictionary)",
        config.backend,
        config.dir.display(),
        config.dictionary
    );

    Ok(match config.backend {
        BackendKind::Flat => Box::new(FlatStore::open(&config.dir, codec)?),
        BackendKind::Sqlite => Box::new(SqliteStore::open(&config.dir, codec)?),
        BackendKind::Redb => Box::new(RedbStore::open(&config.dir, codec)?),
    })
}
