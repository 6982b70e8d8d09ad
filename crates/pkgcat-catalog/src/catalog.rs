//! Catalog definitions

use crate::fetch::Fetcher;
use std::fmt;
use std::sync::Arc;

/// One independently managed source of records.
///
/// The storage location and dictionary come from the
/// [`IndexerConfig`](crate::IndexerConfig); the catalog itself only pairs a
/// name with the fetcher for its source.
#[derive(Clone)]
pub struct Catalog {
    name: String,
    fetcher: Arc<dyn Fetcher>,
}

impl Catalog {
    /// Create a catalog
    pub fn new(name: impl Into<String>, fetcher: impl Fetcher + 'static) -> Self {
        Self::with_fetcher(name, Arc::new(fetcher))
    }

    /// Create a catalog around a shared fetcher
    pub fn with_fetcher(name: impl Into<String>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            name: name.into(),
            fetcher,
        }
    }

    /// Catalog name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fetcher for this catalog's source
    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
