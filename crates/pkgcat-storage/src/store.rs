//! Contract shared by every storage backend

use crate::error::Result;
use std::fmt;
use std::io::{Read, Write};
use std::ops::ControlFlow;

/// Counters reported by a rebuild
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Records read from the source, repeats included
    pub records: usize,
    /// Distinct names written to the key log
    pub keys: usize,
    /// Total size of the raw JSON values
    pub raw_bytes: u64,
    /// Total size of the compressed values written
    pub stored_bytes: u64,
}

impl IndexStats {
    pub(crate) fn add(&mut self, raw: usize, stored: usize) {
        self.records += 1;
        self.raw_bytes += raw as u64;
        self.stored_bytes += stored as u64;
    }
}

/// A catalog's record store.
///
/// Backends differ in lookup cost and durability but behave the same:
///
/// - [`index`](KeyedStore::index) replaces everything previously stored.
///   Names loadable afterwards are exactly the names in that source.
/// - If a name occurs more than once in one source, the last value wins and
///   the key log lists the name once, where it first appeared.
/// - After [`close`](KeyedStore::close) every call fails with
///   [`StorageError::Closed`](crate::StorageError::Closed).
pub trait KeyedStore: Send + fmt::Debug {
    /// Rebuild the store from a JSON document with a `"packages"` object,
    /// writing each distinct record name to `keys`, one per line.
    fn index(&mut self, records: &mut dyn Read, keys: &mut dyn Write) -> Result<IndexStats>;

    /// Return the original JSON bytes of one record.
    ///
    /// Fails with [`StorageError::NotFound`](crate::StorageError::NotFound)
    /// if no record has this name.
    fn load(&self, name: &str) -> Result<Vec<u8>>;

    /// Visit every record with its decompressed JSON, in storage order,
    /// until `visit` breaks.
    fn scan(&self, visit: &mut dyn FnMut(&str, &[u8]) -> ControlFlow<()>) -> Result<()>;

    /// Release the backend's resources.
    fn close(&mut self) -> Result<()>;
}
