//! Single-record lookup for presentation code
//!
//! These calls block on file I/O; async callers should run them through
//! `spawn_blocking`. Each call opens the catalog's store, uses it, and
//! closes it again.

use crate::config::IndexerConfig;
use crate::error::{CatalogError, Result};
use pkgcat_storage::{KeyedStore, open_store};
use serde::de::DeserializeOwned;
use std::fs::{File, OpenOptions};
use std::ops::ControlFlow;
use tracing::debug;

/// Field holding the record name inside a loaded record
pub const KEY_FIELD: &str = "_key";

/// Make `name` the first field of a JSON object payload.
///
/// `{ "version": "1.0" }` named `hello` becomes
/// `{"_key":"hello", "version": "1.0" }`. The rest of the payload is kept
/// byte for byte. Payloads that are not objects are returned unchanged.
pub fn inject_key(name: &str, raw: &[u8]) -> Vec<u8> {
    let Some(body) = raw.trim_ascii_start().strip_prefix(b"{") else {
        return raw.to_vec();
    };

    let quoted = serde_json::Value::String(name.to_string()).to_string();
    let mut out = Vec::with_capacity(raw.len() + KEY_FIELD.len() + quoted.len() + 4);
    out.extend_from_slice(b"{\"");
    out.extend_from_slice(KEY_FIELD.as_bytes());
    out.extend_from_slice(b"\":");
    out.extend_from_slice(quoted.as_bytes());
    if !body.trim_ascii_start().starts_with(b"}") {
        out.push(b',');
    }
    out.extend_from_slice(body);
    out
}

/// Original JSON bytes of one record
pub fn load_raw(config: &IndexerConfig, catalog: &str, name: &str) -> Result<Vec<u8>> {
    debug!(catalog = %catalog, name = %name, "Loading record");
    with_store(config, catalog, |store| Ok(store.load(name)?))
}

/// Load one record with its name injected as [`KEY_FIELD`] and decode it
/// into `T`.
pub fn load_record<T: DeserializeOwned>(
    config: &IndexerConfig,
    catalog: &str,
    name: &str,
) -> Result<T> {
    let raw = load_raw(config, catalog, name)?;
    serde_json::from_slice(&inject_key(name, &raw)).map_err(|source| CatalogError::Decode {
        name: name.to_string(),
        source,
    })
}

/// Visit every record of a catalog until `visit` breaks.
pub fn scan_records<F>(config: &IndexerConfig, catalog: &str, mut visit: F) -> Result<()>
where
    F: FnMut(&str, &[u8]) -> ControlFlow<()>,
{
    with_store(config, catalog, |store| Ok(store.scan(&mut visit)?))
}

/// Open the key log of a catalog for reading.
///
/// A catalog that was never indexed gets an empty key log.
pub fn open_key_log(config: &IndexerConfig, catalog: &str) -> Result<File> {
    let path = config.key_log_path(catalog);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }

    // Create without truncating, then reopen read-only.
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    Ok(File::open(&path)?)
}

fn with_store<T>(
    config: &IndexerConfig,
    catalog: &str,
    f: impl FnOnce(&dyn KeyedStore) -> Result<T>,
) -> Result<T> {
    let mut store = open_store(&config.store_config(catalog))?;
    let result = f(store.as_ref());
    let closed = store.close();
    let value = result?;
    closed?;
    Ok(value)
}
