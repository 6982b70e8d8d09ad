//! redb backend
//!
//! Records live in a single B-tree table keyed by name. A rebuild deletes
//! and recreates the table inside one write transaction, so until that
//! transaction commits readers keep seeing the previous content.

use crate::codec::RecordCodec;
use crate::error::{Result, StorageError};
use crate::key_log::KeyLog;
use crate::store::{IndexStats, KeyedStore};
use pkgcat_formats::parse_records;
use redb::{Database, ReadableTable, TableDefinition, TableError};
use std::fs;
use std::io::{Read, Write};
use std::ops::ControlFlow;
use std::path::Path;
use tracing::{debug, info};

/// Database file name inside the store directory
pub const DB_FILE: &str = "records.redb";

/// Record name to compressed record
const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

/// Store backed by a redb database
pub struct RedbStore {
    db: Option<Database>,
    codec: RecordCodec,
}

impl RedbStore {
    /// Open or create the database in `dir`
    pub fn open(dir: &Path, codec: RecordCodec) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let db = Database::create(dir.join(DB_FILE))?;
        Ok(Self {
            db: Some(db),
            codec,
        })
    }

    fn db(&self) -> Result<&Database> {
        self.db.as_ref().ok_or(StorageError::Closed)
    }
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("open", &self.db.is_some())
            .field("codec", &self.codec)
            .finish()
    }
}

impl KeyedStore for RedbStore {
    fn index(&mut self, records: &mut dyn Read, keys: &mut dyn Write) -> Result<IndexStats> {
        let db = self.db()?;
        let txn = db.begin_write()?;
        txn.delete_table(RECORDS)?;

        let mut stats = IndexStats::default();
        let mut key_log = KeyLog::new(keys);
        {
            let mut table = txn.open_table(RECORDS)?;
            let mut compressor = self.codec.compressor()?;
            let mut buf = Vec::new();

            parse_records(records, |name, raw| -> Result<()> {
                buf.clear();
                let length = compressor.compress(&mut buf, raw)?;
                table.insert(name, buf.as_slice())?;
                key_log.record(name)?;
                stats.add(raw.len(), length);
                Ok(())
            })?;
        }
        txn.commit()?;
        key_log.flush()?;
        stats.keys = key_log.len();

        info!(
            "Indexed {} records into redb: {} compressed bytes",
            stats.records, stats.stored_bytes
        );
        Ok(stats)
    }

    fn load(&self, name: &str) -> Result<Vec<u8>> {
        let txn = self.db()?.begin_read()?;
        let table = match txn.open_table(RECORDS) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => {
                return Err(StorageError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let guard = table
            .get(name)?
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;

        let mut record = Vec::new();
        self.codec.decompress(&mut record, guard.value())?;
        debug!("Loaded {} from redb", name);
        Ok(record)
    }

    fn scan(&self, visit: &mut dyn FnMut(&str, &[u8]) -> ControlFlow<()>) -> Result<()> {
        let txn = self.db()?.begin_read()?;
        let table = match txn.open_table(RECORDS) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut record = Vec::new();
        for entry in table.iter()? {
            let (name, compressed) = entry?;

            record.clear();
            self.codec.decompress(&mut record, compressed.value())?;
            if visit(name.value(), &record).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.db.take();
        Ok(())
    }
}
