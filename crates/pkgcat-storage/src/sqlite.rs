//! SQLite backend
//!
//! One `WITHOUT ROWID` table keyed by record name, so a lookup is a single
//! B-tree probe. Synchronous writes are disabled and the rollback journal is
//! kept in memory: a rebuild is a bulk load of data that can always be
//! fetched again. A failed rebuild rolls back, but a crash in the middle of
//! one leaves the catalog for the next full rebuild.

use crate::codec::RecordCodec;
use crate::error::{Result, StorageError};
use crate::key_log::KeyLog;
use crate::store::{IndexStats, KeyedStore};
use pkgcat_formats::parse_records;
use rusqlite::{Connection, OptionalExtension};
use std::fs;
use std::io::{Read, Write};
use std::ops::ControlFlow;
use std::path::Path;
use tracing::{debug, info};

/// Database file name inside the store directory
pub const DB_FILE: &str = "records.db";

const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS records (
    name    TEXT PRIMARY KEY,
    content BLOB NOT NULL
) WITHOUT ROWID;
";

/// Store backed by a SQLite table
#[derive(Debug)]
pub struct SqliteStore {
    conn: Option<Connection>,
    codec: RecordCodec,
}

impl SqliteStore {
    /// Open or create the database in `dir`
    pub fn open(dir: &Path, codec: RecordCodec) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let conn = Connection::open(dir.join(DB_FILE))?;
        Self::init(conn, codec)
    }

    /// Open a private in-memory database
    pub fn open_in_memory(codec: RecordCodec) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, codec)
    }

    fn init(conn: Connection, codec: RecordCodec) -> Result<Self> {
        conn.pragma_update(None, "synchronous", "OFF")?;
        conn.pragma_update(None, "journal_mode", "MEMORY")?;
        conn.execute_batch(CREATE_TABLE)?;
        Ok(Self {
            conn: Some(conn),
            codec,
        })
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(StorageError::Closed)
    }
}

impl KeyedStore for SqliteStore {
    fn index(&mut self, records: &mut dyn Read, keys: &mut dyn Write) -> Result<IndexStats> {
        let Self { conn, codec } = self;
        let conn = conn.as_mut().ok_or(StorageError::Closed)?;

        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM records", [])?;
        debug!("Dropped {} previous records", removed);

        let mut stats = IndexStats::default();
        let mut key_log = KeyLog::new(keys);
        {
            let mut insert =
                tx.prepare("INSERT OR REPLACE INTO records (name, content) VALUES (?1, ?2)")?;
            let mut compressor = codec.compressor()?;
            let mut buf = Vec::new();

            parse_records(records, |name, raw| -> Result<()> {
                buf.clear();
                let length = compressor.compress(&mut buf, raw)?;
                insert.execute((name, buf.as_slice()))?;
                key_log.record(name)?;
                stats.add(raw.len(), length);
                Ok(())
            })?;
        }
        tx.commit()?;
        key_log.flush()?;
        stats.keys = key_log.len();

        info!(
            "Indexed {} records into SQLite: {} compressed bytes",
            stats.records, stats.stored_bytes
        );
        Ok(stats)
    }

    fn load(&self, name: &str) -> Result<Vec<u8>> {
        let compressed: Vec<u8> = self
            .conn()?
            .query_row(
                "SELECT content FROM records WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;

        let mut record = Vec::new();
        self.codec.decompress(&mut record, &compressed)?;
        debug!("Loaded {} from SQLite", name);
        Ok(record)
    }

    fn scan(&self, visit: &mut dyn FnMut(&str, &[u8]) -> ControlFlow<()>) -> Result<()> {
        let mut stmt = self.conn()?.prepare("SELECT name, content FROM records")?;
        let mut rows = stmt.query([])?;

        let mut record = Vec::new();
        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            let compressed: Vec<u8> = row.get(1)?;

            record.clear();
            self.codec.decompress(&mut record, &compressed)?;
            if visit(&name, &record).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| e)?;
        }
        Ok(())
    }
}
