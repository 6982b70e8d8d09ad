//! Flat dual-file store
//!
//! The reference backend keeps two files per rebuild:
//!
//! - `index.bin`: `(name_len, name, offset, length)` entries in ingestion
//!   order (see [`pkgcat_formats::index_file`]).
//! - `data.bin`: the compressed records back to back, in the same order, so
//!   that `offset[i + 1] == offset[i] + length[i]`.
//!
//! A rebuild accumulates both files in memory while streaming the source and
//! writes each one once at the end. A lookup scans the index from the start.
//! That is linear in the number of records, which is fine for the one
//! preview per process this store serves.
//!
//! Each rebuild writes its pair into a new generation directory and then
//! replaces the `CURRENT` file naming the live one:
//!
//! ```text
//! <dir>/
//!     CURRENT             "gen-00000002"
//!     gen-00000002/
//!         index.bin
//!         data.bin
//! ```
//!
//! Readers only ever see an index together with the data it was built with.
//! Older generations are removed once `CURRENT` has moved on.

use crate::atomic::write_atomic;
use crate::codec::RecordCodec;
use crate::error::{Result, StorageError};
use crate::key_log::KeyLog;
use crate::store::{IndexStats, KeyedStore};
use memmap2::Mmap;
use pkgcat_formats::index_file::{IndexEntry, IndexReader, encode_entry};
use pkgcat_formats::{FormatError, parse_records};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Index file name inside a generation directory
pub const INDEX_FILE: &str = "index.bin";

/// Data file name inside a generation directory
pub const DATA_FILE: &str = "data.bin";

/// File naming the live generation directory
pub const CURRENT_FILE: &str = "CURRENT";

const GENERATION_PREFIX: &str = "gen-";

// Sized for the largest package set (~125k records).
const DATA_CAPACITY: usize = 40 << 20;
const INDEX_CAPACITY: usize = 40 << 10;

/// Flat index-plus-data store
#[derive(Debug)]
pub struct FlatStore {
    dir: PathBuf,
    codec: RecordCodec,
    closed: bool,
}

impl FlatStore {
    /// Open the store in `dir`, creating the directory if needed.
    ///
    /// The files themselves are created by the first rebuild; until then
    /// the store is empty.
    pub fn open(dir: impl Into<PathBuf>, codec: RecordCodec) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            codec,
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }

    fn generation_dir(&self, generation: u64) -> PathBuf {
        self.dir
            .join(format!("{GENERATION_PREFIX}{generation:08}"))
    }

    /// Directory of the live generation, `None` before the first rebuild
    fn live_generation(&self) -> Result<Option<PathBuf>> {
        let current = match fs::read_to_string(self.dir.join(CURRENT_FILE)) {
            Ok(current) => current,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let generation = parse_generation(current.trim()).ok_or_else(|| {
            StorageError::Corrupt(format!("{CURRENT_FILE} names {current:?}"))
        })?;
        Ok(Some(self.generation_dir(generation)))
    }

    /// Generation numbers present on disk, live or not
    fn generations_on_disk(&self) -> Result<Vec<u64>> {
        let mut generations = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(generation) = entry.file_name().to_str().and_then(parse_generation) {
                generations.push(generation);
            }
        }
        Ok(generations)
    }

    /// Remove every generation except `live`.
    ///
    /// Failures only leave disk space behind, so they are logged.
    fn remove_stale_generations(&self, live: u64) {
        let generations = match self.generations_on_disk() {
            Ok(generations) => generations,
            Err(e) => {
                warn!("Listing generations in {}: {}", self.dir.display(), e);
                return;
            }
        };

        for generation in generations.into_iter().filter(|&g| g != live) {
            let path = self.generation_dir(generation);
            match fs::remove_dir_all(&path) {
                Ok(()) => debug!("Removed stale generation {}", path.display()),
                Err(e) => warn!("Removing stale generation {}: {}", path.display(), e),
            }
        }
    }

    /// Find the span of the last entry named `name`
    fn locate(generation: &Path, name: &str) -> Result<Option<(u64, u64)>> {
        let file = open_generation_file(generation, INDEX_FILE)?;
        let mut reader = IndexReader::new(BufReader::new(file));
        let mut found = None;
        let mut scanned = 0usize;
        while let Some(entry) = reader.next_entry().map_err(corrupt_index)? {
            scanned += 1;
            if entry.name == name.as_bytes() {
                found = Some((entry.offset, entry.length));
            }
        }

        debug!("Scanned {} index entries for {}", scanned, name);
        Ok(found)
    }

    /// All index entries, keeping only the last entry for each name
    fn live_entries(generation: &Path) -> Result<Vec<IndexEntry>> {
        let file = open_generation_file(generation, INDEX_FILE)?;
        let entries = IndexReader::new(BufReader::new(file))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(corrupt_index)?;

        let mut last = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            last.insert(entry.name.as_str(), i);
        }
        let keep: Vec<bool> = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| last.get(entry.name.as_str()) == Some(&i))
            .collect();

        Ok(entries
            .into_iter()
            .zip(keep)
            .filter_map(|(entry, keep)| keep.then_some(entry))
            .collect())
    }
}

impl KeyedStore for FlatStore {
    fn index(&mut self, records: &mut dyn Read, keys: &mut dyn Write) -> Result<IndexStats> {
        self.ensure_open()?;

        let mut data = Vec::with_capacity(DATA_CAPACITY);
        let mut index = Vec::with_capacity(INDEX_CAPACITY);
        let mut compressor = self.codec.compressor()?;
        let mut key_log = KeyLog::new(keys);
        let mut stats = IndexStats::default();

        parse_records(records, |name, raw| -> Result<()> {
            let offset = data.len() as u64;
            let length = compressor.compress(&mut data, raw)?;
            encode_entry(name, offset, length as u64, &mut index)?;
            key_log.record(name)?;
            stats.add(raw.len(), length);
            Ok(())
        })?;
        key_log.flush()?;
        stats.keys = key_log.len();

        // Past every directory on disk, including ones left by a rebuild
        // that died before switching.
        let generation = self.generations_on_disk()?.into_iter().max().unwrap_or(0) + 1;
        let generation_dir = self.generation_dir(generation);
        fs::create_dir(&generation_dir)?;
        write_atomic(generation_dir.join(DATA_FILE), &data)?;
        write_atomic(generation_dir.join(INDEX_FILE), &index)?;

        let name = format!("{GENERATION_PREFIX}{generation:08}\n");
        write_atomic(self.dir.join(CURRENT_FILE), name.as_bytes())?;
        self.remove_stale_generations(generation);

        info!(
            "Indexed {} records into {}: {} index bytes, {} data bytes",
            stats.records,
            generation_dir.display(),
            index.len(),
            data.len()
        );
        Ok(stats)
    }

    fn load(&self, name: &str) -> Result<Vec<u8>> {
        self.ensure_open()?;

        let not_found = || StorageError::NotFound(name.to_string());
        let generation = self.live_generation()?.ok_or_else(not_found)?;
        let (offset, length) = Self::locate(&generation, name)?.ok_or_else(not_found)?;

        let mut file = open_generation_file(&generation, DATA_FILE)?;
        let size = file.metadata()?.len();
        if offset.checked_add(length).is_none_or(|end| end > size) {
            return Err(StorageError::Corrupt(format!(
                "record {name} spans {offset}+{length} past the {size} byte data file"
            )));
        }

        let mut compressed = vec![0u8; length as usize];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut compressed)?;

        let mut record = Vec::new();
        self.codec.decompress(&mut record, &compressed)?;
        debug!("Loaded {} ({} -> {} bytes)", name, length, record.len());
        Ok(record)
    }

    fn scan(&self, visit: &mut dyn FnMut(&str, &[u8]) -> ControlFlow<()>) -> Result<()> {
        self.ensure_open()?;

        let Some(generation) = self.live_generation()? else {
            return Ok(());
        };
        let entries = Self::live_entries(&generation)?;
        if entries.is_empty() {
            return Ok(());
        }

        let file = open_generation_file(&generation, DATA_FILE)?;
        #[allow(unsafe_code)]
        // SAFETY: files of a published generation are never written again;
        // a rebuild writes a new generation directory instead.
        let mmap = unsafe { Mmap::map(&file)? };

        let mut record = Vec::new();
        for entry in &entries {
            let span = usize::try_from(entry.offset)
                .ok()
                .zip(usize::try_from(entry.length).ok())
                .and_then(|(start, len)| Some(start..start.checked_add(len)?))
                .and_then(|range| mmap.get(range))
                .ok_or_else(|| {
                    StorageError::Corrupt(format!(
                        "record {} spans {}+{} past the {} byte data file",
                        entry.name,
                        entry.offset,
                        entry.length,
                        mmap.len()
                    ))
                })?;

            record.clear();
            self.codec.decompress(&mut record, span)?;
            if visit(&entry.name, &record).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

fn parse_generation(name: &str) -> Option<u64> {
    let digits = name.strip_prefix(GENERATION_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// A published generation must hold both files.
fn open_generation_file(generation: &Path, file: &str) -> Result<File> {
    let path = generation.join(file);
    File::open(&path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            StorageError::Corrupt(format!("{} is missing", path.display()))
        } else {
            e.into()
        }
    })
}

fn corrupt_index(err: FormatError) -> StorageError {
    match err {
        FormatError::Io(e) => StorageError::Io(e),
        other => StorageError::Corrupt(format!("index file: {other}")),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::codec::DictionaryKind;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> FlatStore {
        FlatStore::open(dir.path(), RecordCodec::new(DictionaryKind::Packages)).unwrap()
    }

    fn index(store: &mut FlatStore, doc: &str) -> (IndexStats, String) {
        let mut keys = Vec::new();
        let stats = store.index(&mut doc.as_bytes(), &mut keys).unwrap();
        (stats, String::from_utf8(keys).unwrap())
    }

    fn live(store: &FlatStore) -> PathBuf {
        store.live_generation().unwrap().expect("store was rebuilt")
    }

    fn generation_names(dir: &TempDir) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .filter(|name| name.starts_with(GENERATION_PREFIX))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_data_blobs_are_contiguous() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        index(
            &mut store,
            r#"{"packages":{"a":{"x":1},"b":[1,2,3],"c":"text"}}"#,
        );

        let bytes = fs::read(live(&store).join(INDEX_FILE)).unwrap();
        let entries: Vec<IndexEntry> = IndexReader::new(&bytes[..])
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);

        assert_eq!(entries[0].offset, 0);
        for pair in entries.windows(2) {
            assert_eq!(pair[1].offset, pair[0].offset + pair[0].length);
        }
        let data_len = fs::metadata(live(&store).join(DATA_FILE)).unwrap().len();
        let last = entries.last().unwrap();
        assert_eq!(last.offset + last.length, data_len);
    }

    #[test]
    fn test_load_before_first_rebuild() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(store.load("anything").unwrap_err().is_not_found());

        let mut visited = 0;
        store
            .scan(&mut |_, _| {
                visited += 1;
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(visited, 0);
    }

    #[test]
    fn test_duplicate_names_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        let (stats, keys) = index(
            &mut store,
            r#"{"packages":{"dup":"first","other":1,"dup":"second"}}"#,
        );

        assert_eq!(stats.records, 3);
        assert_eq!(stats.keys, 2);
        assert_eq!(keys, "dup\nother\n");
        assert_eq!(store.load("dup").unwrap(), br#""second""#);

        let mut seen = Vec::new();
        store
            .scan(&mut |name, raw| {
                seen.push((name.to_string(), String::from_utf8(raw.to_vec()).unwrap()));
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(
            seen,
            [
                ("other".to_string(), "1".to_string()),
                ("dup".to_string(), r#""second""#.to_string()),
            ]
        );
    }

    #[test]
    fn test_failed_rebuild_keeps_previous_files() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        index(&mut store, r#"{"packages":{"kept":{"v":1}}}"#);

        let mut keys = Vec::new();
        let err = store
            .index(&mut &br#"{"packages":{"new":{"v":2}, oops"#[..], &mut keys)
            .unwrap_err();
        assert!(matches!(err, StorageError::Format(FormatError::Malformed(_))));

        assert_eq!(store.load("kept").unwrap(), br#"{"v":1}"#);
        assert!(store.load("new").unwrap_err().is_not_found());
    }

    #[test]
    fn test_name_too_long_aborts_rebuild() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        let doc = format!(r#"{{"packages":{{"{}":1}}}}"#, "n".repeat(256));

        let err = store
            .index(&mut doc.as_bytes(), &mut std::io::sink())
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Format(FormatError::NameTooLong(256))
        ));
    }

    #[test]
    fn test_truncated_data_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        index(&mut store, r#"{"packages":{"a":{"x":1},"b":{"y":2}}}"#);

        let data_path = live(&store).join(DATA_FILE);
        let data = fs::read(&data_path).unwrap();
        fs::write(&data_path, &data[..data.len() - 1]).unwrap();

        assert!(store.load("a").is_ok());
        assert!(matches!(
            store.load("b").unwrap_err(),
            StorageError::Corrupt(_)
        ));
    }

    #[test]
    fn test_scan_stops_on_break() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        index(&mut store, r#"{"packages":{"a":1,"b":2,"c":3}}"#);

        let mut seen = Vec::new();
        store
            .scan(&mut |name, _| {
                seen.push(name.to_string());
                if name == "b" {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();
        assert_eq!(seen, ["a", "b"]);
    }

    #[test]
    fn test_rebuild_switches_generation() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        index(&mut store, r#"{"packages":{"a":{"v":"a1"},"b":{"v":"b1"}}}"#);
        assert_eq!(generation_names(&dir), ["gen-00000001"]);

        index(&mut store, r#"{"packages":{"b":{"v":"b2"},"a":{"v":"a2"}}}"#);
        assert_eq!(generation_names(&dir), ["gen-00000002"]);
        assert_eq!(
            fs::read_to_string(dir.path().join(CURRENT_FILE)).unwrap(),
            "gen-00000002\n"
        );
        assert_eq!(store.load("a").unwrap(), br#"{"v":"a2"}"#);
        assert_eq!(store.load("b").unwrap(), br#"{"v":"b2"}"#);
    }

    #[test]
    fn test_interrupted_rebuild_keeps_previous_generation() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        index(&mut store, r#"{"packages":{"a":{"v":"a1"},"b":{"v":"b1"}}}"#);

        // A rebuild that wrote its files but died before switching CURRENT.
        let other = TempDir::new().unwrap();
        let mut other_store =
            FlatStore::open(other.path(), RecordCodec::new(DictionaryKind::Packages)).unwrap();
        index(&mut other_store, r#"{"packages":{"b":{"v":"b2"},"a":{"v":"a2"}}}"#);
        let orphan = dir.path().join("gen-00000002");
        fs::create_dir(&orphan).unwrap();
        for file in [INDEX_FILE, DATA_FILE] {
            fs::copy(live(&other_store).join(file), orphan.join(file)).unwrap();
        }

        assert_eq!(store.load("a").unwrap(), br#"{"v":"a1"}"#);
        assert_eq!(store.load("b").unwrap(), br#"{"v":"b1"}"#);

        // The next rebuild steps past the orphan and cleans it up.
        index(&mut store, r#"{"packages":{"c":{"v":"c3"}}}"#);
        assert_eq!(generation_names(&dir), ["gen-00000003"]);
        assert_eq!(store.load("c").unwrap(), br#"{"v":"c3"}"#);
        assert!(store.load("a").unwrap_err().is_not_found());
    }

    #[test]
    fn test_dangling_current_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        fs::write(dir.path().join(CURRENT_FILE), "gen-00000009\n").unwrap();
        assert!(matches!(
            store.load("a").unwrap_err(),
            StorageError::Corrupt(_)
        ));

        fs::write(dir.path().join(CURRENT_FILE), "../elsewhere").unwrap();
        assert!(matches!(
            store.load("a").unwrap_err(),
            StorageError::Corrupt(_)
        ));
        assert!(matches!(
            store.scan(&mut |_, _| ControlFlow::Continue(())).unwrap_err(),
            StorageError::Corrupt(_)
        ));
    }
}
