//! Whole-file replacement through a temporary file and a rename
//!
//! Readers of a path see either the old file or the complete new one. The
//! temporary file lives next to the destination so the final rename never
//! crosses filesystems.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// A file being written in place of `path`.
///
/// Nothing at `path` changes until [`AtomicFile::commit`]. Dropping the
/// value without committing removes the temporary file.
#[derive(Debug)]
pub struct AtomicFile {
    path: PathBuf,
    temp: NamedTempFile,
}

impl AtomicFile {
    /// Start writing a replacement for `path`, creating its parent directory
    /// if needed.
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let temp = NamedTempFile::new_in(&dir)?;
        Ok(Self { path, temp })
    }

    /// Flush and move the file over the destination.
    pub fn commit(mut self) -> io::Result<()> {
        self.temp.flush()?;
        self.temp.persist(&self.path).map_err(|e| e.error)?;
        debug!("Replaced {}", self.path.display());
        Ok(())
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.temp.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}

/// Replace the contents of `path` with `contents` in one step.
pub fn write_atomic(path: impl AsRef<Path>, contents: &[u8]) -> io::Result<()> {
    let mut file = AtomicFile::create(path.as_ref())?;
    file.write_all(contents)?;
    file.commit()
}
