//! Plain-text list of indexed record names
//!
//! One name per line, in the order names first appear in the source. The
//! picker reads this file directly, so it must never list a name twice even
//! when the source repeats one.

use std::collections::HashSet;
use std::io::{self, Write};

/// Writer that records each distinct name once
#[derive(Debug)]
pub(crate) struct KeyLog<W> {
    writer: W,
    seen: HashSet<String>,
}

impl<W: Write> KeyLog<W> {
    /// Wrap the destination of the key log
    pub(crate) fn new(writer: W) -> Self {
        Self {
            writer,
            seen: HashSet::new(),
        }
    }

    /// Append `name` unless it was already written.
    ///
    /// Returns `false` for a repeated name.
    pub(crate) fn record(&mut self, name: &str) -> io::Result<bool> {
        if self.seen.contains(name) {
            return Ok(false);
        }

        self.writer.write_all(name.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.seen.insert(name.to_owned());
        Ok(true)
    }

    /// Number of distinct names written
    pub(crate) fn len(&self) -> usize {
        self.seen.len()
    }

    /// Flush the underlying writer
    pub(crate) fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
