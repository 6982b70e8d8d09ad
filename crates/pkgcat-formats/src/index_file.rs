//! Flat store index file entries
//!
//! The index file is a bare sequence of entries in ingestion order, with no
//! header, footer or checksum. End of file terminates the scan.
//!
//! ```text
//! +----------+------------------+----------------+----------------+
//! | name_len | name             | offset         | length         |
//! | u8       | name_len bytes   | signed varint  | signed varint  |
//! +----------+------------------+----------------+----------------+
//! ```
//!
//! `offset`/`length` locate the record's compressed blob in the data file.

use crate::error::{FormatError, FormatResult};
use crate::varint::{read_varint_from, varint_size, write_varint};
use std::io::{ErrorKind, Read};

/// Longest record name the one-byte length prefix can describe
pub const MAX_NAME_LEN: usize = u8::MAX as usize;

/// One owned index entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Record name
    pub name: String,
    /// Byte offset of the compressed blob in the data file
    pub offset: u64,
    /// Length of the compressed blob
    pub length: u64,
}

impl IndexEntry {
    /// Create an entry
    pub fn new(name: impl Into<String>, offset: u64, length: u64) -> Self {
        Self {
            name: name.into(),
            offset,
            length,
        }
    }

    /// Append the encoded entry to `buf`
    pub fn encode(&self, buf: &mut Vec<u8>) -> FormatResult<()> {
        encode_entry(&self.name, self.offset, self.length, buf)
    }
}

/// Append one entry to `buf` without building an [`IndexEntry`] first.
///
/// Fails with [`FormatError::NameTooLong`] if `name` exceeds
/// [`MAX_NAME_LEN`] bytes; nothing is written in that case.
pub fn encode_entry(name: &str, offset: u64, length: u64, buf: &mut Vec<u8>) -> FormatResult<()> {
    let name_len = u8::try_from(name.len()).map_err(|_| FormatError::NameTooLong(name.len()))?;

    buf.push(name_len);
    buf.extend_from_slice(name.as_bytes());
    write_varint(offset as i64, buf);
    write_varint(length as i64, buf);
    Ok(())
}

/// Borrowed view of the entry most recently read by an [`IndexReader`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEntry<'a> {
    /// Record name bytes
    pub name: &'a [u8],
    /// Byte offset of the compressed blob in the data file
    pub offset: u64,
    /// Length of the compressed blob
    pub length: u64,
}

/// Sequential reader over an index file.
///
/// [`IndexReader::next_entry`] reuses one name buffer so a full scan does
/// not allocate per entry. The [`Iterator`] impl yields owned entries.
#[derive(Debug)]
pub struct IndexReader<R> {
    reader: R,
    position: usize,
    name: Vec<u8>,
}

impl<R: Read> IndexReader<R> {
    /// Wrap a reader positioned at the start of an index file
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            position: 0,
            name: Vec::with_capacity(MAX_NAME_LEN),
        }
    }

    /// Read the next entry, or `None` at a clean end of file
    pub fn next_entry(&mut self) -> FormatResult<Option<RawEntry<'_>>> {
        let start = self.position;

        let mut len = [0u8; 1];
        match self.reader.read_exact(&mut len) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        self.name.resize(usize::from(len[0]), 0);
        match self.reader.read_exact(&mut self.name) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(FormatError::InvalidEntry(format!(
                    "name truncated at byte {start}"
                )));
            }
            Err(e) => return Err(e.into()),
        }
        self.position += 1 + self.name.len();

        let offset = read_varint_from(&mut self.reader, self.position)?;
        self.position += varint_size(offset);
        let length = read_varint_from(&mut self.reader, self.position)?;
        self.position += varint_size(length);

        let (Ok(offset), Ok(length)) = (u64::try_from(offset), u64::try_from(length)) else {
            return Err(FormatError::InvalidEntry(format!(
                "negative span {offset}+{length} at byte {start}"
            )));
        };

        Ok(Some(RawEntry {
            name: &self.name,
            offset,
            length,
        }))
    }
}

impl<R: Read> Iterator for IndexReader<R> {
    type Item = FormatResult<IndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_entry() {
            Ok(Some(raw)) => Some(
                String::from_utf8(raw.name.to_vec())
                    .map(|name| IndexEntry::new(name, raw.offset, raw.length))
                    .map_err(|e| FormatError::InvalidEntry(format!("name is not UTF-8: {e}"))),
            ),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
