//! Record extraction and on-disk index encoding for pkgcat catalogs
//!
//! This crate holds the parts of the catalog pipeline that turn bytes into
//! structure and back, without touching the filesystem:
//!
//! - **`jsonstream`**: single-pass extraction of `(name, raw value)` records
//!   from the `"packages"` object of a large JSON document, plus cheap point
//!   lookups of one nested string field
//! - **`varint`**: zig-zag signed variable-length integers
//! - **`index_file`**: entries of the flat store's index file
//!
//! # Example
//!
//! ```rust
//! use pkgcat_formats::jsonstream::parse_records;
//! use pkgcat_formats::FormatError;
//!
//! let doc = br#"{"packages":{"hello":{"version":"2.12"}}}"#;
//! let mut names = Vec::new();
//! parse_records(&doc[..], |name, _raw| {
//!     names.push(name.to_string());
//!     Ok::<(), FormatError>(())
//! })?;
//! assert_eq!(names, ["hello"]);
//! # Ok::<(), FormatError>(())
//! ```

#![warn(missing_docs)]
#![allow(clippy::return_self_not_must_use)] // Builder patterns

pub mod error;
pub mod index_file;
pub mod jsonstream;
pub mod varint;

pub use error::{FormatError, FormatResult};
pub use index_file::{IndexEntry, IndexReader, MAX_NAME_LEN};
pub use jsonstream::{find_path, parse_records};
