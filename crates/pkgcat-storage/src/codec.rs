//! Per-record zstd compression with a bundled dictionary
//!
//! Records are a few hundred bytes to a few KB of JSON with the same field
//! names over and over. Compressing them one by one without help wastes most
//! of each frame on relearning those names, so every record is compressed
//! against a fixed dictionary shipped with the binary. Dictionaries are
//! raw-content samples of the record family they serve; they are never
//! trained or changed at runtime.

use crate::error::{Result, StorageError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::str::FromStr;
use zstd::dict::{DecoderDictionary, EncoderDictionary};

/// zstd level used when none is configured
pub const DEFAULT_LEVEL: i32 = 3;

const PACKAGES_DICT: &[u8] = include_bytes!("../dict/packages.dict");
const OPTIONS_DICT: &[u8] = include_bytes!("../dict/options.dict");

/// Record family a dictionary was built for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DictionaryKind {
    /// Package-set records (name, version, meta, ...)
    #[default]
    Packages,
    /// Module option records (type, default, description, ...)
    Options,
}

impl DictionaryKind {
    /// Raw dictionary content
    pub const fn bytes(self) -> &'static [u8] {
        match self {
            Self::Packages => PACKAGES_DICT,
            Self::Options => OPTIONS_DICT,
        }
    }

    /// Lowercase name as used in configuration
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Packages => "packages",
            Self::Options => "options",
        }
    }
}

impl fmt::Display for DictionaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DictionaryKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "packages" => Ok(Self::Packages),
            "options" => Ok(Self::Options),
            other => Err(StorageError::Config(format!("unknown dictionary: {other}"))),
        }
    }
}

/// Compressor and decompressor sharing one prepared dictionary.
///
/// Build one per store and hand it to the backend; the prepared dictionaries
/// are expensive to create and cheap to reuse.
pub struct RecordCodec {
    kind: DictionaryKind,
    level: i32,
    encoder: EncoderDictionary<'static>,
    decoder: DecoderDictionary<'static>,
}

impl RecordCodec {
    /// Prepare the codec for a dictionary at the default level
    pub fn new(kind: DictionaryKind) -> Self {
        Self::with_level(kind, DEFAULT_LEVEL)
    }

    /// Prepare the codec for a dictionary at a specific zstd level
    pub fn with_level(kind: DictionaryKind, level: i32) -> Self {
        let dict = kind.bytes();
        Self {
            kind,
            level,
            encoder: EncoderDictionary::copy(dict, level),
            decoder: DecoderDictionary::copy(dict),
        }
    }

    /// Create a reusable compressor for a bulk load.
    pub fn compressor(&self) -> Result<RecordCompressor<'_>> {
        let inner = zstd::bulk::Compressor::with_prepared_dictionary(&self.encoder)?;
        Ok(RecordCompressor {
            inner,
            scratch: Vec::new(),
        })
    }

    /// Compress `src` and append the frame to `dst`, returning its length.
    pub fn compress(&self, dst: &mut Vec<u8>, src: &[u8]) -> Result<usize> {
        self.compressor()?.compress(dst, src)
    }

    /// Decompress one frame and append the payload to `dst`.
    ///
    /// Fails with [`StorageError::Corrupt`] if `compressed` is not exactly
    /// one complete frame produced with this dictionary; `dst` is left as it
    /// was.
    pub fn decompress(&self, dst: &mut Vec<u8>, compressed: &[u8]) -> Result<usize> {
        let frame_len = zstd::zstd_safe::find_frame_compressed_size(compressed).map_err(|code| {
            StorageError::Corrupt(format!(
                "invalid frame: {}",
                zstd::zstd_safe::get_error_name(code)
            ))
        })?;
        if frame_len != compressed.len() {
            return Err(StorageError::Corrupt(format!(
                "{} trailing bytes after a {frame_len} byte frame",
                compressed.len() - frame_len
            )));
        }

        let start = dst.len();
        let mut decoder =
            zstd::stream::read::Decoder::with_prepared_dictionary(compressed, &self.decoder)
                .map_err(|e| StorageError::Corrupt(format!("decoder setup failed: {e}")))?
                .single_frame();

        match decoder.read_to_end(dst) {
            Ok(n) => Ok(n),
            Err(e) => {
                dst.truncate(start);
                Err(StorageError::Corrupt(e.to_string()))
            }
        }
    }
}

impl fmt::Debug for RecordCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordCodec")
            .field("kind", &self.kind)
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

/// Compressor context kept alive across the records of one rebuild
pub struct RecordCompressor<'a> {
    inner: zstd::bulk::Compressor<'a>,
    scratch: Vec<u8>,
}

impl RecordCompressor<'_> {
    /// Compress `src` and append the frame to `dst`, returning its length.
    ///
    /// Output only depends on the input, the dictionary and the level.
    pub fn compress(&mut self, dst: &mut Vec<u8>, src: &[u8]) -> Result<usize> {
        self.scratch.clear();
        self.scratch
            .reserve(zstd::zstd_safe::compress_bound(src.len()));

        let written = self.inner.compress_to_buffer(src, &mut self.scratch)?;
        dst.extend_from_slice(&self.scratch[..written]);
        Ok(written)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const RECORD: &[u8] = br#"{"name":"hello-2.12.1","pname":"hello","version":"2.12.1","meta":{"description":"A program that produces a familiar, friendly greeting","homepage":"https://www.gnu.org/software/hello/manual/","license":[{"spdxId":"GPL-3.0-or-later"}],"mainProgram":"hello","platforms":["x86_64-linux","aarch64-linux","x86_64-darwin","aarch64-darwin"]}}"#;

    #[test]
    fn test_round_trip_appends() {
        let codec = RecordCodec::new(DictionaryKind::Packages);
        let mut compressed = b"prefix".to_vec();
        let n = codec.compress(&mut compressed, RECORD).unwrap();
        assert_eq!(compressed.len(), 6 + n);
        assert_eq!(&compressed[..6], b"prefix");

        let mut out = b"{".to_vec();
        codec.decompress(&mut out, &compressed[6..]).unwrap();
        assert_eq!(&out[1..], RECORD);
    }

    #[test]
    fn test_dictionary_helps_small_records() {
        let codec = RecordCodec::new(DictionaryKind::Packages);
        let mut with_dict = Vec::new();
        codec.compress(&mut with_dict, RECORD).unwrap();

        let without_dict = zstd::bulk::compress(RECORD, DEFAULT_LEVEL).unwrap();
        assert!(
            with_dict.len() < without_dict.len(),
            "{} >= {}",
            with_dict.len(),
            without_dict.len()
        );
    }

    #[test]
    fn test_compression_is_deterministic() {
        let codec = RecordCodec::new(DictionaryKind::Options);
        let mut compressor = codec.compressor().unwrap();

        let mut first = Vec::new();
        let mut second = Vec::new();
        compressor.compress(&mut first, RECORD).unwrap();
        compressor.compress(&mut second, RECORD).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let codec = RecordCodec::new(DictionaryKind::Packages);
        let mut out = b"keep".to_vec();
        let err = codec.decompress(&mut out, b"definitely not zstd").unwrap_err();

        assert!(matches!(err, StorageError::Corrupt(_)));
        assert_eq!(out, b"keep");
    }

    #[test]
    fn test_truncated_frame_is_corrupt() {
        let codec = RecordCodec::new(DictionaryKind::Packages);
        let mut compressed = Vec::new();
        codec.compress(&mut compressed, RECORD).unwrap();
        compressed.truncate(compressed.len() / 2);

        let err = codec.decompress(&mut Vec::new(), &compressed).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt(_)));
    }

    #[test]
    fn test_concatenated_frames_are_corrupt() {
        let codec = RecordCodec::new(DictionaryKind::Packages);
        let mut compressed = Vec::new();
        codec.compress(&mut compressed, br#"{"a":1}"#).unwrap();
        codec.compress(&mut compressed, br#"{"b":2}"#).unwrap();

        let mut out = b"keep".to_vec();
        let err = codec.decompress(&mut out, &compressed).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt(_)), "{err}");
        assert_eq!(out, b"keep");
    }

    #[test]
    fn test_dictionary_kind_names() {
        for kind in [DictionaryKind::Packages, DictionaryKind::Options] {
            assert_eq!(kind.as_str().parse::<DictionaryKind>().unwrap(), kind);
            assert!(!kind.bytes().is_empty());
        }
        assert!("nope".parse::<DictionaryKind>().is_err());
    }

    proptest! {
        #[test]
        fn prop_round_trip(payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let codec = RecordCodec::new(DictionaryKind::Packages);
            let mut compressed = Vec::new();
            codec.compress(&mut compressed, &payload).unwrap();

            let mut out = Vec::new();
            codec.decompress(&mut out, &compressed).unwrap();
            prop_assert_eq!(out, payload);
        }
    }
}
