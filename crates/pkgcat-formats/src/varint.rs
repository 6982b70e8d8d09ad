//! Variable-length integers for the flat index file
//!
//! Unsigned values use LEB128: seven payload bits per byte, high bit set on
//! every byte except the last. Signed values are zig-zag mapped first so that
//! small magnitudes of either sign stay short.

use crate::error::{FormatError, FormatResult};
use std::io::{ErrorKind, Read};

/// Longest encoding of a 64-bit value.
pub const MAX_VARINT_LEN: usize = 10;

/// Append an unsigned varint to `data`
pub fn write_uvarint(value: u64, data: &mut Vec<u8>) {
    let mut value = value;

    while value >= 0x80 {
        data.push((value as u8) | 0x80);
        value >>= 7;
    }
    data.push(value as u8);
}

/// Append a zig-zag encoded signed varint to `data`
pub fn write_varint(value: i64, data: &mut Vec<u8>) {
    let mut unsigned = (value as u64) << 1;
    if value < 0 {
        unsigned = !unsigned;
    }
    write_uvarint(unsigned, data);
}

/// Read an unsigned varint from a byte stream.
///
/// `position` is only used to report where a bad varint started.
pub fn read_uvarint_from<R: Read>(reader: &mut R, position: usize) -> FormatResult<u64> {
    let mut result = 0u64;
    let mut shift = 0;
    let mut byte = [0u8; 1];

    for i in 0..MAX_VARINT_LEN {
        match reader.read_exact(&mut byte) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(FormatError::VarInt(position));
            }
            Err(e) => return Err(e.into()),
        }

        let b = byte[0];
        if b < 0x80 {
            if i == MAX_VARINT_LEN - 1 && b > 1 {
                return Err(FormatError::VarInt(position));
            }
            return Ok(result | (u64::from(b) << shift));
        }

        result |= u64::from(b & 0x7F) << shift;
        shift += 7;
    }

    Err(FormatError::VarInt(position))
}

/// Read a zig-zag encoded signed varint from a byte stream
pub fn read_varint_from<R: Read>(reader: &mut R, position: usize) -> FormatResult<i64> {
    read_uvarint_from(reader, position).map(unzigzag)
}

/// Number of bytes `value` occupies once zig-zag encoded
pub fn varint_size(value: i64) -> usize {
    let mut unsigned = (value as u64) << 1;
    if value < 0 {
        unsigned = !unsigned;
    }
    if unsigned == 0 {
        1
    } else {
        (64 - unsigned.leading_zeros()).div_ceil(7) as usize
    }
}

const fn unzigzag(unsigned: u64) -> i64 {
    let value = (unsigned >> 1) as i64;
    if unsigned & 1 == 0 { value } else { !value }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zigzag_layout() {
        // Same byte layout the index files have always used.
        let cases: [(i64, &[u8]); 6] = [
            (0, &[0x00]),
            (-1, &[0x01]),
            (1, &[0x02]),
            (63, &[0x7E]),
            (64, &[0x80, 0x01]),
            (-65, &[0x81, 0x01]),
        ];

        for (value, expected) in cases {
            let mut data = Vec::new();
            write_varint(value, &mut data);
            assert_eq!(data, expected, "encoding of {value}");
            assert_eq!(varint_size(value), expected.len());
        }
    }

    #[test]
    fn test_truncated_varint() {
        let err = read_varint_from(&mut &[0x80u8, 0x80][..], 0).unwrap_err();
        assert!(matches!(err, FormatError::VarInt(0)));

        let err = read_varint_from(&mut &[0xFFu8][..], 7).unwrap_err();
        assert!(matches!(err, FormatError::VarInt(7)));
    }

    #[test]
    fn test_overflowing_varint() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x02];
        assert!(matches!(
            read_uvarint_from(&mut &data[..], 3),
            Err(FormatError::VarInt(3))
        ));
    }

    #[test]
    fn test_extremes_use_the_longest_encoding() {
        for value in [i64::MIN, i64::MAX] {
            let mut data = Vec::new();
            write_varint(value, &mut data);
            assert_eq!(data.len(), MAX_VARINT_LEN);
            assert_eq!(read_varint_from(&mut &data[..], 0).unwrap(), value);
        }
    }

    proptest! {
        #[test]
        fn prop_varint_round_trip(value in any::<i64>()) {
            let mut data = Vec::new();
            write_varint(value, &mut data);
            prop_assert_eq!(data.len(), varint_size(value));

            let mut reader = &data[..];
            prop_assert_eq!(read_varint_from(&mut reader, 0).unwrap(), value);
            prop_assert!(reader.is_empty());
        }
    }
}
