//! Error types for record extraction and index decoding

use thiserror::Error;

/// Errors produced while extracting records or decoding index entries
#[derive(Debug, Error)]
pub enum FormatError {
    /// The document is not valid JSON or does not have the expected shape
    #[error("malformed document: {0}")]
    Malformed(String),

    /// A located value has the wrong JSON type
    #[error("type mismatch at '{path}': expected string, found {found}")]
    TypeMismatch {
        /// Dotted path of the located value
        path: String,
        /// JSON type that was found instead
        found: &'static str,
    },

    /// Record name does not fit the one-byte length prefix
    #[error("record name is {0} bytes, at most 255 are allowed")]
    NameTooLong(usize),

    /// Variable-length integer is truncated or overflows 64 bits
    #[error("invalid varint at byte {0}")]
    VarInt(usize),

    /// Index entry is truncated or carries impossible values
    #[error("truncated or invalid index entry: {0}")]
    InvalidEntry(String),

    /// I/O error from the underlying reader
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FormatError {
    /// Classify a `serde_json` error: reader failures stay I/O errors, every
    /// other category means the input is not the document we expect.
    pub(crate) fn from_json(err: serde_json::Error) -> Self {
        if err.is_io() {
            Self::Io(err.into())
        } else {
            Self::Malformed(err.to_string())
        }
    }
}

/// Result type alias for format operations
pub type FormatResult<T> = Result<T, FormatError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_json_syntax_error_is_malformed() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(
            FormatError::from_json(err),
            FormatError::Malformed(_)
        ));
    }

    #[test]
    fn test_type_mismatch_message() {
        let err = FormatError::TypeMismatch {
            path: "meta.description".to_string(),
            found: "number",
        };
        assert_eq!(
            err.to_string(),
            "type mismatch at 'meta.description': expected string, found number"
        );
    }
}
