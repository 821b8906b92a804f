//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while reading or writing item streams.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode a record.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a record.
    #[error("decoding failed at record {record}: {message}")]
    DecodingFailed {
        /// Zero-based index of the record that failed.
        record: u64,
        /// Description of the decoding error.
        message: String,
    },

    /// The decoded value is not a flat record (a map with text keys).
    #[error("record {record} is not a map (found {found})")]
    NotARecord {
        /// Zero-based index of the offending record.
        record: u64,
        /// Type that was found instead.
        found: String,
    },

    /// The configured format name is unknown.
    #[error("unsupported item format: {name}")]
    UnsupportedFormat {
        /// The requested format name.
        name: String,
    },

    /// Underlying I/O failure.
    #[error("I/O error: {message}")]
    Io {
        /// Description of the I/O error.
        message: String,
    },

    /// The reader or writer was used after being closed.
    #[error("item stream is closed")]
    Closed,
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(record: u64, message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            record,
            message: message.into(),
        }
    }

    /// Create a not-a-record error.
    pub fn not_a_record(record: u64, found: impl Into<String>) -> Self {
        Self::NotARecord {
            record,
            found: found.into(),
        }
    }

    /// Create an unsupported format error.
    pub fn unsupported_format(name: impl Into<String>) -> Self {
        Self::UnsupportedFormat { name: name.into() }
    }
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}
