//! Error types for the datalayer core.

use crate::cursor::ContinuationToken;
use datalayer_codec::CodecError;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type LayerResult<T> = Result<T, LayerError>;

/// Coarse classification surfaced to the host.
///
/// The host uses it to decide whether to retry, surface the failure to an
/// operator, or give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The caller supplied something invalid (configuration, since value, state).
    BadParameter,
    /// Something failed inside the layer or its backing source.
    Internal,
    /// The requested dataset does not exist.
    NotFound,
}

/// Errors that can occur in datalayer operations.
#[derive(Debug, Error)]
pub enum LayerError {
    /// Malformed or ambiguous mapping configuration.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// The backing source cannot be enumerated.
    #[error("source unavailable: {message}")]
    SourceUnavailable {
        /// Description of the problem.
        message: String,
    },

    /// One source unit failed to open or read.
    #[error("failed to read unit {unit}: {message}")]
    UnitRead {
        /// Name of the failing unit.
        unit: String,
        /// Description of the failure.
        message: String,
        /// Position of the last successfully consumed item, for resumption.
        last_token: Option<Box<ContinuationToken>>,
    },

    /// A single item could not be mapped.
    #[error("mapping failed: {message}")]
    Mapping {
        /// Description of the failure.
        message: String,
    },

    /// The since/from value cannot be parsed or is not supported by the dataset.
    #[error("invalid since value {value:?}: {message}")]
    InvalidSince {
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        message: String,
    },

    /// Full-sync lifecycle misuse.
    #[error("full sync: {message}")]
    FullSync {
        /// Description of the misuse.
        message: String,
    },

    /// A write was rejected by the dataset.
    #[error("write rejected: {message}")]
    WriteRejected {
        /// Reason for rejection.
        message: String,
    },

    /// Dataset not registered.
    #[error("dataset not found: {name}")]
    DatasetNotFound {
        /// Name of the dataset.
        name: String,
    },

    /// Item codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl LayerError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a source unavailable error.
    pub fn source_unavailable(message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            message: message.into(),
        }
    }

    /// Creates a unit read error.
    pub fn unit_read(
        unit: impl Into<String>,
        message: impl Into<String>,
        last_token: Option<ContinuationToken>,
    ) -> Self {
        Self::UnitRead {
            unit: unit.into(),
            message: message.into(),
            last_token: last_token.map(Box::new),
        }
    }

    /// Creates a mapping error.
    pub fn mapping(message: impl Into<String>) -> Self {
        Self::Mapping {
            message: message.into(),
        }
    }

    /// Creates an invalid since error.
    pub fn invalid_since(value: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSince {
            value: value.into(),
            message: message.into(),
        }
    }

    /// Creates a full sync error.
    pub fn full_sync(message: impl Into<String>) -> Self {
        Self::FullSync {
            message: message.into(),
        }
    }

    /// Creates a write rejected error.
    pub fn write_rejected(message: impl Into<String>) -> Self {
        Self::WriteRejected {
            message: message.into(),
        }
    }

    /// Creates a dataset not found error.
    pub fn dataset_not_found(name: impl Into<String>) -> Self {
        Self::DatasetNotFound { name: name.into() }
    }

    /// Returns the host-facing classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. }
            | Self::SourceUnavailable { .. }
            | Self::InvalidSince { .. }
            | Self::FullSync { .. }
            | Self::WriteRejected { .. } => ErrorKind::BadParameter,
            Self::DatasetNotFound { .. } => ErrorKind::NotFound,
            Self::UnitRead { .. } | Self::Mapping { .. } | Self::Codec(_) | Self::Io(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether iteration may skip the offending item and continue.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Mapping { .. })
    }

    /// The last good resumption token carried by a unit read error.
    #[must_use]
    pub fn last_token(&self) -> Option<&ContinuationToken> {
        match self {
            Self::UnitRead { last_token, .. } => last_token.as_deref(),
            _ => None,
        }
    }
}
