//! Since values and continuation tokens.
//!
//! A `since` argument is one of:
//!
//! - empty: iterate from the beginning
//! - an RFC 3339 timestamp (`2006-01-02T15:04:05Z07:00`) or a plain integer:
//!   a change *marker*; only changes strictly after it are returned
//! - a token previously issued by an iterator (`dl1-` prefix)
//!
//! Markers are `i64`: timestamps are nanoseconds since the Unix epoch,
//! integers are taken as-is (update counters, generations).
//!
//! A token records the exact iteration position: which unit was active, its
//! marker, and how many raw items of it were consumed. Replaying a token
//! reproduces the remaining sequence of the iteration it was taken from.

use crate::error::{LayerError, LayerResult};
use chrono::{DateTime, Utc};
use datalayer_codec::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

const TOKEN_PREFIX: &str = "dl1-";

/// Where an iteration stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    /// Nothing consumed; all units are pending.
    Start,
    /// Nothing consumed; only units with a marker after this one are pending.
    AfterMarker(i64),
    /// `offset` raw items of `unit` (with `marker`) have been consumed.
    InUnit {
        /// Marker of the unit when it was read.
        marker: i64,
        /// Unit name.
        unit: String,
        /// Raw items consumed from the unit.
        offset: u64,
    },
}

/// Opaque resumption marker handed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationToken {
    /// Iteration position.
    pub position: Position,
    /// Item-level change threshold in effect, for property-based change detection.
    pub item_since: Option<i64>,
}

impl ContinuationToken {
    /// Token for an iteration that starts at the very beginning.
    #[must_use]
    pub const fn start() -> Self {
        Self {
            position: Position::Start,
            item_since: None,
        }
    }

    /// Token for an iteration positioned inside `unit`.
    #[must_use]
    pub fn in_unit(marker: i64, unit: impl Into<String>, offset: u64) -> Self {
        Self {
            position: Position::InUnit {
                marker,
                unit: unit.into(),
                offset,
            },
            item_since: None,
        }
    }

    /// Encodes the token as an opaque string.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut bytes = Vec::new();
        if let Err(e) = ciborium::ser::into_writer(self, &mut bytes) {
            warn!(error = %e, "failed to serialize continuation token");
            bytes.clear();
        }
        let mut out = String::with_capacity(TOKEN_PREFIX.len() + bytes.len() * 2);
        out.push_str(TOKEN_PREFIX);
        for b in bytes {
            out.push_str(&format!("{b:02x}"));
        }
        out
    }

    /// Decodes a string produced by [`ContinuationToken::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::InvalidSince`] if the string is not a token.
    pub fn decode(raw: &str) -> LayerResult<Self> {
        let hex = raw
            .strip_prefix(TOKEN_PREFIX)
            .ok_or_else(|| LayerError::invalid_since(raw, "missing token prefix"))?;
        if hex.len() % 2 != 0 || !hex.is_ascii() {
            return Err(LayerError::invalid_since(raw, "malformed token"));
        }
        let bytes = (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
            .collect::<Result<Vec<u8>, _>>()
            .map_err(|_| LayerError::invalid_since(raw, "malformed token"))?;
        ciborium::de::from_reader(bytes.as_slice())
            .map_err(|e| LayerError::invalid_since(raw, format!("undecodable token: {e}")))
    }
}

impl fmt::Display for ContinuationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for ContinuationToken {
    type Err = LayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

/// A parsed `since` / `from` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Since {
    /// No lower bound.
    Beginning,
    /// Changes strictly after this marker.
    Marker(i64),
    /// Resume at a token's position.
    Token(ContinuationToken),
}

impl Since {
    /// Parses a raw since value.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::InvalidSince`] for values that are neither
    /// empty, a token, an integer, nor an RFC 3339 timestamp.
    pub fn parse(raw: &str) -> LayerResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Since::Beginning);
        }
        if raw.starts_with(TOKEN_PREFIX) {
            return ContinuationToken::decode(raw).map(Since::Token);
        }
        if let Ok(n) = raw.parse::<i64>() {
            return Ok(Since::Marker(n));
        }
        parse_timestamp(raw).map(Since::Marker).ok_or_else(|| {
            LayerError::invalid_since(raw, "expected a token, an integer or an RFC 3339 timestamp")
        })
    }
}

/// Parses an RFC 3339 timestamp into a nanosecond marker.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .and_then(|t| t.with_timezone(&Utc).timestamp_nanos_opt())
}

/// Converts a UTC time into a nanosecond marker, saturating outside the i64 range.
#[must_use]
pub fn marker_from_time(time: DateTime<Utc>) -> i64 {
    time.timestamp_nanos_opt().unwrap_or(if time.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    })
}

/// Interprets a field value as a change marker.
///
/// Integers are used as-is, text must be an RFC 3339 timestamp.
#[must_use]
pub fn marker_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(n) => Some(*n),
        Value::Text(s) => parse_timestamp(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn token_encoding_is_reversible() {
        let tokens = [
            ContinuationToken::start(),
            ContinuationToken {
                position: Position::AfterMarker(-5),
                item_since: Some(12),
            },
            ContinuationToken::in_unit(1_700_000_000_000_000_000, "part:01.jsonl", 42),
        ];
        for token in tokens {
            let encoded = token.encode();
            assert!(encoded.starts_with("dl1-"));
            assert_eq!(encoded.parse::<ContinuationToken>().unwrap(), token);
        }
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        for raw in ["dl1-", "dl1-abc", "dl1-zz", "dl1-00ff", "xyz"] {
            let err = ContinuationToken::decode(raw).unwrap_err();
            assert!(matches!(err, LayerError::InvalidSince { .. }), "{raw}");
        }
    }

    #[test]
    fn since_parsing() {
        assert_eq!(Since::parse("").unwrap(), Since::Beginning);
        assert_eq!(Since::parse("  ").unwrap(), Since::Beginning);
        assert_eq!(Since::parse("17").unwrap(), Since::Marker(17));

        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(
            Since::parse("2024-03-01T12:00:00Z").unwrap(),
            Since::Marker(marker_from_time(ts))
        );
        assert_eq!(
            Since::parse("2024-03-01T13:00:00+01:00").unwrap(),
            Since::Marker(marker_from_time(ts))
        );

        let token = ContinuationToken::in_unit(3, "a", 1);
        assert_eq!(Since::parse(&token.encode()).unwrap(), Since::Token(token));

        assert!(matches!(
            Since::parse("yesterday"),
            Err(LayerError::InvalidSince { .. })
        ));
    }

    #[test]
    fn markers_from_values() {
        assert_eq!(marker_from_value(&Value::Integer(9)), Some(9));
        assert_eq!(
            marker_from_value(&Value::from("1970-01-01T00:00:01Z")),
            Some(1_000_000_000)
        );
        assert_eq!(marker_from_value(&Value::from("soon")), None);
        assert_eq!(marker_from_value(&Value::Bool(true)), None);
    }
}
