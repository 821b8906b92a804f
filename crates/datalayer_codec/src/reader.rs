//! Item stream contracts and codec selection.

use crate::cbor::{CborSequenceReader, CborSequenceWriter};
use crate::error::{CodecError, CodecResult};
use crate::json::{JsonLinesReader, JsonLinesWriter};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{BufRead, Write};
use std::str::FromStr;

/// One flat, source-native record: field name to value, ordered by name.
pub type Record = BTreeMap<String, Value>;

/// A sequential reader of records from one byte stream.
///
/// Readers decode at most one record per call and never buffer decoded
/// records ahead of the caller.
pub trait ItemReader: Send {
    /// Reads the next record, or `None` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is corrupt, a record is not a map,
    /// or the reader has been closed.
    fn read(&mut self) -> CodecResult<Option<Record>>;

    /// Releases the underlying stream. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if releasing the stream fails.
    fn close(&mut self) -> CodecResult<()>;
}

/// A sequential writer of records to one byte stream.
pub trait ItemWriter: Send {
    /// Encodes and writes one record.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the underlying write fails, or the
    /// writer was already finished.
    fn write(&mut self, record: &Record) -> CodecResult<()>;

    /// Flushes and releases the underlying stream. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn finish(&mut self) -> CodecResult<()>;
}

/// Supported on-disk item formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// One JSON object per line.
    #[default]
    Json,
    /// Concatenated CBOR maps (RFC 8742 CBOR sequence).
    Cbor,
}

impl Format {
    /// Conventional file extension for this format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Format::Json => "jsonl",
            Format::Cbor => "cbor",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Json => write!(f, "json"),
            Format::Cbor => write!(f, "cbor"),
        }
    }
}

impl FromStr for Format {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" | "jsonl" | "ndjson" => Ok(Format::Json),
            "cbor" => Ok(Format::Cbor),
            _ => Err(CodecError::unsupported_format(s)),
        }
    }
}

/// Codec section of a dataset's source configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Item format of the byte streams.
    pub format: Format,
}

impl CodecConfig {
    /// Creates a configuration for the given format.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }
}

/// Creates a reader over `input` for the configured format.
pub fn new_item_reader(
    config: &CodecConfig,
    input: Box<dyn BufRead + Send>,
) -> Box<dyn ItemReader> {
    match config.format {
        Format::Json => Box::new(JsonLinesReader::new(input)),
        Format::Cbor => Box::new(CborSequenceReader::new(input)),
    }
}

/// Creates a writer into `output` for the configured format.
pub fn new_item_writer(
    config: &CodecConfig,
    output: Box<dyn Write + Send>,
) -> Box<dyn ItemWriter> {
    match config.format {
        Format::Json => Box::new(JsonLinesWriter::new(output)),
        Format::Cbor => Box::new(CborSequenceWriter::new(output)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    /// Write sink that keeps its bytes reachable after the writer is boxed.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn record(id: &str, n: i64) -> Record {
        let mut r = Record::new();
        r.insert("id".into(), Value::from(id));
        r.insert("n".into(), Value::from(n));
        r
    }

    #[test]
    fn format_parsing() {
        assert_eq!("json".parse::<Format>().unwrap(), Format::Json);
        assert_eq!("NDJSON".parse::<Format>().unwrap(), Format::Json);
        assert_eq!("cbor".parse::<Format>().unwrap(), Format::Cbor);
        assert!(matches!(
            "csv".parse::<Format>(),
            Err(CodecError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: CodecConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.format, Format::Json);
        let config: CodecConfig = serde_json::from_str(r#"{"format": "cbor"}"#).unwrap();
        assert_eq!(config.format, Format::Cbor);
    }

    #[test]
    fn writer_output_is_readable_for_each_format() {
        for format in [Format::Json, Format::Cbor] {
            let config = CodecConfig::new(format);
            let sink = SharedBuf::default();
            let mut writer = new_item_writer(&config, Box::new(sink.clone()));
            writer.write(&record("a", 1)).unwrap();
            writer.write(&record("b", 2)).unwrap();
            writer.finish().unwrap();

            let bytes = sink.0.lock().unwrap().clone();
            let mut reader = new_item_reader(&config, Box::new(Cursor::new(bytes)));
            assert_eq!(reader.read().unwrap(), Some(record("a", 1)), "{format}");
            assert_eq!(reader.read().unwrap(), Some(record("b", 2)), "{format}");
            assert_eq!(reader.read().unwrap(), None, "{format}");
            reader.close().unwrap();
        }
    }
}
