//! JSON Lines codec: one JSON object per line.

use crate::error::{CodecError, CodecResult};
use crate::reader::{ItemReader, ItemWriter, Record};
use crate::value::Value;
use std::io::{BufRead, Write};

/// Reads one JSON object per line. Blank lines are skipped.
pub struct JsonLinesReader<R: BufRead + Send> {
    input: Option<R>,
    line: String,
    record: u64,
}

impl<R: BufRead + Send> JsonLinesReader<R> {
    /// Creates a reader over `input`.
    pub fn new(input: R) -> Self {
        Self {
            input: Some(input),
            line: String::new(),
            record: 0,
        }
    }
}

impl<R: BufRead + Send> ItemReader for JsonLinesReader<R> {
    fn read(&mut self) -> CodecResult<Option<Record>> {
        let input = self.input.as_mut().ok_or(CodecError::Closed)?;
        loop {
            self.line.clear();
            if input.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            let trimmed = self.line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let index = self.record;
            self.record += 1;
            let json: serde_json::Value = serde_json::from_str(trimmed)
                .map_err(|e| CodecError::decoding_failed(index, e.to_string()))?;
            return match Value::from(json) {
                Value::Map(fields) => Ok(Some(fields)),
                other => Err(CodecError::not_a_record(index, other.type_name())),
            };
        }
    }

    fn close(&mut self) -> CodecResult<()> {
        self.input = None;
        Ok(())
    }
}

/// Writes one JSON object per line.
pub struct JsonLinesWriter<W: Write + Send> {
    output: Option<W>,
}

impl<W: Write + Send> JsonLinesWriter<W> {
    /// Creates a writer into `output`.
    pub fn new(output: W) -> Self {
        Self {
            output: Some(output),
        }
    }
}

impl<W: Write + Send> ItemWriter for JsonLinesWriter<W> {
    fn write(&mut self, record: &Record) -> CodecResult<()> {
        let output = self.output.as_mut().ok_or(CodecError::Closed)?;
        let object: serde_json::Map<String, serde_json::Value> = record
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
            .collect();
        serde_json::to_writer(&mut *output, &object)
            .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
        output.write_all(b"\n")?;
        Ok(())
    }

    fn finish(&mut self) -> CodecResult<()> {
        if let Some(mut output) = self.output.take() {
            output.flush()?;
        }
        Ok(())
    }
}
