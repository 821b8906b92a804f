//! CBOR sequence codec: concatenated CBOR maps with text keys.

use crate::error::{CodecError, CodecResult};
use crate::reader::{ItemReader, ItemWriter, Record};
use crate::value::Value;
use ciborium::value::{Integer, Value as CborValue};
use std::io::{BufRead, Write};

/// Converts a decoded CBOR value into a [`Value`].
///
/// Tags are unwrapped, map keys must be text.
pub fn from_cbor_value(value: CborValue) -> Result<Value, String> {
    Ok(match value {
        CborValue::Null => Value::Null,
        CborValue::Bool(b) => Value::Bool(b),
        CborValue::Integer(n) => {
            Value::Integer(i64::try_from(n).map_err(|_| "integer out of i64 range".to_string())?)
        }
        CborValue::Float(f) => Value::Float(f),
        CborValue::Text(s) => Value::Text(s),
        CborValue::Bytes(b) => Value::Bytes(b),
        CborValue::Array(items) => Value::Array(
            items
                .into_iter()
                .map(from_cbor_value)
                .collect::<Result<_, _>>()?,
        ),
        CborValue::Map(pairs) => {
            let mut map = Record::new();
            for (k, v) in pairs {
                let CborValue::Text(key) = k else {
                    return Err("map key is not text".to_string());
                };
                map.insert(key, from_cbor_value(v)?);
            }
            Value::Map(map)
        }
        CborValue::Tag(_, inner) => from_cbor_value(*inner)?,
        _ => return Err("unsupported CBOR value".to_string()),
    })
}

/// Converts a [`Value`] into a CBOR value ready for encoding.
pub fn to_cbor_value(value: &Value) -> CborValue {
    match value {
        Value::Null => CborValue::Null,
        Value::Bool(b) => CborValue::Bool(*b),
        Value::Integer(n) => CborValue::Integer(Integer::from(*n)),
        Value::Float(f) => CborValue::Float(*f),
        Value::Text(s) => CborValue::Text(s.clone()),
        Value::Bytes(b) => CborValue::Bytes(b.clone()),
        Value::Array(items) => CborValue::Array(items.iter().map(to_cbor_value).collect()),
        Value::Map(map) => CborValue::Map(
            map.iter()
                .map(|(k, v)| (CborValue::Text(k.clone()), to_cbor_value(v)))
                .collect(),
        ),
    }
}

/// Reads a sequence of CBOR maps.
pub struct CborSequenceReader<R: BufRead + Send> {
    input: Option<R>,
    record: u64,
}

impl<R: BufRead + Send> CborSequenceReader<R> {
    /// Creates a reader over `input`.
    pub fn new(input: R) -> Self {
        Self {
            input: Some(input),
            record: 0,
        }
    }
}

impl<R: BufRead + Send> ItemReader for CborSequenceReader<R> {
    fn read(&mut self) -> CodecResult<Option<Record>> {
        let input = self.input.as_mut().ok_or(CodecError::Closed)?;
        // A clean end of stream sits exactly on a record boundary.
        if input.fill_buf()?.is_empty() {
            return Ok(None);
        }

        let index = self.record;
        self.record += 1;
        let raw: CborValue = ciborium::de::from_reader(&mut *input)
            .map_err(|e| CodecError::decoding_failed(index, e.to_string()))?;
        match from_cbor_value(raw).map_err(|m| CodecError::decoding_failed(index, m))? {
            Value::Map(fields) => Ok(Some(fields)),
            other => Err(CodecError::not_a_record(index, other.type_name())),
        }
    }

    fn close(&mut self) -> CodecResult<()> {
        self.input = None;
        Ok(())
    }
}

/// Writes a sequence of CBOR maps.
pub struct CborSequenceWriter<W: Write + Send> {
    output: Option<W>,
}

impl<W: Write + Send> CborSequenceWriter<W> {
    /// Creates a writer into `output`.
    pub fn new(output: W) -> Self {
        Self {
            output: Some(output),
        }
    }
}

impl<W: Write + Send> ItemWriter for CborSequenceWriter<W> {
    fn write(&mut self, record: &Record) -> CodecResult<()> {
        let output = self.output.as_mut().ok_or(CodecError::Closed)?;
        let map = to_cbor_value(&Value::Map(record.clone()));
        ciborium::ser::into_writer(&map, &mut *output)
            .map_err(|e| CodecError::encoding_failed(e.to_string()))
    }

    fn finish(&mut self) -> CodecResult<()> {
        if let Some(mut output) = self.output.take() {
            output.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode(values: &[CborValue]) -> Vec<u8> {
        let mut buf = Vec::new();
        for v in values {
            ciborium::ser::into_writer(v, &mut buf).unwrap();
        }
        buf
    }

    fn text_map(pairs: &[(&str, CborValue)]) -> CborValue {
        CborValue::Map(
            pairs
                .iter()
                .map(|(k, v)| (CborValue::Text((*k).to_string()), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn reads_sequence_of_maps() {
        let bytes = encode(&[
            text_map(&[("id", CborValue::Text("a".into()))]),
            text_map(&[("id", CborValue::Text("b".into())), ("f", CborValue::Float(0.5))]),
        ]);
        let mut reader = CborSequenceReader::new(Cursor::new(bytes));

        assert_eq!(reader.read().unwrap().unwrap()["id"], Value::from("a"));
        let second = reader.read().unwrap().unwrap();
        assert_eq!(second["f"], Value::Float(0.5));
        assert!(reader.read().unwrap().is_none());
    }

    #[test]
    fn tags_are_unwrapped() {
        let tagged = CborValue::Tag(1, Box::new(CborValue::Integer(Integer::from(5))));
        assert_eq!(from_cbor_value(tagged).unwrap(), Value::Integer(5));
    }

    #[test]
    fn non_text_keys_are_rejected() {
        let bytes = encode(&[CborValue::Map(vec![(
            CborValue::Integer(Integer::from(1)),
            CborValue::Null,
        )])]);
        let mut reader = CborSequenceReader::new(Cursor::new(bytes));
        assert!(matches!(
            reader.read(),
            Err(CodecError::DecodingFailed { record: 0, .. })
        ));
    }

    #[test]
    fn truncated_record_is_an_error() {
        let mut bytes = encode(&[text_map(&[("name", CborValue::Text("abcdef".into()))])]);
        bytes.truncate(bytes.len() - 2);
        let mut reader = CborSequenceReader::new(Cursor::new(bytes));
        assert!(reader.read().is_err());
    }

    #[test]
    fn scalar_record_is_rejected() {
        let bytes = encode(&[CborValue::Bool(true)]);
        let mut reader = CborSequenceReader::new(Cursor::new(bytes));
        assert_eq!(reader.read().unwrap_err(), CodecError::not_a_record(0, "bool"));
    }

    #[test]
    fn value_conversion_preserves_nesting() {
        let mut inner = Record::new();
        inner.insert("x".into(), Value::Array(vec![Value::Integer(-3), Value::Null]));
        let value = Value::Map(inner);
        assert_eq!(from_cbor_value(to_cbor_value(&value)).unwrap(), value);
    }
}
