//! # DataLayer Codec
//!
//! Item stream codecs for the datalayer toolkit.
//!
//! A codec turns the raw bytes of one physical source unit (a file, a blob)
//! into a sequence of flat records and back. The toolkit core only relies on
//! the [`ItemReader`] / [`ItemWriter`] contracts; the concrete format is
//! picked from a [`CodecConfig`].
//!
//! ## Formats
//!
//! - [`Format::Json`]: JSON Lines, one object per line
//! - [`Format::Cbor`]: a CBOR sequence of maps with text keys
//!
//! ## Usage
//!
//! ```
//! use datalayer_codec::{new_item_reader, CodecConfig, Value};
//! use std::io::Cursor;
//!
//! let input = Cursor::new(b"{\"id\": \"a1\", \"qty\": 3}\n".to_vec());
//! let mut reader = new_item_reader(&CodecConfig::default(), Box::new(input));
//!
//! let record = reader.read().unwrap().unwrap();
//! assert_eq!(record.get("qty"), Some(&Value::Integer(3)));
//! assert!(reader.read().unwrap().is_none());
//! reader.close().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod error;
mod json;
mod reader;
mod value;

pub use cbor::{from_cbor_value, to_cbor_value, CborSequenceReader, CborSequenceWriter};
pub use error::{CodecError, CodecResult};
pub use json::{JsonLinesReader, JsonLinesWriter};
pub use reader::{
    new_item_reader, new_item_writer, CodecConfig, Format, ItemReader, ItemWriter, Record,
};
pub use value::Value;
