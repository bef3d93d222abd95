// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! # avro-binary
//!
//! A schema-driven implementation of the [Apache Avro](https://avro.apache.org/) binary
//! encoding. A JSON schema is parsed once into an immutable [`Schema`]; values of the generic
//! [`types::Value`] model are then encoded to and decoded from raw datums, or streamed out of
//! Object Container Files with [`Reader`] and into them with [`Writer`].
//!
//! All `int` and `long` data is zig-zag encoded as base-128 varints. Decoding every varint goes
//! through a bit-packing fast path (see [`bitpack`]) that picks a BMI2 or a portable backend once
//! per process.
//!
//! # Parsing a schema
//!
//! ```
//! use avro_binary::Schema;
//!
//! let raw_schema = r#"
//!     {
//!         "type": "record",
//!         "name": "test",
//!         "fields": [
//!             {"name": "a", "type": "long", "default": 42},
//!             {"name": "b", "type": "string"}
//!         ]
//!     }
//! "#;
//!
//! let schema = Schema::parse_str(raw_schema).unwrap();
//! println!("{}", schema.to_json_string().unwrap());
//! assert_eq!(
//!     schema.canonical_form().unwrap(),
//!     r#"{"name":"test","type":"record","fields":[{"name":"a","type":"long"},{"name":"b","type":"string"}]}"#
//! );
//! ```
//!
//! Named types can refer to themselves, so linked structures are fine:
//!
//! ```
//! # use avro_binary::Schema;
//! let schema = Schema::parse_str(r#"
//!     {"type": "record", "name": "Node", "fields": [
//!         {"name": "value", "type": "int"},
//!         {"name": "next", "type": ["null", "Node"]}
//!     ]}
//! "#).unwrap();
//! assert!(schema.lookup("Node").is_some());
//! ```
//!
//! # Encoding and decoding datums
//!
//! ```
//! use avro_binary::{Schema, from_avro_datum, to_avro_datum, types::Record};
//!
//! let schema = Schema::parse_str(r#"
//!     {"type": "record", "name": "test", "fields": [
//!         {"name": "a", "type": "long", "default": 42},
//!         {"name": "b", "type": "string"}
//!     ]}
//! "#).unwrap();
//!
//! let mut record = Record::new(&schema).unwrap();
//! record.put("b", "foo");
//! let value = record.into_value().unwrap();
//!
//! let bytes = to_avro_datum(&schema, value.clone()).unwrap();
//! assert_eq!(bytes, [0x54, 0x06, b'f', b'o', b'o']);
//! assert_eq!(from_avro_datum(&schema, &bytes).unwrap(), value);
//! ```
//!
//! Failures carry an [`ErrorKind`], the schema path of the offending value and, when decoding,
//! the byte offset at which the problem was found:
//!
//! ```
//! # use avro_binary::{ErrorKind, Schema, from_avro_datum};
//! let schema = Schema::parse_str(r#"{"type": "array", "items": "string"}"#).unwrap();
//! let err = from_avro_datum(&schema, &[0x02, 0x0a, b'a']).unwrap_err();
//! assert_eq!(err.kind(), ErrorKind::Decode);
//! assert!(err.is_truncation());
//! assert_eq!(err.path().unwrap().to_string(), "$[0]");
//! ```
//!
//! # Object container files
//!
//! ```
//! use avro_binary::{Codec, DeflateSettings, Reader, Schema, Writer, types::Value};
//!
//! let schema = Schema::parse_str(r#"["null", "long"]"#).unwrap();
//! let mut writer = Writer::with_codec(&schema, Vec::new(), Codec::Deflate(DeflateSettings::default())).unwrap();
//! writer.append(Value::Null).unwrap();
//! writer.append(7i64).unwrap();
//! let encoded = writer.into_inner().unwrap();
//!
//! let reader = Reader::new(&encoded[..]).unwrap();
//! assert_eq!(reader.codec(), "deflate");
//! for value in reader {
//!     println!("{:?}", value.unwrap());
//! }
//! ```
//!
//! Codecs other than the built-in ones can be plugged into a [`CodecRegistry`] and handed to
//! [`Reader::builder`].

mod codec;
mod decode;
mod encode;
mod reader;
mod writer;

pub mod bitpack;
pub mod error;
pub mod schema;
pub mod types;
pub mod util;
pub mod validator;

#[cfg(feature = "bzip")]
pub use codec::bzip::Bzip2Settings;
#[cfg(feature = "xz")]
pub use codec::xz::XzSettings;
#[cfg(feature = "zstandard")]
pub use codec::zstandard::ZstandardSettings;
pub use codec::{Codec, CodecRegistry, Decompressor, DeflateSettings};
pub use decode::{decode_at, from_avro_datum};
pub use encode::{encode, to_avro_datum};
pub use error::{Error, ErrorKind};
pub use reader::Reader;
pub use schema::Schema;
pub use writer::Writer;

/// A convenience type alias for `Result`s with `Error`s.
pub type AvroResult<T> = Result<T, Error>;
