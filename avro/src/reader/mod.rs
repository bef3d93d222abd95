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

//! Reading object container files.

mod block;
mod source;

use crate::{AvroResult, codec::CodecRegistry, schema::Schema, types::Value};
use block::Block;
use bon::bon;
use std::{collections::HashMap, io::Read};

pub(crate) use block::{MAGIC, SYNC_SIZE};

/// Main interface for reading Avro object container files.
///
/// The header is read when the `Reader` is created. Objects are then
/// decoded lazily, one block at a time, while iterating:
///
/// ```no_run
/// # use avro_binary::Reader;
/// # use std::io::Cursor;
/// # let input = Cursor::new(Vec::<u8>::new());
/// for value in Reader::new(input).unwrap() {
///     match value {
///         Ok(v) => println!("{:?}", v),
///         Err(e) => println!("Error: {}", e),
///     };
/// }
/// ```
///
/// Iteration stops after the first error.
pub struct Reader<R> {
    block: Block<R>,
    errored: bool,
}

#[bon]
impl<R: Read> Reader<R> {
    /// Creates a `Reader` that understands every built-in codec.
    ///
    /// **NOTE** The avro header is going to be read automatically upon creation of the `Reader`.
    pub fn new(reader: R) -> AvroResult<Reader<R>> {
        Reader::builder(reader).build()
    }

    /// Creates a `Reader` with an optional registry of block codecs.
    ///
    /// **NOTE** The avro header is going to be read automatically upon creation of the `Reader`.
    #[builder(finish_fn = build)]
    pub fn builder(
        #[builder(start_fn)] reader: R,
        codecs: Option<CodecRegistry>,
    ) -> AvroResult<Reader<R>> {
        let block = Block::new(reader, &codecs.unwrap_or_default())?;
        Ok(Reader {
            block,
            errored: false,
        })
    }

    /// Get a reference to the writer `Schema`.
    #[inline]
    pub fn writer_schema(&self) -> &Schema {
        &self.block.writer_schema
    }

    /// Get a reference to the user metadata
    #[inline]
    pub fn user_metadata(&self) -> &HashMap<String, Vec<u8>> {
        &self.block.user_metadata
    }

    /// The `avro.codec` of the file, `null` when the header has none.
    pub fn codec(&self) -> &str {
        self.block.codec()
    }

    /// The sync marker that separates blocks.
    pub fn sync_marker(&self) -> &[u8; SYNC_SIZE] {
        self.block.marker()
    }
}

impl<R: Read> Iterator for Reader<R> {
    type Item = AvroResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        // to prevent keep on reading after the first error occurs
        if self.errored {
            return None;
        };
        match self.block.read_next() {
            Ok(opt) => opt.map(Ok),
            Err(e) => {
                self.errored = true;
                self.block.close();
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    const SCHEMA: &str = r#"
    {
      "type": "record",
      "name": "test",
      "fields": [
        {
          "name": "a",
          "type": "long",
          "default": 42
        },
        {
          "name": "b",
          "type": "string"
        }
      ]
    }
    "#;
    const ENCODED: &[u8] = &[
        79u8, 98u8, 106u8, 1u8, 4u8, 22u8, 97u8, 118u8, 114u8, 111u8, 46u8, 115u8, 99u8, 104u8,
        101u8, 109u8, 97u8, 222u8, 1u8, 123u8, 34u8, 116u8, 121u8, 112u8, 101u8, 34u8, 58u8, 34u8,
        114u8, 101u8, 99u8, 111u8, 114u8, 100u8, 34u8, 44u8, 34u8, 110u8, 97u8, 109u8, 101u8, 34u8,
        58u8, 34u8, 116u8, 101u8, 115u8, 116u8, 34u8, 44u8, 34u8, 102u8, 105u8, 101u8, 108u8,
        100u8, 115u8, 34u8, 58u8, 91u8, 123u8, 34u8, 110u8, 97u8, 109u8, 101u8, 34u8, 58u8, 34u8,
        97u8, 34u8, 44u8, 34u8, 116u8, 121u8, 112u8, 101u8, 34u8, 58u8, 34u8, 108u8, 111u8, 110u8,
        103u8, 34u8, 44u8, 34u8, 100u8, 101u8, 102u8, 97u8, 117u8, 108u8, 116u8, 34u8, 58u8, 52u8,
        50u8, 125u8, 44u8, 123u8, 34u8, 110u8, 97u8, 109u8, 101u8, 34u8, 58u8, 34u8, 98u8, 34u8,
        44u8, 34u8, 116u8, 121u8, 112u8, 101u8, 34u8, 58u8, 34u8, 115u8, 116u8, 114u8, 105u8,
        110u8, 103u8, 34u8, 125u8, 93u8, 125u8, 20u8, 97u8, 118u8, 114u8, 111u8, 46u8, 99u8, 111u8,
        100u8, 101u8, 99u8, 8u8, 110u8, 117u8, 108u8, 108u8, 0u8, 94u8, 61u8, 54u8, 221u8, 190u8,
        207u8, 108u8, 180u8, 158u8, 57u8, 114u8, 40u8, 173u8, 199u8, 228u8, 239u8, 4u8, 20u8, 54u8,
        6u8, 102u8, 111u8, 111u8, 84u8, 6u8, 98u8, 97u8, 114u8, 94u8, 61u8, 54u8, 221u8, 190u8,
        207u8, 108u8, 180u8, 158u8, 57u8, 114u8, 40u8, 173u8, 199u8, 228u8, 239u8,
    ];

    fn record(a: i64, b: &str) -> Value {
        Value::Record(vec![Value::Int(a), Value::String(b.to_string())])
    }

    #[test]
    fn test_reader_iterator() -> anyhow::Result<()> {
        let schema = Schema::parse_str(SCHEMA)?;
        let reader = Reader::new(ENCODED)?;
        assert_eq!(reader.writer_schema(), &schema);
        assert_eq!(reader.codec(), "null");

        let values = reader.collect::<AvroResult<Vec<_>>>()?;
        assert_eq!(values, vec![record(27, "foo"), record(42, "bar")]);
        Ok(())
    }

    #[test]
    fn test_reader_invalid_header() {
        let invalid = ENCODED.iter().copied().skip(1).collect::<Vec<u8>>();
        let err = Reader::new(&invalid[..]).err().map(|e| e.kind());
        assert_eq!(err, Some(ErrorKind::Format));
    }

    #[test]
    fn test_reader_invalid_block() -> anyhow::Result<()> {
        let invalid = ENCODED
            .iter()
            .copied()
            .rev()
            .skip(19)
            .collect::<Vec<u8>>()
            .into_iter()
            .rev()
            .collect::<Vec<u8>>();
        let reader = Reader::new(&invalid[..])?;
        let results: Vec<_> = reader.collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].as_ref().is_err_and(|e| e.is_truncation()));
        Ok(())
    }

    #[test]
    fn test_reader_empty_buffer() {
        let empty = Cursor::new(Vec::<u8>::new());
        let err = Reader::new(empty).err();
        assert!(err.is_some_and(|e| e.is_truncation()));
    }

    #[test]
    fn test_reader_only_header() -> anyhow::Result<()> {
        let invalid = ENCODED.iter().copied().take(163).collect::<Vec<u8>>();
        let mut reader = Reader::new(&invalid[..])?;
        assert!(reader.next().is_none());
        Ok(())
    }

    #[test]
    fn custom_codec_registry() -> anyhow::Result<()> {
        let mut codecs = CodecRegistry::empty();
        let err = Reader::builder(ENCODED).codecs(codecs.clone()).build().err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::UnsupportedCodec));

        codecs.register("null", crate::Codec::Null);
        let reader = Reader::builder(ENCODED).codecs(codecs.clone()).build()?;
        assert_eq!(reader.count(), 2);
        Ok(())
    }

    #[cfg(not(feature = "snappy"))]
    #[test]
    fn test_read_not_enabled_codec() {
        let snappy_compressed_avro = vec![
            79, 98, 106, 1, 4, 22, 97, 118, 114, 111, 46, 115, 99, 104, 101, 109, 97, 210, 1, 123,
            34, 102, 105, 101, 108, 100, 115, 34, 58, 91, 123, 34, 110, 97, 109, 101, 34, 58, 34,
            110, 117, 109, 34, 44, 34, 116, 121, 112, 101, 34, 58, 34, 115, 116, 114, 105, 110,
            103, 34, 125, 93, 44, 34, 110, 97, 109, 101, 34, 58, 34, 101, 118, 101, 110, 116, 34,
            44, 34, 110, 97, 109, 101, 115, 112, 97, 99, 101, 34, 58, 34, 101, 120, 97, 109, 112,
            108, 101, 110, 97, 109, 101, 115, 112, 97, 99, 101, 34, 44, 34, 116, 121, 112, 101, 34,
            58, 34, 114, 101, 99, 111, 114, 100, 34, 125, 20, 97, 118, 114, 111, 46, 99, 111, 100,
            101, 99, 12, 115, 110, 97, 112, 112, 121, 0, 213, 209, 241, 208, 200, 110, 164, 47,
            203, 25, 90, 235, 161, 167, 195, 177, 2, 20, 4, 12, 6, 49, 50, 51, 115, 38, 58, 0, 213,
            209, 241, 208, 200, 110, 164, 47, 203, 25, 90, 235, 161, 167, 195, 177,
        ];

        match Reader::new(snappy_compressed_avro.as_slice()) {
            Err(err) => assert_eq!("Unsupported codec: 'snappy'", err.to_string()),
            Ok(_) => panic!("Expected an error in the reading of the codec!"),
        }
    }
}
