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

//! Writing object container files.
use crate::{
    AvroResult, Codec, Error,
    encode::encode_into,
    error::Details,
    reader::{MAGIC, SYNC_SIZE},
    schema::Schema,
    types::Value,
    util::zig_i64,
};
use log::debug;
use std::{collections::HashMap, io::Write, mem::ManuallyDrop};

const DEFAULT_BLOCK_SIZE: usize = 16000;

/// Main interface for writing Avro object container files.
///
/// It is critical to call flush before `Writer<W>` is dropped. Though dropping will attempt to flush
/// the contents of the buffer, any errors that happen in the process of dropping will be ignored.
/// Calling flush ensures that the buffer is empty and thus dropping will not even attempt file operations.
pub struct Writer<'a, W: Write> {
    schema: &'a Schema,
    writer: W,
    codec: Codec,
    block_size: usize,
    buffer: Vec<u8>,
    num_values: usize,
    marker: [u8; SYNC_SIZE],
    has_header: bool,
    user_metadata: HashMap<String, Vec<u8>>,
}

#[bon::bon]
impl<'a, W: Write> Writer<'a, W> {
    #[builder]
    pub fn builder(
        schema: &'a Schema,
        writer: W,
        #[builder(default = Codec::Null)] codec: Codec,
        /// Uncompressed bytes buffered before a block is written.
        #[builder(default = DEFAULT_BLOCK_SIZE)]
        block_size: usize,
        #[builder(default = generate_sync_marker())] marker: [u8; SYNC_SIZE],
        #[builder(default)] user_metadata: HashMap<String, Vec<u8>>,
    ) -> AvroResult<Self> {
        if let Some(key) = user_metadata.keys().find(|k| k.starts_with("avro.")) {
            return Err(Details::InvalidMetadataKey(key.clone()).into());
        }
        Ok(Self {
            schema,
            writer,
            codec,
            block_size,
            buffer: Vec::with_capacity(block_size),
            num_values: 0,
            marker,
            has_header: false,
            user_metadata,
        })
    }
}

impl<'a, W: Write> Writer<'a, W> {
    /// Creates a `Writer` given a `Schema` and something implementing the `io::Write` trait to write
    /// to.
    /// No compression `Codec` will be used.
    pub fn new(schema: &'a Schema, writer: W) -> AvroResult<Self> {
        Writer::with_codec(schema, writer, Codec::Null)
    }

    /// Creates a `Writer` with a specific `Codec` given a `Schema` and something implementing the
    /// `io::Write` trait to write to.
    pub fn with_codec(schema: &'a Schema, writer: W, codec: Codec) -> AvroResult<Self> {
        Self::builder()
            .schema(schema)
            .writer(writer)
            .codec(codec)
            .build()
    }

    /// Get a reference to the `Schema` associated to a `Writer`.
    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    /// Append a value to the `Writer`. The value is checked against the
    /// schema while it is encoded; a value that does not conform leaves the
    /// pending block untouched.
    ///
    /// Returns the number of bytes written (it might be 0, see below).
    ///
    /// **NOTE**: This function is not guaranteed to perform any actual write, since it relies on
    /// internal buffering for performance reasons. If you want to be sure the value has been
    /// written, then call [`flush`](Writer::flush).
    pub fn append<T: Into<Value>>(&mut self, value: T) -> AvroResult<usize> {
        let value = value.into();
        self.append_value_ref(&value)
    }

    /// Append a value by reference. See [`append`](Writer::append).
    pub fn append_value_ref(&mut self, value: &Value) -> AvroResult<usize> {
        let n = self.maybe_write_header()?;
        encode_into(self.schema, value, &mut self.buffer)?;
        self.num_values += 1;

        if self.buffer.len() >= self.block_size {
            return self.flush().map(|b| b + n);
        }

        Ok(n)
    }

    /// Extend a `Writer` with an `Iterator` of values.
    ///
    /// Returns the number of bytes written.
    ///
    /// **NOTE**: This function forces the written data to be flushed (an implicit
    /// call to [`flush`](Writer::flush) is performed).
    pub fn extend<I, T: Into<Value>>(&mut self, values: I) -> AvroResult<usize>
    where
        I: IntoIterator<Item = T>,
    {
        let mut num_bytes = 0;
        for value in values {
            num_bytes += self.append(value)?;
        }
        num_bytes += self.flush()?;

        Ok(num_bytes)
    }

    /// Extend a `Writer` by appending each `Value` from a slice.
    ///
    /// **NOTE**: This function forces the written data to be flushed (an implicit
    /// call to [`flush`](Writer::flush) is performed).
    pub fn extend_from_slice(&mut self, values: &[Value]) -> AvroResult<usize> {
        let mut num_bytes = 0;
        for value in values {
            num_bytes += self.append_value_ref(value)?;
        }
        num_bytes += self.flush()?;

        Ok(num_bytes)
    }

    /// Flush the content to the inner `Writer`.
    ///
    /// Call this function to make sure all the content has been written before releasing the `Writer`.
    /// This will also write the header if it wasn't written yet.
    ///
    /// Returns the number of bytes written.
    pub fn flush(&mut self) -> AvroResult<usize> {
        let mut num_bytes = self.maybe_write_header()?;
        if self.num_values == 0 {
            return Ok(num_bytes);
        }

        self.codec.compress(&mut self.buffer)?;

        let mut block_header = Vec::with_capacity(20);
        zig_i64(self.num_values as i64, &mut block_header);
        zig_i64(self.buffer.len() as i64, &mut block_header);
        debug!(
            "Writing block of {} values, {} bytes",
            self.num_values,
            self.buffer.len()
        );

        for part in [&block_header[..], &self.buffer[..], &self.marker[..]] {
            self.writer.write_all(part).map_err(Details::WriteBytes)?;
            num_bytes += part.len();
        }

        self.buffer.clear();
        self.num_values = 0;

        self.writer.flush().map_err(Details::FlushWriter)?;

        Ok(num_bytes)
    }

    /// Return what the `Writer` is writing to, consuming the `Writer` itself.
    ///
    /// **NOTE**: This function forces the written data to be flushed (an implicit
    /// call to [`flush`](Writer::flush) is performed).
    pub fn into_inner(mut self) -> AvroResult<W> {
        self.flush()?;

        let mut this = ManuallyDrop::new(self);

        // Extract every member that is not Copy and therefore should be dropped
        let _buffer = std::mem::take(&mut this.buffer);
        let _user_metadata = std::mem::take(&mut this.user_metadata);

        // SAFETY: double-drops are prevented by putting `this` in a ManuallyDrop that is never dropped
        let writer = unsafe { std::ptr::read(&this.writer) };

        Ok(writer)
    }

    /// Gets a reference to the underlying writer.
    ///
    /// **NOTE**: There is likely data still in the buffer. To have all the data
    /// in the writer call [`flush`](Writer::flush) first.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Append pure bytes to the payload.
    fn append_bytes(&mut self, bytes: &[u8]) -> AvroResult<usize> {
        self.writer
            .write_all(bytes)
            .map_err(Details::WriteBytes)?;
        Ok(bytes.len())
    }

    /// Adds custom metadata to the file.
    /// This method could be used only before adding the first record to the writer.
    pub fn add_user_metadata<T: AsRef<[u8]>>(&mut self, key: String, value: T) -> AvroResult<()> {
        if !self.has_header {
            if key.starts_with("avro.") {
                return Err(Details::InvalidMetadataKey(key).into());
            }
            self.user_metadata.insert(key, value.as_ref().to_vec());
            Ok(())
        } else {
            Err(Details::FileHeaderAlreadyWritten.into())
        }
    }

    /// Create an Avro header based on schema, codec and sync marker.
    fn header(&self) -> Result<Vec<u8>, Error> {
        let schema_bytes = self.schema.to_json_string()?.into_bytes();

        let mut metadata = vec![("avro.schema".to_string(), Value::Bytes(schema_bytes))];
        if self.codec != Codec::Null {
            metadata.push(("avro.codec".to_string(), self.codec.into()));
        }
        let compression_level = match self.codec {
            #[cfg(feature = "bzip")]
            Codec::Bzip2(settings) => Some(settings.compression_level),
            #[cfg(feature = "xz")]
            Codec::Xz(settings) => Some(settings.compression_level),
            #[cfg(feature = "zstandard")]
            Codec::Zstandard(settings) => Some(settings.compression_level),
            _ => None,
        };
        if let Some(level) = compression_level {
            metadata.push((
                "avro.codec.compression_level".to_string(),
                Value::Bytes(vec![level]),
            ));
        }

        let mut user_metadata: Vec<_> = self.user_metadata.iter().collect();
        user_metadata.sort();
        for (k, v) in user_metadata {
            metadata.push((k.clone(), Value::Bytes(v.clone())));
        }

        let mut header = Vec::new();
        header.extend_from_slice(&MAGIC);
        encode_into(Schema::metadata(), &Value::Map(metadata), &mut header)?;
        header.extend_from_slice(&self.marker);

        Ok(header)
    }

    fn maybe_write_header(&mut self) -> AvroResult<usize> {
        if !self.has_header {
            let header = self.header()?;
            let n = self.append_bytes(header.as_ref())?;
            self.has_header = true;
            Ok(n)
        } else {
            Ok(0)
        }
    }
}

impl<W: Write> Drop for Writer<'_, W> {
    /// Drop the writer, will try to flush ignoring any errors.
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn generate_sync_marker() -> [u8; SYNC_SIZE] {
    rand::random()
}

#[cfg(target_arch = "wasm32")]
fn generate_sync_marker() -> [u8; SYNC_SIZE] {
    let mut marker = [0_u8; SYNC_SIZE];
    std::iter::repeat_with(quad_rand::rand)
        .take(4)
        .flat_map(|i| i.to_be_bytes())
        .enumerate()
        .for_each(|(i, n)| marker[i] = n);
    marker
}
