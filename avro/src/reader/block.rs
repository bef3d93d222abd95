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

use super::source::Source;
use crate::{
    AvroResult, Error,
    codec::{CodecRegistry, Decompressor},
    decode::decode_at,
    error::{ContainerStage, DecodeError, Details},
    schema::Schema,
    types::Value,
    util::{safe_len, zag_i64},
};
use log::{debug, warn};
use std::{collections::HashMap, io::Read, sync::Arc};

pub(crate) const MAGIC: [u8; 4] = [b'O', b'b', b'j', 1u8];
pub(crate) const SYNC_SIZE: usize = 16;

const SCHEMA_KEY: &str = "avro.schema";
const CODEC_KEY: &str = "avro.codec";

/// Where the block reader stands in the container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum State {
    /// Header read, no block yet.
    HeaderParsed,
    /// Objects of the current block remain.
    BlockReady,
    /// Every object of the current block was returned.
    BlockExhausted,
    /// Clean end of input or a fatal error.
    Closed,
}

/// Internal Block reader.
pub(super) struct Block<R> {
    source: Source<R>,
    state: State,
    marker: [u8; SYNC_SIZE],
    codec: String,
    decompressor: Arc<dyn Decompressor>,
    pub(super) writer_schema: Schema,
    pub(super) user_metadata: HashMap<String, Vec<u8>>,
    /// Decompressed payload of the current block.
    data: Vec<u8>,
    data_pos: usize,
    /// Objects left in the current block.
    remaining: usize,
    blocks_read: usize,
}

fn offset_as_usize(offset: u64) -> usize {
    usize::try_from(offset).unwrap_or(usize::MAX)
}

impl<R: Read> Block<R> {
    pub(super) fn new(reader: R, codecs: &CodecRegistry) -> AvroResult<Block<R>> {
        let mut source = Source::new(reader);

        if !source.fill(MAGIC.len())? {
            return Err(truncated(ContainerStage::Header, source.end_offset()));
        }
        if source.available()[..MAGIC.len()] != MAGIC {
            return Err(Details::HeaderMagic.into());
        }
        source.consume(MAGIC.len());

        let metadata = read_metadata(&mut source)?;
        let mut writer_schema = None;
        let mut codec = String::from("null");
        let mut user_metadata = HashMap::new();
        for (key, value) in metadata {
            let Value::Bytes(value) = value else {
                continue;
            };
            match key.as_str() {
                SCHEMA_KEY => {
                    let json: serde_json::Value =
                        serde_json::from_slice(&value).map_err(Details::ParseSchemaJson)?;
                    writer_schema = Some(Schema::parse(&json)?);
                }
                CODEC_KEY => {
                    codec = String::from_utf8(value)
                        .map_err(|_| Details::MetadataUtf8(CODEC_KEY.to_string()))?;
                }
                "avro.codec.compression_level" => {}
                other if other.starts_with("avro.") => {
                    warn!("Ignoring unknown metadata key: {other}");
                }
                _ => {
                    user_metadata.insert(key, value);
                }
            }
        }
        let writer_schema = writer_schema.ok_or(Details::GetAvroSchemaFromMap)?;
        let decompressor = codecs.get(&codec)?;

        if !source.fill(SYNC_SIZE)? {
            return Err(truncated(ContainerStage::Header, source.end_offset()));
        }
        let mut marker = [0u8; SYNC_SIZE];
        marker.copy_from_slice(&source.available()[..SYNC_SIZE]);
        source.consume(SYNC_SIZE);
        debug!(
            "Read container header: codec '{codec}', {} bytes",
            source.offset()
        );

        Ok(Block {
            source,
            state: State::HeaderParsed,
            marker,
            codec,
            decompressor,
            writer_schema,
            user_metadata,
            data: Vec::new(),
            data_pos: 0,
            remaining: 0,
            blocks_read: 0,
        })
    }

    pub(super) fn codec(&self) -> &str {
        &self.codec
    }

    pub(super) fn marker(&self) -> &[u8; SYNC_SIZE] {
        &self.marker
    }

    /// Stop reading after a failure.
    pub(super) fn close(&mut self) {
        self.state = State::Closed;
    }

    fn read_long(&mut self, stage: ContainerStage) -> AvroResult<i64> {
        loop {
            match zag_i64(self.source.available(), 0) {
                Ok((n, len)) => {
                    self.source.consume(len);
                    return Ok(n);
                }
                Err(DecodeError::TruncatedInput { .. }) => {
                    if self.source.fill_more()? == 0 {
                        return Err(truncated(stage, self.source.end_offset()));
                    }
                }
                Err(reason) => {
                    return Err(Error::decode(offset_as_usize(self.source.offset()), reason));
                }
            }
        }
    }

    /// Read the next block. Returns `false` at a clean end of input.
    fn read_block(&mut self) -> AvroResult<bool> {
        if self.source.is_exhausted()? {
            debug!("End of container after {} blocks", self.blocks_read);
            self.state = State::Closed;
            return Ok(false);
        }

        let count = self.read_long(ContainerStage::BlockHeader)?;
        if count < 0 {
            return Err(Details::NegativeObjectCount {
                count,
                block: self.blocks_read,
            }
            .into());
        }
        let size_at = self.source.offset();
        let size = self.read_long(ContainerStage::BlockHeader)?;
        if size < 0 {
            return Err(Error::decode(
                offset_as_usize(size_at),
                DecodeError::NegativeLength(size),
            ));
        }
        let size = usize::try_from(size)
            .map_err(|_| DecodeError::LengthOutOfBounds { len: size as u64 })
            .and_then(safe_len)
            .map_err(|reason| Error::decode(offset_as_usize(size_at), reason))?;

        if !self.source.fill(size)? {
            return Err(truncated(ContainerStage::BlockData, self.source.end_offset()));
        }
        let data = self.source.available()[..size].to_vec();
        self.source.consume(size);

        if !self.source.fill(SYNC_SIZE)? {
            return Err(truncated(ContainerStage::SyncMarker, self.source.end_offset()));
        }
        if self.source.available()[..SYNC_SIZE] != self.marker {
            self.state = State::Closed;
            return Err(Details::GetBlockMarker {
                block: self.blocks_read,
            }
            .into());
        }
        self.source.consume(SYNC_SIZE);

        self.data = self.decompressor.decompress(data)?;
        self.data_pos = 0;
        self.remaining = usize::try_from(count)
            .map_err(|_| Error::decode(0, DecodeError::LengthOutOfBounds { len: count as u64 }))?;
        self.blocks_read += 1;
        self.state = State::BlockReady;
        Ok(true)
    }

    /// The next object of the container, reading blocks as needed.
    ///
    /// Offsets of decode failures are relative to the decompressed block.
    pub(super) fn read_next(&mut self) -> AvroResult<Option<Value>> {
        loop {
            match self.state {
                State::Closed => return Ok(None),
                State::HeaderParsed | State::BlockExhausted => {
                    if !self.read_block()? {
                        return Ok(None);
                    }
                }
                State::BlockReady if self.remaining == 0 => {
                    if self.data_pos < self.data.len() {
                        warn!(
                            "Ignoring {} trailing bytes in block {}",
                            self.data.len() - self.data_pos,
                            self.blocks_read - 1
                        );
                    }
                    self.state = State::BlockExhausted;
                }
                State::BlockReady => {
                    let (value, len) = decode_at(&self.writer_schema, &self.data, self.data_pos)?;
                    self.data_pos += len;
                    self.remaining -= 1;
                    return Ok(Some(value));
                }
            }
        }
    }
}

fn truncated(stage: ContainerStage, offset: u64) -> Error {
    Details::ContainerTruncated { stage, offset }.into()
}

/// Decode the header metadata map, pulling more input until it is complete.
fn read_metadata<R: Read>(source: &mut Source<R>) -> AvroResult<Vec<(String, Value)>> {
    loop {
        match decode_at(Schema::metadata(), source.available(), 0) {
            Ok((Value::Map(entries), len)) => {
                source.consume(len);
                return Ok(entries);
            }
            Ok(_) => return Err(Details::GetAvroSchemaFromMap.into()),
            Err(e) if e.is_input_exhausted() => {
                if source.fill_more()? == 0 {
                    return Err(truncated(ContainerStage::Header, source.end_offset()));
                }
            }
            Err(e) => return Err(e.shifted(offset_as_usize(source.offset()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    const MARKER: [u8; SYNC_SIZE] = [7; SYNC_SIZE];

    fn header(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut bytes = MAGIC.to_vec();
        if !entries.is_empty() {
            crate::util::zig_i64(entries.len() as i64, &mut bytes);
            for (key, value) in entries {
                crate::encode::encode_bytes(key.as_bytes(), &mut bytes);
                crate::encode::encode_bytes(value.as_bytes(), &mut bytes);
            }
        }
        bytes.push(0);
        bytes.extend_from_slice(&MARKER);
        bytes
    }

    #[test]
    fn header_fields() -> anyhow::Result<()> {
        let bytes = header(&[
            ("avro.schema", r#""long""#),
            ("avro.codec", "null"),
            ("avro.unknown", "?"),
            ("owner", "me"),
        ]);
        let block = Block::new(&bytes[..], &CodecRegistry::default())?;
        assert_eq!(block.codec(), "null");
        assert_eq!(block.marker(), &MARKER);
        assert_eq!(block.state, State::HeaderParsed);
        assert_eq!(block.user_metadata.get("owner"), Some(&b"me".to_vec()));
        assert!(!block.user_metadata.contains_key("avro.unknown"));
        Ok(())
    }

    #[test]
    fn codec_defaults_to_null() -> anyhow::Result<()> {
        let bytes = header(&[("avro.schema", r#""long""#)]);
        let err = Block::new(&bytes[..], &CodecRegistry::empty()).err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::UnsupportedCodec));

        let block = Block::new(&bytes[..], &CodecRegistry::default())?;
        assert_eq!(block.codec(), "null");
        Ok(())
    }

    #[test]
    fn missing_schema() {
        let bytes = header(&[("avro.codec", "null")]);
        let err = Block::new(&bytes[..], &CodecRegistry::default()).err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::Format));
    }

    #[test]
    fn blocks_and_clean_end() -> anyhow::Result<()> {
        let mut bytes = header(&[("avro.schema", r#""long""#)]);
        // two objects in the first block, an empty block, one object
        bytes.extend_from_slice(&[0x04, 0x04, 0x02, 0x04]);
        bytes.extend_from_slice(&MARKER);
        bytes.extend_from_slice(&[0x00, 0x00]);
        bytes.extend_from_slice(&MARKER);
        bytes.extend_from_slice(&[0x02, 0x02, 0x06]);
        bytes.extend_from_slice(&MARKER);

        let mut block = Block::new(&bytes[..], &CodecRegistry::default())?;
        let mut values = Vec::new();
        while let Some(value) = block.read_next()? {
            values.push(value);
        }
        assert_eq!(values, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(block.state, State::Closed);
        assert_eq!(block.blocks_read, 3);
        Ok(())
    }

    #[test]
    fn marker_mismatch_closes_the_reader() -> anyhow::Result<()> {
        let mut bytes = header(&[("avro.schema", r#""long""#)]);
        bytes.extend_from_slice(&[0x02, 0x02, 0x02]);
        bytes.extend_from_slice(&[8; SYNC_SIZE]);

        let mut block = Block::new(&bytes[..], &CodecRegistry::default())?;
        let err = block.read_next().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corruption);
        assert_eq!(block.state, State::Closed);
        assert!(block.read_next()?.is_none());
        Ok(())
    }

    #[test]
    fn truncation_stages() -> anyhow::Result<()> {
        let mut full = header(&[("avro.schema", r#""long""#)]);
        let header_len = full.len();
        full.extend_from_slice(&[0x02, 0x06, 0x02, 0x04, 0x06]);
        full.extend_from_slice(&MARKER);

        let stage_of = |len: usize| -> Option<(ContainerStage, u64)> {
            let err = match Block::new(&full[..len], &CodecRegistry::default()) {
                Ok(mut block) => block.read_next().err()?,
                Err(e) => e,
            };
            match err.into_details() {
                Details::ContainerTruncated { stage, offset } => Some((stage, offset)),
                _ => None,
            }
        };

        assert_eq!(stage_of(2), Some((ContainerStage::Header, 2)));
        assert_eq!(stage_of(10), Some((ContainerStage::Header, 10)));
        assert_eq!(stage_of(header_len - 1), Some((ContainerStage::Header, header_len as u64 - 1)));
        assert_eq!(
            stage_of(header_len + 1),
            Some((ContainerStage::BlockHeader, header_len as u64 + 1))
        );
        assert_eq!(
            stage_of(header_len + 4),
            Some((ContainerStage::BlockData, header_len as u64 + 4))
        );
        assert_eq!(
            stage_of(header_len + 6),
            Some((ContainerStage::SyncMarker, header_len as u64 + 6))
        );
        Ok(())
    }

    #[test]
    fn negative_object_count() -> anyhow::Result<()> {
        let mut bytes = header(&[("avro.schema", r#""long""#)]);
        bytes.extend_from_slice(&[0x01, 0x00]);
        bytes.extend_from_slice(&MARKER);
        let mut block = Block::new(&bytes[..], &CodecRegistry::default())?;
        assert_eq!(block.read_next().unwrap_err().kind(), ErrorKind::Corruption);
        Ok(())
    }
}
