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

use crate::{schema::SchemaKind, types::ValueKind};
use std::{
    collections::VecDeque,
    error::Error as _,
    fmt,
};

/// Errors encountered while building schemas, encoding, decoding or reading
/// object container files.
///
/// To inspect the details of the error use [`details`](Self::details) or
/// [`into_details`](Self::into_details). [`kind`](Self::kind) gives the coarse
/// classification most callers branch on.
#[derive(thiserror::Error, Debug)]
#[repr(transparent)]
#[error(transparent)]
pub struct Error {
    details: Box<Details>,
}

impl Error {
    pub fn new(details: Details) -> Self {
        Self {
            details: Box::new(details),
        }
    }

    pub fn details(&self) -> &Details {
        &self.details
    }

    pub fn into_details(self) -> Details {
        *self.details
    }

    pub fn kind(&self) -> ErrorKind {
        self.details.kind()
    }

    /// Returns `true` when the input ended before a complete value, header or
    /// block could be read.
    pub fn is_truncation(&self) -> bool {
        match self.details.as_ref() {
            Details::Decode { reason, .. } => matches!(
                reason,
                DecodeError::TruncatedInput { .. } | DecodeError::VarintTooLong { .. }
            ),
            Details::ContainerTruncated { .. } => true,
            _ => false,
        }
    }

    /// `true` only when more input bytes could complete the decode.
    pub(crate) fn is_input_exhausted(&self) -> bool {
        matches!(
            self.details.as_ref(),
            Details::Decode {
                reason: DecodeError::TruncatedInput { .. },
                ..
            }
        )
    }

    /// `true` when a value was nested deeper than the configured limit.
    pub(crate) fn is_depth_limit(&self) -> bool {
        matches!(
            self.details.as_ref(),
            Details::Decode {
                reason: DecodeError::DepthLimit { .. },
                ..
            } | Details::Encode {
                reason: EncodeError::DepthLimit { .. },
                ..
            }
        )
    }

    /// The schema path of an encode or decode failure, if any.
    pub fn path(&self) -> Option<&SchemaPath> {
        match self.details.as_ref() {
            Details::Decode { path, .. } | Details::Encode { path, .. } => Some(path),
            _ => None,
        }
    }

    /// The byte offset at which a decode failure was detected.
    pub fn offset(&self) -> Option<usize> {
        match self.details.as_ref() {
            Details::Decode { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    /// Prefix the schema path of an encode or decode failure with `segment`.
    ///
    /// Nested encoders and decoders call this while the error travels
    /// outwards, so the path is only built on failure.
    pub(crate) fn within(mut self, segment: PathSegment) -> Self {
        match self.details.as_mut() {
            Details::Decode { path, .. } | Details::Encode { path, .. } => {
                path.segments.push_front(segment)
            }
            _ => {}
        }
        self
    }

    /// Shift the offset of a decode failure by `base` bytes.
    pub(crate) fn shifted(mut self, base: usize) -> Self {
        if let Details::Decode { offset, .. } = self.details.as_mut() {
            *offset += base;
        }
        self
    }

    pub(crate) fn decode(offset: usize, reason: DecodeError) -> Self {
        Details::Decode {
            path: SchemaPath::default(),
            offset,
            reason,
        }
        .into()
    }

    pub(crate) fn encode(reason: EncodeError) -> Self {
        Details::Encode {
            path: SchemaPath::default(),
            reason,
        }
        .into()
    }
}

impl From<Details> for Error {
    fn from(details: Details) -> Self {
        Self::new(details)
    }
}

/// Coarse classification of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or invalid schema definition.
    Schema,
    /// Value does not conform to the schema it is encoded with.
    Encode,
    /// Bytes do not form a valid value for the schema.
    Decode,
    /// Bad magic or missing header metadata in a container file.
    Format,
    /// Sync marker mismatch or undecodable block payload.
    Corruption,
    /// The container names a codec with no registered decompressor.
    UnsupportedCodec,
    /// The underlying byte source or sink failed.
    Io,
}

/// One step from a schema root towards the node a failure happened in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathSegment {
    /// A record field, by name.
    Field(String),
    /// The n-th item of an array.
    Item(usize),
    /// The key of the n-th map entry.
    Key(usize),
    /// The value stored under a map key.
    MapValue(String),
    /// A union branch, by index.
    Branch(u32),
}

/// Location of an encode or decode failure inside a value, written like
/// `$.fields.next[branch 1].value`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SchemaPath {
    segments: VecDeque<PathSegment>,
}

impl SchemaPath {
    pub fn segments(&self) -> impl Iterator<Item = &PathSegment> {
        self.segments.iter()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for SchemaPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for segment in &self.segments {
            match segment {
                PathSegment::Field(name) => write!(f, ".{name}")?,
                PathSegment::Item(index) => write!(f, "[{index}]")?,
                PathSegment::Key(index) => write!(f, "[key {index}]")?,
                PathSegment::MapValue(key) => write!(f, "[{key:?}]")?,
                PathSegment::Branch(index) => write!(f, "[branch {index}]")?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for SchemaPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SchemaPath({self})")
    }
}

/// Why a datum could not be decoded.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated input: needed {needed} bytes but only {available} remain")]
    TruncatedInput { needed: usize, available: usize },

    #[error("variable-length integer did not terminate within {max_bytes} bytes")]
    VarintTooLong { max_bytes: usize },

    #[error("invalid UTF-8 in string: {0}")]
    InvalidUtf8(#[source] std::str::Utf8Error),

    #[error("negative length {0}")]
    NegativeLength(i64),

    #[error("length {len} does not fit in memory")]
    LengthOutOfBounds { len: u64 },

    #[error("value {0} does not fit in an int")]
    IntOutOfRange(i64),

    #[error("union branch {index} out of range ({num_variants} branches)")]
    UnionIndex { index: i64, num_variants: usize },

    #[error("enum index {index} out of range ({num_symbols} symbols)")]
    EnumIndex { index: i64, num_symbols: usize },

    #[error("unable to allocate {desired} bytes (maximum allowed: {maximum})")]
    MemoryAllocation { desired: usize, maximum: usize },

    #[error("block byte size {size} out of bounds ({available} bytes remain)")]
    BlockSizeOutOfBounds { size: i64, available: usize },

    #[error("value nested deeper than {max} levels")]
    DepthLimit { max: usize },
}

/// Why a value could not be encoded.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EncodeError {
    #[error("value of kind {value:?} does not match schema {expected:?}")]
    KindMismatch { expected: SchemaKind, value: ValueKind },

    #[error("value {0} does not fit in an int")]
    IntOutOfRange(i64),

    #[error("symbol {0:?} is not among the declared enum symbols")]
    EnumSymbol(String),

    #[error("union branch {index} out of range ({num_variants} branches)")]
    UnionIndex { index: u32, num_variants: usize },

    #[error("no union branch accepts a value of kind {0:?}")]
    NoUnionBranch(ValueKind),

    #[error("fixed size mismatch, expected: {size}, got: {n}")]
    FixedSize { size: usize, n: usize },

    #[error("record has {expected} fields but the value has {got}")]
    FieldCount { expected: usize, got: usize },

    #[error("field `{0}` has no value and no default")]
    MissingField(String),

    #[error("value nested deeper than {max} levels")]
    DepthLimit { max: usize },
}

/// Where in a container file the input ended early.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ContainerStage {
    Header,
    BlockHeader,
    BlockData,
    SyncMarker,
}

#[derive(thiserror::Error)]
pub enum Details {
    #[error("Failed to parse schema from JSON")]
    ParseSchemaJson(#[source] serde_json::Error),

    #[error("Must be a JSON string, object or array")]
    ParseSchemaFromValidJson,

    #[error("Unknown primitive type or undefined named type: {0}")]
    UnknownType(String),

    #[error("Complex type `{0}` must be declared with a JSON object")]
    ComplexTypeAsName(String),

    #[error("No `type` field found in complex type")]
    GetComplexTypeField,

    #[error("`type` must be a string, object or array, got {0}")]
    GetComplexType(serde_json::Value),

    #[error("No `name` field")]
    GetNameField,

    #[error("Invalid schema name {0}. It must match the regex '{1}'")]
    InvalidSchemaName(String, &'static str),

    #[error("Invalid namespace {0}. It must match the regex '{1}'")]
    InvalidNamespace(String, &'static str),

    #[error("Invalid field name {0}")]
    FieldName(String),

    #[error("Invalid enum symbol name {0}")]
    EnumSymbolName(String),

    #[error("Two named schemas defined for the same fullname: {0}")]
    NameCollision(String),

    #[error("No `fields` in record")]
    GetRecordFieldsJson,

    #[error("No `name` in record field")]
    GetNameFieldFromRecord,

    #[error("No `type` in record field `{0}`")]
    GetRecordFieldTypeField(String),

    #[error("Duplicate field name {0}")]
    FieldNameDuplicate(String),

    #[error("No `symbols` field in enum")]
    GetEnumSymbolsField,

    #[error("Enum symbols must be strings")]
    GetEnumSymbols,

    #[error("Enum must declare at least one symbol")]
    EmptyEnum,

    #[error("Duplicate enum symbol {0}")]
    EnumSymbolDuplicate(String),

    #[error("No `size` in fixed")]
    GetFixedSizeField,

    #[error("Fixed schema `size` value must be a non-negative integer: {0}")]
    GetFixedSizeFieldPositive(serde_json::Value),

    #[error("No `items` in array")]
    GetArrayItemsField,

    #[error("No `values` in map")]
    GetMapValuesField,

    #[error("Unions must contain at least one member type")]
    EmptyUnion,

    #[error("Unions may not directly contain a union")]
    GetNestedUnion,

    #[error("Unions may not have more than one member of type '{0}'")]
    GetUnionDuplicate(String),

    #[error("Invalid default {value} for field `{field}` of type {expected:?}")]
    GetDefaultValue {
        field: String,
        expected: SchemaKind,
        value: serde_json::Value,
    },

    #[error("Failed to encode value at {path}: {reason}")]
    Encode {
        path: SchemaPath,
        #[source]
        reason: EncodeError,
    },

    #[error("Failed to decode value at {path} (byte offset {offset}): {reason}")]
    Decode {
        path: SchemaPath,
        offset: usize,
        #[source]
        reason: DecodeError,
    },

    #[error("Wrong magic in header")]
    HeaderMagic,

    #[error("No `avro.schema` in metadata")]
    GetAvroSchemaFromMap,

    #[error("Header metadata value for `{0}` is not valid UTF-8")]
    MetadataUtf8(String),

    #[error("Invalid metadata key {0}: the `avro.` prefix is reserved")]
    InvalidMetadataKey(String),

    #[error("Cannot add user metadata after the header has been written")]
    FileHeaderAlreadyWritten,

    #[error("Input ended in the container {stage} at byte offset {offset}")]
    ContainerTruncated { stage: ContainerStage, offset: u64 },

    #[error("Negative object count {count} in block {block}")]
    NegativeObjectCount { count: i64, block: usize },

    #[error("Sync marker mismatch after block {block}")]
    GetBlockMarker { block: usize },

    #[error("Failed to decompress block with codec {codec}")]
    Decompress {
        codec: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Bad Snappy CRC32; expected {expected:x} but got {actual:x}")]
    SnappyCrc32 { expected: u32, actual: u32 },

    #[error("Failed to compress block with codec {codec}")]
    Compress {
        codec: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Unsupported codec: '{0}'")]
    CodecNotSupported(String),

    #[error("Failed to read from the byte source")]
    ReadSource(#[source] std::io::Error),

    #[error("Failed to write to the byte sink")]
    WriteBytes(#[source] std::io::Error),

    #[error("Failed to flush the byte sink")]
    FlushWriter(#[source] std::io::Error),

    #[error("Failed to convert JSON to string")]
    ConvertJsonToString(#[source] serde_json::Error),
}

impl Details {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Details::Encode { .. }
            | Details::InvalidMetadataKey(_)
            | Details::FileHeaderAlreadyWritten
            | Details::Compress { .. }
            | Details::ConvertJsonToString(_) => ErrorKind::Encode,
            Details::Decode { .. } | Details::ContainerTruncated { .. } => ErrorKind::Decode,
            Details::HeaderMagic | Details::GetAvroSchemaFromMap | Details::MetadataUtf8(_) => {
                ErrorKind::Format
            }
            Details::NegativeObjectCount { .. }
            | Details::GetBlockMarker { .. }
            | Details::Decompress { .. }
            | Details::SnappyCrc32 { .. } => ErrorKind::Corruption,
            Details::CodecNotSupported(_) => ErrorKind::UnsupportedCodec,
            Details::ReadSource(_) | Details::WriteBytes(_) | Details::FlushWriter(_) => {
                ErrorKind::Io
            }
            _ => ErrorKind::Schema,
        }
    }
}

impl fmt::Debug for Details {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut msg = self.to_string();
        if let Some(e) = self.source() {
            msg.extend([": ", &e.to_string()]);
        }
        write!(f, "{msg}")
    }
}
