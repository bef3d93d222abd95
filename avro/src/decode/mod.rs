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

//! Decoding of single Avro datums from an in-memory buffer.

mod cursor;

use crate::{
    AvroResult, Error,
    error::{DecodeError, PathSegment},
    schema::{NodeId, Schema, SchemaNode},
    types::Value,
    util::{check_depth, safe_len},
};
pub(crate) use cursor::Cursor;
use std::mem;

/// Decode a datum encoded with `schema` from the start of `bytes`.
///
/// Bytes after the datum are ignored.
pub fn from_avro_datum(schema: &Schema, bytes: &[u8]) -> AvroResult<Value> {
    decode_at(schema, bytes, 0).map(|(value, _)| value)
}

/// Decode a datum starting at `offset` in `bytes`.
///
/// Returns the value and the number of bytes it occupied. Error offsets are
/// positions in `bytes`, not relative to `offset`.
pub fn decode_at(schema: &Schema, bytes: &[u8], offset: usize) -> AvroResult<(Value, usize)> {
    let mut cursor = Cursor::new(bytes, offset);
    let value = decode_node(schema, schema.root(), &mut cursor, 0)?;
    Ok((value, cursor.pos() - offset))
}

/// Decode the value of node `id`, which sits `depth` complex nodes below the
/// root.
pub(crate) fn decode_node(
    schema: &Schema,
    id: NodeId,
    cursor: &mut Cursor,
    depth: usize,
) -> AvroResult<Value> {
    check_depth(depth).map_err(|max| Error::decode(cursor.pos(), DecodeError::DepthLimit { max }))?;
    match schema.node(id) {
        SchemaNode::Null => Ok(Value::Null),
        SchemaNode::Boolean => {
            let [byte] = cursor.read_array::<1>()?;
            Ok(Value::Boolean(byte != 0))
        }
        SchemaNode::Int => cursor.read_int().map(|n| Value::Int(n.into())),
        SchemaNode::Long => cursor.read_long().map(Value::Int),
        SchemaNode::Float => Ok(Value::Float(f32::from_le_bytes(cursor.read_array()?))),
        SchemaNode::Double => Ok(Value::Double(f64::from_le_bytes(cursor.read_array()?))),
        SchemaNode::Bytes => {
            let len = cursor.read_len()?;
            Ok(Value::Bytes(cursor.read_bytes(len)?.to_vec()))
        }
        SchemaNode::String => read_string(cursor).map(Value::String),
        SchemaNode::Fixed(fixed) => Ok(Value::Fixed(cursor.read_bytes(fixed.size)?.to_vec())),
        SchemaNode::Enum(enum_schema) => {
            let start = cursor.pos();
            let index = cursor.read_long()?;
            usize::try_from(index)
                .ok()
                .and_then(|i| enum_schema.symbols.get(i))
                .map(|symbol| Value::Enum(symbol.clone()))
                .ok_or_else(|| {
                    Error::decode(
                        start,
                        DecodeError::EnumIndex {
                            index,
                            num_symbols: enum_schema.symbols.len(),
                        },
                    )
                })
        }
        SchemaNode::Array(array) => {
            let mut items = Vec::new();
            loop {
                let count = read_item_count(cursor, items.len())?;
                if count == 0 {
                    break;
                }
                items.reserve(count.min(cursor.remaining()));
                for _ in 0..count {
                    let index = items.len();
                    let item = decode_node(schema, array.items, cursor, depth + 1)
                        .map_err(|e| e.within(PathSegment::Item(index)))?;
                    items.push(item);
                }
            }
            Ok(Value::Array(items))
        }
        SchemaNode::Map(map) => {
            let mut entries = Vec::new();
            loop {
                let count = read_item_count(cursor, entries.len())?;
                if count == 0 {
                    break;
                }
                entries.reserve(count.min(cursor.remaining()));
                for _ in 0..count {
                    let index = entries.len();
                    let key =
                        read_string(cursor).map_err(|e| e.within(PathSegment::Key(index)))?;
                    let value = decode_node(schema, map.values, cursor, depth + 1)
                        .map_err(|e| e.within(PathSegment::MapValue(key.clone())))?;
                    entries.push((key, value));
                }
            }
            Ok(Value::Map(entries))
        }
        SchemaNode::Record(record) => record
            .fields
            .iter()
            .map(|field| {
                decode_node(schema, field.schema, cursor, depth + 1)
                    .map_err(|e| e.within(PathSegment::Field(field.name.clone())))
            })
            .collect::<AvroResult<Vec<_>>>()
            .map(Value::Record),
        SchemaNode::Union(union) => {
            let start = cursor.pos();
            let index = cursor.read_long()?;
            let (branch, variant) = u32::try_from(index)
                .ok()
                .and_then(|i| union.variants().get(i as usize).map(|v| (i, *v)))
                .ok_or_else(|| {
                    Error::decode(
                        start,
                        DecodeError::UnionIndex {
                            index,
                            num_variants: union.variants().len(),
                        },
                    )
                })?;
            let value = decode_node(schema, variant, cursor, depth + 1)
                .map_err(|e| e.within(PathSegment::Branch(branch)))?;
            Ok(Value::Union(branch, Box::new(value)))
        }
        SchemaNode::Ref { id, .. } => decode_node(schema, *id, cursor, depth),
    }
}

fn read_string(cursor: &mut Cursor) -> AvroResult<String> {
    let start = cursor.pos();
    let len = cursor.read_len()?;
    let bytes = cursor.read_bytes(len)?;
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|e| Error::decode(start, DecodeError::InvalidUtf8(e)))
}

/// Block count of an array or map that already holds `decoded` items. The
/// running total is bounded so that corrupt counts cannot request an absurd
/// allocation, even spread over many blocks of zero-width items.
fn read_item_count(cursor: &mut Cursor, decoded: usize) -> AvroResult<usize> {
    let start = cursor.pos();
    let count = cursor.read_block_count()?;
    safe_len(
        decoded
            .saturating_add(count)
            .saturating_mul(mem::size_of::<Value>()),
    )
    .map_err(|reason| Error::decode(start, reason))?;
    Ok(count)
}
