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

use crate::{
    AvroResult, Error,
    error::{Details, EncodeError, PathSegment},
    schema::{NodeId, Schema, SchemaNode},
    types::Value,
    util::{check_depth, zig_i32, zig_i64},
};
use log::error;
use std::io::Write;

/// Encode a `Value` into avro format, writing it to `writer`.
///
/// The value is checked against the schema while it is encoded; on failure
/// nothing is written. Returns the number of bytes written.
pub fn encode<W: Write>(value: &Value, schema: &Schema, writer: &mut W) -> AvroResult<usize> {
    let buffer = to_avro_datum(schema, value.clone())?;
    writer
        .write_all(&buffer)
        .map_err(Details::WriteBytes)?;
    Ok(buffer.len())
}

/// Encode a value into raw Avro data, without any header.
pub fn to_avro_datum<T: Into<Value>>(schema: &Schema, value: T) -> AvroResult<Vec<u8>> {
    let mut buffer = Vec::new();
    encode_into(schema, &value.into(), &mut buffer)?;
    Ok(buffer)
}

/// Append the encoding of `value` to `buffer`. On failure `buffer` is left
/// as it was.
pub(crate) fn encode_into(schema: &Schema, value: &Value, buffer: &mut Vec<u8>) -> AvroResult<usize> {
    let start = buffer.len();
    match encode_node(schema, schema.root(), value, buffer, 0) {
        Ok(()) => Ok(buffer.len() - start),
        Err(e) => {
            buffer.truncate(start);
            Err(e)
        }
    }
}

pub(crate) fn encode_bytes(bytes: &[u8], buffer: &mut Vec<u8>) {
    zig_i64(bytes.len() as i64, buffer);
    buffer.extend_from_slice(bytes);
}

fn mismatch(node: &SchemaNode, value: &Value) -> Error {
    Error::encode(EncodeError::KindMismatch {
        expected: node.kind(),
        value: value.kind(),
    })
}

/// Whether `node` can hold a value of the kind of `value`, without looking
/// inside it.
fn admits(node: &SchemaNode, value: &Value) -> bool {
    matches!(
        (node, value),
        (SchemaNode::Null, Value::Null)
            | (SchemaNode::Boolean, Value::Boolean(_))
            | (SchemaNode::Int | SchemaNode::Long, Value::Int(_))
            | (SchemaNode::Float, Value::Float(_))
            | (SchemaNode::Double, Value::Double(_) | Value::Float(_))
            | (SchemaNode::Bytes, Value::Bytes(_))
            | (SchemaNode::String, Value::String(_))
            | (SchemaNode::Fixed(_), Value::Fixed(_) | Value::Bytes(_))
            | (SchemaNode::Enum(_), Value::Enum(_) | Value::String(_))
            | (SchemaNode::Array(_), Value::Array(_))
            | (SchemaNode::Map(_), Value::Map(_))
            | (SchemaNode::Record(_), Value::Record(_))
    )
}

fn encode_node(
    schema: &Schema,
    id: NodeId,
    value: &Value,
    buffer: &mut Vec<u8>,
    depth: usize,
) -> AvroResult<()> {
    check_depth(depth).map_err(|max| Error::encode(EncodeError::DepthLimit { max }))?;
    let node = schema.resolve(id);
    match (node, value) {
        (SchemaNode::Union(union), Value::Union(index, inner)) => {
            let branch = union.variants().get(*index as usize).ok_or_else(|| {
                Error::encode(EncodeError::UnionIndex {
                    index: *index,
                    num_variants: union.variants().len(),
                })
            })?;
            zig_i64(i64::from(*index), buffer);
            encode_node(schema, *branch, inner, buffer, depth + 1)
                .map_err(|e| e.within(PathSegment::Branch(*index)))
        }
        // A bare value goes to the first branch it conforms to, found by
        // encoding into each candidate and rolling back on failure.
        (SchemaNode::Union(union), value) => {
            let start = buffer.len();
            for (index, branch) in union.variants().iter().enumerate() {
                if !admits(schema.resolve(*branch), value) {
                    continue;
                }
                let index = index as u32;
                zig_i64(i64::from(index), buffer);
                match encode_node(schema, *branch, value, buffer, depth + 1) {
                    Ok(()) => return Ok(()),
                    Err(e) if e.is_depth_limit() => {
                        return Err(e.within(PathSegment::Branch(index)));
                    }
                    Err(_) => buffer.truncate(start),
                }
            }
            Err(Error::encode(EncodeError::NoUnionBranch(value.kind())))
        }
        (SchemaNode::Null, Value::Null) => Ok(()),
        (SchemaNode::Boolean, Value::Boolean(b)) => {
            buffer.push(u8::from(*b));
            Ok(())
        }
        (SchemaNode::Int, Value::Int(n)) => {
            let n = i32::try_from(*n).map_err(|_| Error::encode(EncodeError::IntOutOfRange(*n)))?;
            zig_i32(n, buffer);
            Ok(())
        }
        (SchemaNode::Long, Value::Int(n)) => {
            zig_i64(*n, buffer);
            Ok(())
        }
        (SchemaNode::Float, Value::Float(x)) => {
            buffer.extend_from_slice(&x.to_le_bytes());
            Ok(())
        }
        (SchemaNode::Double, Value::Double(x)) => {
            buffer.extend_from_slice(&x.to_le_bytes());
            Ok(())
        }
        (SchemaNode::Double, Value::Float(x)) => {
            buffer.extend_from_slice(&f64::from(*x).to_le_bytes());
            Ok(())
        }
        (SchemaNode::Bytes, Value::Bytes(bytes)) => {
            encode_bytes(bytes, buffer);
            Ok(())
        }
        (SchemaNode::String, Value::String(s)) => {
            encode_bytes(s.as_bytes(), buffer);
            Ok(())
        }
        (SchemaNode::Fixed(fixed), Value::Fixed(bytes) | Value::Bytes(bytes)) => {
            if bytes.len() != fixed.size {
                return Err(Error::encode(EncodeError::FixedSize {
                    size: fixed.size,
                    n: bytes.len(),
                }));
            }
            buffer.extend_from_slice(bytes);
            Ok(())
        }
        (SchemaNode::Enum(enum_schema), Value::Enum(symbol) | Value::String(symbol)) => {
            match enum_schema.index_of(symbol) {
                Some(index) => {
                    zig_i64(index as i64, buffer);
                    Ok(())
                }
                None => {
                    error!("Invalid symbol string {:?} for enum {}.", symbol, enum_schema.name);
                    Err(Error::encode(EncodeError::EnumSymbol(symbol.clone())))
                }
            }
        }
        (SchemaNode::Array(array), Value::Array(items)) => {
            if !items.is_empty() {
                zig_i64(items.len() as i64, buffer);
                for (i, item) in items.iter().enumerate() {
                    encode_node(schema, array.items, item, buffer, depth + 1)
                        .map_err(|e| e.within(PathSegment::Item(i)))?;
                }
            }
            buffer.push(0u8);
            Ok(())
        }
        (SchemaNode::Map(map), Value::Map(entries)) => {
            if !entries.is_empty() {
                zig_i64(entries.len() as i64, buffer);
                for (key, value) in entries {
                    encode_bytes(key.as_bytes(), buffer);
                    encode_node(schema, map.values, value, buffer, depth + 1)
                        .map_err(|e| e.within(PathSegment::MapValue(key.clone())))?;
                }
            }
            buffer.push(0u8);
            Ok(())
        }
        (SchemaNode::Record(record), Value::Record(values)) => {
            if values.len() != record.fields.len() {
                return Err(Error::encode(EncodeError::FieldCount {
                    expected: record.fields.len(),
                    got: values.len(),
                }));
            }
            for (field, value) in record.fields.iter().zip(values) {
                encode_node(schema, field.schema, value, buffer, depth + 1)
                    .map_err(|e| e.within(PathSegment::Field(field.name.clone())))?;
            }
            Ok(())
        }
        (node, value) => Err(mismatch(node, value)),
    }
}

#[cfg(test)]
#[allow(clippy::expect_fun_call)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use hex_literal::hex;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    pub(crate) fn success(value: &Value, schema: &Schema) -> String {
        format!(
            "Value: {:?}\n should encode with schema:\n{:?}",
            &value, &schema
        )
    }

    #[rstest]
    #[case(r#""null""#, Value::Null, &[])]
    #[case(r#""boolean""#, Value::Boolean(true), &hex!("01"))]
    #[case(r#""int""#, Value::Int(64), &hex!("8001"))]
    #[case(r#""int""#, Value::Int(i64::from(i32::MAX)), &hex!("feffffff0f"))]
    #[case(r#""long""#, Value::Int(-1), &hex!("01"))]
    #[case(r#""float""#, Value::Float(1.0), &hex!("0000803f"))]
    #[case(r#""double""#, Value::Double(-2.0), &hex!("00000000000000c0"))]
    #[case(r#""bytes""#, Value::Bytes(vec![0xde, 0xad]), &hex!("04dead"))]
    #[case(r#""string""#, Value::String("foo".into()), &hex!("06666f6f"))]
    #[case(r#"{"type": "fixed", "name": "F", "size": 2}"#, Value::Fixed(vec![1, 2]), &hex!("0102"))]
    #[case(r#"{"type": "enum", "name": "E", "symbols": ["A", "B"]}"#, Value::Enum("B".into()), &hex!("02"))]
    fn primitives(#[case] schema: &str, #[case] value: Value, #[case] expected: &[u8]) -> anyhow::Result<()> {
        let schema = Schema::parse_str(schema)?;
        assert_eq!(to_avro_datum(&schema, value)?, expected);
        Ok(())
    }

    #[test]
    fn test_encode_empty_array() -> anyhow::Result<()> {
        let schema = Schema::parse_str(r#"{"type": "array", "items": "int"}"#)?;
        assert_eq!(to_avro_datum(&schema, Value::Array(vec![]))?, vec![0u8]);
        Ok(())
    }

    #[test]
    fn test_encode_empty_map() -> anyhow::Result<()> {
        let schema = Schema::parse_str(r#"{"type": "map", "values": "int"}"#)?;
        assert_eq!(to_avro_datum(&schema, Value::Map(vec![]))?, vec![0u8]);
        Ok(())
    }

    #[test]
    fn test_encode_map_in_one_block() -> anyhow::Result<()> {
        let schema = Schema::parse_str(r#"{"type": "map", "values": "int"}"#)?;
        let value = Value::Map(vec![
            ("A".into(), Value::Int(1)),
            ("B".into(), Value::Int(2)),
        ]);
        assert_eq!(to_avro_datum(&schema, value)?, hex!("04 02 41 02 02 42 04 00"));
        Ok(())
    }

    #[test]
    fn test_encode_bare_value_picks_first_matching_branch() -> anyhow::Result<()> {
        let schema = Schema::parse_str(r#"["int", "long"]"#)?;
        assert_eq!(to_avro_datum(&schema, Value::Int(1))?, hex!("00 02"));
        assert_eq!(
            to_avro_datum(&schema, Value::Int(i64::from(i32::MAX) + 1))?,
            hex!("02 80 80 80 80 10")
        );

        let schema = Schema::parse_str(r#"["null", "long"]"#)?;
        assert_eq!(to_avro_datum(&schema, Value::Null)?, hex!("00"));
        assert_eq!(
            to_avro_datum(&schema, Value::Union(1, Box::new(Value::Int(1))))?,
            hex!("02 02")
        );
        Ok(())
    }

    #[test]
    fn test_encode_record() -> anyhow::Result<()> {
        let schema = Schema::parse_str(
            r#"{
                "type": "record",
                "name": "test",
                "fields": [
                    {"name": "a", "type": "long"},
                    {"name": "b", "type": "string"}
                ]
            }"#,
        )?;
        let value = Value::Record(vec![Value::Int(27), Value::String("foo".into())]);
        let mut written = Vec::new();
        let n = encode(&value, &schema, &mut written).expect(&success(&value, &schema));
        assert_eq!(written, hex!("36 06 66 6f 6f"));
        assert_eq!(n, 5);
        Ok(())
    }

    #[rstest]
    #[case::wrong_kind(r#""string""#, Value::Int(1), "does not match schema String")]
    #[case::int_range(r#""int""#, Value::Int(1 << 40), "does not fit in an int")]
    #[case::unknown_symbol(
        r#"{"type": "enum", "name": "E", "symbols": ["A"]}"#,
        Value::Enum("Z".into()),
        "\"Z\" is not among the declared enum symbols"
    )]
    #[case::fixed_size(
        r#"{"type": "fixed", "name": "F", "size": 2}"#,
        Value::Fixed(vec![1]),
        "expected: 2, got: 1"
    )]
    #[case::union_index(
        r#"["null", "int"]"#,
        Value::Union(2, Box::new(Value::Null)),
        "union branch 2 out of range (2 branches)"
    )]
    #[case::no_branch(r#"["null", "int"]"#, Value::String("x".into()), "no union branch")]
    #[case::union_for_plain(r#""int""#, Value::Union(0, Box::new(Value::Int(1))), "Union")]
    fn encode_errors(#[case] schema: &str, #[case] value: Value, #[case] message: &str) -> anyhow::Result<()> {
        let schema = Schema::parse_str(schema)?;
        let err = to_avro_datum(&schema, value).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encode);
        assert!(err.to_string().contains(message), "{err}");
        Ok(())
    }

    const NODE: &str = r#"{"type":"record","name":"Node","fields":[{"name":"next","type":["null","Node"]}]}"#;

    /// `levels` nested records, with or without explicit union branches.
    fn chain(levels: usize, explicit: bool) -> Value {
        let mut value = Value::Record(vec![Value::Null]);
        for _ in 1..levels {
            let next = if explicit {
                Value::Union(1, Box::new(value))
            } else {
                value
            };
            value = Value::Record(vec![next]);
        }
        value
    }

    #[test]
    fn test_encode_bare_nested_values_pick_branches_at_every_level() -> anyhow::Result<()> {
        let schema = Schema::parse_str(NODE)?;
        let bare = to_avro_datum(&schema, chain(100, false))?;
        let mut expected = vec![0x02; 99];
        expected.push(0x00);
        assert_eq!(bare, expected);
        Ok(())
    }

    #[test]
    fn test_encode_stops_at_the_nesting_limit() -> anyhow::Result<()> {
        let schema = Schema::parse_str(NODE)?;
        for explicit in [true, false] {
            let mut buffer = Vec::new();
            let err = encode_into(&schema, &chain(2_000, explicit), &mut buffer).unwrap_err();
            assert!(buffer.is_empty());
            assert_eq!(err.kind(), ErrorKind::Encode);
            assert!(
                err.to_string().contains(&format!(
                    "nested deeper than {} levels",
                    crate::util::DEFAULT_MAX_NESTING_DEPTH
                )),
                "{err}"
            );
        }
        Ok(())
    }

    #[test]
    fn test_encode_error_carries_path_and_writes_nothing() -> anyhow::Result<()> {
        let schema = Schema::parse_str(
            r#"{
                "type": "record",
                "name": "R",
                "fields": [
                    {"name": "ok", "type": "long"},
                    {"name": "items", "type": {"type": "array", "items": ["null", "string"]}}
                ]
            }"#,
        )?;
        let value = Value::Record(vec![
            Value::Int(1),
            Value::Array(vec![
                Value::Null,
                Value::Union(1, Box::new(Value::Int(3))),
            ]),
        ]);
        let mut buffer = vec![0xaa];
        let err = encode_into(&schema, &value, &mut buffer).unwrap_err();
        assert_eq!(buffer, vec![0xaa]);
        assert_eq!(
            err.path().map(|p| p.to_string()).as_deref(),
            Some("$.items[1][branch 1]")
        );
        Ok(())
    }
}
