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

use avro_binary::{
    ErrorKind, Schema, decode_at, from_avro_datum, to_avro_datum,
    types::{Record, Value},
    util::{zag_i64, zig_i64},
};
use hex_literal::hex;
use pretty_assertions::assert_eq;
use rstest::rstest;

#[rstest]
#[case::zero(0, &[0x00])]
#[case::minus_one(-1, &[0x01])]
#[case::one(1, &[0x02])]
#[case::minus_sixty_five(-65, &[0x81, 0x01])]
#[case::max(i64::MAX, &hex!("feffffffffffffffff01"))]
#[case::min(i64::MIN, &hex!("ffffffffffffffffff01"))]
fn zigzag_varints(#[case] n: i64, #[case] expected: &[u8]) -> anyhow::Result<()> {
    let mut bytes = Vec::new();
    assert_eq!(zig_i64(n, &mut bytes), expected.len());
    assert_eq!(bytes, expected);
    assert_eq!(zag_i64(&bytes, 0)?, (n, expected.len()));
    Ok(())
}

#[test]
fn union_of_null_and_long() -> anyhow::Result<()> {
    let schema = Schema::parse_str(r#"["null","long"]"#)?;

    let value = from_avro_datum(&schema, &[0x00])?;
    assert_eq!(value.unwrap_union(), &Value::Null);

    let value = from_avro_datum(&schema, &[0x02, 0x02])?;
    assert_eq!(value, Value::Union(1, Box::new(Value::Int(1))));
    Ok(())
}

#[test]
fn empty_containers_are_a_single_terminator() -> anyhow::Result<()> {
    for raw in [
        r#"{"type":"array","items":"string"}"#,
        r#"{"type":"map","values":"string"}"#,
    ] {
        let schema = Schema::parse_str(raw)?;
        let empty = match schema.kind() {
            avro_binary::schema::SchemaKind::Array => Value::Array(vec![]),
            _ => Value::Map(vec![]),
        };
        assert_eq!(to_avro_datum(&schema, empty.clone())?, [0x00]);
        assert_eq!(from_avro_datum(&schema, &[0x00])?, empty);
    }
    Ok(())
}

#[test]
fn truncated_string_never_yields_a_value() -> anyhow::Result<()> {
    let schema = Schema::parse_str(r#""string""#)?;
    let bytes = to_avro_datum(&schema, "hello")?;
    for len in 0..bytes.len() {
        let err = from_avro_datum(&schema, &bytes[..len]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(err.is_truncation(), "{len}: {err}");
    }
    assert_eq!(from_avro_datum(&schema, &bytes)?, Value::String("hello".into()));
    Ok(())
}

#[test]
fn consecutive_datums() -> anyhow::Result<()> {
    let schema = Schema::parse_str(r#"{"type":"enum","name":"Suit","symbols":["S","H","D","C"]}"#)?;
    let bytes = hex!("00 06 04");
    let mut offset = 0;
    let mut symbols = Vec::new();
    while offset < bytes.len() {
        let (value, len) = decode_at(&schema, &bytes, offset)?;
        symbols.push(value);
        offset += len;
    }
    assert_eq!(
        symbols,
        vec![
            Value::Enum("S".into()),
            Value::Enum("C".into()),
            Value::Enum("D".into()),
        ]
    );
    Ok(())
}

#[test]
fn namespaced_references() -> anyhow::Result<()> {
    let schema = Schema::parse_str(
        r#"{
            "type": "record",
            "name": "Envelope",
            "namespace": "com.example",
            "fields": [
                {"name": "id", "type": {"type": "fixed", "name": "Id", "size": 4}},
                {"name": "parent", "type": ["null", "com.example.Id"]},
                {"name": "kind", "type": {"type": "enum", "name": "Kind", "namespace": "other", "symbols": ["A", "B"]}},
                {"name": "again", "type": "other.Kind"}
            ]
        }"#,
    )?;
    assert!(schema.lookup("com.example.Id").is_some());
    assert!(schema.lookup("other.Kind").is_some());

    let mut record = Record::new(&schema).ok_or_else(|| anyhow::anyhow!("not a record"))?;
    record.put("id", Value::Fixed(vec![1, 2, 3, 4]));
    record.put("parent", Value::Fixed(vec![5, 6, 7, 8]));
    record.put("kind", Value::Enum("B".into()));
    record.put("again", Value::Enum("A".into()));
    let value = record.into_value()?;

    let bytes = to_avro_datum(&schema, value)?;
    assert_eq!(bytes, hex!("01020304 02 05060708 02 00"));
    Ok(())
}

#[test]
fn encode_errors_name_the_offending_value() -> anyhow::Result<()> {
    let schema = Schema::parse_str(
        r#"{"type":"record","name":"R","fields":[
            {"name":"tags","type":{"type":"array","items":{"type":"fixed","name":"T","size":2}}}
        ]}"#,
    )?;
    let value = Value::Record(vec![Value::Array(vec![
        Value::Fixed(vec![1, 2]),
        Value::Fixed(vec![1, 2, 3]),
    ])]);
    let err = to_avro_datum(&schema, value).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Encode);
    assert_eq!(
        err.path().map(ToString::to_string).as_deref(),
        Some("$.tags[1]")
    );
    Ok(())
}
