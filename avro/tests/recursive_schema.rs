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
    Schema, from_avro_datum, schema::SchemaNode, to_avro_datum,
    types::{Record, Value},
};
use hex_literal::hex;
use pretty_assertions::assert_eq;

const NODE: &str = r#"{"type":"record","name":"Node","fields":[{"name":"next","type":["null","Node"]}]}"#;

/// `depth` nested `Node`s, the innermost ending the list with null.
fn chain(depth: usize) -> Value {
    let mut next = Value::Union(0, Box::new(Value::Null));
    for level in 1..=depth {
        let node = Value::Record(vec![next]);
        if level == depth {
            return node;
        }
        next = Value::Union(1, Box::new(node));
    }
    next
}

#[test]
fn node_schema_builds() -> anyhow::Result<()> {
    let schema = Schema::parse_str(NODE)?;
    let id = schema.lookup("Node").ok_or_else(|| anyhow::anyhow!("Node not registered"))?;
    assert_eq!(schema.root(), id);

    let SchemaNode::Record(record) = schema.root_node() else {
        panic!("expected a record");
    };
    let SchemaNode::Union(union) = schema.node(record.fields[0].schema) else {
        panic!("expected a union");
    };
    // the second branch is a reference back to the record, not a copy of it
    assert!(matches!(
        schema.node(union.variants()[1]),
        SchemaNode::Ref { id: target, .. } if *target == id
    ));
    Ok(())
}

#[test]
fn three_deep_chain_round_trips() -> anyhow::Result<()> {
    let schema = Schema::parse_str(NODE)?;
    let value = chain(3);
    assert!(schema.validate(&value));

    let bytes = to_avro_datum(&schema, value.clone())?;
    assert_eq!(bytes, hex!("02 02 00"));
    assert_eq!(from_avro_datum(&schema, &bytes)?, value);
    Ok(())
}

#[test]
fn chain_built_with_record_helper() -> anyhow::Result<()> {
    let schema = Schema::parse_str(NODE)?;
    let mut value = Value::Union(0, Box::new(Value::Null));
    for _ in 0..3 {
        let mut record = Record::new(&schema).ok_or_else(|| anyhow::anyhow!("not a record"))?;
        record.put("next", value);
        value = Value::Union(1, Box::new(record.into_value()?));
    }
    let Value::Union(1, outer) = value else {
        panic!("expected a record branch");
    };
    assert_eq!(*outer, chain(3));
    Ok(())
}

#[test]
fn mutually_recursive_types() -> anyhow::Result<()> {
    let schema = Schema::parse_str(
        r#"{
            "type": "record",
            "name": "Tree",
            "fields": [
                {"name": "label", "type": "string"},
                {"name": "children", "type": {"type": "array", "items": {
                    "type": "record",
                    "name": "Edge",
                    "fields": [
                        {"name": "weight", "type": "int"},
                        {"name": "to", "type": "Tree"}
                    ]
                }}}
            ]
        }"#,
    )?;
    let leaf = |label: &str| {
        Value::Record(vec![Value::String(label.to_string()), Value::Array(vec![])])
    };
    let value = Value::Record(vec![
        Value::String("root".to_string()),
        Value::Array(vec![
            Value::Record(vec![Value::Int(1), leaf("a")]),
            Value::Record(vec![Value::Int(2), leaf("b")]),
        ]),
    ]);
    let bytes = to_avro_datum(&schema, value.clone())?;
    assert_eq!(from_avro_datum(&schema, &bytes)?, value);

    let json = schema.to_json()?;
    assert_eq!(Schema::parse(&json)?, schema);
    Ok(())
}
