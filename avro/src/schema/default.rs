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

//! Conversion of record field defaults between JSON and [`Value`].

use crate::AvroResult;
use crate::error::Details;
use crate::schema::{NodeId, Schema, SchemaNode};
use crate::types::Value;
use serde_json::{Map, Value as JsonValue};
use std::collections::{HashMap, HashSet};

/// Defaults nested deeper than this are rejected.
const MAX_DEFAULT_DEPTH: usize = 64;

/// Upper bound on the number of values the defaults of one schema may expand
/// to. Record defaults fill missing fields from the field defaults of the
/// nested records, which can double per level.
const MAX_DEFAULT_VALUES: usize = 1 << 16;

/// A field default waiting for the schema to be complete.
pub(crate) struct PendingDefault {
    pub(crate) record: NodeId,
    pub(crate) field: usize,
    pub(crate) json: JsonValue,
}

type FieldKey = (NodeId, usize);

pub(crate) fn resolve_defaults(schema: &mut Schema, pending: Vec<PendingDefault>) -> AvroResult<()> {
    let mut expander = Expander {
        schema,
        raw: pending
            .iter()
            .map(|p| ((p.record, p.field), &p.json))
            .collect(),
        done: HashMap::new(),
        active: HashSet::new(),
        budget: MAX_DEFAULT_VALUES,
    };

    let mut resolved = Vec::with_capacity(pending.len());
    for p in &pending {
        let SchemaNode::Record(record) = schema.node(p.record) else {
            continue;
        };
        let field = &record.fields[p.field];
        let value = expander.field_default((p.record, p.field), 0).ok_or_else(|| {
            Details::GetDefaultValue {
                field: field.name.clone(),
                expected: schema.resolve(field.schema).kind(),
                value: p.json.clone(),
            }
        })?;
        resolved.push((p.record, p.field, value));
    }
    drop(expander);

    for (record, field, value) in resolved {
        if let SchemaNode::Record(record) = schema.node_mut(record) {
            record.fields[field].default = Some(value);
        }
    }
    Ok(())
}

/// Bytes and fixed defaults are strings whose code points are the byte
/// values (ISO-8859-1).
fn latin1(s: &str) -> Option<Vec<u8>> {
    s.chars().map(|c| u8::try_from(u32::from(c)).ok()).collect()
}

/// Converts JSON defaults to values. Each field default is converted once;
/// later uses clone the result and are charged its size.
struct Expander<'a> {
    schema: &'a Schema,
    raw: HashMap<FieldKey, &'a JsonValue>,
    /// Converted field defaults and the number of values in each.
    done: HashMap<FieldKey, (Value, usize)>,
    /// Field defaults being converted, to reject defaults that contain
    /// themselves.
    active: HashSet<FieldKey>,
    budget: usize,
}

impl Expander<'_> {
    fn spend(&mut self, values: usize) -> Option<()> {
        self.budget = self.budget.checked_sub(values)?;
        Some(())
    }

    fn field_default(&mut self, key: FieldKey, depth: usize) -> Option<Value> {
        if let Some(size) = self.done.get(&key).map(|(_, size)| *size) {
            self.spend(size)?;
            return self.done.get(&key).map(|(value, _)| value.clone());
        }
        let schema = self.schema;
        let SchemaNode::Record(record) = schema.node(key.0) else {
            return None;
        };
        let field_schema = record.fields.get(key.1)?.schema;
        let json = *self.raw.get(&key)?;
        if !self.active.insert(key) {
            return None;
        }
        let before = self.budget;
        let value = self.from_json(field_schema, json, depth);
        self.active.remove(&key);
        let value = value?;
        self.done.insert(key, (value.clone(), before - self.budget));
        Some(value)
    }

    fn from_json(&mut self, id: NodeId, json: &JsonValue, depth: usize) -> Option<Value> {
        if depth > MAX_DEFAULT_DEPTH {
            return None;
        }
        self.spend(1)?;
        let schema = self.schema;
        let id = schema.resolve_id(id);
        match (schema.node(id), json) {
            (SchemaNode::Null, JsonValue::Null) => Some(Value::Null),
            (SchemaNode::Boolean, JsonValue::Bool(b)) => Some(Value::Boolean(*b)),
            (SchemaNode::Int, JsonValue::Number(n)) => n
                .as_i64()
                .filter(|n| i32::try_from(*n).is_ok())
                .map(Value::Int),
            (SchemaNode::Long, JsonValue::Number(n)) => n.as_i64().map(Value::Int),
            (SchemaNode::Float, JsonValue::Number(n)) => {
                n.as_f64().map(|f| Value::Float(f as f32))
            }
            (SchemaNode::Double, JsonValue::Number(n)) => n.as_f64().map(Value::Double),
            (SchemaNode::Bytes, JsonValue::String(s)) => latin1(s).map(Value::Bytes),
            (SchemaNode::String, JsonValue::String(s)) => Some(Value::String(s.clone())),
            (SchemaNode::Fixed(fixed), JsonValue::String(s)) => latin1(s)
                .filter(|bytes| bytes.len() == fixed.size)
                .map(Value::Fixed),
            (SchemaNode::Enum(e), JsonValue::String(s)) => {
                e.index_of(s).map(|_| Value::Enum(s.clone()))
            }
            (SchemaNode::Array(array), JsonValue::Array(items)) => items
                .iter()
                .map(|item| self.from_json(array.items, item, depth + 1))
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            (SchemaNode::Map(map), JsonValue::Object(entries)) => entries
                .iter()
                .map(|(key, value)| {
                    self.from_json(map.values, value, depth + 1)
                        .map(|v| (key.clone(), v))
                })
                .collect::<Option<Vec<_>>>()
                .map(Value::Map),
            (SchemaNode::Record(record), JsonValue::Object(object)) => record
                .fields
                .iter()
                .map(|field| match object.get(&field.name) {
                    Some(json) => self.from_json(field.schema, json, depth + 1),
                    None => self.field_default((id, field.position), depth + 1),
                })
                .collect::<Option<Vec<_>>>()
                .map(Value::Record),
            // A union default always belongs to the first branch.
            (SchemaNode::Union(union), json) => {
                let first = *union.variants().first()?;
                self.from_json(first, json, depth + 1)
                    .map(|v| Value::Union(0, Box::new(v)))
            }
            _ => None,
        }
    }
}

/// The JSON form of a default, as written in a schema definition.
pub(crate) fn value_to_json(schema: &Schema, id: NodeId, value: &Value) -> JsonValue {
    let id = schema.resolve_id(id);
    match (schema.node(id), value) {
        (_, Value::Null) => JsonValue::Null,
        (_, Value::Boolean(b)) => JsonValue::Bool(*b),
        (_, Value::Int(n)) => JsonValue::from(*n),
        (_, Value::Float(f)) => JsonValue::from(f64::from(*f)),
        (_, Value::Double(d)) => JsonValue::from(*d),
        (_, Value::Bytes(bytes) | Value::Fixed(bytes)) => {
            JsonValue::String(bytes.iter().map(|b| char::from(*b)).collect())
        }
        (_, Value::String(s) | Value::Enum(s)) => JsonValue::String(s.clone()),
        (SchemaNode::Array(array), Value::Array(items)) => JsonValue::Array(
            items
                .iter()
                .map(|item| value_to_json(schema, array.items, item))
                .collect(),
        ),
        (SchemaNode::Map(map), Value::Map(entries)) => JsonValue::Object(
            entries
                .iter()
                .map(|(key, value)| (key.clone(), value_to_json(schema, map.values, value)))
                .collect::<Map<_, _>>(),
        ),
        (SchemaNode::Record(record), Value::Record(values)) => JsonValue::Object(
            record
                .fields
                .iter()
                .zip(values)
                .map(|(field, value)| {
                    (field.name.clone(), value_to_json(schema, field.schema, value))
                })
                .collect::<Map<_, _>>(),
        ),
        (SchemaNode::Union(union), Value::Union(index, inner)) => {
            match union.variants().get(*index as usize) {
                Some(branch) => value_to_json(schema, *branch, inner),
                None => JsonValue::Null,
            }
        }
        _ => JsonValue::Null,
    }
}
