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

//! Logic handling the intermediate representation of Avro values.

use crate::{
    AvroResult, Error,
    error::EncodeError,
    schema::{NodeId, RecordSchema, Schema, SchemaNode},
};
use strum_macros::EnumDiscriminants;

/// Represents any valid Avro value.
///
/// `int` and `long` both decode to [`Value::Int`]; the schema decides the
/// width on the wire.
#[derive(Clone, Debug, PartialEq, EnumDiscriminants)]
#[strum_discriminants(name(ValueKind), derive(Hash, Ord, PartialOrd))]
pub enum Value {
    /// A `null` Avro value.
    Null,
    /// A `boolean` Avro value.
    Boolean(bool),
    /// An `int` or `long` Avro value.
    Int(i64),
    /// A `float` Avro value.
    Float(f32),
    /// A `double` Avro value.
    Double(f64),
    /// A `bytes` Avro value.
    Bytes(Vec<u8>),
    /// A `string` Avro value.
    String(String),
    /// A `fixed` Avro value, exactly as long as its schema declares.
    Fixed(Vec<u8>),
    /// An `enum` Avro value, by symbol.
    Enum(String),
    /// An `array` Avro value.
    Array(Vec<Value>),
    /// A `map` Avro value, in wire order.
    Map(Vec<(String, Value)>),
    /// A `record` Avro value, one entry per field in declaration order.
    Record(Vec<Value>),
    /// A `union` Avro value: the branch index and the value of that branch.
    Union(u32, Box<Value>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        ValueKind::from(self)
    }

    /// Strip any number of union wrappers.
    pub fn unwrap_union(&self) -> &Value {
        match self {
            Value::Union(_, inner) => inner.unwrap_union(),
            other => other,
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Self::Null
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_owned())
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::Array(value)
    }
}

/// Utility for building a [`Value::Record`] by field name.
///
/// Fields that are never [`put`](Self::put) take their schema default.
///
/// ```
/// # use avro_binary::{Schema, types::{Record, Value}};
/// let schema = Schema::parse_str(r#"{
///     "type": "record",
///     "name": "Point",
///     "fields": [
///         {"name": "x", "type": "long"},
///         {"name": "y", "type": "long", "default": 0}
///     ]
/// }"#)?;
/// let mut record = Record::new(&schema).expect("root is a record");
/// record.put("x", 5);
/// assert_eq!(record.into_value()?, Value::Record(vec![Value::Int(5), Value::Int(0)]));
/// # Ok::<(), avro_binary::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Record<'a> {
    schema: &'a RecordSchema,
    fields: Vec<Option<Value>>,
}

impl<'a> Record<'a> {
    /// Create a `Record` for the root of `schema`.
    ///
    /// Returns `None` if the root is not a record.
    pub fn new(schema: &'a Schema) -> Option<Record<'a>> {
        Self::for_node(schema, schema.root())
    }

    /// Create a `Record` for any record node of `schema`.
    pub fn for_node(schema: &'a Schema, id: NodeId) -> Option<Record<'a>> {
        match schema.resolve(id) {
            SchemaNode::Record(record) => Some(Record {
                schema: record,
                fields: vec![None; record.fields.len()],
            }),
            _ => None,
        }
    }

    /// Set the value of field `field`. Unknown field names are ignored.
    pub fn put<V>(&mut self, field: &str, value: V)
    where
        V: Into<Value>,
    {
        if let Some(&position) = self.schema.lookup.get(field) {
            self.fields[position] = Some(value.into());
        }
    }

    /// Get the value of field `field`, if it was set.
    pub fn get(&self, field: &str) -> Option<&Value> {
        let position = *self.schema.lookup.get(field)?;
        self.fields[position].as_ref()
    }

    /// Build the record value, filling unset fields from their defaults.
    pub fn into_value(self) -> AvroResult<Value> {
        self.schema
            .fields
            .iter()
            .zip(self.fields)
            .map(|(field, value)| {
                value.or_else(|| field.default.clone()).ok_or_else(|| {
                    Error::encode(EncodeError::MissingField(field.name.clone()))
                })
            })
            .collect::<AvroResult<Vec<_>>>()
            .map(Value::Record)
    }
}
