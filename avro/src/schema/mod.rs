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

//! Logic for parsing and interacting with schemas in Avro format.
//!
//! A [`Schema`] is an arena of [`SchemaNode`]s addressed by [`NodeId`].
//! Named types (`record`, `enum`, `fixed`) are defined once and every later
//! use of their name is a [`SchemaNode::Ref`] holding the id of the
//! definition, so recursive records never form an ownership cycle.

mod default;
mod name;
mod parser;
mod record;
mod union;

pub use name::{Name, Namespace, NamespaceRef};
pub use record::{RecordField, RecordSchema};
pub use union::UnionSchema;

use crate::{AvroResult, error::Details, types::Value, util::check_depth};
use parser::Parser;
use serde::{
    Serialize, Serializer,
    ser::{SerializeMap, SerializeSeq},
};
use serde_json::Value as JsonValue;
use std::{collections::HashMap, sync::OnceLock};
use strum_macros::EnumDiscriminants;

/// Represents documentation for complex Avro schemas.
pub type Documentation = Option<String>;

/// Handle of a node inside a [`Schema`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One node of a schema tree.
#[derive(Clone, Debug, PartialEq, EnumDiscriminants)]
#[strum_discriminants(name(SchemaKind), derive(Hash, Ord, PartialOrd))]
pub enum SchemaNode {
    /// A `null` Avro schema.
    Null,
    /// A `boolean` Avro schema.
    Boolean,
    /// An `int` Avro schema.
    Int,
    /// A `long` Avro schema.
    Long,
    /// A `float` Avro schema.
    Float,
    /// A `double` Avro schema.
    Double,
    /// A `bytes` Avro schema.
    Bytes,
    /// A `string` Avro schema.
    String,
    /// A `fixed` Avro schema.
    Fixed(FixedSchema),
    /// An `enum` Avro schema.
    Enum(EnumSchema),
    /// An `array` Avro schema.
    Array(ArraySchema),
    /// A `map` Avro schema. Keys are always strings.
    Map(MapSchema),
    /// A `record` Avro schema.
    Record(RecordSchema),
    /// A `union` Avro schema.
    Union(UnionSchema),
    /// A use of a named type defined elsewhere in the schema.
    Ref { name: Name, id: NodeId },
}

impl SchemaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SchemaKind::Null => "null",
            SchemaKind::Boolean => "boolean",
            SchemaKind::Int => "int",
            SchemaKind::Long => "long",
            SchemaKind::Float => "float",
            SchemaKind::Double => "double",
            SchemaKind::Bytes => "bytes",
            SchemaKind::String => "string",
            SchemaKind::Fixed => "fixed",
            SchemaKind::Enum => "enum",
            SchemaKind::Array => "array",
            SchemaKind::Map => "map",
            SchemaKind::Record => "record",
            SchemaKind::Union => "union",
            SchemaKind::Ref => "ref",
        }
    }

    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            SchemaKind::Null
                | SchemaKind::Boolean
                | SchemaKind::Int
                | SchemaKind::Long
                | SchemaKind::Double
                | SchemaKind::Float
                | SchemaKind::Bytes
                | SchemaKind::String,
        )
    }

    pub fn is_named(self) -> bool {
        matches!(
            self,
            SchemaKind::Record | SchemaKind::Enum | SchemaKind::Fixed | SchemaKind::Ref
        )
    }
}

impl SchemaNode {
    pub fn kind(&self) -> SchemaKind {
        SchemaKind::from(self)
    }

    /// The name of a named type or of a reference to one.
    pub fn name(&self) -> Option<&Name> {
        match self {
            SchemaNode::Record(RecordSchema { name, .. })
            | SchemaNode::Enum(EnumSchema { name, .. })
            | SchemaNode::Fixed(FixedSchema { name, .. })
            | SchemaNode::Ref { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// A description of a Fixed schema.
#[derive(Clone, Debug, PartialEq)]
pub struct FixedSchema {
    pub name: Name,
    pub doc: Documentation,
    /// Number of bytes of every value.
    pub size: usize,
}

/// A description of an Enum schema.
#[derive(Clone, Debug, PartialEq)]
pub struct EnumSchema {
    pub name: Name,
    pub doc: Documentation,
    /// The symbols, in wire index order.
    pub symbols: Vec<String>,
}

impl EnumSchema {
    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ArraySchema {
    pub items: NodeId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MapSchema {
    pub values: NodeId,
}

/// An immutable, parsed Avro schema.
///
/// Build one with [`Schema::parse`] or [`Schema::parse_str`]; it can then be
/// shared between threads and used for any number of encode and decode calls.
#[derive(Clone, Debug, PartialEq)]
pub struct Schema {
    nodes: Vec<SchemaNode>,
    names: HashMap<Name, NodeId>,
    root: NodeId,
}

impl Schema {
    /// Build a schema from an already parsed JSON tree.
    pub fn parse(value: &JsonValue) -> AvroResult<Schema> {
        Parser::default().parse_root(value)
    }

    /// Build a schema from its JSON text.
    pub fn parse_str(input: &str) -> AvroResult<Schema> {
        let value: JsonValue = serde_json::from_str(input).map_err(Details::ParseSchemaJson)?;
        Self::parse(&value)
    }

    pub(crate) fn from_parts(
        nodes: Vec<SchemaNode>,
        names: HashMap<Name, NodeId>,
        root: NodeId,
    ) -> Self {
        Self { nodes, names, root }
    }

    /// The map of string to bytes every container header is encoded with.
    pub(crate) fn metadata() -> &'static Schema {
        static METADATA_ONCE: OnceLock<Schema> = OnceLock::new();
        METADATA_ONCE.get_or_init(|| Schema {
            nodes: vec![
                SchemaNode::Map(MapSchema { values: NodeId(1) }),
                SchemaNode::Bytes,
            ],
            names: HashMap::new(),
            root: NodeId(0),
        })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The node behind `id`.
    ///
    /// # Panics
    /// If `id` was not handed out by this schema.
    pub fn node(&self, id: NodeId) -> &SchemaNode {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut SchemaNode {
        &mut self.nodes[id.0]
    }

    /// The id of the definition `id` stands for: itself, unless it is a
    /// reference to a named type.
    pub fn resolve_id(&self, id: NodeId) -> NodeId {
        match self.node(id) {
            SchemaNode::Ref { id: target, .. } => *target,
            _ => id,
        }
    }

    /// Like [`node`](Self::node), following a reference to its definition.
    pub fn resolve(&self, id: NodeId) -> &SchemaNode {
        self.node(self.resolve_id(id))
    }

    /// The resolved root node.
    pub fn root_node(&self) -> &SchemaNode {
        self.resolve(self.root)
    }

    /// The kind of the resolved root node.
    pub fn kind(&self) -> SchemaKind {
        self.root_node().kind()
    }

    /// Find a named type by its full name.
    pub fn lookup(&self, fullname: &str) -> Option<NodeId> {
        let name = Name::new(fullname).ok()?;
        self.names.get(&name).copied()
    }

    /// All named types defined in this schema.
    pub fn named(&self) -> impl Iterator<Item = (&Name, NodeId)> {
        self.names.iter().map(|(name, id)| (name, *id))
    }

    /// Returns whether `value` conforms to the root of this schema.
    pub fn validate(&self, value: &Value) -> bool {
        self.validate_node(self.root, value)
    }

    /// Returns whether `value` conforms to node `id`.
    ///
    /// Values nested deeper than [`max_nesting_depth`](crate::util::max_nesting_depth)
    /// do not conform.
    pub fn validate_node(&self, id: NodeId, value: &Value) -> bool {
        self.validate_at(id, value, 0)
    }

    fn validate_at(&self, id: NodeId, value: &Value, depth: usize) -> bool {
        if check_depth(depth).is_err() {
            return false;
        }
        let depth = depth + 1;
        match (self.resolve(id), value) {
            (SchemaNode::Null, Value::Null) => true,
            (SchemaNode::Boolean, Value::Boolean(_)) => true,
            (SchemaNode::Int, Value::Int(n)) => i32::try_from(*n).is_ok(),
            (SchemaNode::Long, Value::Int(_)) => true,
            (SchemaNode::Float, Value::Float(_)) => true,
            (SchemaNode::Double, Value::Double(_) | Value::Float(_)) => true,
            (SchemaNode::Bytes, Value::Bytes(_)) => true,
            (SchemaNode::String, Value::String(_)) => true,
            (SchemaNode::Fixed(fixed), Value::Fixed(bytes) | Value::Bytes(bytes)) => {
                bytes.len() == fixed.size
            }
            (SchemaNode::Enum(schema), Value::Enum(symbol) | Value::String(symbol)) => {
                schema.index_of(symbol).is_some()
            }
            (SchemaNode::Array(array), Value::Array(items)) => items
                .iter()
                .all(|item| self.validate_at(array.items, item, depth)),
            (SchemaNode::Map(map), Value::Map(entries)) => entries
                .iter()
                .all(|(_, value)| self.validate_at(map.values, value, depth)),
            (SchemaNode::Record(record), Value::Record(values)) => {
                values.len() == record.fields.len()
                    && record
                        .fields
                        .iter()
                        .zip(values)
                        .all(|(field, value)| self.validate_at(field.schema, value, depth))
            }
            (SchemaNode::Union(union), Value::Union(index, inner)) => union
                .variants()
                .get(*index as usize)
                .is_some_and(|branch| self.validate_at(*branch, inner, depth)),
            (SchemaNode::Union(union), value) => union
                .variants()
                .iter()
                .any(|branch| self.validate_at(*branch, value, depth)),
            _ => false,
        }
    }

    /// The schema as a JSON tree. Named types are written out in full where
    /// they are defined and by full name everywhere else.
    pub fn to_json(&self) -> AvroResult<JsonValue> {
        serde_json::to_value(self).map_err(|e| Details::ConvertJsonToString(e).into())
    }

    /// The schema as JSON text, as embedded in container headers. Unlike
    /// [`canonical_form`](Self::canonical_form) this keeps docs and defaults.
    pub fn to_json_string(&self) -> AvroResult<String> {
        serde_json::to_string(self).map_err(|e| Details::ConvertJsonToString(e).into())
    }

    /// Converts `self` into its [Parsing Canonical Form]: full names, no
    /// docs, aliases or defaults, attributes in the order `name`, `type`,
    /// `fields`, `symbols`, `items`, `values`, `size`, and no whitespace.
    ///
    /// [Parsing Canonical Form]:
    /// https://avro.apache.org/docs/++version++/specification/#parsing-canonical-form-for-schemas
    pub fn canonical_form(&self) -> AvroResult<String> {
        serde_json::to_string(&CanonicalView {
            schema: self,
            id: self.root,
        })
        .map_err(|e| Details::ConvertJsonToString(e).into())
    }

    fn view(&self, id: NodeId) -> NodeView<'_> {
        NodeView { schema: self, id }
    }
}

impl std::str::FromStr for Schema {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

impl Serialize for Schema {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.view(self.root).serialize(serializer)
    }
}

/// Serializes one node of a schema.
struct NodeView<'a> {
    schema: &'a Schema,
    id: NodeId,
}

impl Serialize for NodeView<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let schema = self.schema;
        match schema.node(self.id) {
            SchemaNode::Ref { name, .. } => serializer.serialize_str(name.fullname()),
            SchemaNode::Null => serializer.serialize_str("null"),
            SchemaNode::Boolean => serializer.serialize_str("boolean"),
            SchemaNode::Int => serializer.serialize_str("int"),
            SchemaNode::Long => serializer.serialize_str("long"),
            SchemaNode::Float => serializer.serialize_str("float"),
            SchemaNode::Double => serializer.serialize_str("double"),
            SchemaNode::Bytes => serializer.serialize_str("bytes"),
            SchemaNode::String => serializer.serialize_str("string"),
            SchemaNode::Array(ArraySchema { items }) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "array")?;
                map.serialize_entry("items", &schema.view(*items))?;
                map.end()
            }
            SchemaNode::Map(MapSchema { values }) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "map")?;
                map.serialize_entry("values", &schema.view(*values))?;
                map.end()
            }
            SchemaNode::Union(union) => {
                let variants = union.variants();
                let mut seq = serializer.serialize_seq(Some(variants.len()))?;
                for variant in variants {
                    seq.serialize_element(&schema.view(*variant))?;
                }
                seq.end()
            }
            SchemaNode::Record(RecordSchema {
                name, doc, fields, ..
            }) => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("type", "record")?;
                map.serialize_entry("name", name.fullname())?;
                if let Some(doc) = doc {
                    map.serialize_entry("doc", doc)?;
                }
                let fields: Vec<FieldView> = fields
                    .iter()
                    .map(|field| FieldView { schema, field })
                    .collect();
                map.serialize_entry("fields", &fields)?;
                map.end()
            }
            SchemaNode::Enum(EnumSchema { name, doc, symbols }) => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("type", "enum")?;
                map.serialize_entry("name", name.fullname())?;
                if let Some(doc) = doc {
                    map.serialize_entry("doc", doc)?;
                }
                map.serialize_entry("symbols", symbols)?;
                map.end()
            }
            SchemaNode::Fixed(FixedSchema { name, doc, size }) => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("type", "fixed")?;
                map.serialize_entry("name", name.fullname())?;
                if let Some(doc) = doc {
                    map.serialize_entry("doc", doc)?;
                }
                map.serialize_entry("size", size)?;
                map.end()
            }
        }
    }
}

/// Serializes one node of a schema in Parsing Canonical Form.
struct CanonicalView<'a> {
    schema: &'a Schema,
    id: NodeId,
}

impl CanonicalView<'_> {
    fn of(&self, id: NodeId) -> Self {
        CanonicalView {
            schema: self.schema,
            id,
        }
    }
}

impl Serialize for CanonicalView<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.schema.node(self.id) {
            SchemaNode::Array(ArraySchema { items }) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "array")?;
                map.serialize_entry("items", &self.of(*items))?;
                map.end()
            }
            SchemaNode::Map(MapSchema { values }) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "map")?;
                map.serialize_entry("values", &self.of(*values))?;
                map.end()
            }
            SchemaNode::Union(union) => {
                let variants = union.variants();
                let mut seq = serializer.serialize_seq(Some(variants.len()))?;
                for variant in variants {
                    seq.serialize_element(&self.of(*variant))?;
                }
                seq.end()
            }
            SchemaNode::Record(RecordSchema { name, fields, .. }) => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("name", name.fullname())?;
                map.serialize_entry("type", "record")?;
                let fields: Vec<CanonicalField> = fields
                    .iter()
                    .map(|field| CanonicalField {
                        name: &field.name,
                        schema: self.of(field.schema),
                    })
                    .collect();
                map.serialize_entry("fields", &fields)?;
                map.end()
            }
            SchemaNode::Enum(EnumSchema { name, symbols, .. }) => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("name", name.fullname())?;
                map.serialize_entry("type", "enum")?;
                map.serialize_entry("symbols", symbols)?;
                map.end()
            }
            SchemaNode::Fixed(FixedSchema { name, size, .. }) => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("name", name.fullname())?;
                map.serialize_entry("type", "fixed")?;
                map.serialize_entry("size", size)?;
                map.end()
            }
            // primitives and references read the same in both forms
            _ => self.schema.view(self.id).serialize(serializer),
        }
    }
}

struct CanonicalField<'a> {
    name: &'a str,
    schema: CanonicalView<'a>,
}

impl Serialize for CanonicalField<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("name", self.name)?;
        map.serialize_entry("type", &self.schema)?;
        map.end()
    }
}

struct FieldView<'a> {
    schema: &'a Schema,
    field: &'a RecordField,
}

impl Serialize for FieldView<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let field = self.field;
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("name", &field.name)?;
        if let Some(doc) = &field.doc {
            map.serialize_entry("doc", doc)?;
        }
        map.serialize_entry("type", &self.schema.view(field.schema))?;
        if let Some(default) = &field.default {
            let json = default::value_to_json(self.schema, field.schema, default);
            map.serialize_entry("default", &json)?;
        }
        map.end()
    }
}
