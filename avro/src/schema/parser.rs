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

use crate::error::Details;
use crate::schema::{
    ArraySchema, EnumSchema, FixedSchema, MapSchema, Name, NamespaceRef, NodeId, RecordField,
    RecordSchema, Schema, SchemaNode, UnionSchema,
    default::{self, PendingDefault},
};
use crate::util::MapHelper;
use crate::validator::validate_enum_symbol_name;
use crate::{AvroResult, Error};
use log::{debug, warn};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// Builds the node arena of a [`Schema`].
#[derive(Default)]
pub(crate) struct Parser {
    nodes: Vec<SchemaNode>,
    /// Named types, registered before their children are parsed so that a
    /// field can refer to its own record.
    names: HashMap<Name, NodeId>,
    /// Field defaults, converted once every named type is complete.
    defaults: Vec<PendingDefault>,
}

impl Parser {
    pub(crate) fn parse_root(mut self, value: &Value) -> AvroResult<Schema> {
        let root = self.parse(value, None)?;
        let mut schema = Schema::from_parts(self.nodes, self.names, root);
        default::resolve_defaults(&mut schema, self.defaults)?;
        Ok(schema)
    }

    fn push(&mut self, node: SchemaNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Reserve a node for a named type and register its name.
    ///
    /// The placeholder is replaced once the definition is complete.
    fn register_named(&mut self, name: &Name) -> AvroResult<NodeId> {
        if self.names.contains_key(name) {
            return Err(Details::NameCollision(name.fullname().to_string()).into());
        }
        let id = self.push(SchemaNode::Null);
        self.names.insert(name.clone(), id);
        Ok(id)
    }

    /// Parse a JSON schema into a node, returning its id.
    pub(crate) fn parse(
        &mut self,
        value: &Value,
        enclosing_namespace: NamespaceRef,
    ) -> AvroResult<NodeId> {
        match *value {
            Value::String(ref t) => self.parse_known_schema(t.as_str(), enclosing_namespace),
            Value::Object(ref data) => self.parse_complex(data, enclosing_namespace),
            Value::Array(ref data) => self.parse_union(data, enclosing_namespace),
            _ => Err(Details::ParseSchemaFromValidJson.into()),
        }
    }

    /// Parse a string as a primitive type or a reference to a named type.
    fn parse_known_schema(
        &mut self,
        name: &str,
        enclosing_namespace: NamespaceRef,
    ) -> AvroResult<NodeId> {
        let node = match name {
            "null" => SchemaNode::Null,
            "boolean" => SchemaNode::Boolean,
            "int" => SchemaNode::Int,
            "long" => SchemaNode::Long,
            "double" => SchemaNode::Double,
            "float" => SchemaNode::Float,
            "bytes" => SchemaNode::Bytes,
            "string" => SchemaNode::String,
            "record" | "error" | "enum" | "fixed" | "array" | "map" => {
                return Err(Details::ComplexTypeAsName(name.to_string()).into());
            }
            _ => return self.fetch_schema_ref(name, enclosing_namespace),
        };
        Ok(self.push(node))
    }

    /// Resolve a name to an already registered named type.
    ///
    /// The name is first qualified with the enclosing namespace, then tried
    /// as written. Only names registered earlier in the definition (including
    /// the records currently being parsed) can be referenced.
    fn fetch_schema_ref(
        &mut self,
        name: &str,
        enclosing_namespace: NamespaceRef,
    ) -> AvroResult<NodeId> {
        let qualified = Name::new_with_enclosing_namespace(name, enclosing_namespace)?;
        if let Some(id) = self.names.get(&qualified).copied() {
            return Ok(self.push(SchemaNode::Ref {
                name: qualified,
                id,
            }));
        }
        let as_written = Name::new(name)?;
        match self.names.get(&as_written).copied() {
            Some(id) => Ok(self.push(SchemaNode::Ref {
                name: as_written,
                id,
            })),
            None => Err(Details::UnknownType(qualified.to_string()).into()),
        }
    }

    /// Parse a JSON object representing a complex Avro type.
    ///
    /// Avro supports "recursive" definition of types.
    /// e.g: `{"type": {"type": "string"}}`
    fn parse_complex(
        &mut self,
        complex: &Map<String, Value>,
        enclosing_namespace: NamespaceRef,
    ) -> AvroResult<NodeId> {
        match complex.get("type") {
            Some(Value::String(t)) => match t.as_str() {
                "record" | "error" => self.parse_record(complex, enclosing_namespace),
                "enum" => self.parse_enum(complex, enclosing_namespace),
                "array" => self.parse_array(complex, enclosing_namespace),
                "map" => self.parse_map(complex, enclosing_namespace),
                "fixed" => self.parse_fixed(complex, enclosing_namespace),
                other => self.parse_known_schema(other, enclosing_namespace),
            },
            Some(Value::Object(data)) => self.parse_complex(data, enclosing_namespace),
            Some(Value::Array(variants)) => self.parse_union(variants, enclosing_namespace),
            Some(unknown) => Err(Details::GetComplexType(unknown.clone()).into()),
            None => Err(Details::GetComplexTypeField.into()),
        }
    }

    /// A named definition without its body, e.g. `{"type": "record", "name":
    /// "Node"}`, is accepted as a reference to a type already registered.
    fn get_already_seen_schema(
        &mut self,
        complex: &Map<String, Value>,
        enclosing_namespace: NamespaceRef,
    ) -> Option<NodeId> {
        let name = Name::parse(complex, enclosing_namespace).ok()?;
        let id = *self.names.get(&name)?;
        Some(self.push(SchemaNode::Ref { name, id }))
    }

    fn parse_record(
        &mut self,
        complex: &Map<String, Value>,
        enclosing_namespace: NamespaceRef,
    ) -> AvroResult<NodeId> {
        let fields_opt = complex.get("fields");

        if fields_opt.is_none()
            && let Some(seen) = self.get_already_seen_schema(complex, enclosing_namespace)
        {
            return Ok(seen);
        }

        let fully_qualified_name = Name::parse(complex, enclosing_namespace)?;
        let fields_json = fields_opt
            .and_then(|fields| fields.as_array())
            .ok_or(Details::GetRecordFieldsJson)?;

        let id = self.register_named(&fully_qualified_name)?;

        debug!("Going to parse record schema: {:?}", &fully_qualified_name);

        let mut fields = Vec::with_capacity(fields_json.len());
        let mut field_names = HashSet::with_capacity(fields_json.len());
        for (position, field) in fields_json.iter().enumerate() {
            let field = field.as_object().ok_or(Details::GetNameFieldFromRecord)?;
            let (field, default) =
                RecordField::parse(field, position, self, &fully_qualified_name)?;
            if !field_names.insert(field.name.clone()) {
                return Err(Details::FieldNameDuplicate(field.name).into());
            }
            if let Some(json) = default {
                self.defaults.push(PendingDefault {
                    record: id,
                    field: position,
                    json,
                });
            }
            fields.push(field);
        }

        self.nodes[id.0] = SchemaNode::Record(RecordSchema::new(
            fully_qualified_name,
            complex.string("doc"),
            fields,
        ));
        Ok(id)
    }

    fn parse_enum(
        &mut self,
        complex: &Map<String, Value>,
        enclosing_namespace: NamespaceRef,
    ) -> AvroResult<NodeId> {
        let symbols_opt = complex.get("symbols");

        if symbols_opt.is_none()
            && let Some(seen) = self.get_already_seen_schema(complex, enclosing_namespace)
        {
            return Ok(seen);
        }

        let fully_qualified_name = Name::parse(complex, enclosing_namespace)?;

        let symbols: Vec<String> = symbols_opt
            .and_then(|v| v.as_array())
            .ok_or_else(|| Error::from(Details::GetEnumSymbolsField))
            .and_then(|symbols| {
                symbols
                    .iter()
                    .map(|symbol| symbol.as_str().map(|s| s.to_string()))
                    .collect::<Option<_>>()
                    .ok_or_else(|| Error::from(Details::GetEnumSymbols))
            })?;

        if symbols.is_empty() {
            return Err(Details::EmptyEnum.into());
        }

        let mut existing_symbols: HashSet<&String> = HashSet::with_capacity(symbols.len());
        for symbol in symbols.iter() {
            validate_enum_symbol_name(symbol)?;

            if !existing_symbols.insert(symbol) {
                return Err(Details::EnumSymbolDuplicate(symbol.to_string()).into());
            }
        }

        let id = self.register_named(&fully_qualified_name)?;
        self.nodes[id.0] = SchemaNode::Enum(EnumSchema {
            name: fully_qualified_name,
            doc: complex.string("doc"),
            symbols,
        });
        Ok(id)
    }

    fn parse_array(
        &mut self,
        complex: &Map<String, Value>,
        enclosing_namespace: NamespaceRef,
    ) -> AvroResult<NodeId> {
        let items = complex
            .get("items")
            .ok_or_else(|| Details::GetArrayItemsField.into())
            .and_then(|items| self.parse(items, enclosing_namespace))?;
        Ok(self.push(SchemaNode::Array(ArraySchema { items })))
    }

    fn parse_map(
        &mut self,
        complex: &Map<String, Value>,
        enclosing_namespace: NamespaceRef,
    ) -> AvroResult<NodeId> {
        let values = complex
            .get("values")
            .ok_or_else(|| Details::GetMapValuesField.into())
            .and_then(|values| self.parse(values, enclosing_namespace))?;
        Ok(self.push(SchemaNode::Map(MapSchema { values })))
    }

    fn parse_union(
        &mut self,
        items: &[Value],
        enclosing_namespace: NamespaceRef,
    ) -> AvroResult<NodeId> {
        let variants = items
            .iter()
            .map(|v| self.parse(v, enclosing_namespace))
            .collect::<Result<Vec<_>, _>>()?;
        if variants.len() == 1 {
            warn!(
                "Union schema with just one member! Consider dropping the union! \
                Please enable debug logging to find out which Record schema \
                declares the union with 'RUST_LOG=avro_binary::schema=debug'."
            );
        }
        let union = UnionSchema::new(variants, &self.nodes)?;
        Ok(self.push(SchemaNode::Union(union)))
    }

    fn parse_fixed(
        &mut self,
        complex: &Map<String, Value>,
        enclosing_namespace: NamespaceRef,
    ) -> AvroResult<NodeId> {
        let size_opt = complex.get("size");
        if size_opt.is_none()
            && let Some(seen) = self.get_already_seen_schema(complex, enclosing_namespace)
        {
            return Ok(seen);
        }

        let size = match size_opt {
            Some(size) => size
                .as_u64()
                .and_then(|size| usize::try_from(size).ok())
                .ok_or_else(|| Details::GetFixedSizeFieldPositive(size.clone())),
            None => Err(Details::GetFixedSizeField),
        }?;

        let fully_qualified_name = Name::parse(complex, enclosing_namespace)?;
        let id = self.register_named(&fully_qualified_name)?;
        self.nodes[id.0] = SchemaNode::Fixed(FixedSchema {
            name: fully_qualified_name,
            doc: complex.string("doc"),
            size,
        });
        Ok(id)
    }
}
