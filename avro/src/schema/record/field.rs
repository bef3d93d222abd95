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

use crate::AvroResult;
use crate::error::Details;
use crate::schema::{Documentation, Name, NodeId, parser::Parser};
use crate::types::Value;
use crate::util::MapHelper;
use crate::validator::validate_record_field_name;
use serde_json::{Map, Value as JsonValue};

#[derive(Clone, Debug, PartialEq)]
pub struct RecordField {
    /// Name of the field.
    pub name: String,
    /// Documentation of the field.
    pub doc: Documentation,
    /// Default value of the field, converted against its schema.
    ///
    /// Used by [`types::Record`](crate::types::Record) for fields left unset.
    pub default: Option<Value>,
    /// Schema of the field.
    pub schema: NodeId,
    /// Position of the field in the list of `field` of its parent `Schema`
    pub position: usize,
}

impl RecordField {
    /// Parse a field definition. The raw `default` is returned next to the
    /// field; it is converted once the whole schema has been built.
    pub(crate) fn parse(
        field: &Map<String, JsonValue>,
        position: usize,
        parser: &mut Parser,
        enclosing_record: &Name,
    ) -> AvroResult<(Self, Option<JsonValue>)> {
        let name = field.name().ok_or(Details::GetNameFieldFromRecord)?;

        validate_record_field_name(&name)?;

        let field_type = field
            .get("type")
            .ok_or_else(|| Details::GetRecordFieldTypeField(name.clone()))?;
        let schema = parser.parse(field_type, enclosing_record.namespace())?;

        Ok((
            RecordField {
                name,
                doc: field.string("doc"),
                default: None,
                schema,
                position,
            },
            field.get("default").cloned(),
        ))
    }
}
