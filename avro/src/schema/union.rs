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
use crate::schema::{Name, NodeId, Schema, SchemaKind, SchemaNode};
use crate::types::Value;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub struct UnionSchema {
    /// The branches of this union, in wire index order.
    pub(crate) variants: Vec<NodeId>,
}

/// What makes two union branches indistinguishable.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum BranchKey<'a> {
    Kind(SchemaKind),
    Named(&'a Name),
}

impl UnionSchema {
    /// Creates a new UnionSchema over already parsed `variants`.
    ///
    /// # Errors
    /// Will return an error if there are no variants, if a variant is itself a
    /// union, or if two variants share an unnamed kind or a name.
    pub(crate) fn new(variants: Vec<NodeId>, nodes: &[SchemaNode]) -> AvroResult<Self> {
        if variants.is_empty() {
            return Err(Details::EmptyUnion.into());
        }
        let mut seen = BTreeSet::new();
        for id in &variants {
            let node = &nodes[id.0];
            let key = match node.name() {
                Some(name) => BranchKey::Named(name),
                None if node.kind() == SchemaKind::Union => {
                    return Err(Details::GetNestedUnion.into());
                }
                None => BranchKey::Kind(node.kind()),
            };
            if !seen.insert(key) {
                let label = match node.name() {
                    Some(name) => name.fullname().to_string(),
                    None => node.kind().as_str().to_string(),
                };
                return Err(Details::GetUnionDuplicate(label).into());
            }
        }
        Ok(UnionSchema { variants })
    }

    /// Returns a slice to all variants of this schema.
    pub fn variants(&self) -> &[NodeId] {
        &self.variants
    }

    /// Returns true if any of the variants of this `UnionSchema` is `null`.
    pub fn is_nullable(&self, schema: &Schema) -> bool {
        self.variants
            .iter()
            .any(|id| matches!(schema.node(*id), SchemaNode::Null))
    }

    /// The first branch `value` conforms to, with its index.
    pub fn find_branch(&self, schema: &Schema, value: &Value) -> Option<(u32, NodeId)> {
        self.variants
            .iter()
            .position(|id| schema.validate_node(*id, value))
            .map(|index| (index as u32, self.variants[index]))
    }
}
