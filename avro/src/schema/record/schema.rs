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

use crate::schema::{Documentation, Name, RecordField};
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};

#[derive(Clone, PartialEq)]
pub struct RecordSchema {
    /// The name of the schema
    pub name: Name,
    /// The documentation of the schema
    pub doc: Documentation,
    /// The fields, in declaration (and wire) order
    pub fields: Vec<RecordField>,
    /// The `lookup` table maps field names to their position in the `Vec`
    /// of `fields`.
    pub lookup: BTreeMap<String, usize>,
}

impl RecordSchema {
    pub(crate) fn new(name: Name, doc: Documentation, fields: Vec<RecordField>) -> Self {
        let lookup = fields
            .iter()
            .map(|field| (field.name.clone(), field.position))
            .collect();
        Self {
            name,
            doc,
            fields,
            lookup,
        }
    }

    pub fn field(&self, name: &str) -> Option<&RecordField> {
        self.lookup.get(name).map(|position| &self.fields[*position])
    }
}

impl Debug for RecordSchema {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("RecordSchema");
        debug.field("name", &self.name);
        if let Some(doc) = &self.doc {
            debug.field("doc", doc);
        }
        debug.field("fields", &self.fields);
        if self.doc.is_none() {
            debug.finish_non_exhaustive()
        } else {
            debug.finish()
        }
    }
}
