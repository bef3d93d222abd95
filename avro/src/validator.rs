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

//! # Custom name validation
//!
//! By default, names, namespaces, record field names and enum symbols must
//! follow the Avro naming rules: `[A-Za-z_][A-Za-z0-9_]*`, with namespaces and
//! full names made of such parts joined by dots.
//!
//! Schemas produced by other tools are sometimes more lenient. A host can
//! install its own [`NameValidator`] once, before the first schema is parsed:
//!
//! ```
//! # use avro_binary::validator::{NameValidator, set_name_validator};
//! # use regex_lite::Regex;
//! # use std::sync::OnceLock;
//! struct AllowDashesInSymbols;
//!
//! impl NameValidator for AllowDashesInSymbols {
//!     fn symbol_regex(&self) -> &'static Regex {
//!         static SYMBOL_ONCE: OnceLock<Regex> = OnceLock::new();
//!         SYMBOL_ONCE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("Regex is valid"))
//!     }
//! }
//!
//! if set_name_validator(Box::new(AllowDashesInSymbols)).is_err() {
//!     panic!("There was already a name validator configured")
//! }
//! ```
//!
//! **Note**: the validator can be set only once per process. Parsing a schema
//! first installs the default one.

use crate::{AvroResult, error::Details};
use log::debug;
use regex_lite::Regex;
use std::sync::OnceLock;

/// Validates the identifiers appearing in a schema.
///
/// Every method has a default following the Avro rules, so an implementation
/// only overrides the regexes it wants to relax.
pub trait NameValidator: Send + Sync {
    /// Regex for a possibly qualified name. The unqualified part must be
    /// captured by a group called `name`.
    fn name_regex(&self) -> &'static Regex {
        static NAME_ONCE: OnceLock<Regex> = OnceLock::new();
        NAME_ONCE.get_or_init(|| {
            Regex::new(
                r"^((?P<namespace>([A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*)?)\.)?(?P<name>[A-Za-z_][A-Za-z0-9_]*)$",
            )
            .expect("Regex is valid")
        })
    }

    fn namespace_regex(&self) -> &'static Regex {
        static NAMESPACE_ONCE: OnceLock<Regex> = OnceLock::new();
        NAMESPACE_ONCE.get_or_init(|| {
            Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*)?$")
                .expect("Regex is valid")
        })
    }

    fn symbol_regex(&self) -> &'static Regex {
        static SYMBOL_ONCE: OnceLock<Regex> = OnceLock::new();
        SYMBOL_ONCE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Regex is valid"))
    }

    fn field_name_regex(&self) -> &'static Regex {
        static FIELD_NAME_ONCE: OnceLock<Regex> = OnceLock::new();
        FIELD_NAME_ONCE
            .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Regex is valid"))
    }

    /// Validates a possibly qualified name and returns the byte index where
    /// the unqualified part starts.
    fn validate_name(&self, name: &str) -> AvroResult<usize> {
        let regex = self.name_regex();
        regex
            .captures(name)
            .and_then(|caps| caps.name("name"))
            .map(|m| m.start())
            .ok_or_else(|| Details::InvalidSchemaName(name.to_string(), regex.as_str()).into())
    }

    fn validate_namespace(&self, namespace: &str) -> AvroResult<()> {
        let regex = self.namespace_regex();
        if regex.is_match(namespace) {
            Ok(())
        } else {
            Err(Details::InvalidNamespace(namespace.to_string(), regex.as_str()).into())
        }
    }

    fn validate_symbol(&self, symbol: &str) -> AvroResult<()> {
        if self.symbol_regex().is_match(symbol) {
            Ok(())
        } else {
            Err(Details::EnumSymbolName(symbol.to_string()).into())
        }
    }

    fn validate_field_name(&self, field_name: &str) -> AvroResult<()> {
        if self.field_name_regex().is_match(field_name) {
            Ok(())
        } else {
            Err(Details::FieldName(field_name.to_string()).into())
        }
    }
}

/// Follows the Avro naming rules.
struct AvroRules;

impl NameValidator for AvroRules {}

static VALIDATOR_ONCE: OnceLock<Box<dyn NameValidator>> = OnceLock::new();

/// Install a custom validator.
///
/// Returns `Err(validator)` if a validator is already in place, either set by
/// an earlier call or installed by default when a schema was parsed.
pub fn set_name_validator(
    validator: Box<dyn NameValidator>,
) -> Result<(), Box<dyn NameValidator>> {
    debug!("Setting a custom name validator.");
    VALIDATOR_ONCE.set(validator)
}

fn validator() -> &'static dyn NameValidator {
    VALIDATOR_ONCE
        .get_or_init(|| {
            debug!("Going to use the default name validator.");
            Box::new(AvroRules)
        })
        .as_ref()
}

pub(crate) fn validate_schema_name(name: &str) -> AvroResult<usize> {
    validator().validate_name(name)
}

pub(crate) fn validate_namespace(namespace: &str) -> AvroResult<()> {
    validator().validate_namespace(namespace)
}

pub(crate) fn validate_enum_symbol_name(symbol: &str) -> AvroResult<()> {
    validator().validate_symbol(symbol)
}

pub(crate) fn validate_record_field_name(field_name: &str) -> AvroResult<()> {
    validator().validate_field_name(field_name)
}
