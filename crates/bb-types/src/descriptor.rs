// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Fact type descriptors and the field schema they declare.

use crate::value::FieldKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declaration for a single field within a fact type's schema.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FieldDecl {
    /// The shape values in this field must take.
    pub kind: FieldKind,
    /// Whether the field must be present on every instance.
    pub required: bool,
    /// Default value used when the field is absent and not required.
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    /// Closed set of acceptable values, if the field is an enumeration.
    #[serde(default)]
    pub allowed_values: Option<Vec<serde_json::Value>>,
    /// Human-readable description surfaced by `--info`/help tooling.
    #[serde(default)]
    pub help: String,
}

/// `{name, groups, field_schema}` — a concrete fact type's shape.
///
/// Invariants
/// - `name` is globally unique across the registry it is registered into.
/// - No key of `field_schema` is a reserved name ([`crate::reserved::is_reserved`]).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FactTypeDescriptor {
    /// Concrete type name.
    pub name: String,
    /// Fact groups this type is a member of.
    pub groups: Vec<String>,
    /// Declared fields, keyed by name.
    pub field_schema: BTreeMap<String, FieldDecl>,
}

impl FactTypeDescriptor {
    /// Construct a descriptor with no declared fields, for types whose only
    /// content is their relations (e.g. marker facts).
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: Vec::new(),
            field_schema: BTreeMap::new(),
        }
    }

    /// Builder-style group addition.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    /// Builder-style field addition.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, decl: FieldDecl) -> Self {
        self.field_schema.insert(name.into(), decl);
        self
    }
}
