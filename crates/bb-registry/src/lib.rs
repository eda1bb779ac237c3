// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Fact type registry (`spec.md` §4.1).
//!
//! Registers fact classes under a name and zero or more group names, expands
//! group names to concrete types at subscribe/interest time, and enforces
//! the reserved-name API surface.

use bb_types::{is_reserved, FactTypeDescriptor};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;
use thiserror::Error;

/// Errors raised while registering or querying the registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A distinct descriptor was already registered under this name.
    #[error("duplicate fact type: {0}")]
    Duplicate(String),
    /// A field declaration uses a name from the reserved API surface.
    #[error("reserved field name {field} on fact type {fact_type}")]
    ReservedName {
        /// The offending fact type.
        fact_type: String,
        /// The reserved field name used.
        field: String,
    },
    /// `expand` was called on a name that is neither a concrete type nor a
    /// registered group.
    #[error("unknown fact type or group: {0}")]
    UnknownType(String),
}

impl RegistryError {
    /// Structured diagnostic view (`spec.md` §7).
    pub fn diagnostic(&self) -> bb_config::Diagnostic {
        let kind = match self {
            Self::Duplicate(_) => "Duplicate",
            Self::ReservedName { .. } => "ReservedName",
            Self::UnknownType(_) => "UnknownType",
        };
        bb_config::Diagnostic {
            kind,
            location: "bb-registry",
            detail: self.to_string(),
        }
    }
}

#[derive(Default)]
struct Inner {
    types: BTreeMap<String, FactTypeDescriptor>,
    groups: BTreeMap<String, BTreeSet<String>>,
}

/// Thread-safe fact type registry.
///
/// Registration is expected to happen once, before the game starts
/// (`spec.md` §4.3): the interest index freezes its own group expansion at
/// worker-registration time and never re-reads the registry afterward.
#[derive(Default)]
pub struct FactRegistry {
    inner: RwLock<Inner>,
}

impl FactRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fact type under its own name and every listed group.
    ///
    /// Idempotent for an identical re-declaration (same descriptor by value);
    /// fails with `Duplicate` if a *different* descriptor is registered under
    /// a name already in use.
    pub fn register(&self, descriptor: FactTypeDescriptor) -> Result<(), RegistryError> {
        for field in descriptor.field_schema.keys() {
            if is_reserved(field) {
                return Err(RegistryError::ReservedName {
                    fact_type: descriptor.name.clone(),
                    field: field.clone(),
                });
            }
        }

        let mut inner = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(existing) = inner.types.get(&descriptor.name) {
            if existing == &descriptor {
                return Ok(());
            }
            return Err(RegistryError::Duplicate(descriptor.name));
        }

        for group in &descriptor.groups {
            inner
                .groups
                .entry(group.clone())
                .or_default()
                .insert(descriptor.name.clone());
        }
        inner.types.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Expand `name` to the set of concrete type names it covers: identity
    /// if `name` is itself a concrete type, the group's members if it is a
    /// registered group name (a type that is also a group name, if that ever
    /// happens, expands to the union of both).
    pub fn expand(&self, name: &str) -> Result<BTreeSet<String>, RegistryError> {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut out = BTreeSet::new();
        if inner.types.contains_key(name) {
            out.insert(name.to_string());
        }
        if let Some(members) = inner.groups.get(name) {
            out.extend(members.iter().cloned());
        }
        if out.is_empty() {
            return Err(RegistryError::UnknownType(name.to_string()));
        }
        Ok(out)
    }

    /// Fetch a previously registered descriptor by concrete type name.
    pub fn get(&self, name: &str) -> Option<FactTypeDescriptor> {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.types.get(name).cloned()
    }

    /// All concrete type names currently registered, ascending.
    pub fn all_types(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.types.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bb_types::FieldDecl;
    use bb_types::FieldKind;

    fn md5() -> FactTypeDescriptor {
        FactTypeDescriptor::empty("md5").with_group("hash").with_field(
            "value",
            FieldDecl {
                kind: FieldKind::String,
                required: true,
                default: None,
                allowed_values: None,
                help: String::new(),
            },
        )
    }

    #[test]
    fn register_then_expand_identity() {
        let reg = FactRegistry::new();
        reg.register(md5()).unwrap();
        let expanded = reg.expand("md5").unwrap();
        assert_eq!(expanded, BTreeSet::from(["md5".to_string()]));
    }

    #[test]
    fn register_then_expand_group() {
        let reg = FactRegistry::new();
        reg.register(md5()).unwrap();
        reg.register(FactTypeDescriptor::empty("sha1").with_group("hash"))
            .unwrap();
        let expanded = reg.expand("hash").unwrap();
        assert_eq!(
            expanded,
            BTreeSet::from(["md5".to_string(), "sha1".to_string()])
        );
    }

    #[test]
    fn duplicate_distinct_descriptor_fails() {
        let reg = FactRegistry::new();
        reg.register(md5()).unwrap();
        let other = FactTypeDescriptor::empty("md5");
        assert!(matches!(
            reg.register(other),
            Err(RegistryError::Duplicate(_))
        ));
    }

    #[test]
    fn duplicate_identical_descriptor_is_idempotent() {
        let reg = FactRegistry::new();
        reg.register(md5()).unwrap();
        assert!(reg.register(md5()).is_ok());
    }

    #[test]
    fn reserved_field_name_rejected() {
        let reg = FactRegistry::new();
        let bad = FactTypeDescriptor::empty("evil").with_field(
            "parentFacts",
            FieldDecl {
                kind: FieldKind::Int,
                required: false,
                default: None,
                allowed_values: None,
                help: String::new(),
            },
        );
        assert!(matches!(
            reg.register(bad),
            Err(RegistryError::ReservedName { .. })
        ));
    }

    #[test]
    fn expand_unknown_name_fails() {
        let reg = FactRegistry::new();
        assert!(matches!(
            reg.expand("nonexistent"),
            Err(RegistryError::UnknownType(_))
        ));
    }
}
