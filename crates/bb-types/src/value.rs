// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Runtime representation of a declared fact/hyp field value.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The field-kind catalog a [`crate::descriptor::FieldSchema`] declares
/// against, and the closed set of shapes a [`Value`] may take.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum FieldKind {
    /// UTF-8 text.
    String,
    /// Opaque bytes.
    Bytes,
    /// Boolean.
    Bool,
    /// Signed 64-bit integer.
    Int,
    /// IEEE-754 double.
    Float,
    /// Arbitrary-precision decimal, carried as a canonical string. No parser
    /// lives in the core; validation only checks the field is a `Numeric`
    /// value, not that the string is a well-formed number.
    Numeric,
    /// String-keyed map of values.
    Dict,
    /// Ordered list of values.
    List,
    /// Ordered list of string-keyed maps.
    ListOfDicts,
    /// Either a string or bytes.
    StringOrBytes,
    /// Opaque escape hatch for field kinds the registry doesn't model
    /// natively. Carried as JSON.
    Custom,
}

/// A value stored in a fact/hyp's `fields` map.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value")]
pub enum Value {
    /// UTF-8 text.
    Str(String),
    /// Opaque bytes.
    Bytes(bytes::Bytes),
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// IEEE-754 double.
    Float(f64),
    /// Arbitrary-precision decimal, carried as a canonical string.
    Numeric(String),
    /// String-keyed map of values.
    Dict(BTreeMap<String, Value>),
    /// Ordered list of values.
    List(Vec<Value>),
    /// Ordered list of string-keyed maps.
    ListOfDicts(Vec<BTreeMap<String, Value>>),
    /// Opaque JSON escape hatch for [`FieldKind::Custom`].
    Custom(serde_json::Value),
}

impl Value {
    /// The [`FieldKind`] this value would satisfy, used by field-schema
    /// validation. `StringOrBytes` is not returned here — a `Str` or `Bytes`
    /// value satisfies it, checked at the call site, not by this mapping.
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Str(_) => FieldKind::String,
            Self::Bytes(_) => FieldKind::Bytes,
            Self::Bool(_) => FieldKind::Bool,
            Self::Int(_) => FieldKind::Int,
            Self::Float(_) => FieldKind::Float,
            Self::Numeric(_) => FieldKind::Numeric,
            Self::Dict(_) => FieldKind::Dict,
            Self::List(_) => FieldKind::List,
            Self::ListOfDicts(_) => FieldKind::ListOfDicts,
            Self::Custom(_) => FieldKind::Custom,
        }
    }

    /// Whether this value satisfies the declared `kind`, honoring
    /// `StringOrBytes`'s either/or semantics.
    pub fn satisfies(&self, kind: FieldKind) -> bool {
        match kind {
            FieldKind::StringOrBytes => matches!(self, Self::Str(_) | Self::Bytes(_)),
            FieldKind::Custom => true,
            other => self.kind() == other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_or_bytes_accepts_either() {
        assert!(Value::Str("x".into()).satisfies(FieldKind::StringOrBytes));
        assert!(Value::Bytes(bytes::Bytes::from_static(b"x")).satisfies(FieldKind::StringOrBytes));
        assert!(!Value::Bool(true).satisfies(FieldKind::StringOrBytes));
    }

    #[test]
    fn custom_accepts_anything() {
        assert!(Value::Int(1).satisfies(FieldKind::Custom));
    }

    #[test]
    fn exact_kind_match() {
        assert!(Value::Int(1).satisfies(FieldKind::Int));
        assert!(!Value::Int(1).satisfies(FieldKind::Float));
    }
}
