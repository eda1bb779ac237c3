// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Identifiers for the three blackboard tables.
//!
//! Invariants
//! - Ids are dense and assigned in ascending insertion order, per table.
//! - An id is never reused, even after a hyp is promoted away from the hyp
//!   table (the fact it becomes gets a fresh [`FactId`]).

use serde::{Deserialize, Serialize};

/// Identifier for an entry in the object table.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

/// Identifier for an entry in the fact table.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct FactId(pub u64);

/// Identifier for an entry in the hyp table.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct HypId(pub u64);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

impl std::fmt::Display for FactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fact#{}", self.0)
    }
}

impl std::fmt::Display for HypId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "hyp#{}", self.0)
    }
}

/// Which of the three tables an id or event refers to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum EntryKind {
    /// The object table.
    Object,
    /// The fact table.
    Fact,
    /// The hyp table.
    Hyp,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Object => "object",
            Self::Fact => "fact",
            Self::Hyp => "hyp",
        };
        f.write_str(s)
    }
}
