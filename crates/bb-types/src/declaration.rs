// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Worker declarations: the static metadata a worker attaches to its
//! template (`spec.md` §6).

use crate::ident::EntryKind;
use crate::version::Version;
use serde::{Deserialize, Serialize};

/// One declared interest: a concrete fact/hyp type name or a group name
/// (resolved by the interest index at registration time), tagged by table.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Interest {
    /// Which table this interest watches.
    pub kind: EntryKind,
    /// Concrete type name or group name to match against.
    pub name: String,
}

impl Interest {
    /// Construct an interest in a fact (or hyp) type or group by name.
    pub fn new(kind: EntryKind, name: impl Into<String>) -> Self {
        Self { kind, name: name.into() }
    }
}

/// Static metadata describing a worker, carried by its template.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkerDeclaration {
    /// Worker name, unique within its role (NPC/Player/BackStory).
    pub name: String,
    /// Human-readable summary.
    pub description: String,
    /// Author/maintainer string.
    pub creator: String,
    /// This worker's own version.
    pub version: Version,
    /// Minimum engine version this worker requires.
    pub engine_version: Version,
    /// Extended help text for `--info`-style tooling.
    pub help: String,
    /// Declared interests. Empty is legal to construct but rejected at
    /// registration (`IndexError::EmptyInterestSet`).
    pub interests: Vec<Interest>,
}
