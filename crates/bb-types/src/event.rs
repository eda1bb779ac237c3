// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The event a commit to the blackboard publishes (`spec.md` §4.2).

use crate::ident::EntryKind;
use serde::{Deserialize, Serialize};

/// Published once per successful mutation of the store.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostEvent {
    /// Which table the new entry landed in.
    pub kind: EntryKind,
    /// Concrete type name. For objects this is always `"object"` — objects
    /// have no type registry, but a uniform field keeps interest-matching
    /// code generic over all three kinds.
    pub type_name: String,
    /// The new entry's id within its table.
    pub id: u64,
    /// Group memberships the entry's type belongs to (empty for objects).
    pub groups: Vec<String>,
    /// Parent ids supplied when the entry was added, split by kind, as
    /// `(kind, id)` pairs — used by child-scoped waiters.
    pub parents: Vec<(EntryKind, u64)>,
    /// Set when this event is an object dedup hit: the bytes already existed
    /// under this id. The default scheduler policy does not re-spawn
    /// object-interested workers for a deduped arrival.
    pub deduped: bool,
}
