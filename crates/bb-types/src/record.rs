// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Materialised object, fact, and hyp records.
//!
//! Invariants
//! - `Object` is immutable after insertion; its id is a function of its
//!   bytes (content-addressed dedup lives in `bb-store`, not here).
//! - `Fact`/`Hyp` are immutable from a worker's perspective after creation;
//!   only `relations` may be updated in place, by the store, as later
//!   entries reference this one.
//! - `Hyp.tainted` is always `true`; `Fact` carries no `tainted` field
//!   because fact-table membership already implies `false`.

use crate::ident::{FactId, HypId, ObjectId};
use crate::relations::Relations;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An opaque byte buffer held in the object table.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Object {
    /// Dense id within the object table.
    pub id: ObjectId,
    /// Opaque payload bytes.
    pub bytes: bytes::Bytes,
    /// Name of the worker (or "gamemaster") that first inserted these bytes.
    pub creator: String,
    /// Unix epoch milliseconds at insertion.
    pub created_at: i64,
    /// Parent/child relations (objects may only have parent facts/hyps and
    /// child facts/hyps in practice, but the shared `Relations` shape is
    /// kept uniform across all three tables).
    pub relations: Relations,
}

/// A typed, immutable record asserted by a worker: a [`Fact`] if
/// `tainted == false`, a promoted-hyp-turned-fact otherwise carries the same
/// shape under a fresh [`FactId`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Fact {
    /// Dense id within the fact table.
    pub id: FactId,
    /// Concrete fact type name.
    pub fact_type: String,
    /// Fact groups this entry's type belongs to, captured at insertion time
    /// (group membership is resolved once; later registry changes never
    /// retroactively alter an already-inserted entry).
    pub group_memberships: Vec<String>,
    /// Name of the worker that asserted this fact.
    pub creator: String,
    /// Unix epoch milliseconds at insertion.
    pub created_at: i64,
    /// Declared field values.
    pub fields: BTreeMap<String, Value>,
    /// Parent/child relations.
    pub relations: Relations,
}

/// A tainted (uncertain) fact. Structurally identical to [`Fact`] except for
/// id space and the always-`true` taint flag.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Hyp {
    /// Dense id within the hyp table.
    pub id: HypId,
    /// Concrete fact type name (hyps share the fact-type registry).
    pub fact_type: String,
    /// Fact groups this entry's type belongs to, captured at insertion time.
    pub group_memberships: Vec<String>,
    /// Name of the worker that asserted this hyp.
    pub creator: String,
    /// Unix epoch milliseconds at insertion.
    pub created_at: i64,
    /// Declared field values.
    pub fields: BTreeMap<String, Value>,
    /// Parent/child relations.
    pub relations: Relations,
}

impl Hyp {
    /// Always `true` — kept as a method (rather than a stored field) so the
    /// invariant "tainted matches table membership" can't be violated by
    /// deserializing a stale flag from an old save file.
    pub fn tainted(&self) -> bool {
        true
    }

    /// Convert this hyp into a fact record under `new_id`, carrying fields
    /// and relations verbatim (non-cascading promotion, `spec.md` §9).
    pub fn into_fact(self, new_id: FactId) -> Fact {
        Fact {
            id: new_id,
            fact_type: self.fact_type,
            group_memberships: self.group_memberships,
            creator: self.creator,
            created_at: self.created_at,
            fields: self.fields,
            relations: self.relations,
        }
    }
}
