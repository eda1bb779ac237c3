// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Parent/child relation lists carried by every entry.
//!
//! Invariants
//! - Every id is kept sorted ascending, so snapshot encoding and equality
//!   checks are order-independent of insertion order.
//! - Relations are maintained symmetrically by the store: adding `x` with
//!   parent `y` implies `y`'s matching child list gains `x.id` in the same
//!   commit. `bb-types` only carries the lists; the store enforces symmetry.

use serde::{Deserialize, Serialize};

/// Parent/child id lists for one entry, split by kind.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Relations {
    /// Ids of parent objects.
    pub parent_objects: Vec<u64>,
    /// Ids of parent facts.
    pub parent_facts: Vec<u64>,
    /// Ids of parent hyps.
    pub parent_hyps: Vec<u64>,
    /// Ids of child objects.
    pub child_objects: Vec<u64>,
    /// Ids of child facts.
    pub child_facts: Vec<u64>,
    /// Ids of child hyps.
    pub child_hyps: Vec<u64>,
}

impl Relations {
    /// Construct relations with only the given parents set; no children yet.
    pub fn with_parents(parent_objects: Vec<u64>, parent_facts: Vec<u64>, parent_hyps: Vec<u64>) -> Self {
        let mut r = Self {
            parent_objects,
            parent_facts,
            parent_hyps,
            ..Self::default()
        };
        r.sort();
        r
    }

    /// Sort every list ascending. Called after any mutation so equality and
    /// snapshot encoding never depend on insertion order.
    pub fn sort(&mut self) {
        self.parent_objects.sort_unstable();
        self.parent_facts.sort_unstable();
        self.parent_hyps.sort_unstable();
        self.child_objects.sort_unstable();
        self.child_facts.sort_unstable();
        self.child_hyps.sort_unstable();
    }

    fn push_unique(list: &mut Vec<u64>, id: u64) {
        if let Err(pos) = list.binary_search(&id) {
            list.insert(pos, id);
        }
    }

    /// Record `id` as a child object.
    pub fn add_child_object(&mut self, id: u64) {
        Self::push_unique(&mut self.child_objects, id);
    }

    /// Record `id` as a child fact.
    pub fn add_child_fact(&mut self, id: u64) {
        Self::push_unique(&mut self.child_facts, id);
    }

    /// Record `id` as a child hyp.
    pub fn add_child_hyp(&mut self, id: u64) {
        Self::push_unique(&mut self.child_hyps, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_parents_sorts() {
        let r = Relations::with_parents(vec![3, 1, 2], vec![], vec![]);
        assert_eq!(r.parent_objects, vec![1, 2, 3]);
    }

    #[test]
    fn add_child_is_idempotent_and_sorted() {
        let mut r = Relations::default();
        r.add_child_fact(5);
        r.add_child_fact(1);
        r.add_child_fact(5);
        assert_eq!(r.child_facts, vec![1, 5]);
    }
}
