// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Concurrent blackboard store: object/fact/hyp tables, dedup, relations,
//! and event emission.
//!
//! Invariants
//! - Lock ordering is objects, then facts, then hyps, then ascending id
//!   within a table. [`BlackboardStore`] never acquires locks out of this
//!   order; `check_parents`/`link_children` are the only places that touch
//!   more than one table and both walk it object, fact, hyp.
//! - Ids are dense per table and never reused.
//! - A [`bb_types::PostEvent`] is published after every successful commit,
//!   including `promote_hyp`.

use bb_cas::{blob_hash, BlobHash};
use bb_config::Diagnostic;
use bb_registry::FactRegistry;
use bb_types::{EntryKind, Fact, FactId, Hyp, HypId, Object, ObjectId, PostEvent, Relations, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, RwLock};

/// Errors raised by store operations.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No entry with this id exists in the named table.
    #[error("no {kind} with id {id}")]
    NotFound {
        /// Which table was queried.
        kind: EntryKind,
        /// The id that was not found.
        id: u64,
    },
    /// An operation expected an id from a different table.
    #[error("id {id} belongs to a different table than expected ({expected})")]
    WrongKind {
        /// The table the caller expected.
        expected: EntryKind,
        /// The id in question.
        id: u64,
    },
    /// A parent id referenced by a new entry does not exist.
    #[error("dangling parent reference: {kind} {id}")]
    DanglingParent {
        /// Which table the missing parent was supposed to live in.
        kind: EntryKind,
        /// The missing parent id.
        id: u64,
    },
    /// The caller tried to mutate an entry after it was committed.
    #[error("{kind} {id} is immutable after insertion")]
    Immutable {
        /// Which table the entry lives in.
        kind: EntryKind,
        /// The entry's id.
        id: u64,
    },
}

impl StoreError {
    /// Structured diagnostic view (`spec.md` §7).
    pub fn diagnostic(&self) -> Diagnostic {
        let kind = match self {
            Self::NotFound { .. } => "NotFound",
            Self::WrongKind { .. } => "WrongKind",
            Self::DanglingParent { .. } => "DanglingParent",
            Self::Immutable { .. } => "Immutable",
        };
        Diagnostic {
            kind,
            location: "bb-store",
            detail: self.to_string(),
        }
    }
}

#[derive(Default)]
struct Table<T> {
    entries: RwLock<BTreeMap<u64, T>>,
    next_id: AtomicU64,
}

impl<T: Clone> Table<T> {
    async fn get(&self, id: u64, kind: EntryKind) -> Result<T, StoreError> {
        self.entries
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { kind, id })
    }
}

/// One entry as returned by [`BlackboardStore::list`], tagged by which table
/// it came from since the three tables hold distinct record types.
#[derive(Clone, Debug)]
pub enum Entry {
    /// An object-table record.
    Object(Object),
    /// A fact-table record.
    Fact(Fact),
    /// A hyp-table record.
    Hyp(Hyp),
}

/// The three-table, event-emitting blackboard store.
pub struct BlackboardStore {
    objects: Table<Object>,
    facts: Table<Fact>,
    hyps: Table<Hyp>,
    dedup: RwLock<HashMap<BlobHash, ObjectId>>,
    events: mpsc::UnboundedSender<PostEvent>,
}

impl BlackboardStore {
    /// Construct an empty store, returning the event stream's receiving end.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PostEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                objects: Table::default(),
                facts: Table::default(),
                hyps: Table::default(),
                dedup: RwLock::new(HashMap::new()),
                events: tx,
            },
            rx,
        )
    }

    fn emit(&self, event: PostEvent) {
        // A closed receiver (scheduler shut down) is not a store error: the
        // store keeps accepting writes, it just has no one left listening.
        let _ = self.events.send(event);
    }

    async fn check_parents(
        &self,
        parent_objects: &[u64],
        parent_facts: &[u64],
        parent_hyps: &[u64],
    ) -> Result<(), StoreError> {
        let objects = self.objects.entries.read().await;
        for id in parent_objects {
            if !objects.contains_key(id) {
                return Err(StoreError::DanglingParent {
                    kind: EntryKind::Object,
                    id: *id,
                });
            }
        }
        drop(objects);
        let facts = self.facts.entries.read().await;
        for id in parent_facts {
            if !facts.contains_key(id) {
                return Err(StoreError::DanglingParent {
                    kind: EntryKind::Fact,
                    id: *id,
                });
            }
        }
        drop(facts);
        let hyps = self.hyps.entries.read().await;
        for id in parent_hyps {
            if !hyps.contains_key(id) {
                return Err(StoreError::DanglingParent {
                    kind: EntryKind::Hyp,
                    id: *id,
                });
            }
        }
        Ok(())
    }

    async fn link_children(
        &self,
        parent_objects: &[u64],
        parent_facts: &[u64],
        parent_hyps: &[u64],
        child_kind: EntryKind,
        child_id: u64,
    ) {
        if !parent_objects.is_empty() {
            let mut objects = self.objects.entries.write().await;
            for id in parent_objects {
                if let Some(o) = objects.get_mut(id) {
                    match child_kind {
                        EntryKind::Fact => o.relations.add_child_fact(child_id),
                        EntryKind::Hyp => o.relations.add_child_hyp(child_id),
                        EntryKind::Object => o.relations.add_child_object(child_id),
                    }
                }
            }
        }
        if !parent_facts.is_empty() {
            let mut facts = self.facts.entries.write().await;
            for id in parent_facts {
                if let Some(f) = facts.get_mut(id) {
                    match child_kind {
                        EntryKind::Fact => f.relations.add_child_fact(child_id),
                        EntryKind::Hyp => f.relations.add_child_hyp(child_id),
                        EntryKind::Object => f.relations.add_child_object(child_id),
                    }
                }
            }
        }
        if !parent_hyps.is_empty() {
            let mut hyps = self.hyps.entries.write().await;
            for id in parent_hyps {
                if let Some(h) = hyps.get_mut(id) {
                    match child_kind {
                        EntryKind::Fact => h.relations.add_child_fact(child_id),
                        EntryKind::Hyp => h.relations.add_child_hyp(child_id),
                        EntryKind::Object => h.relations.add_child_object(child_id),
                    }
                }
            }
        }
    }

    /// Insert bytes into the object table. Returns the assigned id and
    /// whether the bytes were a dedup hit against an already-stored object.
    ///
    /// On a dedup hit the existing object's id and `created_at`/`creator`
    /// are unchanged; only its relations gain the new parent links
    /// (`spec.md` §9).
    pub async fn add_object(
        &self,
        bytes: bytes::Bytes,
        creator: &str,
        parent_objects: Vec<u64>,
        parent_facts: Vec<u64>,
        parent_hyps: Vec<u64>,
        created_at: i64,
    ) -> Result<(ObjectId, bool), StoreError> {
        self.check_parents(&parent_objects, &parent_facts, &parent_hyps)
            .await?;

        let hash = blob_hash(&bytes);
        let mut dedup = self.dedup.write().await;
        if let Some(existing) = dedup.get(&hash).copied() {
            drop(dedup);
            let mut objects = self.objects.entries.write().await;
            if let Some(obj) = objects.get_mut(&existing.0) {
                obj.relations.parent_objects.extend(parent_objects.iter());
                obj.relations.parent_facts.extend(parent_facts.iter());
                obj.relations.parent_hyps.extend(parent_hyps.iter());
                obj.relations.sort();
            }
            drop(objects);
            self.link_children(
                &parent_objects,
                &parent_facts,
                &parent_hyps,
                EntryKind::Object,
                existing.0,
            )
            .await;
            self.emit(PostEvent {
                kind: EntryKind::Object,
                type_name: "object".to_string(),
                id: existing.0,
                groups: Vec::new(),
                parents: parent_tuples(&parent_objects, &parent_facts, &parent_hyps),
                deduped: true,
            });
            return Ok((existing, true));
        }

        let id = ObjectId(self.objects.next_id.fetch_add(1, Ordering::SeqCst));
        dedup.insert(hash, id);
        drop(dedup);

        let object = Object {
            id,
            bytes,
            creator: creator.to_string(),
            created_at,
            relations: Relations::with_parents(parent_objects.clone(), parent_facts.clone(), parent_hyps.clone()),
        };
        self.objects.entries.write().await.insert(id.0, object);
        self.link_children(&parent_objects, &parent_facts, &parent_hyps, EntryKind::Object, id.0)
            .await;

        self.emit(PostEvent {
            kind: EntryKind::Object,
            type_name: "object".to_string(),
            id: id.0,
            groups: Vec::new(),
            parents: parent_tuples(&parent_objects, &parent_facts, &parent_hyps),
            deduped: false,
        });
        Ok((id, false))
    }

    /// Insert a new fact. `fact_type` must already be registered; its frozen
    /// group membership is captured onto the record at insertion.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_fact(
        &self,
        registry: &FactRegistry,
        fact_type: &str,
        fields: BTreeMap<String, Value>,
        creator: &str,
        parent_objects: Vec<u64>,
        parent_facts: Vec<u64>,
        parent_hyps: Vec<u64>,
        created_at: i64,
    ) -> Result<FactId, StoreError> {
        self.check_parents(&parent_objects, &parent_facts, &parent_hyps)
            .await?;
        let groups = registry
            .get(fact_type)
            .map(|d| d.groups)
            .unwrap_or_default();

        let id = FactId(self.facts.next_id.fetch_add(1, Ordering::SeqCst));
        let fact = Fact {
            id,
            fact_type: fact_type.to_string(),
            group_memberships: groups.clone(),
            creator: creator.to_string(),
            created_at,
            fields,
            relations: Relations::with_parents(parent_objects.clone(), parent_facts.clone(), parent_hyps.clone()),
        };
        self.facts.entries.write().await.insert(id.0, fact);
        self.link_children(&parent_objects, &parent_facts, &parent_hyps, EntryKind::Fact, id.0)
            .await;

        self.emit(PostEvent {
            kind: EntryKind::Fact,
            type_name: fact_type.to_string(),
            id: id.0,
            groups,
            parents: parent_tuples(&parent_objects, &parent_facts, &parent_hyps),
            deduped: false,
        });
        Ok(id)
    }

    /// Insert a new hyp. Structurally identical to [`add_fact`](Self::add_fact)
    /// except for id space.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_hyp(
        &self,
        registry: &FactRegistry,
        fact_type: &str,
        fields: BTreeMap<String, Value>,
        creator: &str,
        parent_objects: Vec<u64>,
        parent_facts: Vec<u64>,
        parent_hyps: Vec<u64>,
        created_at: i64,
    ) -> Result<HypId, StoreError> {
        self.check_parents(&parent_objects, &parent_facts, &parent_hyps)
            .await?;
        let groups = registry
            .get(fact_type)
            .map(|d| d.groups)
            .unwrap_or_default();

        let id = HypId(self.hyps.next_id.fetch_add(1, Ordering::SeqCst));
        let hyp = Hyp {
            id,
            fact_type: fact_type.to_string(),
            group_memberships: groups.clone(),
            creator: creator.to_string(),
            created_at,
            fields,
            relations: Relations::with_parents(parent_objects.clone(), parent_facts.clone(), parent_hyps.clone()),
        };
        self.hyps.entries.write().await.insert(id.0, hyp);
        self.link_children(&parent_objects, &parent_facts, &parent_hyps, EntryKind::Hyp, id.0)
            .await;

        self.emit(PostEvent {
            kind: EntryKind::Hyp,
            type_name: fact_type.to_string(),
            id: id.0,
            groups,
            parents: parent_tuples(&parent_objects, &parent_facts, &parent_hyps),
            deduped: false,
        });
        Ok(id)
    }

    /// Fetch an object by id.
    pub async fn get_object(&self, id: ObjectId) -> Result<Object, StoreError> {
        self.objects.get(id.0, EntryKind::Object).await
    }

    /// Fetch a fact by id.
    pub async fn get_fact(&self, id: FactId) -> Result<Fact, StoreError> {
        self.facts.get(id.0, EntryKind::Fact).await
    }

    /// Fetch a hyp by id.
    pub async fn get_hyp(&self, id: HypId) -> Result<Hyp, StoreError> {
        self.hyps.get(id.0, EntryKind::Hyp).await
    }

    /// List every entry of `kind`, optionally narrowed to a single fact
    /// type (`spec.md` §4.2). `type_name` is ignored for `EntryKind::Object`
    /// — the object table carries no type. Results are in ascending id
    /// order, the tables' own iteration order.
    pub async fn list(&self, kind: EntryKind, type_name: Option<&str>) -> Vec<Entry> {
        match kind {
            EntryKind::Object => self
                .objects
                .entries
                .read()
                .await
                .values()
                .cloned()
                .map(Entry::Object)
                .collect(),
            EntryKind::Fact => self
                .facts
                .entries
                .read()
                .await
                .values()
                .filter(|f| type_name.is_none_or(|t| t == f.fact_type))
                .cloned()
                .map(Entry::Fact)
                .collect(),
            EntryKind::Hyp => self
                .hyps
                .entries
                .read()
                .await
                .values()
                .filter(|h| type_name.is_none_or(|t| t == h.fact_type))
                .cloned()
                .map(Entry::Hyp)
                .collect(),
        }
    }

    /// Promote a hyp into a fact: non-cascading (`spec.md` §9). The hyp's
    /// fields and relations are copied verbatim onto a fresh fact id; the
    /// hyp is removed from the hyp table. Parents that are themselves hyps
    /// are left as hyps.
    pub async fn promote_hyp(&self, id: HypId, created_at: i64) -> Result<FactId, StoreError> {
        let mut hyps = self.hyps.entries.write().await;
        let hyp = hyps
            .remove(&id.0)
            .ok_or(StoreError::NotFound { kind: EntryKind::Hyp, id: id.0 })?;
        drop(hyps);

        let new_id = FactId(self.facts.next_id.fetch_add(1, Ordering::SeqCst));
        let parent_objects = hyp.relations.parent_objects.clone();
        let parent_facts = hyp.relations.parent_facts.clone();
        let parent_hyps = hyp.relations.parent_hyps.clone();
        let mut fact = hyp.into_fact(new_id);
        fact.created_at = created_at;
        let groups = fact.group_memberships.clone();
        let type_name = fact.fact_type.clone();
        self.facts.entries.write().await.insert(new_id.0, fact);

        self.emit(PostEvent {
            kind: EntryKind::Fact,
            type_name,
            id: new_id.0,
            groups,
            parents: parent_tuples(&parent_objects, &parent_facts, &parent_hyps),
            deduped: false,
        });
        Ok(new_id)
    }

    /// Number of entries currently in each table, `(objects, facts, hyps)`.
    pub async fn counts(&self) -> (usize, usize, usize) {
        (
            self.objects.entries.read().await.len(),
            self.facts.entries.read().await.len(),
            self.hyps.entries.read().await.len(),
        )
    }

    /// Snapshot every table's contents for persistence (`bb-snapshot`).
    pub async fn export_tables(&self) -> StoreTables {
        StoreTables {
            objects: self.objects.entries.read().await.clone(),
            facts: self.facts.entries.read().await.clone(),
            hyps: self.hyps.entries.read().await.clone(),
            next_object_id: self.objects.next_id.load(Ordering::SeqCst),
            next_fact_id: self.facts.next_id.load(Ordering::SeqCst),
            next_hyp_id: self.hyps.next_id.load(Ordering::SeqCst),
        }
    }

    /// Rebuild a store from previously exported tables, returning the event
    /// receiver as [`new`](Self::new) does.
    pub fn from_tables(tables: StoreTables) -> (Self, mpsc::UnboundedReceiver<PostEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut dedup = HashMap::new();
        for (id, object) in &tables.objects {
            dedup.insert(blob_hash(&object.bytes), ObjectId(*id));
        }
        let store = Self {
            objects: Table {
                entries: RwLock::new(tables.objects),
                next_id: AtomicU64::new(tables.next_object_id),
            },
            facts: Table {
                entries: RwLock::new(tables.facts),
                next_id: AtomicU64::new(tables.next_fact_id),
            },
            hyps: Table {
                entries: RwLock::new(tables.hyps),
                next_id: AtomicU64::new(tables.next_hyp_id),
            },
            dedup: RwLock::new(dedup),
            events: tx,
        };
        (store, rx)
    }
}

impl Default for BlackboardStore {
    fn default() -> Self {
        Self::new().0
    }
}

fn parent_tuples(
    parent_objects: &[u64],
    parent_facts: &[u64],
    parent_hyps: &[u64],
) -> Vec<(EntryKind, u64)> {
    parent_objects
        .iter()
        .map(|id| (EntryKind::Object, *id))
        .chain(parent_facts.iter().map(|id| (EntryKind::Fact, *id)))
        .chain(parent_hyps.iter().map(|id| (EntryKind::Hyp, *id)))
        .collect()
}

/// Serializable snapshot of every table, used by `bb-snapshot` to build the
/// save-file container.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct StoreTables {
    /// Object table contents.
    pub objects: BTreeMap<u64, Object>,
    /// Fact table contents.
    pub facts: BTreeMap<u64, Fact>,
    /// Hyp table contents.
    pub hyps: BTreeMap<u64, Hyp>,
    /// Next id to assign in the object table.
    pub next_object_id: u64,
    /// Next id to assign in the fact table.
    pub next_fact_id: u64,
    /// Next id to assign in the hyp table.
    pub next_hyp_id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bb_types::FactTypeDescriptor;

    fn registry() -> FactRegistry {
        let r = FactRegistry::new();
        r.register(FactTypeDescriptor::empty("md5")).unwrap();
        r
    }

    #[tokio::test]
    async fn add_object_assigns_dense_ids() {
        let (store, _rx) = BlackboardStore::new();
        let (a, deduped_a) = store
            .add_object(bytes::Bytes::from_static(b"one"), "gm", vec![], vec![], vec![], 0)
            .await
            .unwrap();
        let (b, deduped_b) = store
            .add_object(bytes::Bytes::from_static(b"two"), "gm", vec![], vec![], vec![], 0)
            .await
            .unwrap();
        assert_eq!(a.0, 0);
        assert_eq!(b.0, 1);
        assert!(!deduped_a);
        assert!(!deduped_b);
    }

    #[tokio::test]
    async fn duplicate_bytes_dedup_to_same_id() {
        let (store, _rx) = BlackboardStore::new();
        let (a, _) = store
            .add_object(bytes::Bytes::from_static(b"same"), "gm", vec![], vec![], vec![], 0)
            .await
            .unwrap();
        let (b, deduped) = store
            .add_object(bytes::Bytes::from_static(b"same"), "other", vec![], vec![], vec![], 0)
            .await
            .unwrap();
        assert_eq!(a, b);
        assert!(deduped);
        let obj = store.get_object(a).await.unwrap();
        assert_eq!(obj.creator, "gm");
    }

    #[tokio::test]
    async fn add_fact_with_dangling_parent_fails() {
        let (store, _rx) = BlackboardStore::new();
        let reg = registry();
        let result = store
            .add_fact(&reg, "md5", BTreeMap::new(), "gm", vec![], vec![99], vec![], 0)
            .await;
        assert!(matches!(result, Err(StoreError::DanglingParent { kind: EntryKind::Fact, id: 99 })));
    }

    #[tokio::test]
    async fn promote_hyp_moves_to_fact_table_non_cascading() {
        let (store, _rx) = BlackboardStore::new();
        let reg = registry();
        let parent_hyp = store
            .add_hyp(&reg, "md5", BTreeMap::new(), "gm", vec![], vec![], vec![], 0)
            .await
            .unwrap();
        let hyp = store
            .add_hyp(
                &reg,
                "md5",
                BTreeMap::new(),
                "gm",
                vec![],
                vec![],
                vec![parent_hyp.0],
                0,
            )
            .await
            .unwrap();
        let fact_id = store.promote_hyp(hyp, 1).await.unwrap();
        let fact = store.get_fact(fact_id).await.unwrap();
        assert_eq!(fact.relations.parent_hyps, vec![parent_hyp.0]);
        assert!(matches!(
            store.get_hyp(hyp).await,
            Err(StoreError::NotFound { kind: EntryKind::Hyp, .. })
        ));
        // Parent hyp itself is untouched — no cascade.
        assert!(store.get_hyp(parent_hyp).await.is_ok());
    }

    #[tokio::test]
    async fn list_narrows_by_type_and_ignores_it_for_objects() {
        let (store, _rx) = BlackboardStore::new();
        let reg = registry();
        reg.register(FactTypeDescriptor::empty("mimetype")).unwrap();
        store
            .add_object(bytes::Bytes::from_static(b"a"), "gm", vec![], vec![], vec![], 0)
            .await
            .unwrap();
        store
            .add_object(bytes::Bytes::from_static(b"b"), "gm", vec![], vec![], vec![], 0)
            .await
            .unwrap();
        store
            .add_fact(&reg, "md5", BTreeMap::new(), "gm", vec![], vec![], vec![], 0)
            .await
            .unwrap();
        store
            .add_fact(&reg, "mimetype", BTreeMap::new(), "gm", vec![], vec![], vec![], 0)
            .await
            .unwrap();

        let objects = store.list(EntryKind::Object, Some("ignored")).await;
        assert_eq!(objects.len(), 2);

        let md5_facts = store.list(EntryKind::Fact, Some("md5")).await;
        assert_eq!(md5_facts.len(), 1);
        assert!(matches!(&md5_facts[0], Entry::Fact(f) if f.fact_type == "md5"));

        let all_facts = store.list(EntryKind::Fact, None).await;
        assert_eq!(all_facts.len(), 2);
    }

    #[tokio::test]
    async fn emits_post_event_on_commit() {
        let (store, mut rx) = BlackboardStore::new();
        let reg = registry();
        store
            .add_fact(&reg, "md5", BTreeMap::new(), "gm", vec![], vec![], vec![], 0)
            .await
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EntryKind::Fact);
        assert_eq!(event.id, 0);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    // Object ids assigned for distinct byte strings are always dense
    // (0..n), and re-submitting an already-seen blob never advances the
    // counter — the dedup index and the id counter can't drift apart.
    proptest! {
        #[test]
        fn object_ids_stay_dense_under_dedup(blobs in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..8), 0..30)) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async move {
                let (store, _rx) = BlackboardStore::new();
                let mut seen = std::collections::HashMap::new();
                let mut next_expected = 0u64;
                for blob in blobs {
                    let (id, deduped) = store
                        .add_object(bytes::Bytes::from(blob.clone()), "gm", vec![], vec![], vec![], 0)
                        .await
                        .unwrap();
                    if let Some(&existing) = seen.get(&blob) {
                        prop_assert!(deduped);
                        prop_assert_eq!(id.0, existing);
                    } else {
                        prop_assert!(!deduped);
                        prop_assert_eq!(id.0, next_expected);
                        seen.insert(blob, id.0);
                        next_expected += 1;
                    }
                }
                Ok(())
            })?;
        }
    }
}
