// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-clone console facade handed to worker callbacks (`spec.md` §4.6).
//!
//! One [`Console`] is constructed by the scheduler for each clone. `memory`
//! is shared (by `Arc`) across every clone spawned from the same worker
//! template; `data` and the lazily-created temp directory belong to this
//! clone alone and need no lock.

mod builder;

pub use builder::{FactBuilder, HypBuilder};

use bb_config::Diagnostic;
use bb_registry::FactRegistry;
use bb_store::{BlackboardStore, Entry, StoreError};
use bb_types::{EntryKind, Fact, FactId, Hyp, HypId, ObjectId};
use bb_wait::{ParentRef, WaitError, WaitRegistry, WaitStream};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::OnceCell;

/// Errors surfaced through the console API.
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    /// Underlying store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Underlying wait operation failed.
    #[error(transparent)]
    Wait(#[from] WaitError),
    /// A builder was reused after `build_and_add` already consumed it.
    #[error("builder already committed")]
    Immutable,
    /// The clone's scoped temp directory could not be created.
    #[error("failed to create temp directory: {0}")]
    TempDir(String),
}

impl ConsoleError {
    /// Structured diagnostic view (`spec.md` §7).
    pub fn diagnostic(&self) -> Diagnostic {
        let kind = match self {
            Self::Store(_) => "Store",
            Self::Wait(_) => "Wait",
            Self::Immutable => "Immutable",
            Self::TempDir(_) => "TempDir",
        };
        Diagnostic {
            kind,
            location: "bb-console",
            detail: self.to_string(),
        }
    }
}

/// Shared worker-template memory: one instance per template, `Arc`-cloned
/// into every `Console` spawned from it.
pub type TemplateMemory = Arc<RwLock<BTreeMap<String, serde_json::Value>>>;

/// Construct an empty, shareable template memory instance.
pub fn new_template_memory() -> TemplateMemory {
    Arc::new(RwLock::new(BTreeMap::new()))
}

/// Per-clone facade over the store, registry, and wait registry.
pub struct Console {
    store: Arc<BlackboardStore>,
    registry: Arc<FactRegistry>,
    wait_registry: Arc<WaitRegistry>,
    memory: TemplateMemory,
    data: BTreeMap<String, serde_json::Value>,
    temp_dir: OnceCell<tempfile::TempDir>,
    extra_temp_dirs: Mutex<Vec<tempfile::TempDir>>,
    temp_base: std::path::PathBuf,
    template_name: String,
    serial: u64,
}

impl Console {
    /// Construct a console for one clone. `temp_base` is the directory new
    /// per-clone temp directories are created under.
    pub fn new(
        store: Arc<BlackboardStore>,
        registry: Arc<FactRegistry>,
        wait_registry: Arc<WaitRegistry>,
        memory: TemplateMemory,
        temp_base: std::path::PathBuf,
        template_name: impl Into<String>,
        serial: u64,
    ) -> Self {
        Self {
            store,
            registry,
            wait_registry,
            memory,
            data: BTreeMap::new(),
            temp_dir: OnceCell::new(),
            extra_temp_dirs: Mutex::new(Vec::new()),
            temp_base,
            template_name: template_name.into(),
            serial,
        }
    }

    pub(crate) fn store(&self) -> &BlackboardStore {
        &self.store
    }

    pub(crate) fn registry(&self) -> &FactRegistry {
        &self.registry
    }

    pub(crate) fn creator_name(&self) -> &str {
        &self.template_name
    }

    pub(crate) fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default()
    }

    /// Tag used by [`print`](Self::print) and scheduler-side logging:
    /// `"{template}#{serial}"`.
    pub fn clone_tag(&self) -> String {
        format!("{}#{}", self.template_name, self.serial)
    }

    /// Fetch an object by id.
    pub async fn get_object(&self, id: ObjectId) -> Result<bb_types::Object, ConsoleError> {
        Ok(self.store.get_object(id).await?)
    }

    /// Fetch a fact by id.
    pub async fn get_fact(&self, id: FactId) -> Result<bb_types::Fact, ConsoleError> {
        Ok(self.store.get_fact(id).await?)
    }

    /// Fetch a hyp by id.
    pub async fn get_hyp(&self, id: HypId) -> Result<bb_types::Hyp, ConsoleError> {
        Ok(self.store.get_hyp(id).await?)
    }

    /// All facts currently in the store, optionally narrowed to a single
    /// fact type (`spec.md` §4.6).
    pub async fn get_all_facts(&self, type_name: Option<&str>) -> Vec<Fact> {
        self.store
            .list(EntryKind::Fact, type_name)
            .await
            .into_iter()
            .filter_map(|entry| match entry {
                Entry::Fact(fact) => Some(fact),
                Entry::Object(_) | Entry::Hyp(_) => None,
            })
            .collect()
    }

    /// All hyps currently in the store, optionally narrowed to a single
    /// fact type (`spec.md` §4.6).
    pub async fn get_all_hyps(&self, type_name: Option<&str>) -> Vec<Hyp> {
        self.store
            .list(EntryKind::Hyp, type_name)
            .await
            .into_iter()
            .filter_map(|entry| match entry {
                Entry::Hyp(hyp) => Some(hyp),
                Entry::Object(_) | Entry::Fact(_) => None,
            })
            .collect()
    }

    /// Insert bytes into the object table.
    pub async fn add_object(
        &self,
        bytes: bytes::Bytes,
        parent_objects: Vec<u64>,
        parent_facts: Vec<u64>,
        parent_hyps: Vec<u64>,
    ) -> Result<(ObjectId, bool), ConsoleError> {
        Ok(self
            .store
            .add_object(bytes, &self.template_name, parent_objects, parent_facts, parent_hyps, self.now())
            .await?)
    }

    /// Promote a hyp to a fact (non-cascading, `spec.md` §9).
    pub async fn promote_hyp(&self, id: HypId) -> Result<FactId, ConsoleError> {
        Ok(self.store.promote_hyp(id, self.now()).await?)
    }

    /// Suspend until a matching entry exists, draining backlog first.
    /// `since_id` skips backlog entries at or below that id, for callers
    /// resuming a wait without replaying what they've already seen.
    pub async fn wait_on_entries(
        &self,
        kind: EntryKind,
        type_name: Option<String>,
        since_id: Option<u64>,
    ) -> WaitStream {
        self.wait_registry.wait_on_entries(&self.store, kind, type_name, since_id).await
    }

    /// As [`wait_on_entries`](Self::wait_on_entries), scoped to children of
    /// `parent`. Fails fast if `parent` does not exist yet.
    pub async fn wait_on_child_entries(
        &self,
        parent: ParentRef,
        kind: EntryKind,
        type_name: Option<String>,
        since_id: Option<u64>,
    ) -> Result<WaitStream, ConsoleError> {
        Ok(self
            .wait_registry
            .wait_on_child_entries(&self.store, parent, kind, type_name, since_id)
            .await?)
    }

    /// Suspend until exactly one matching entry arrives or `timeout` elapses.
    pub async fn wait_till_entry(
        &self,
        kind: EntryKind,
        type_name: Option<String>,
        since_id: Option<u64>,
        timeout: std::time::Duration,
    ) -> Result<bb_types::PostEvent, ConsoleError> {
        Ok(self
            .wait_registry
            .wait_till_entry(&self.store, kind, type_name, since_id, timeout)
            .await?)
    }

    /// Shared memory for this clone's worker template. Visible to every
    /// clone of the same template, across the whole run.
    pub fn memory(&self) -> &TemplateMemory {
        &self.memory
    }

    /// Private per-clone scratch data. No lock: only this clone ever sees it.
    pub fn data(&mut self) -> &mut BTreeMap<String, serde_json::Value> {
        &mut self.data
    }

    /// This clone's scoped temp directory, created lazily on first access
    /// and removed when the `Console` (and hence this directory handle) is
    /// dropped — including on cancellation or panic.
    pub async fn my_directory(&self) -> Result<&std::path::Path, ConsoleError> {
        let dir = self
            .temp_dir
            .get_or_try_init(|| async {
                tempfile::Builder::new()
                    .prefix(&format!("{}-", self.template_name))
                    .tempdir_in(&self.temp_base)
                    .map_err(|e| ConsoleError::TempDir(e.to_string()))
            })
            .await?;
        Ok(dir.path())
    }

    /// A fresh scoped temp directory, independent of [`my_directory`](Self::my_directory).
    /// Returns a new directory on every call; each is held alive for this
    /// clone's lifetime and removed when the `Console` is dropped.
    pub async fn create_temp_directory(&self) -> Result<std::path::PathBuf, ConsoleError> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", self.template_name))
            .tempdir_in(&self.temp_base)
            .map_err(|e| ConsoleError::TempDir(e.to_string()))?;
        let path = dir.path().to_path_buf();
        self.extra_temp_dirs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(dir);
        Ok(path)
    }

    /// Log a message tagged with this clone's identity, routed through
    /// `tracing` rather than stdout (`spec.md` §4.6).
    pub fn print(&self, message: impl std::fmt::Display) {
        tracing::info!(clone = %self.clone_tag(), "{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bb_types::FactTypeDescriptor;

    fn console() -> (Console, tempfile::TempDir) {
        let (store, _rx) = BlackboardStore::new();
        let registry = FactRegistry::new();
        registry.register(FactTypeDescriptor::empty("md5")).unwrap();
        let temp_base = tempfile::tempdir().unwrap();
        let console = Console::new(
            Arc::new(store),
            Arc::new(registry),
            Arc::new(WaitRegistry::new()),
            new_template_memory(),
            temp_base.path().to_path_buf(),
            "tester",
            0,
        );
        (console, temp_base)
    }

    #[tokio::test]
    async fn fact_builder_rejects_double_commit() {
        let (console, _tmp) = console();
        let mut builder = FactBuilder::new("md5");
        builder.build_and_add(&console).await.unwrap();
        let result = builder.build_and_add(&console).await;
        assert!(matches!(result, Err(ConsoleError::Immutable)));
    }

    #[tokio::test]
    async fn my_directory_is_created_lazily_and_stable() {
        let (console, _tmp) = console();
        let first = console.my_directory().await.unwrap().to_path_buf();
        let second = console.my_directory().await.unwrap().to_path_buf();
        assert_eq!(first, second);
        assert!(first.exists());
    }

    #[tokio::test]
    async fn create_temp_directory_returns_a_fresh_one_each_call() {
        let (console, _tmp) = console();
        let first = console.create_temp_directory().await.unwrap();
        let second = console.create_temp_directory().await.unwrap();
        assert_ne!(first, second);
        assert!(first.exists());
        assert!(second.exists());
    }

    #[tokio::test]
    async fn get_all_facts_narrows_by_type() {
        let (console, _tmp) = console();
        let mut md5 = FactBuilder::new("md5");
        md5.build_and_add(&console).await.unwrap();

        let all = console.get_all_facts(None).await;
        assert_eq!(all.len(), 1);
        let narrowed = console.get_all_facts(Some("md5")).await;
        assert_eq!(narrowed.len(), 1);
        let empty = console.get_all_facts(Some("sha1")).await;
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn memory_is_shared_across_consoles_from_same_template() {
        let (store, _rx) = BlackboardStore::new();
        let registry = FactRegistry::new();
        let wait_registry = Arc::new(WaitRegistry::new());
        let memory = new_template_memory();
        let temp_base = tempfile::tempdir().unwrap();
        let store = Arc::new(store);
        let registry = Arc::new(registry);

        let a = Console::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&wait_registry),
            memory.clone(),
            temp_base.path().to_path_buf(),
            "tester",
            0,
        );
        let b = Console::new(store, registry, wait_registry, memory.clone(), temp_base.path().to_path_buf(), "tester", 1);

        a.memory().write().unwrap().insert("seen".to_string(), serde_json::json!(true));
        assert_eq!(
            b.memory().read().unwrap().get("seen"),
            Some(&serde_json::json!(true))
        );
    }
}
