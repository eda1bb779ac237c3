// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Top-level `Game` facade: wires the fact registry, store, interest index,
//! wait registry, and scheduler into one handle a driver can construct,
//! feed, run, and save (`spec.md` §2, §6).

use bb_registry::{FactRegistry, RegistryError};
use bb_scheduler::{IndexError, LoadError, Scheduler, SchedulerError, WorkerTemplate};
use bb_snapshot::SnapshotError;
use bb_store::{BlackboardStore, StoreError};
use bb_types::{Fact, FactId, FactTypeDescriptor, Hyp, HypId, Object, ObjectId, Value, Version};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Unified error type for every failure mode the facade can surface.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// Fact type registration failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Worker template registration failed.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// A store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A scheduler operation failed.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    /// Loading a save file failed.
    #[error(transparent)]
    Load(#[from] LoadError),
    /// Writing a save file failed.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

impl GameError {
    /// Structured diagnostic view (`spec.md` §7), forwarding to whichever
    /// crate's error actually fired.
    pub fn diagnostic(&self) -> bb_config::Diagnostic {
        match self {
            Self::Registry(e) => e.diagnostic(),
            Self::Index(e) => e.diagnostic(),
            Self::Store(e) => e.diagnostic(),
            Self::Scheduler(e) => e.diagnostic(),
            Self::Load(e) => e.diagnostic(),
            Self::Snapshot(e) => e.diagnostic(),
        }
    }

    /// Process exit code this error should map to for a CLI driver
    /// (`spec.md` §6): always non-zero, distinguishing load/config
    /// failures (2) from in-run failures (1).
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Load(_) => 2,
            _ => 1,
        }
    }
}

/// One complete blackboard game: a registry, a running scheduler, and the
/// engine version this build reports for save-file compatibility checks.
pub struct Game {
    scheduler: Scheduler,
    engine_version: Version,
}

impl Game {
    /// Start a fresh game over an empty store.
    pub fn new(parallelism: usize, temp_base: PathBuf, engine_version: Version) -> Self {
        let registry = Arc::new(FactRegistry::new());
        Self {
            scheduler: Scheduler::new(registry, parallelism, temp_base, engine_version.clone()),
            engine_version,
        }
    }

    /// Register a fact type (`spec.md` §4.1).
    pub fn register_fact_type(&self, descriptor: FactTypeDescriptor) -> Result<(), GameError> {
        Ok(self.scheduler.registry().register(descriptor)?)
    }

    /// Register a worker template (`spec.md` §4.3).
    pub async fn register_worker(&self, template: WorkerTemplate) -> Result<(), GameError> {
        Ok(self.scheduler.register_worker(template).await?)
    }

    /// Seed the initial object the run starts from.
    pub async fn seed_object(&self, bytes: bytes::Bytes, creator: &str) -> Result<bb_types::ObjectId, GameError> {
        let now = now_millis();
        let (id, _deduped) = self
            .scheduler
            .store()
            .add_object(bytes, creator, vec![], vec![], vec![], now)
            .await?;
        Ok(id)
    }

    /// Promote a hyp to a fact (`spec.md` §4.5).
    pub async fn promote_hyp(&self, id: HypId) -> Result<FactId, GameError> {
        Ok(self.scheduler.promote_hyp(id).await?)
    }

    /// Assert a fact directly, bypassing worker dispatch — for a driver
    /// injecting externally-observed facts.
    pub async fn add_fact(
        &self,
        fact_type: &str,
        fields: BTreeMap<String, Value>,
        creator: &str,
    ) -> Result<FactId, GameError> {
        let now = now_millis();
        Ok(self
            .scheduler
            .store()
            .add_fact(self.scheduler.registry(), fact_type, fields, creator, vec![], vec![], vec![], now)
            .await?)
    }

    /// Assert a hyp directly, bypassing worker dispatch.
    pub async fn add_hyp(
        &self,
        fact_type: &str,
        fields: BTreeMap<String, Value>,
        creator: &str,
    ) -> Result<HypId, GameError> {
        let now = now_millis();
        Ok(self
            .scheduler
            .store()
            .add_hyp(self.scheduler.registry(), fact_type, fields, creator, vec![], vec![], vec![], now)
            .await?)
    }

    /// Handle to the underlying store, for drivers that need to act
    /// concurrently with a running dispatch loop (`run_until_quiescent`
    /// borrows the scheduler mutably; the store itself stays safely
    /// `Arc`-shared for outside writers).
    pub fn store(&self) -> &Arc<BlackboardStore> {
        self.scheduler.store()
    }

    /// Handle to the fact registry.
    pub fn registry(&self) -> &Arc<FactRegistry> {
        self.scheduler.registry()
    }

    /// Fetch an object by id.
    pub async fn get_object(&self, id: ObjectId) -> Result<Object, GameError> {
        Ok(self.scheduler.store().get_object(id).await?)
    }

    /// Fetch a fact by id.
    pub async fn get_fact(&self, id: FactId) -> Result<Fact, GameError> {
        Ok(self.scheduler.store().get_fact(id).await?)
    }

    /// Fetch a hyp by id.
    pub async fn get_hyp(&self, id: HypId) -> Result<Hyp, GameError> {
        Ok(self.scheduler.store().get_hyp(id).await?)
    }

    /// Current `(objects, facts, hyps)` counts.
    pub async fn counts(&self) -> (usize, usize, usize) {
        self.scheduler.store().counts().await
    }

    /// Run to quiescence.
    pub async fn run_until_quiescent(&mut self, grace_time: Duration) -> Result<(), GameError> {
        Ok(self.scheduler.run_until_quiescent(grace_time).await?)
    }

    /// Clones that finished with a worker error, for driver-side reporting.
    pub fn failed_clones(&self) -> Vec<(u64, &str, &str)> {
        self.scheduler.failed_clones()
    }

    /// Write a save file.
    pub async fn save_to(&self, writer: &mut impl std::io::Write) -> Result<(), GameError> {
        Ok(self.scheduler.save_to(writer).await?)
    }

    /// Restore a game from a save file and a fresh set of worker templates.
    pub async fn load(
        reader: &mut impl std::io::Read,
        templates: Vec<WorkerTemplate>,
        fact_types: Vec<FactTypeDescriptor>,
        parallelism: usize,
        temp_base: PathBuf,
        engine_version: Version,
    ) -> Result<Self, GameError> {
        let registry = Arc::new(FactRegistry::new());
        for descriptor in fact_types {
            registry.register(descriptor)?;
        }
        let scheduler =
            Scheduler::load(reader, registry, templates, parallelism, temp_base, engine_version.clone()).await?;
        Ok(Self { scheduler, engine_version })
    }

    /// This build's engine version, as recorded into save-file headers.
    pub fn engine_version(&self) -> &Version {
        &self.engine_version
    }
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
