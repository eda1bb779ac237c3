// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Worker callback traits and the template that pairs one with its
//! declared metadata (`spec.md` §6).

use async_trait::async_trait;
use bb_console::{new_template_memory, Console, TemplateMemory};
use bb_types::{Fact, Hyp, Object, WorkerDeclaration};
use std::sync::Arc;

/// Error a worker callback returns to signal a recoverable failure.
/// Never a panic — a panicking worker is instead caught by the scheduler
/// and recorded against its clone (`spec.md` §7).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct WorkerError(pub String);

/// Callback for workers interested in the object table.
#[async_trait]
pub trait ObjectWorker: Send + Sync {
    /// Handle one object arrival.
    async fn handle_data(&self, console: &Console, object: Object) -> Result<(), WorkerError>;
}

/// Callback for workers interested in fact types.
#[async_trait]
pub trait FactWorker: Send + Sync {
    /// Handle one fact arrival.
    async fn handle_fact(&self, console: &Console, fact: Fact) -> Result<(), WorkerError>;
}

/// Callback for workers interested in hyp types.
#[async_trait]
pub trait HypWorker: Send + Sync {
    /// Handle one hyp arrival.
    async fn handle_hyp(&self, console: &Console, hyp: Hyp) -> Result<(), WorkerError>;
}

/// Callback for back-stories: long-lived narrators that react to facts but
/// are otherwise indistinguishable from a `FactWorker` at the dispatch
/// layer (`spec.md` §2's role distinction is a naming/authoring
/// convention, not a different entry point).
#[async_trait]
pub trait BackStory: Send + Sync {
    /// Handle one fact arrival.
    async fn handle_fact(&self, console: &Console, fact: Fact) -> Result<(), WorkerError>;
}

/// The concrete callback a template dispatches to, tagged by which table
/// it watches.
#[derive(Clone)]
pub enum WorkerHandler {
    /// Watches the object table.
    Object(Arc<dyn ObjectWorker>),
    /// Watches fact types.
    Fact(Arc<dyn FactWorker>),
    /// Watches hyp types.
    Hyp(Arc<dyn HypWorker>),
    /// Watches fact types, authored as a back-story.
    BackStory(Arc<dyn BackStory>),
}

/// A registered worker: its declared metadata, its callback, and the
/// template-scoped memory shared by every clone spawned from it.
#[derive(Clone)]
pub struct WorkerTemplate {
    /// Static declaration (name, interests, versions, ...).
    pub declaration: WorkerDeclaration,
    /// The callback this template dispatches to.
    pub handler: WorkerHandler,
    /// Memory shared by every clone of this template.
    pub memory: TemplateMemory,
}

impl WorkerTemplate {
    /// Construct a template with fresh, empty shared memory.
    pub fn new(declaration: WorkerDeclaration, handler: WorkerHandler) -> Self {
        Self {
            declaration,
            handler,
            memory: new_template_memory(),
        }
    }
}
