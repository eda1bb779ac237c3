// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Configuration document model and storage ports for the blackboard engine.
//!
//! The YAML parsing and component-search-path walking the external driver
//! performs are out of scope here ([`spec.md`'s non-goals]); this crate fixes
//! only the Rust shape the parsed document takes ([`document::GameDocument`])
//! and a small key/value [`store::ConfigStore`] port used to persist engine
//! preferences between runs.

pub mod document;
pub mod fs_store;
pub mod store;

pub use document::{merge_common, EngineSection, GameDocument, WorkerOptions};
pub use fs_store::FsConfigStore;
pub use store::{ConfigError, ConfigService, ConfigStore};

/// Structured `{kind, where, detail}` view shared by every error enum in the
/// workspace (`spec.md` §7), used for `tracing` events and driver exit
/// diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Short machine-stable error variant name.
    pub kind: &'static str,
    /// Component that raised the error.
    pub location: &'static str,
    /// Human-readable detail, usually the error's `Display` output.
    pub detail: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}@{}] {}", self.kind, self.location, self.detail)
    }
}
