// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The top-level configuration document shape consumed from outside the core.
//!
//! Parsing a `.yaml` file into this shape is the external driver's job (the
//! driver and the shell that discovers extra components are explicitly out
//! of scope for this engine). This module fixes only the document's Rust
//! shape and the `common`-block merge rule, so the driver and the engine
//! agree on what a "worker options bag" looks like.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Per-component option bag. Keys and value shapes are worker-defined; the
/// engine treats this as opaque JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerOptions(pub BTreeMap<String, serde_json::Value>);

/// Merge `common` under `specific`, per the documented precedence: `common` <
/// per-component. Keys present in both are taken from `specific`; keys only
/// in `common` are inherited.
pub fn merge_common(common: &WorkerOptions, specific: &WorkerOptions) -> WorkerOptions {
    let mut merged = common.0.clone();
    for (key, value) in &specific.0 {
        merged.insert(key.clone(), value.clone());
    }
    WorkerOptions(merged)
}

/// `d20` top-level block: engine-wide run parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Extra component search paths (resolved and walked by the external driver).
    #[serde(default, rename = "extraComponentPaths")]
    pub extra_component_paths: Vec<PathBuf>,
    /// Seconds of observed quiescence required before the run ends.
    #[serde(default = "default_grace_time", rename = "graceTime")]
    pub grace_time_secs: u64,
    /// Base directory for per-clone temporary directories.
    #[serde(default = "default_temporary_dir")]
    pub temporary: PathBuf,
}

fn default_grace_time() -> u64 {
    1
}

fn default_temporary_dir() -> PathBuf {
    std::env::temp_dir()
}

impl EngineSection {
    /// Grace time as a [`Duration`], for direct use by `bb-scheduler`.
    pub fn grace_time(&self) -> Duration {
        Duration::from_secs(self.grace_time_secs)
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            extra_component_paths: Vec::new(),
            grace_time_secs: default_grace_time(),
            temporary: default_temporary_dir(),
        }
    }
}

/// Full document shape: `d20`, `common`, and the five per-kind component
/// sections (`spec.md` §6). Each per-kind section maps a component name to
/// its option bag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameDocument {
    /// Engine-wide run parameters.
    #[serde(default)]
    pub d20: EngineSection,
    /// Options merged into every component's bag before component-specific
    /// options are applied.
    #[serde(default)]
    pub common: WorkerOptions,
    /// Object-reactive, single-instance workers.
    #[serde(default, rename = "NPCS")]
    pub npcs: BTreeMap<String, WorkerOptions>,
    /// Fact/hyp-reactive, cloned workers.
    #[serde(default, rename = "Players")]
    pub players: BTreeMap<String, WorkerOptions>,
    /// Seed-fact-reactive, single-instance workers.
    #[serde(default, rename = "BackStories")]
    pub back_stories: BTreeMap<String, WorkerOptions>,
    /// Out-of-loop triggered actions (e.g. promotion hooks).
    #[serde(default, rename = "Actions")]
    pub actions: BTreeMap<String, WorkerOptions>,
    /// Output renderers.
    #[serde(default, rename = "Screens")]
    pub screens: BTreeMap<String, WorkerOptions>,
}

impl GameDocument {
    /// Parse a document from a YAML string (the external driver's entrypoint
    /// for loading `--config`).
    pub fn from_yaml(text: &str) -> Result<Self, crate::ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Effective options for a named component within `section`, with
    /// `common` merged under the component's own bag.
    pub fn effective_options<'a>(
        &'a self,
        section: &'a BTreeMap<String, WorkerOptions>,
        component: &str,
    ) -> WorkerOptions {
        let specific = section.get(component).cloned().unwrap_or_default();
        merge_common(&self.common, &specific)
    }
}
