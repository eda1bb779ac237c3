// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Interest index: records which worker templates care about which fact/hyp
//! types or groups, and answers "who matches this event" (`spec.md` §4.3).
//!
//! The index is generic over the template payload (`T`) so it has no
//! dependency on the concrete worker-callback machinery that lives in
//! `bb-scheduler` — it only ever stores and hands back `Arc<T>`.

use bb_config::Diagnostic;
use bb_registry::FactRegistry;
use bb_types::{EntryKind, WorkerDeclaration};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Errors raised while registering a worker template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    /// A template declared zero interests; it would never be scheduled.
    #[error("worker {0} declared no interests")]
    EmptyInterestSet(String),
    /// One of the template's interests named a type or group that expands
    /// to zero concrete types.
    #[error("worker {worker}'s interest {interest} expanded to zero concrete types")]
    GroupExpandedToNothing {
        /// The worker's declared name.
        worker: String,
        /// The interest name that failed to expand.
        interest: String,
    },
}

impl IndexError {
    /// Structured diagnostic view (`spec.md` §7).
    pub fn diagnostic(&self) -> Diagnostic {
        let kind = match self {
            Self::EmptyInterestSet(_) => "EmptyInterestSet",
            Self::GroupExpandedToNothing { .. } => "GroupExpandedToNothing",
        };
        Diagnostic {
            kind,
            location: "bb-interest",
            detail: self.to_string(),
        }
    }
}

/// Registry of worker templates, keyed by `(table, concrete type name)`.
///
/// Registration freezes each interest's group expansion against the
/// registry at call time (`spec.md` §4.3): later registry changes never
/// retroactively alter who matches an already-registered template.
pub struct InterestIndex<T> {
    by_type: RwLock<HashMap<(EntryKind, String), Vec<Arc<T>>>>,
}

impl<T> Default for InterestIndex<T> {
    fn default() -> Self {
        Self {
            by_type: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> InterestIndex<T> {
    /// Construct an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template's declared interests, expanding each against
    /// `registry`. Never spawns the template on failure — the caller should
    /// treat an `Err` as a registration-time rejection (`spec.md` §8).
    pub async fn register(
        &self,
        declaration: &WorkerDeclaration,
        registry: &FactRegistry,
        template: Arc<T>,
    ) -> Result<(), IndexError> {
        if declaration.interests.is_empty() {
            return Err(IndexError::EmptyInterestSet(declaration.name.clone()));
        }

        let mut expansions = Vec::new();
        for interest in &declaration.interests {
            // The object table carries no type registry — every object's
            // `PostEvent::type_name` is the literal `"object"` — so an
            // object-table interest matches by name directly rather than
            // through group expansion.
            if interest.kind == EntryKind::Object {
                expansions.push((EntryKind::Object, interest.name.clone()));
                continue;
            }

            let expanded = registry.expand(&interest.name).map_or_else(
                |_| std::collections::BTreeSet::new(),
                |set| set,
            );
            if expanded.is_empty() {
                return Err(IndexError::GroupExpandedToNothing {
                    worker: declaration.name.clone(),
                    interest: interest.name.clone(),
                });
            }
            for concrete in expanded {
                expansions.push((interest.kind, concrete));
            }
        }

        let mut by_type = self.by_type.write().await;
        for key in expansions {
            by_type.entry(key).or_default().push(Arc::clone(&template));
        }
        Ok(())
    }

    /// Templates interested in `(kind, type_name)`, in registration order.
    pub async fn matches(&self, kind: EntryKind, type_name: &str) -> Vec<Arc<T>> {
        self.by_type
            .read()
            .await
            .get(&(kind, type_name.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}
