// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Blackboard data model: objects, facts, hyps, ids, and relations.
//!
//! This crate has no concurrency and no I/O — it is the set of plain-data
//! types every other `bb-*` crate builds on. The concurrent store lives in
//! `bb-store`; the registry that validates [`descriptor::FactTypeDescriptor`]
//! lives in `bb-registry`.

pub mod declaration;
pub mod descriptor;
pub mod event;
pub mod ident;
pub mod record;
pub mod relations;
pub mod reserved;
pub mod value;
pub mod version;

pub use declaration::{Interest, WorkerDeclaration};
pub use descriptor::{FactTypeDescriptor, FieldDecl};
pub use event::PostEvent;
pub use ident::{EntryKind, FactId, HypId, ObjectId};
pub use record::{Fact, Hyp, Object};
pub use relations::Relations;
pub use reserved::is_reserved;
pub use value::{FieldKind, Value};
pub use version::{Version, VersionParseError};
