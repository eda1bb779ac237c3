// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Two toy workers standing in for the real NPCs/Players an external
//! component loader would normally supply.

use crate::{MD5_FACT, MIMETYPE_FACT};
use async_trait::async_trait;
use bb_console::{Console, FactBuilder, HypBuilder};
use bb_scheduler::{FactWorker, ObjectWorker, WorkerError};
use bb_types::{Fact, Object, Value};

fn console_err(error: bb_console::ConsoleError) -> WorkerError {
    WorkerError(error.to_string())
}

/// On every object arrival, asserts its content hash as an `md5`-slot fact.
/// Uses the object table's own BLAKE3 digest rather than pulling in a real
/// MD5 implementation — the fact type name is cosmetic, the digest is real.
pub struct HasherNpc;

#[async_trait]
impl ObjectWorker for HasherNpc {
    async fn handle_data(&self, console: &Console, object: Object) -> Result<(), WorkerError> {
        let digest = bb_cas::blob_hash(&object.bytes).to_string();
        let mut builder = FactBuilder::new(MD5_FACT);
        builder.field("value", Value::Str(digest)).map_err(console_err)?;
        builder.parent_object(object.id.0).map_err(console_err)?;
        builder.build_and_add(console).await.map_err(console_err)?;
        Ok(())
    }
}

/// On an `md5` fact, hypothesizes a mimetype. Stands in for the kind of
/// sniffing logic a real player component would run against the digest or
/// the underlying bytes; this one always guesses the same thing.
pub struct MimeTypePlayer;

#[async_trait]
impl FactWorker for MimeTypePlayer {
    async fn handle_fact(&self, console: &Console, fact: Fact) -> Result<(), WorkerError> {
        let mut builder = HypBuilder::new(MIMETYPE_FACT);
        builder
            .field("value", Value::Str("application/octet-stream".to_string()))
            .map_err(console_err)?;
        builder.parent_fact(fact.id.0).map_err(console_err)?;
        builder.build_and_add(console).await.map_err(console_err)?;
        Ok(())
    }
}
