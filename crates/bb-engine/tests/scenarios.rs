// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! End-to-end scenarios run against an in-process `Game`, with tiny inline
//! worker templates standing in for real NPCs/Players/BackStories.

use async_trait::async_trait;
use bb_console::{Console, ConsoleError, FactBuilder, HypBuilder};
use bb_engine::Game;
use bb_scheduler::{FactWorker, ObjectWorker, WorkerError, WorkerHandler, WorkerTemplate};
use bb_types::{EntryKind, Fact, FactTypeDescriptor, Hyp, Interest, Object, Value, Version, WorkerDeclaration};
use bb_wait::WaitError;
use futures_util::StreamExt;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

fn declaration(name: &str, kind: EntryKind, interest: &str) -> WorkerDeclaration {
    WorkerDeclaration {
        name: name.to_string(),
        description: String::new(),
        creator: "test".to_string(),
        version: Version(vec![1]),
        engine_version: Version(vec![1]),
        help: String::new(),
        interests: vec![Interest::new(kind, interest)],
    }
}

fn console_err(error: ConsoleError) -> WorkerError {
    WorkerError(error.to_string())
}

/// NPC: on any object arrival, asserts the md5 digest of `b"abc"` (the one
/// byte string every scenario below seeds).
struct Md5Npc;

#[async_trait]
impl ObjectWorker for Md5Npc {
    async fn handle_data(&self, console: &Console, object: Object) -> Result<(), WorkerError> {
        let mut builder = FactBuilder::new("md5");
        builder
            .field("value", Value::Str("900150983cd24fb0d6963f7d28e17f72".to_string()))
            .map_err(console_err)?;
        builder.parent_object(object.id.0).map_err(console_err)?;
        builder.build_and_add(console).await.map_err(console_err)?;
        Ok(())
    }
}

/// Player: on an md5 fact, hypothesizes the mimetype and remembers the hyp
/// id it created, for the test to read back.
struct MimeTypePlayer {
    last_hyp: Arc<Mutex<Option<bb_types::HypId>>>,
}

#[async_trait]
impl FactWorker for MimeTypePlayer {
    async fn handle_fact(&self, console: &Console, fact: Fact) -> Result<(), WorkerError> {
        let mut builder = HypBuilder::new("mimetype");
        builder
            .field("value", Value::Str("text/plain".to_string()))
            .map_err(console_err)?;
        builder.parent_fact(fact.id.0).map_err(console_err)?;
        let id = builder.build_and_add(console).await.map_err(console_err)?;
        *self.last_hyp.lock().await = Some(id);
        Ok(())
    }
}

struct CountingObjectWorker {
    seen: Arc<AtomicUsize>,
}

#[async_trait]
impl ObjectWorker for CountingObjectWorker {
    async fn handle_data(&self, _console: &Console, _object: Object) -> Result<(), WorkerError> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct CountingFactWorker {
    seen: Arc<AtomicUsize>,
}

#[async_trait]
impl FactWorker for CountingFactWorker {
    async fn handle_fact(&self, _console: &Console, _fact: Fact) -> Result<(), WorkerError> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Triggered by a `"start"` fact: drains the three pre-populated `"hash"`
/// facts from backlog in id order, signals `ready`, then blocks for one more
/// live arrival before returning — a clean end, no cancellation plumbing
/// needed (`WaitStream`'s sender is dropped along with this clone's task).
struct BacklogDrainWorker {
    seen: Arc<Mutex<Vec<u64>>>,
    ready: Arc<Notify>,
}

#[async_trait]
impl FactWorker for BacklogDrainWorker {
    async fn handle_fact(&self, console: &Console, _fact: Fact) -> Result<(), WorkerError> {
        let mut stream = console.wait_on_entries(EntryKind::Fact, Some("hash".to_string()), None).await;
        for _ in 0..3 {
            let event = stream
                .next()
                .await
                .ok_or_else(|| WorkerError("backlog stream ended early".to_string()))?;
            self.seen.lock().await.push(event.id);
        }
        self.ready.notify_one();
        let event = stream
            .next()
            .await
            .ok_or_else(|| WorkerError("live stream ended early".to_string()))?;
        self.seen.lock().await.push(event.id);
        Ok(())
    }
}

/// Triggered by a `"start"` fact: waits on a fact type no one ever produces
/// and records whether it observed a timeout.
struct TimeoutWorker {
    timed_out: Arc<Mutex<Option<bool>>>,
}

#[async_trait]
impl FactWorker for TimeoutWorker {
    async fn handle_fact(&self, console: &Console, _fact: Fact) -> Result<(), WorkerError> {
        let result = console
            .wait_till_entry(EntryKind::Fact, Some("sha1".to_string()), None, Duration::from_millis(100))
            .await;
        let timed_out = matches!(result, Err(ConsoleError::Wait(WaitError::Timeout)));
        *self.timed_out.lock().await = Some(timed_out);
        Ok(())
    }
}

/// Registered only on the loaded game: records that a fact of its watched
/// type arrived, to prove a promoted hyp wakes type-scoped dispatch.
struct FlagWorker {
    fired: Arc<AtomicUsize>,
}

#[async_trait]
impl FactWorker for FlagWorker {
    async fn handle_fact(&self, _console: &Console, _fact: Fact) -> Result<(), WorkerError> {
        self.fired.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn single_object_one_npc_one_player() {
    let mut game = Game::new(4, std::env::temp_dir(), Version(vec![1]));
    game.register_fact_type(FactTypeDescriptor::empty("md5")).unwrap();
    game.register_fact_type(FactTypeDescriptor::empty("mimetype")).unwrap();

    game.register_worker(WorkerTemplate::new(
        declaration("md5-npc", EntryKind::Object, "object"),
        WorkerHandler::Object(Arc::new(Md5Npc)),
    ))
    .await
    .unwrap();

    let last_hyp = Arc::new(Mutex::new(None));
    game.register_worker(WorkerTemplate::new(
        declaration("mimetype-player", EntryKind::Fact, "md5"),
        WorkerHandler::Fact(Arc::new(MimeTypePlayer { last_hyp: last_hyp.clone() })),
    ))
    .await
    .unwrap();

    let object_id = game.seed_object(bytes::Bytes::from_static(b"abc"), "gm").await.unwrap();
    game.run_until_quiescent(Duration::from_millis(100)).await.unwrap();

    assert_eq!(game.counts().await, (1, 1, 1));
    assert!(game.failed_clones().is_empty());

    let hyp_id = last_hyp.lock().await.expect("player should have hypothesized a mimetype");
    let hyp = game.get_hyp(hyp_id).await.unwrap();
    assert_eq!(hyp.relations.parent_facts, vec![0]);

    let fact = game.get_fact(bb_types::FactId(hyp.relations.parent_facts[0])).await.unwrap();
    assert_eq!(fact.relations.parent_objects, vec![object_id.0]);
}

#[tokio::test]
async fn duplicate_bytes_dedup_and_object_worker_spawns_once() {
    let mut game = Game::new(4, std::env::temp_dir(), Version(vec![1]));
    let seen = Arc::new(AtomicUsize::new(0));
    game.register_worker(WorkerTemplate::new(
        declaration("counter", EntryKind::Object, "object"),
        WorkerHandler::Object(Arc::new(CountingObjectWorker { seen: seen.clone() })),
    ))
    .await
    .unwrap();

    let a = game.seed_object(bytes::Bytes::from_static(b"x"), "alice").await.unwrap();
    let b = game.seed_object(bytes::Bytes::from_static(b"x"), "bob").await.unwrap();
    assert_eq!(a, b);

    game.run_until_quiescent(Duration::from_millis(100)).await.unwrap();
    assert_eq!(game.counts().await, (1, 0, 0));
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn backlog_then_live_wait_delivers_in_order_and_ends_cleanly() {
    let mut game = Game::new(4, std::env::temp_dir(), Version(vec![1]));
    game.register_fact_type(FactTypeDescriptor::empty("hash")).unwrap();
    game.register_fact_type(FactTypeDescriptor::empty("start")).unwrap();

    for _ in 0..3 {
        game.add_fact("hash", BTreeMap::new(), "gm").await.unwrap();
    }

    let seen = Arc::new(Mutex::new(Vec::new()));
    let ready = Arc::new(Notify::new());
    game.register_worker(WorkerTemplate::new(
        declaration("drainer", EntryKind::Fact, "start"),
        WorkerHandler::Fact(Arc::new(BacklogDrainWorker { seen: seen.clone(), ready: ready.clone() })),
    ))
    .await
    .unwrap();
    game.add_fact("start", BTreeMap::new(), "gm").await.unwrap();

    let store = Arc::clone(game.store());
    let registry = Arc::clone(game.registry());

    let run_task = tokio::spawn(async move {
        game.run_until_quiescent(Duration::from_millis(300)).await.unwrap();
        game
    });

    ready.notified().await;
    store
        .add_fact(&registry, "hash", BTreeMap::new(), "gm", vec![], vec![], vec![], 0)
        .await
        .unwrap();

    let game = run_task.await.unwrap();
    assert_eq!(*seen.lock().await, vec![0, 1, 2, 3]);
    assert!(game.failed_clones().is_empty());
}

#[tokio::test]
async fn wait_with_no_producer_times_out() {
    let mut game = Game::new(4, std::env::temp_dir(), Version(vec![1]));
    game.register_fact_type(FactTypeDescriptor::empty("start")).unwrap();
    game.register_fact_type(FactTypeDescriptor::empty("sha1")).unwrap();

    let timed_out = Arc::new(Mutex::new(None));
    game.register_worker(WorkerTemplate::new(
        declaration("waiter", EntryKind::Fact, "start"),
        WorkerHandler::Fact(Arc::new(TimeoutWorker { timed_out: timed_out.clone() })),
    ))
    .await
    .unwrap();
    game.add_fact("start", BTreeMap::new(), "gm").await.unwrap();

    game.run_until_quiescent(Duration::from_millis(50)).await.unwrap();
    assert_eq!(*timed_out.lock().await, Some(true));
    assert!(game.failed_clones().is_empty());
}

#[tokio::test]
async fn group_interest_spawns_on_either_concrete_member() {
    let mut game = Game::new(4, std::env::temp_dir(), Version(vec![1]));
    game.register_fact_type(FactTypeDescriptor::empty("md5").with_group("hash")).unwrap();
    game.register_fact_type(FactTypeDescriptor::empty("sha1").with_group("hash")).unwrap();

    let seen = Arc::new(AtomicUsize::new(0));
    game.register_worker(WorkerTemplate::new(
        declaration("hash-fan", EntryKind::Fact, "hash"),
        WorkerHandler::Fact(Arc::new(CountingFactWorker { seen: seen.clone() })),
    ))
    .await
    .unwrap();

    game.add_fact("md5", BTreeMap::new(), "gm").await.unwrap();
    game.add_fact("sha1", BTreeMap::new(), "gm").await.unwrap();
    game.run_until_quiescent(Duration::from_millis(100)).await.unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn save_load_and_promote_wakes_a_type_scoped_waiter() {
    let mut game = Game::new(4, std::env::temp_dir(), Version(vec![1]));
    game.register_fact_type(FactTypeDescriptor::empty("md5")).unwrap();
    game.register_fact_type(FactTypeDescriptor::empty("mimetype")).unwrap();
    game.register_worker(WorkerTemplate::new(
        declaration("md5-npc", EntryKind::Object, "object"),
        WorkerHandler::Object(Arc::new(Md5Npc)),
    ))
    .await
    .unwrap();

    let last_hyp = Arc::new(Mutex::new(None));
    game.register_worker(WorkerTemplate::new(
        declaration("mimetype-player", EntryKind::Fact, "md5"),
        WorkerHandler::Fact(Arc::new(MimeTypePlayer { last_hyp: last_hyp.clone() })),
    ))
    .await
    .unwrap();

    game.seed_object(bytes::Bytes::from_static(b"abc"), "gm").await.unwrap();
    game.run_until_quiescent(Duration::from_millis(100)).await.unwrap();
    let hyp_id = last_hyp.lock().await.expect("scenario 1 setup should have produced a hyp");

    let mut buf = Vec::new();
    game.save_to(&mut buf).await.unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let watcher = WorkerTemplate::new(
        declaration("mimetype-watcher", EntryKind::Fact, "mimetype"),
        WorkerHandler::Fact(Arc::new(FlagWorker { fired: fired.clone() })),
    );

    let mut cursor = std::io::Cursor::new(buf);
    let mut loaded = Game::load(
        &mut cursor,
        vec![watcher],
        vec![FactTypeDescriptor::empty("md5"), FactTypeDescriptor::empty("mimetype")],
        4,
        std::env::temp_dir(),
        Version(vec![1]),
    )
    .await
    .unwrap();

    // Externally promote the hyp against the freshly loaded, not-yet-resumed
    // game before driving it to quiescence.
    let promoted = loaded.promote_hyp(hyp_id).await.unwrap();
    loaded.run_until_quiescent(Duration::from_millis(100)).await.unwrap();

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    let fact = loaded.get_fact(promoted).await.unwrap();
    assert_eq!(fact.fact_type, "mimetype");
}
