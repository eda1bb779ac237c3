// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Wait registry: lets a worker suspend until a matching entry exists,
//! draining any already-committed backlog before yielding live arrivals
//! (`spec.md` §4.4), and wakes every parked waiter with a cancellation when
//! the scheduler declares quiescence (`spec.md` §4.5 step 5).

use bb_config::Diagnostic;
use bb_store::{BlackboardStore, StoreError};
use bb_types::{EntryKind, FactId, HypId, ObjectId, PostEvent};
use futures_util::Stream;
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::Duration;
use tokio_stream::wrappers::BroadcastStream;

/// Errors raised by wait operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    /// The timeout elapsed before a matching entry arrived.
    #[error("wait timed out")]
    Timeout,
    /// The wait was cancelled — the scheduler declared quiescence (or is
    /// tearing down) while this waiter was still parked.
    #[error("wait was cancelled")]
    Cancelled,
    /// A `wait_on_child_*` call named a parent id that does not exist yet.
    #[error(transparent)]
    NoSuchParent(#[from] StoreError),
}

impl WaitError {
    /// Structured diagnostic view (`spec.md` §7).
    pub fn diagnostic(&self) -> Diagnostic {
        let kind = match self {
            Self::Timeout => "Timeout",
            Self::Cancelled => "Cancelled",
            Self::NoSuchParent(_) => "NoSuchParent",
        };
        Diagnostic {
            kind,
            location: "bb-wait",
            detail: self.to_string(),
        }
    }
}

type WaitKey = (EntryKind, Option<String>);

/// Registry of parked waiters, keyed by `(table, optional type filter)`.
///
/// Owns the shutdown broadcast the scheduler fires at quiescence
/// (`spec.md` §4.5 step 5): every live [`WaitStream`] subscribes to it at
/// construction and ends (yielding `None`, surfaced as
/// [`WaitError::Cancelled`] by [`wait_till_entry`](Self::wait_till_entry))
/// the moment it fires, regardless of whether a matching entry ever arrives.
pub struct WaitRegistry {
    waiters: RwLock<HashMap<WaitKey, Vec<mpsc::UnboundedSender<PostEvent>>>>,
    parked: Arc<AtomicU64>,
    shutdown: broadcast::Sender<()>,
}

impl Default for WaitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitRegistry {
    /// Construct an empty registry.
    pub fn new() -> Self {
        let (shutdown, _rx) = broadcast::channel(1);
        Self {
            waiters: RwLock::new(HashMap::new()),
            parked: Arc::new(AtomicU64::new(0)),
            shutdown,
        }
    }

    /// Number of waiters currently parked on a live [`WaitStream`] — used by
    /// the scheduler's quiescence check (`spec.md` §4.5 step 5: "every
    /// non-done clone is parked on a wait primitive").
    pub fn parked_count(&self) -> u64 {
        self.parked.load(Ordering::SeqCst)
    }

    /// Broadcast a cancellation to every waiter currently parked, and every
    /// one that subscribes from here on. Idempotent; a send with no
    /// receivers is not an error.
    pub fn cancel_all(&self) {
        let _ = self.shutdown.send(());
    }

    /// Called by the scheduler's dispatch loop for every committed
    /// [`PostEvent`]. Forwards the event to every waiter whose filter
    /// matches, dropping senders whose receiver has gone away ("release
    /// without leaking", `spec.md` §4.4).
    pub async fn notify(&self, event: &PostEvent) {
        let mut waiters = self.waiters.write().await;
        for key in [
            (event.kind, Some(event.type_name.clone())),
            (event.kind, None),
        ] {
            if let Some(senders) = waiters.get_mut(&key) {
                senders.retain(|tx| tx.send(event.clone()).is_ok());
            }
        }
    }

    /// Suspend until an entry of `kind` (optionally filtered to
    /// `type_name`) exists, yielding the historical backlog first.
    /// `since_id` excludes backlog entries with an id at or below it, so a
    /// subscriber that has already consumed some prefix of the table can
    /// resume without replaying what it already saw (`spec.md` §4.4).
    ///
    /// Backlog draining and live-waiter registration are not perfectly
    /// atomic with respect to the store's own table locks — a commit
    /// landing in the narrow window between the backlog scan and the
    /// `waiters` insert below is delivered on both paths. Downstream
    /// consumers (the scheduler's dispatch loop) already deduplicate by
    /// `(kind, id)`, so a duplicate delivery here is harmless; a *missed*
    /// delivery is not possible because the waiter is registered before
    /// this function returns.
    pub async fn wait_on_entries(
        &self,
        store: &BlackboardStore,
        kind: EntryKind,
        type_name: Option<String>,
        since_id: Option<u64>,
    ) -> WaitStream {
        let backlog = self
            .backlog_for(store, kind, type_name.as_deref(), None, since_id)
            .await;
        self.register(kind, type_name, backlog).await
    }

    /// As [`wait_on_entries`](Self::wait_on_entries), but scoped to
    /// children of a specific parent id. Fails fast with
    /// [`WaitError::NoSuchParent`] if the parent does not exist yet
    /// (`spec.md` §9 — overrides best-effort blocking).
    pub async fn wait_on_child_entries(
        &self,
        store: &BlackboardStore,
        parent: ParentRef,
        kind: EntryKind,
        type_name: Option<String>,
        since_id: Option<u64>,
    ) -> Result<WaitStream, WaitError> {
        match parent {
            ParentRef::Object(id) => {
                store.get_object(id).await?;
            }
            ParentRef::Fact(id) => {
                store.get_fact(id).await?;
            }
            ParentRef::Hyp(id) => {
                store.get_hyp(id).await?;
            }
        }
        let backlog = self
            .backlog_for(store, kind, type_name.as_deref(), Some(parent), since_id)
            .await;
        Ok(self.register(kind, type_name, backlog).await)
    }

    async fn register(&self, kind: EntryKind, type_name: Option<String>, backlog: VecDeque<PostEvent>) -> WaitStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.waiters.write().await.entry((kind, type_name)).or_default().push(tx);
        self.parked.fetch_add(1, Ordering::SeqCst);
        WaitStream::new(backlog, rx, Arc::clone(&self.parked), self.shutdown.subscribe())
    }

    /// Wait for exactly one matching arrival, bounded by `timeout`. If a
    /// matching entry is already in the backlog, it is returned immediately
    /// without racing the timer — with `timeout == Duration::ZERO` this is
    /// the difference between a deterministic hit and a coin-flip against
    /// an equally-ready `sleep(0)` (`spec.md` §8).
    pub async fn wait_till_entry(
        &self,
        store: &BlackboardStore,
        kind: EntryKind,
        type_name: Option<String>,
        since_id: Option<u64>,
        timeout: Duration,
    ) -> Result<PostEvent, WaitError> {
        let mut stream = self.wait_on_entries(store, kind, type_name, since_id).await;
        if let Some(event) = stream.next_from_backlog() {
            return Ok(event);
        }
        tokio::select! {
            next = futures_util::StreamExt::next(&mut stream) => {
                next.ok_or(WaitError::Cancelled)
            }
            () = tokio::time::sleep(timeout) => Err(WaitError::Timeout),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn backlog_for(
        &self,
        store: &BlackboardStore,
        kind: EntryKind,
        type_name: Option<&str>,
        parent: Option<ParentRef>,
        since_id: Option<u64>,
    ) -> VecDeque<PostEvent> {
        let tables = store.export_tables().await;
        let mut out = VecDeque::new();
        match kind {
            EntryKind::Object => {
                for (id, obj) in &tables.objects {
                    if since_id.is_some_and(|since| *id <= since) {
                        continue;
                    }
                    if let Some(p) = parent {
                        if !parent_matches(p, &obj.relations) {
                            continue;
                        }
                    }
                    out.push_back(PostEvent {
                        kind: EntryKind::Object,
                        type_name: "object".to_string(),
                        id: *id,
                        groups: Vec::new(),
                        parents: Vec::new(),
                        deduped: false,
                    });
                }
            }
            EntryKind::Fact => {
                for (id, fact) in &tables.facts {
                    if since_id.is_some_and(|since| *id <= since) {
                        continue;
                    }
                    if type_name.is_some_and(|t| t != fact.fact_type) {
                        continue;
                    }
                    if let Some(p) = parent {
                        if !parent_matches(p, &fact.relations) {
                            continue;
                        }
                    }
                    out.push_back(PostEvent {
                        kind: EntryKind::Fact,
                        type_name: fact.fact_type.clone(),
                        id: *id,
                        groups: fact.group_memberships.clone(),
                        parents: Vec::new(),
                        deduped: false,
                    });
                }
            }
            EntryKind::Hyp => {
                for (id, hyp) in &tables.hyps {
                    if since_id.is_some_and(|since| *id <= since) {
                        continue;
                    }
                    if type_name.is_some_and(|t| t != hyp.fact_type) {
                        continue;
                    }
                    if let Some(p) = parent {
                        if !parent_matches(p, &hyp.relations) {
                            continue;
                        }
                    }
                    out.push_back(PostEvent {
                        kind: EntryKind::Hyp,
                        type_name: hyp.fact_type.clone(),
                        id: *id,
                        groups: hyp.group_memberships.clone(),
                        parents: Vec::new(),
                        deduped: false,
                    });
                }
            }
        }
        out
    }
}

/// A parent id to scope a child-wait by, split by table.
#[derive(Clone, Copy, Debug)]
pub enum ParentRef {
    /// Scope to children of this object.
    Object(ObjectId),
    /// Scope to children of this fact.
    Fact(FactId),
    /// Scope to children of this hyp.
    Hyp(HypId),
}

fn parent_matches(parent: ParentRef, relations: &bb_types::Relations) -> bool {
    match parent {
        ParentRef::Object(id) => relations.parent_objects.contains(&id.0),
        ParentRef::Fact(id) => relations.parent_facts.contains(&id.0),
        ParentRef::Hyp(id) => relations.parent_hyps.contains(&id.0),
    }
}

/// Stream of matching [`PostEvent`]s: historical backlog, then live
/// arrivals, until the sender is dropped or the registry broadcasts
/// cancellation.
pub struct WaitStream {
    backlog: VecDeque<PostEvent>,
    rx: mpsc::UnboundedReceiver<PostEvent>,
    shutdown: BroadcastStream<()>,
    parked: Arc<AtomicU64>,
}

impl WaitStream {
    fn new(
        backlog: VecDeque<PostEvent>,
        rx: mpsc::UnboundedReceiver<PostEvent>,
        parked: Arc<AtomicU64>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            backlog,
            rx,
            shutdown: BroadcastStream::new(shutdown),
            parked,
        }
    }

    /// Pop the next already-buffered backlog entry, if any, without
    /// touching the live channel or the shutdown signal.
    fn next_from_backlog(&mut self) -> Option<PostEvent> {
        self.backlog.pop_front()
    }
}

impl Drop for WaitStream {
    fn drop(&mut self) {
        self.parked.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Stream for WaitStream {
    type Item = PostEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(event) = self.backlog.pop_front() {
            return Poll::Ready(Some(event));
        }
        if let Poll::Ready(event) = self.rx.poll_recv(cx) {
            return Poll::Ready(event);
        }
        match Pin::new(&mut self.shutdown).poll_next(cx) {
            Poll::Ready(_) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
