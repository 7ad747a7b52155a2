//! One mirrored path and the state machine that keeps it live.
//!
//! ```text
//!   Uninitialized ──init()──> Live ──clear()──> Cleared
//!         │                    ↺ echo / flush
//!         └── init() failed ──────────────────> Cleared
//! ```
//!
//! A node learns about changes from two independent sources. Watch
//! notifications are routed to [`TreeNode::echo`] by the client dispatcher,
//! and every subtree root runs a periodic flush that re-reads the whole
//! subtree. Both paths pass every observed version through the node's
//! [`VersionGate`]s, so whichever reads a change first emits it and the
//! other is a no-op.
//!
//! Nodes reference their parent and root weakly. The owning edges are the
//! client index and each parent's children map; both are emptied by
//! [`TreeNode::clear`].

use std::fmt;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::trace;
use tracing::warn;

use super::Indexed;
use super::NodeEvent;
use super::NodeEventKind;
use super::NodeLifecycle;
use super::RearmStep;
use super::StopReason;
use super::TreeContext;
use super::TreeNodeMap;
use super::VersionGate;
use super::WatchKind;
use super::WatchRearm;
use super::WatchState;
use crate::utils::path;
use crate::CoordinationResult;
use crate::RawEvent;
use crate::RawEventKind;
use crate::Result;
use crate::Stat;
use crate::TreeError;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Uninitialized = 0,
    Live = 1,
    Cleared = 2,
}

impl From<u8> for NodeState {
    fn from(v: u8) -> Self {
        match v {
            0 => NodeState::Uninitialized,
            1 => NodeState::Live,
            _ => NodeState::Cleared,
        }
    }
}

pub struct TreeNode {
    path: String,
    name: String,

    parent: Option<Weak<TreeNode>>,
    /// Topmost node of this subtree; `None` on the root itself
    root: Option<Weak<TreeNode>>,
    children: TreeNodeMap,

    /// Paths of cleared children, drained before the children map is read
    detached_tx: mpsc::UnboundedSender<String>,
    detached_rx: Mutex<mpsc::UnboundedReceiver<String>>,
    /// The parent's detach queue
    parent_detached_tx: Option<mpsc::UnboundedSender<String>>,

    data_version: VersionGate,
    children_version: VersionGate,
    lifecycle: NodeLifecycle,
    state: AtomicU8,
    interval: Duration,

    /// Subtree event stream, present on roots only
    event_tx: Option<mpsc::Sender<NodeEvent>>,
    event_rx: Mutex<Option<mpsc::Receiver<NodeEvent>>>,
    /// Serializes this node's emissions with its `Removed`
    emit_lock: tokio::sync::Mutex<()>,
    /// Fired once teardown finished, `Removed` included
    torn_down: CancellationToken,

    ctx: Arc<TreeContext>,
}

impl TreeNode {
    /// Builds an unregistered, uninitialized node.
    ///
    /// The short name defaults to the last path segment. With a parent, the
    /// node joins the parent's subtree: its root is the parent's root, or
    /// the parent itself when the parent is a subtree root.
    ///
    /// # Errors
    /// - [`TreeError::InvalidPath`] for a malformed path
    /// - [`TreeError::InvalidTopology`] if `parent` has a parent but no root
    pub(crate) fn new(
        ctx: Arc<TreeContext>,
        node_path: &str,
        name: Option<&str>,
        parent: Option<&Arc<TreeNode>>,
        interval: Duration,
    ) -> Result<Arc<Self>> {
        path::validate_path(node_path)?;

        let name = match name {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => path::short_name(node_path).to_string(),
        };

        let (parent_ref, root, parent_detached_tx) = match parent {
            None => (None, None, None),
            Some(p) => {
                let root = match (&p.root, &p.parent) {
                    (Some(r), _) => r.clone(),
                    (None, None) => Arc::downgrade(p),
                    (None, Some(_)) => {
                        return Err(TreeError::InvalidTopology {
                            path: node_path.to_string(),
                            parent: p.path.clone(),
                        }
                        .into());
                    }
                };
                (
                    Some(Arc::downgrade(p)),
                    Some(root),
                    Some(p.detached_tx.clone()),
                )
            }
        };

        let (event_tx, event_rx) = if root.is_none() {
            let (tx, rx) = mpsc::channel(ctx.event_buffer_size.max(1));
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let (detached_tx, detached_rx) = mpsc::unbounded_channel();

        Ok(Arc::new(Self {
            path: node_path.to_string(),
            name,
            parent: parent_ref,
            root,
            children: TreeNodeMap::new(),
            detached_tx,
            detached_rx: Mutex::new(detached_rx),
            parent_detached_tx,
            data_version: VersionGate::new(),
            children_version: VersionGate::new(),
            lifecycle: NodeLifecycle::new(),
            state: AtomicU8::new(NodeState::Uninitialized as u8),
            interval,
            event_tx,
            event_rx: Mutex::new(event_rx),
            emit_lock: tokio::sync::Mutex::new(()),
            torn_down: CancellationToken::new(),
            ctx,
        }))
    }

    /// Reads the node and its children (reported as `Created`), arms both
    /// watches and, on a subtree root, starts the periodic flush.
    ///
    /// The node must already be registered. On failure it is torn down
    /// again and the read error is returned.
    pub async fn init(self: &Arc<Self>) -> Result<()> {
        if self.state() != NodeState::Uninitialized {
            debug!(path = %self.path, state = ?self.state(), "init skipped");
            return Ok(());
        }

        if let Err(e) = self.sync(NodeEventKind::Created).await {
            warn!(path = %self.path, error = %e, "initial read failed");
            self.abort_init().await;
            return Err(e);
        }

        if self
            .state
            .compare_exchange(
                NodeState::Uninitialized as u8,
                NodeState::Live as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            debug!(path = %self.path, "cleared during init");
            return Ok(());
        }

        self.rearm(WatchKind::Children).await;
        self.rearm(WatchKind::Data).await;

        if self.is_root() && !self.lifecycle.is_cleared() {
            self.spawn_flush();
        }

        debug!(path = %self.path, state = ?self.state(), "init done");
        Ok(())
    }

    /// Handles a watch notification for this node.
    ///
    /// Ignored unless the node is live.
    pub async fn echo(
        self: &Arc<Self>,
        event: RawEvent,
    ) {
        if self.state() != NodeState::Live {
            trace!(path = %self.path, ?event, "echo ignored on non-live node");
            return;
        }

        match event.kind {
            RawEventKind::NodeDeleted => {
                if let Err(e) = self.clear().await {
                    error!(path = %self.path, error = %e, "clear failed");
                }
            }
            RawEventKind::NodeDataChanged => {
                match self.ctx.coordinator.get(&self.path).await {
                    Ok((data, stat)) => self.accept_data(NodeEventKind::Updated, data, stat).await,
                    Err(e) if e.is_no_node() => {
                        if let Err(e) = self.clear().await {
                            error!(path = %self.path, error = %e, "clear failed");
                        }
                        return;
                    }
                    Err(e) => warn!(path = %self.path, error = %e, "get failed"),
                }
                self.rearm(WatchKind::Data).await;
            }
            RawEventKind::NodeChildrenChanged => {
                match self.ctx.coordinator.children(&self.path).await {
                    Ok((names, stat)) => self.accept_children(names, stat).await,
                    Err(e) if e.is_no_node() => {
                        if let Err(e) = self.clear().await {
                            error!(path = %self.path, error = %e, "clear failed");
                        }
                        return;
                    }
                    Err(e) => warn!(path = %self.path, error = %e, "children failed"),
                }
                self.rearm(WatchKind::Children).await;
            }
            RawEventKind::NodeCreated | RawEventKind::Session => {
                trace!(path = %self.path, ?event, "echo: nothing to do");
            }
        }
    }

    /// Tears the node and its whole subtree down.
    ///
    /// Idempotent: only the first call does the work, later and concurrent
    /// calls wait until it finished. Emits exactly one `Removed` event for
    /// this node after all of its children emitted theirs.
    pub fn clear(self: &Arc<Self>) -> BoxFuture<'static, Result<()>> {
        let this = self.clone();
        async move {
            if !this.lifecycle.mark_cleared() {
                this.torn_down.cancelled().await;
                return Ok(());
            }
            this.state.store(NodeState::Cleared as u8, Ordering::Release);
            this.lifecycle.stop();

            let children = this.children.snapshot();
            let results = join_all(children.iter().map(|c| c.clear())).await;
            for (child, res) in children.iter().zip(results) {
                if let Err(e) = res {
                    error!(path = %child.path, error = %e, "clear failed on child");
                }
            }
            this.children.clear();

            this.detach_from_parent();
            this.ctx.registry.remove_node(&this);

            {
                let _emitting = this.emit_lock.lock().await;
                this.emit(NodeEvent::removed(&this.path, &this.name)).await;
            }
            this.torn_down.cancel();
            debug!(path = %this.path, "node cleared");
            Ok(())
        }
        .boxed()
    }

    /// Takes the subtree event stream. Only a subtree root has one and it
    /// can be taken once.
    pub fn subscribe(&self) -> Option<mpsc::Receiver<NodeEvent>> {
        self.event_rx.lock().take()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> NodeState {
        NodeState::from(self.state.load(Ordering::Acquire))
    }

    pub fn is_root(&self) -> bool {
        self.root.is_none()
    }

    pub fn parent(&self) -> Option<Arc<TreeNode>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn root(&self) -> Option<Arc<TreeNode>> {
        self.root.as_ref().and_then(Weak::upgrade)
    }

    pub fn data_version(&self) -> i32 {
        self.data_version.current()
    }

    pub fn children_version(&self) -> i32 {
        self.children_version.current()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Live direct children
    pub fn children(&self) -> Vec<Arc<TreeNode>> {
        self.drain_detached();
        self.children
            .snapshot()
            .into_iter()
            .filter(|c| !c.is_retired())
            .collect()
    }

    pub fn child(
        &self,
        child_path: &str,
    ) -> Option<Arc<TreeNode>> {
        self.drain_detached();
        self.children.get(child_path).filter(|c| !c.is_retired())
    }

    /// Adds a node built with this node as parent to the children map.
    pub(crate) fn attach_child(
        &self,
        child: Arc<TreeNode>,
    ) {
        self.drain_detached();
        let _ = self.children.insert_if_absent(child);
    }

    /// Reads data and children once, emitting `kind` for an accepted data
    /// version and expanding newly listed children.
    async fn sync(
        self: &Arc<Self>,
        kind: NodeEventKind,
    ) -> Result<()> {
        let (data, stat) = self.ctx.coordinator.get(&self.path).await?;
        self.accept_data(kind, data, stat).await;

        let (names, stat) = self.ctx.coordinator.children(&self.path).await?;
        self.accept_children(names, stat).await;
        Ok(())
    }

    async fn accept_data(
        &self,
        kind: NodeEventKind,
        data: Bytes,
        stat: Stat,
    ) {
        let _emitting = self.emit_lock.lock().await;
        // a read that raced with clear must not follow the Removed event
        if self.lifecycle.is_cleared() {
            trace!(path = %self.path, version = stat.version, "data read after clear dropped");
            return;
        }
        if !self.data_version.update(stat.version) {
            trace!(path = %self.path, version = stat.version, "stale data version");
            return;
        }
        self.emit(NodeEvent::with_data(kind, &self.path, &self.name, data, stat))
            .await;
    }

    async fn accept_children(
        self: &Arc<Self>,
        names: Vec<String>,
        stat: Stat,
    ) {
        if !self.children_version.update(stat.cversion) {
            trace!(path = %self.path, cversion = stat.cversion, "stale children version");
            return;
        }
        self.expand(names).await;
    }

    /// Creates, registers and initializes every listed child this node does
    /// not track yet. Children missing from the listing are left alone;
    /// they leave through their own deletion.
    pub(crate) fn expand(
        self: &Arc<Self>,
        names: Vec<String>,
    ) -> BoxFuture<'static, ()> {
        let this = self.clone();
        async move {
            this.drain_detached();

            for name in names {
                if this.lifecycle.is_cleared() {
                    return;
                }
                let child_path = path::join(&this.path, &name);
                if this.children.get(&child_path).is_some_and(|c| !c.is_retired()) {
                    continue;
                }

                let child = match TreeNode::new(
                    this.ctx.clone(),
                    &child_path,
                    Some(&name),
                    Some(&this),
                    this.interval,
                ) {
                    Ok(child) => child,
                    Err(e) => {
                        warn!(path = %child_path, error = %e, "cannot build child");
                        continue;
                    }
                };

                if let Err(current) = this.ctx.registry.insert_if_absent(child.clone()) {
                    trace!(path = %child_path, state = ?current.state(), "child already tracked");
                    continue;
                }
                let _ = this.children.insert_if_absent(child.clone());

                // a clear that snapshotted our children before the insert
                // would miss this child
                if this.lifecycle.is_cleared() {
                    child.discard();
                    return;
                }

                if let Err(e) = child.init().await {
                    warn!(path = %child_path, error = %e, "child init failed");
                }
            }
        }
        .boxed()
    }

    /// Arms the watch of `kind` again, retrying transient failures with the
    /// configured backoff until it is armed, the node is gone or the
    /// matching stop signal fires.
    async fn rearm(
        self: &Arc<Self>,
        kind: WatchKind,
    ) {
        let stop = self.lifecycle.watch_stop(kind).clone();
        let mut rearm = WatchRearm::fired(kind, self.ctx.rearm);

        while let RearmStep::Attempt { delay } = rearm.begin(stop.is_cancelled()) {
            if !delay.is_zero() {
                tokio::select! {
                    _ = stop.cancelled() => continue,
                    _ = tokio::time::sleep(delay + jitter(delay)) => {}
                }
            }

            let outcome = self.arm(kind).await;
            if let Err(e) = &outcome {
                if !e.is_no_node() {
                    warn!(path = %self.path, ?kind, error = %e, "re-arm failed");
                }
            }
            rearm.complete(outcome.as_ref().map(|_| ()), stop.is_cancelled());
        }

        match rearm.state() {
            WatchState::Armed => trace!(path = %self.path, ?kind, "watch armed"),
            WatchState::Stopped(StopReason::NodeGone) => {
                debug!(path = %self.path, ?kind, "node gone while re-arming");
                if let Err(e) = self.clear().await {
                    error!(path = %self.path, error = %e, "clear failed");
                }
            }
            WatchState::Stopped(StopReason::Cancelled) => {
                debug!(path = %self.path, ?kind, "re-arm stopped");
            }
            WatchState::Stopped(StopReason::RetriesExhausted) => {
                warn!(path = %self.path, ?kind, "re-arm retries exhausted; relying on flush");
            }
            state => trace!(path = %self.path, ?kind, ?state, "re-arm left unfinished"),
        }
    }

    /// One arming read. Its result is fed through the version gates, so a
    /// change that landed between the last read and the arm is not lost.
    async fn arm(
        self: &Arc<Self>,
        kind: WatchKind,
    ) -> CoordinationResult<()> {
        match kind {
            WatchKind::Data => {
                let (data, stat) = self.ctx.coordinator.get_w(&self.path).await?;
                self.accept_data(NodeEventKind::Updated, data, stat).await;
            }
            WatchKind::Children => {
                let (names, stat) = self.ctx.coordinator.children_w(&self.path).await?;
                self.accept_children(names, stat).await;
            }
        }
        Ok(())
    }

    fn spawn_flush(self: &Arc<Self>) {
        let node = Arc::downgrade(self);
        let stop = self.lifecycle.flush_stop().clone();
        let interval = self.interval;
        let node_path = self.path.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(node) = node.upgrade() else { break };
                        node.flush_subtree().await;
                        trace!(path = %node_path, "flushed");
                    }
                }
            }
            debug!(path = %node_path, "flush stopped");
        });
    }

    /// Depth-first re-read of this node and every live descendant.
    pub(crate) fn flush_subtree(self: &Arc<Self>) -> BoxFuture<'static, ()> {
        let this = self.clone();
        async move {
            if this.state() != NodeState::Live {
                return;
            }
            this.drain_detached();

            for child in this.children.snapshot() {
                child.flush_subtree().await;
            }

            match this.sync(NodeEventKind::Updated).await {
                Ok(()) => {}
                Err(e) if e.is_no_node() => {
                    debug!(path = %this.path, "flush found node deleted");
                    if let Err(e) = this.clear().await {
                        error!(path = %this.path, error = %e, "clear failed");
                    }
                }
                Err(e) => warn!(path = %this.path, error = %e, "flush failed"),
            }
        }
        .boxed()
    }

    /// Sends `event` to the subtree root's stream.
    ///
    /// Waits while the stream is full.
    async fn emit(
        &self,
        event: NodeEvent,
    ) {
        let root = match &self.root {
            None => None,
            Some(weak) => match weak.upgrade() {
                Some(root) => Some(root),
                None => {
                    trace!(path = %self.path, ?event, "root gone; event dropped");
                    return;
                }
            },
        };
        let target = root.as_deref().unwrap_or(self);

        let Some(tx) = &target.event_tx else {
            return;
        };
        trace!(path = %event.path, kind = ?event.kind, "emit");
        if tx.send(event).await.is_err() {
            trace!(path = %target.path, "event stream closed");
        }
    }

    /// Tears down a node whose init failed. Only a node that already
    /// announced itself emits `Removed`.
    async fn abort_init(self: &Arc<Self>) {
        if self.data_version.is_unset() {
            self.discard();
        } else if let Err(e) = self.clear().await {
            error!(path = %self.path, error = %e, "clear failed");
        }
    }

    /// Silent teardown: stops the node and unlinks it without emitting
    /// `Removed`.
    pub(crate) fn discard(self: &Arc<Self>) {
        if !self.lifecycle.mark_cleared() {
            return;
        }
        self.state.store(NodeState::Cleared as u8, Ordering::Release);
        self.lifecycle.stop();
        self.detach_from_parent();
        self.ctx.registry.remove_node(self);
        self.torn_down.cancel();
        debug!(path = %self.path, "node discarded");
    }

    fn detach_from_parent(&self) {
        if let Some(tx) = &self.parent_detached_tx {
            // the parent may already be gone
            let _ = tx.send(self.path.clone());
        }
    }

    fn drain_detached(&self) {
        let mut rx = self.detached_rx.lock();
        while let Ok(child_path) = rx.try_recv() {
            self.children.remove_if_retired(&child_path);
        }
    }
}

impl Indexed for TreeNode {
    fn key(&self) -> &str {
        &self.path
    }

    fn is_retired(&self) -> bool {
        self.lifecycle.is_cleared()
    }
}

impl fmt::Debug for TreeNode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("TreeNode")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("data_version", &self.data_version.current())
            .field("children_version", &self.children_version.current())
            .field("is_root", &self.is_root())
            .finish()
    }
}

/// Up to a quarter of `delay`, so retries of sibling nodes spread out
fn jitter(delay: Duration) -> Duration {
    let max = delay.as_millis() as u64 / 4;
    if max == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max))
}
