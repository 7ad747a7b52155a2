use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

use super::Acl;
use super::CoordinationResult;
use super::Coordinator;
use super::RawEvent;
use super::RawEventKind;
use super::Stat;
use crate::utils::path;
use crate::CoordinationError;

/// In-process coordination service with ZooKeeper semantics
///
/// - `create` bumps the parent's `cversion`, `set_data` bumps `version`
/// - data and children watches are one-shot per path
/// - `get_w` / `children_w` on a missing path fail with `NoNode` and arm nothing
/// - notifications go to the receiver returned by [`MemCoordinator::new`],
///   in the order the mutations happened
///
/// # Example
/// ```ignore
/// let (service, events) = MemCoordinator::new();
/// service.create("/app", Bytes::new(), &[]).await?;
/// let client = TreeClient::builder(service.clone(), events).connect().await?;
/// ```
pub struct MemCoordinator {
    state: Mutex<MemState>,
    events: mpsc::UnboundedSender<RawEvent>,
}

struct MemNode {
    data: Bytes,
    stat: Stat,
    children: BTreeSet<String>,
    acl: Vec<Acl>,
}

struct MemState {
    nodes: BTreeMap<String, MemNode>,
    data_watches: HashSet<String>,
    child_watches: HashSet<String>,
    zxid: i64,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

fn parent_of(p: &str) -> Option<String> {
    if p == "/" {
        return None;
    }
    match p.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(p[..idx].to_string()),
        None => None,
    }
}

fn no_node(p: &str) -> CoordinationError {
    CoordinationError::NoNode { path: p.to_string() }
}

impl MemState {
    fn next_zxid(&mut self) -> i64 {
        self.zxid += 1;
        self.zxid
    }

    fn node(
        &self,
        p: &str,
    ) -> CoordinationResult<&MemNode> {
        self.nodes.get(p).ok_or_else(|| no_node(p))
    }
}

impl MemCoordinator {
    /// Creates an empty namespace containing only `/`.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<RawEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let now = now_ms();
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "/".to_string(),
            MemNode {
                data: Bytes::new(),
                stat: Stat {
                    ctime: now,
                    mtime: now,
                    ..Stat::default()
                },
                children: BTreeSet::new(),
                acl: vec![Acl::world_all()],
            },
        );
        let service = Self {
            state: Mutex::new(MemState {
                nodes,
                data_watches: HashSet::new(),
                child_watches: HashSet::new(),
                zxid: 0,
            }),
            events: tx,
        };
        (Arc::new(service), rx)
    }

    fn fire_data_watch(
        &self,
        state: &mut MemState,
        p: &str,
        kind: RawEventKind,
    ) {
        if state.data_watches.remove(p) {
            self.send(RawEvent::new(kind, p));
        }
    }

    fn fire_child_watch(
        &self,
        state: &mut MemState,
        p: &str,
        kind: RawEventKind,
    ) {
        if state.child_watches.remove(p) {
            self.send(RawEvent::new(kind, p));
        }
    }

    fn send(
        &self,
        event: RawEvent,
    ) {
        trace!(path = %event.path, kind = ?event.kind, "mem coordinator fires watch");
        // Nobody listening is not an error for the service side
        let _ = self.events.send(event);
    }

    /// Replaces the data of `path`, bumping its `version`.
    pub fn set_data(
        &self,
        p: &str,
        data: impl Into<Bytes>,
    ) -> CoordinationResult<Stat> {
        let mut state = self.state.lock();
        let zxid = state.next_zxid();
        let node = state.nodes.get_mut(p).ok_or_else(|| no_node(p))?;
        let data = data.into();
        node.stat.version += 1;
        node.stat.mzxid = zxid;
        node.stat.mtime = now_ms();
        node.stat.data_length = data.len() as i32;
        node.data = data;
        let stat = node.stat;
        self.fire_data_watch(&mut state, p, RawEventKind::NodeDataChanged);
        Ok(stat)
    }

    /// Deletes a leaf node.
    ///
    /// # Errors
    /// - `NoNode` if the path does not exist
    /// - `NotEmpty` if the node still has children
    pub fn delete(
        &self,
        p: &str,
    ) -> CoordinationResult<()> {
        let mut state = self.state.lock();
        self.delete_locked(&mut state, p)
    }

    /// Deletes `path` and its whole subtree, deepest nodes first.
    pub fn delete_all(
        &self,
        p: &str,
    ) -> CoordinationResult<()> {
        let mut state = self.state.lock();
        state.node(p)?;
        let prefix = path::join(p, "");
        let mut doomed: Vec<String> = state
            .nodes
            .keys()
            .filter(|k| k.as_str() == p || k.starts_with(&prefix))
            .cloned()
            .collect();
        // deeper paths first
        doomed.sort_by_key(|k| std::cmp::Reverse(k.matches('/').count()));
        for k in doomed {
            self.delete_locked(&mut state, &k)?;
        }
        Ok(())
    }

    fn delete_locked(
        &self,
        state: &mut MemState,
        p: &str,
    ) -> CoordinationResult<()> {
        let parent = parent_of(p).ok_or_else(|| CoordinationError::Other("cannot delete /".into()))?;
        if !state.node(p)?.children.is_empty() {
            return Err(CoordinationError::NotEmpty { path: p.to_string() });
        }
        let zxid = state.next_zxid();
        state.nodes.remove(p);
        if let Some(parent_node) = state.nodes.get_mut(&parent) {
            parent_node.children.remove(path::short_name(p));
            parent_node.stat.cversion += 1;
            parent_node.stat.num_children -= 1;
            parent_node.stat.pzxid = zxid;
        }
        self.fire_data_watch(state, p, RawEventKind::NodeDeleted);
        self.fire_child_watch(state, p, RawEventKind::NodeDeleted);
        self.fire_child_watch(state, &parent, RawEventKind::NodeChildrenChanged);
        Ok(())
    }

    /// Pushes a path-less session event onto the notification stream.
    pub fn session_event(&self) {
        self.send(RawEvent::new(RawEventKind::Session, ""));
    }

    /// Number of armed data watches, for tests and diagnostics.
    pub fn data_watch_count(&self) -> usize {
        self.state.lock().data_watches.len()
    }

    /// Number of armed children watches, for tests and diagnostics.
    pub fn child_watch_count(&self) -> usize {
        self.state.lock().child_watches.len()
    }

    pub fn contains(
        &self,
        p: &str,
    ) -> bool {
        self.state.lock().nodes.contains_key(p)
    }

    /// ACL list `path` was created with.
    pub fn acl(
        &self,
        p: &str,
    ) -> CoordinationResult<Vec<Acl>> {
        Ok(self.state.lock().node(p)?.acl.clone())
    }
}

#[async_trait]
impl Coordinator for MemCoordinator {
    async fn get(
        &self,
        p: &str,
    ) -> CoordinationResult<(Bytes, Stat)> {
        let state = self.state.lock();
        let node = state.node(p)?;
        Ok((node.data.clone(), node.stat))
    }

    async fn get_w(
        &self,
        p: &str,
    ) -> CoordinationResult<(Bytes, Stat)> {
        let mut state = self.state.lock();
        let (data, stat) = {
            let node = state.node(p)?;
            (node.data.clone(), node.stat)
        };
        state.data_watches.insert(p.to_string());
        Ok((data, stat))
    }

    async fn children(
        &self,
        p: &str,
    ) -> CoordinationResult<(Vec<String>, Stat)> {
        let state = self.state.lock();
        let node = state.node(p)?;
        Ok((node.children.iter().cloned().collect(), node.stat))
    }

    async fn children_w(
        &self,
        p: &str,
    ) -> CoordinationResult<(Vec<String>, Stat)> {
        let mut state = self.state.lock();
        let (children, stat) = {
            let node = state.node(p)?;
            (node.children.iter().cloned().collect(), node.stat)
        };
        state.child_watches.insert(p.to_string());
        Ok((children, stat))
    }

    async fn exists(
        &self,
        p: &str,
    ) -> CoordinationResult<Option<Stat>> {
        Ok(self.state.lock().nodes.get(p).map(|n| n.stat))
    }

    async fn create(
        &self,
        p: &str,
        data: Bytes,
        acl: &[Acl],
    ) -> CoordinationResult<String> {
        path::validate_path(p).map_err(|e| CoordinationError::Other(e.to_string()))?;
        let parent = parent_of(p).ok_or_else(|| CoordinationError::NodeExists { path: p.to_string() })?;

        let mut state = self.state.lock();
        if state.nodes.contains_key(p) {
            return Err(CoordinationError::NodeExists { path: p.to_string() });
        }
        state.node(&parent)?;

        let zxid = state.next_zxid();
        let now = now_ms();
        state.nodes.insert(
            p.to_string(),
            MemNode {
                stat: Stat {
                    czxid: zxid,
                    mzxid: zxid,
                    pzxid: zxid,
                    ctime: now,
                    mtime: now,
                    data_length: data.len() as i32,
                    ..Stat::default()
                },
                data,
                children: BTreeSet::new(),
                acl: acl.to_vec(),
            },
        );
        if let Some(parent_node) = state.nodes.get_mut(&parent) {
            parent_node.children.insert(path::short_name(p).to_string());
            parent_node.stat.cversion += 1;
            parent_node.stat.num_children += 1;
            parent_node.stat.pzxid = zxid;
        }
        self.fire_child_watch(&mut state, &parent, RawEventKind::NodeChildrenChanged);
        Ok(p.to_string())
    }
}
