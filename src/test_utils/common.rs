use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::tree::TreeContext;
use crate::BackoffPolicy;
use crate::CoordinationError;
use crate::Coordinator;
use crate::MockCoordinator;
use crate::NodeEvent;
use crate::NodeEventKind;
use crate::Stat;
use crate::TreeNode;

pub(crate) const LONG_INTERVAL: Duration = Duration::from_secs(3600);

pub(crate) fn stat(
    version: i32,
    cversion: i32,
) -> Stat {
    Stat {
        version,
        cversion,
        ..Stat::default()
    }
}

pub(crate) fn no_node(path: &str) -> CoordinationError {
    CoordinationError::NoNode {
        path: path.to_string(),
    }
}

pub(crate) fn test_policy() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 0,
        base_delay_ms: 10,
        max_delay_ms: 40,
    }
}

pub(crate) fn test_context(coordinator: Arc<dyn Coordinator>) -> Arc<TreeContext> {
    Arc::new(TreeContext::new(coordinator, test_policy(), 64))
}

/// Builds a subtree root for `path`, registers it and takes its stream.
pub(crate) fn register_root(
    ctx: &Arc<TreeContext>,
    path: &str,
    interval: Duration,
) -> (Arc<TreeNode>, mpsc::Receiver<NodeEvent>) {
    let node = TreeNode::new(ctx.clone(), path, None, None, interval).unwrap();
    ctx.registry.insert_if_absent(node.clone()).unwrap();
    let rx = node.subscribe().unwrap();
    (node, rx)
}

/// Mock serving a fixed tree: every listed path has data `data:<path>` at
/// version 0 and the given children at cversion 0; anything else is
/// `NoNode`.
pub(crate) fn static_tree(nodes: &[(&str, Vec<&str>)]) -> MockCoordinator {
    let tree: Arc<HashMap<String, Vec<String>>> = Arc::new(
        nodes
            .iter()
            .map(|(p, c)| (p.to_string(), c.iter().map(|s| s.to_string()).collect()))
            .collect(),
    );

    let mut mock = MockCoordinator::new();
    let t = tree.clone();
    mock.expect_get().returning(move |p| read_data(&t, p));
    let t = tree.clone();
    mock.expect_get_w().returning(move |p| read_data(&t, p));
    let t = tree.clone();
    mock.expect_children().returning(move |p| read_children(&t, p));
    let t = tree;
    mock.expect_children_w().returning(move |p| read_children(&t, p));
    mock
}

fn read_data(
    tree: &HashMap<String, Vec<String>>,
    p: &str,
) -> Result<(Bytes, Stat), CoordinationError> {
    if tree.contains_key(p) {
        Ok((Bytes::from(format!("data:{p}")), stat(0, 0)))
    } else {
        Err(no_node(p))
    }
}

fn read_children(
    tree: &HashMap<String, Vec<String>>,
    p: &str,
) -> Result<(Vec<String>, Stat), CoordinationError> {
    tree.get(p).map(|c| (c.clone(), stat(0, 0))).ok_or_else(|| no_node(p))
}

/// Receives until the stream stays quiet for `quiet`.
pub(crate) async fn drain_events(
    rx: &mut mpsc::Receiver<NodeEvent>,
    quiet: Duration,
) -> Vec<NodeEvent> {
    let mut out = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(quiet, rx.recv()).await {
        out.push(event);
    }
    out
}

pub(crate) fn count(
    events: &[NodeEvent],
    kind: NodeEventKind,
    path: &str,
) -> usize {
    events.iter().filter(|e| e.kind == kind && e.path == path).count()
}
