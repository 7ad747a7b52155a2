use std::sync::Arc;
use std::time::Duration;

use d_engine_treecache::BackoffPolicy;
use d_engine_treecache::MemCoordinator;
use d_engine_treecache::NodeEvent;
use d_engine_treecache::NodeEventKind;
use d_engine_treecache::TreeClient;
use tokio::sync::mpsc;

/// Long enough that no flush runs during a test unless it asks for one
pub const NO_FLUSH: Duration = Duration::from_secs(3600);

pub const QUIET: Duration = Duration::from_millis(150);

pub fn fast_rearm() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 0,
        base_delay_ms: 5,
        max_delay_ms: 20,
    }
}

/// In-memory service plus a client bootstrapped at `root_path`.
pub async fn connect(root_path: &str) -> (Arc<MemCoordinator>, TreeClient) {
    let (service, events) = MemCoordinator::new();
    let client = TreeClient::builder(service.clone(), events)
        .root_path(root_path)
        .flush_interval(NO_FLUSH)
        .rearm_policy(fast_rearm())
        .connect()
        .await
        .expect("connect");
    (service, client)
}

/// Client whose watch notifications are all lost, so only its flush can
/// observe changes.
pub async fn connect_deaf(
    root_path: &str,
    flush_interval: Duration,
) -> (Arc<MemCoordinator>, TreeClient) {
    let (service, _lost) = MemCoordinator::new();
    let (_silent_tx, silent_rx) = mpsc::unbounded_channel();
    let client = TreeClient::builder(service.clone(), silent_rx)
        .root_path(root_path)
        .flush_interval(flush_interval)
        .rearm_policy(fast_rearm())
        .connect()
        .await
        .expect("connect");
    (service, client)
}

/// Receives until the stream stays quiet for [`QUIET`].
pub async fn settle(rx: &mut mpsc::Receiver<NodeEvent>) -> Vec<NodeEvent> {
    let mut out = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(QUIET, rx.recv()).await {
        out.push(event);
    }
    out
}

pub fn count(
    events: &[NodeEvent],
    kind: NodeEventKind,
    path: &str,
) -> usize {
    events.iter().filter(|e| e.kind == kind && e.path == path).count()
}
