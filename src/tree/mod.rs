//! The in-memory mirror.
//!
//! Leaves first: [`VersionGate`] dedupes observed versions,
//! [`NodeLifecycle`] carries a node's stop signals, [`WatchRearm`] paces
//! one-shot watch re-arming, [`TreeNodeMap`] indexes nodes by path, and
//! [`TreeNode`] ties them together for one mirrored path.

mod event;
mod lifecycle;
mod node;
mod rearm;
mod registry;
mod version_gate;

pub use event::*;
pub use lifecycle::*;
pub use node::*;
pub use rearm::*;
pub use registry::*;
pub use version_gate::*;


use std::sync::Arc;

use crate::BackoffPolicy;
use crate::Coordinator;

/// State shared by every node of one client
///
/// Created with the client and emptied by its shutdown. Nodes hold it
/// strongly while the registry holds the nodes, so a node stays reachable
/// until it is cleared.
pub(crate) struct TreeContext {
    pub(crate) coordinator: Arc<dyn Coordinator>,
    /// Global path index of live nodes
    pub(crate) registry: TreeNodeMap,
    pub(crate) rearm: BackoffPolicy,
    pub(crate) event_buffer_size: usize,
}

impl TreeContext {
    pub(crate) fn new(
        coordinator: Arc<dyn Coordinator>,
        rearm: BackoffPolicy,
        event_buffer_size: usize,
    ) -> Self {
        Self {
            coordinator,
            registry: TreeNodeMap::new(),
            rearm,
            event_buffer_size,
        }
    }
}
