//! Client module for the tree cache
//!
//! - [`TreeClient`] - owns the coordination handle, the path index and the
//!   dispatcher that routes watch notifications to nodes
//! - [`TreeClientBuilder`] - configurable construction plus root bootstrap
//!
//! # Basic Usage
//! ```ignore
//! use d_engine_treecache::{MemCoordinator, NodeEventKind, TreeClient};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let (service, events) = MemCoordinator::new();
//!     let client = TreeClient::builder(service.clone(), events)
//!         .root_path("/services")
//!         .connect()
//!         .await
//!         .unwrap();
//!
//!     let (root, mut events) = client.watch("/services").unwrap();
//!     let reader = tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             println!("{:?} {}", event.kind, event.path);
//!         }
//!     });
//!     root.init().await.unwrap();
//!
//!     client.shutdown().await;
//!     reader.await.unwrap();
//! }
//! ```

mod builder;
mod dispatcher;

pub use builder::*;
pub(crate) use dispatcher::*;


use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::tree::TreeContext;
use crate::utils::path;
use crate::CoordinationError;
use crate::Coordinator;
use crate::Error;
use crate::NodeEvent;
use crate::RawEvent;
use crate::Result;
use crate::TreeCacheConfig;
use crate::TreeError;
use crate::TreeNode;

/// Entry point of the tree cache
///
/// One client serves any number of independently watched subtrees. All of
/// them share the client's coordination handle and path index.
pub struct TreeClient {
    ctx: Arc<TreeContext>,
    config: TreeCacheConfig,
    shutdown: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl TreeClient {
    pub fn builder(
        coordinator: Arc<dyn Coordinator>,
        events: mpsc::UnboundedReceiver<RawEvent>,
    ) -> TreeClientBuilder {
        TreeClientBuilder::new(coordinator, events)
    }

    /// Creates the client and starts routing `events` to watched nodes.
    ///
    /// `config` is used as is; validate it first. Must be called inside a
    /// tokio runtime.
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        events: mpsc::UnboundedReceiver<RawEvent>,
        config: TreeCacheConfig,
    ) -> Self {
        let ctx = Arc::new(TreeContext::new(
            coordinator,
            config.rearm,
            config.cache.event_buffer_size,
        ));
        let shutdown = CancellationToken::new();

        let dispatcher = EventDispatcher::new(ctx.clone(), events, shutdown.clone());
        let handle = tokio::spawn(dispatcher.run());

        Self {
            ctx,
            config,
            shutdown,
            dispatcher: Mutex::new(Some(handle)),
        }
    }

    pub fn config(&self) -> &TreeCacheConfig {
        &self.config
    }

    /// Ensures the configured root path exists.
    pub async fn bootstrap(&self) -> Result<()> {
        let root_path = self.config.session.root_path.clone();
        self.ensure_path(&root_path).await
    }

    /// Walks `node_path` from the top and creates every missing segment
    /// with empty content and the session's ACLs.
    pub async fn ensure_path(
        &self,
        node_path: &str,
    ) -> Result<()> {
        path::validate_path(node_path)?;
        let acl = self.config.session.acls();

        for segment in path::ancestors(node_path) {
            if self.ctx.coordinator.exists(&segment).await?.is_some() {
                continue;
            }
            match self.ctx.coordinator.create(&segment, Bytes::new(), &acl).await {
                Ok(created) => info!(path = %created, "created missing path segment"),
                // lost a race with another creator
                Err(CoordinationError::NodeExists { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Builds and registers a node for `node_path`.
    ///
    /// Without a parent the node becomes a subtree root with its own event
    /// stream and flush loop. With a parent it joins that parent's subtree
    /// and children map. The node is returned uninitialized; call
    /// [`TreeNode::init`] to start observing.
    ///
    /// # Errors
    /// - [`TreeError::AlreadyWatched`] if a live node holds the path
    /// - [`TreeError::InvalidPath`], [`TreeError::InvalidTopology`]
    pub fn watch_node(
        &self,
        node_path: &str,
        name: Option<&str>,
        parent: Option<&Arc<TreeNode>>,
        interval: Duration,
    ) -> Result<Arc<TreeNode>> {
        let node = TreeNode::new(self.ctx.clone(), node_path, name, parent, interval)?;

        if self.ctx.registry.insert_if_absent(node.clone()).is_err() {
            return Err(TreeError::AlreadyWatched(node_path.to_string()).into());
        }
        if let Some(parent) = parent {
            parent.attach_child(node.clone());
        }

        debug!(path = %node_path, "node registered");
        Ok(node)
    }

    /// Registers a subtree root flushed at the configured interval and
    /// hands back its event stream.
    ///
    /// Start reading the stream before calling [`TreeNode::init`]: emission
    /// waits while the stream is full.
    pub fn watch(
        &self,
        node_path: &str,
    ) -> Result<(Arc<TreeNode>, mpsc::Receiver<NodeEvent>)> {
        self.watch_with_interval(node_path, self.config.cache.flush_interval())
    }

    pub fn watch_with_interval(
        &self,
        node_path: &str,
        interval: Duration,
    ) -> Result<(Arc<TreeNode>, mpsc::Receiver<NodeEvent>)> {
        let node = self.watch_node(node_path, None, None, interval)?;
        let events = node
            .subscribe()
            .ok_or_else(|| Error::Fatal(format!("event stream of {node_path} already taken")))?;
        Ok((node, events))
    }

    /// Looks up the live node registered for `node_path`.
    pub fn get(
        &self,
        node_path: &str,
    ) -> Option<Arc<TreeNode>> {
        self.ctx.registry.get(node_path)
    }

    /// Number of nodes in the path index
    pub fn node_count(&self) -> usize {
        self.ctx.registry.len()
    }

    /// Clears every subtree, then stops routing notifications.
    pub async fn shutdown(&self) {
        info!("Tree client shutting down");

        let roots: Vec<_> = self
            .ctx
            .registry
            .snapshot()
            .into_iter()
            .filter(|n| n.is_root())
            .collect();
        clear_all(&roots).await;

        // nodes registered under an explicit parent whose root went first
        let stragglers = self.ctx.registry.snapshot();
        clear_all(&stragglers).await;
        self.ctx.registry.clear();

        self.shutdown.cancel();
        let handle = self.dispatcher.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Tree event dispatcher failed: {:?}", e);
            }
        }

        info!("Tree client stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for TreeClient {
    /// Stops every node still registered without emitting `Removed`, and
    /// empties the index so nodes and their context can be freed. Call
    /// [`TreeClient::shutdown`] first to get the teardown events.
    fn drop(&mut self) {
        for node in self.ctx.registry.snapshot() {
            node.discard();
        }
        self.ctx.registry.clear();
        self.shutdown.cancel();
    }
}

async fn clear_all(nodes: &[Arc<TreeNode>]) {
    let results = join_all(nodes.iter().map(|n| n.clear())).await;
    for (node, res) in nodes.iter().zip(results) {
        if let Err(e) = res {
            error!(path = %node.path(), error = %e, "clear failed during shutdown");
        }
    }
}
