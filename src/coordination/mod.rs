//! Coordination service abstraction
//!
//! The tree cache never talks to the wire protocol directly. Everything it
//! needs from the hierarchical, versioned namespace it mirrors is captured
//! by the [`Coordinator`] trait:
//!
//! - plain reads (`get`, `children`, `exists`) used by flushes and by the
//!   handlers that react to watch notifications
//! - reads that also arm a one-shot watch (`get_w`, `children_w`)
//! - `create`, used only to bootstrap the configured root path
//!
//! Watch notifications are not returned from the calls that arm them. Like
//! a real session, an implementation delivers them on a separate
//! [`RawEvent`] stream handed to [`TreeClient`](crate::TreeClient) at
//! construction.
//!
//! [`MemCoordinator`] is an in-process implementation with ZooKeeper
//! semantics.

mod memory;
pub use memory::*;


use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)]
use mockall::automock;

use crate::CoordinationError;

pub type CoordinationResult<T> = std::result::Result<T, CoordinationError>;

/// Per-node metadata returned with every read
///
/// `version` counts data changes and `cversion` counts changes to the list
/// of children; both only ever grow for the lifetime of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    pub czxid: i64,
    pub mzxid: i64,
    pub ctime: i64,
    pub mtime: i64,
    pub version: i32,
    pub cversion: i32,
    pub aversion: i32,
    pub ephemeral_owner: i64,
    pub data_length: i32,
    pub num_children: i32,
    pub pzxid: i64,
}

pub const PERM_READ: u32 = 1 << 0;
pub const PERM_WRITE: u32 = 1 << 1;
pub const PERM_CREATE: u32 = 1 << 2;
pub const PERM_DELETE: u32 = 1 << 3;
pub const PERM_ADMIN: u32 = 1 << 4;
pub const PERM_ALL: u32 = PERM_READ | PERM_WRITE | PERM_CREATE | PERM_DELETE | PERM_ADMIN;

/// Access control entry attached to created nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acl {
    pub perms: u32,
    pub scheme: String,
    pub id: String,
}

impl Acl {
    pub fn world_all() -> Self {
        Self {
            perms: PERM_ALL,
            scheme: "world".into(),
            id: "anyone".into(),
        }
    }

    pub fn world_read() -> Self {
        Self {
            perms: PERM_READ,
            scheme: "world".into(),
            id: "anyone".into(),
        }
    }

    /// Full access for a digest identity (`user:hash`)
    pub fn digest(identity: &str) -> Self {
        Self {
            perms: PERM_ALL,
            scheme: "digest".into(),
            id: identity.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawEventKind {
    NodeCreated,
    NodeDeleted,
    NodeDataChanged,
    NodeChildrenChanged,
    /// Connection state change; carries no path
    Session,
}

/// A notification as delivered by the coordination session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: RawEventKind,
    pub path: String,
}

impl RawEvent {
    pub fn new(
        kind: RawEventKind,
        path: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Coordinator: Send + Sync + 'static {
    /// Reads data and stat of `path`.
    ///
    /// # Errors
    /// [`CoordinationError::NoNode`] if the path does not exist.
    async fn get(
        &self,
        path: &str,
    ) -> CoordinationResult<(Bytes, Stat)>;

    /// Reads data and stat of `path` and arms a one-shot data watch.
    ///
    /// The watch fires once, as `NodeDataChanged` or `NodeDeleted`, and must
    /// be armed again afterwards. No watch is armed when the call fails.
    async fn get_w(
        &self,
        path: &str,
    ) -> CoordinationResult<(Bytes, Stat)>;

    /// Lists the short names of the direct children of `path`.
    ///
    /// The returned stat's `cversion` identifies this listing.
    async fn children(
        &self,
        path: &str,
    ) -> CoordinationResult<(Vec<String>, Stat)>;

    /// Lists children of `path` and arms a one-shot children watch.
    ///
    /// The watch fires once, as `NodeChildrenChanged` or `NodeDeleted`.
    async fn children_w(
        &self,
        path: &str,
    ) -> CoordinationResult<(Vec<String>, Stat)>;

    /// Returns the stat of `path`, or `None` if it does not exist.
    async fn exists(
        &self,
        path: &str,
    ) -> CoordinationResult<Option<Stat>>;

    /// Creates a persistent node and returns its path.
    ///
    /// # Errors
    /// - [`CoordinationError::NodeExists`] if the path is taken
    /// - [`CoordinationError::NoNode`] if the parent does not exist
    async fn create(
        &self,
        path: &str,
        data: Bytes,
        acl: &[Acl],
    ) -> CoordinationResult<String>;
}
