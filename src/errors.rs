//! Tree Cache Error Hierarchy
//!
//! Errors are layered by where they originate:
//! - [`CoordinationError`]: failures reported by the coordination service client
//! - [`TreeError`]: misuse of the tree cache API (bad paths, duplicate watches)
//! - configuration loading and validation failures
//!
//! Only the caller-facing paths (`init`, `watch_node`, bootstrap, config
//! loading) return these errors. Steady-state watch and flush processing logs
//! and swallows them.

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Remote read/write/watch failures
    #[error(transparent)]
    Coordination(#[from] CoordinationError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Tree cache API misuse
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// Unrecoverable failures
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinationError {
    /// The path does not exist on the service.
    ///
    /// Not a failure for the tree cache: it is the authoritative signal
    /// that a watched node was deleted.
    #[error("Node does not exist: {path}")]
    NoNode { path: String },

    #[error("Node already exists: {path}")]
    NodeExists { path: String },

    #[error("Node has children: {path}")]
    NotEmpty { path: String },

    /// Connection dropped; the session may still be recoverable
    #[error("Connection to coordination service lost")]
    ConnectionLoss,

    #[error("Coordination session expired")]
    SessionExpired,

    #[error("Coordination service error: {0}")]
    Other(String),
}

impl CoordinationError {
    pub fn is_no_node(&self) -> bool {
        matches!(self, CoordinationError::NoNode { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("Invalid node path: {0:?}")]
    InvalidPath(String),

    /// A live subtree root is already registered for this path
    #[error("Path {0} is already watched")]
    AlreadyWatched(String),

    #[error("Parent {parent} of {path} has no root but has a parent")]
    InvalidTopology { path: String, parent: String },
}

impl Error {
    /// True when the underlying cause is a missing remote node
    pub fn is_no_node(&self) -> bool {
        matches!(self, Error::Coordination(e) if e.is_no_node())
    }
}
