use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::coordination::Acl;
use crate::utils::path::validate_path;
use crate::Error;
use crate::Result;

/// Coordination service session parameters
///
/// The connection itself (handshake, reconnects, auth) is owned by the
/// [`Coordinator`](crate::Coordinator) implementation; these values are
/// what the tree cache needs to know about it.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionConfig {
    /// Service endpoints, `host:port`
    ///
    /// Default: `127.0.0.1:2181`
    #[serde(default = "default_hosts")]
    pub hosts: Vec<String>,

    /// Session timeout in milliseconds
    ///
    /// Default: 10000
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    /// Absolute path that must exist before any subtree is attached.
    /// Missing ancestors are created with empty content on bootstrap.
    ///
    /// Default: `/`
    #[serde(default = "default_root_path")]
    pub root_path: String,

    /// Digest identity (`user:hash`) granted full access on created nodes
    ///
    /// Default: none (world-readable and writable)
    #[serde(default)]
    pub auth: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            hosts: default_hosts(),
            session_timeout_ms: default_session_timeout_ms(),
            root_path: default_root_path(),
            auth: None,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() || self.hosts.iter().any(|h| h.trim().is_empty()) {
            return Err(Error::Config(ConfigError::Message(
                "session.hosts must contain at least one non-empty endpoint".into(),
            )));
        }

        if self.session_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "session.session_timeout_ms must be greater than 0".into(),
            )));
        }

        validate_path(&self.root_path).map_err(|e| {
            Error::Config(ConfigError::Message(format!("session.root_path: {e}")))
        })?;

        if let Some(auth) = &self.auth {
            if !auth.contains(':') {
                return Err(Error::Config(ConfigError::Message(
                    "session.auth must be in `user:hash` form".into(),
                )));
            }
        }

        Ok(())
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    /// ACL list applied to nodes created by the client
    ///
    /// With an identity configured the owner gets every permission and
    /// everyone else may read; without one the node is open.
    pub fn acls(&self) -> Vec<Acl> {
        match &self.auth {
            Some(identity) => vec![Acl::digest(identity), Acl::world_read()],
            None => vec![Acl::world_all()],
        }
    }
}

fn default_hosts() -> Vec<String> {
    vec!["127.0.0.1:2181".to_string()]
}
fn default_session_timeout_ms() -> u64 {
    10_000
}
fn default_root_path() -> String {
    "/".to_string()
}
