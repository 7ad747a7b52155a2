use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::TreeClient;
use crate::BackoffPolicy;
use crate::Coordinator;
use crate::RawEvent;
use crate::Result;
use crate::TreeCacheConfig;

pub struct TreeClientBuilder {
    coordinator: Arc<dyn Coordinator>,
    events: mpsc::UnboundedReceiver<RawEvent>,
    config: TreeCacheConfig,
}

impl TreeClientBuilder {
    /// Create a new builder with default config over an established session
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        events: mpsc::UnboundedReceiver<RawEvent>,
    ) -> Self {
        Self {
            coordinator,
            events,
            config: TreeCacheConfig::default(),
        }
    }

    /// Completely replaces the current configuration
    ///
    /// Discards anything set earlier through the individual setters, so
    /// call it first when combining both.
    ///
    /// # Example
    /// ```ignore
    /// let config = TreeCacheConfig::new()?;
    /// let client = TreeClient::builder(service, events)
    ///     .config(config)
    ///     .flush_interval(Duration::from_secs(30))
    ///     .connect()
    ///     .await?;
    /// ```
    pub fn config(
        mut self,
        config: TreeCacheConfig,
    ) -> Self {
        self.config = config;
        self
    }

    /// Path created by bootstrap (default: `/`)
    pub fn root_path(
        mut self,
        root_path: impl Into<String>,
    ) -> Self {
        self.config.session.root_path = root_path.into();
        self
    }

    /// Reconciliation period of subtree roots (default: 10s)
    pub fn flush_interval(
        mut self,
        interval: Duration,
    ) -> Self {
        self.config.cache.flush_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Capacity of each subtree root's event stream (default: 1024)
    pub fn event_buffer_size(
        mut self,
        size: usize,
    ) -> Self {
        self.config.cache.event_buffer_size = size;
        self
    }

    pub fn rearm_policy(
        mut self,
        policy: BackoffPolicy,
    ) -> Self {
        self.config.rearm = policy;
        self
    }

    /// Digest identity (`user:hash`) owning bootstrapped nodes
    pub fn auth(
        mut self,
        identity: impl Into<String>,
    ) -> Self {
        self.config.session.auth = Some(identity.into());
        self
    }

    /// Validates the configuration, starts the client and bootstraps the
    /// root path.
    pub async fn connect(self) -> Result<TreeClient> {
        let config = self.config.validate()?;
        let client = TreeClient::new(self.coordinator, self.events, config);
        client.bootstrap().await?;
        Ok(client)
    }
}
