//! Raw watch notification dispatcher
//!
//! A single long-lived task per client, spawned by [`TreeClient::new`]. It
//! never handles a notification itself: each one is handed to a new task
//! running the owning node's `echo`, so a slow handler for one path never
//! delays notifications for other paths.
//!
//! ```text
//! coordination session
//!   └─> EventDispatcher::run() [1 task]
//!         ├─> spawns echo for /a
//!         ├─> spawns echo for /a/b
//!         └─> drops events without a path or for unknown paths
//! ```
//!
//! [`TreeClient::new`]: super::TreeClient::new

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::tree::TreeContext;
use crate::RawEvent;

pub(crate) struct EventDispatcher {
    ctx: Arc<TreeContext>,
    events: mpsc::UnboundedReceiver<RawEvent>,
    shutdown: CancellationToken,
}

impl EventDispatcher {
    pub(crate) fn new(
        ctx: Arc<TreeContext>,
        events: mpsc::UnboundedReceiver<RawEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            ctx,
            events,
            shutdown,
        }
    }

    /// Runs until shutdown or until the session's event stream ends.
    pub(crate) async fn run(mut self) {
        info!("Tree event dispatcher started");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!("Tree event dispatcher shutting down");
                    break;
                }

                event = self.events.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => {
                        warn!("Raw event stream closed");
                        break;
                    }
                },
            }
        }

        info!("Tree event dispatcher stopped");
    }

    fn dispatch(
        &self,
        event: RawEvent,
    ) {
        if event.path.is_empty() {
            trace!(kind = ?event.kind, "ignoring event without path");
            return;
        }

        let Some(node) = self.ctx.registry.get(&event.path) else {
            trace!(path = %event.path, kind = ?event.kind, "ignoring event for untracked path");
            return;
        };

        tokio::spawn(async move {
            node.echo(event).await;
        });
    }
}
