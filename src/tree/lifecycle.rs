use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use tokio_util::sync::CancellationToken;

use super::WatchKind;

/// Per-node shutdown coordination
///
/// Three independent stop signals, one per background activity of the
/// node, plus the one-way `cleared` flag that guards re-entrant teardown.
#[derive(Debug, Default)]
pub struct NodeLifecycle {
    data_watch_stop: CancellationToken,
    children_watch_stop: CancellationToken,
    flush_stop: CancellationToken,
    cleared: AtomicBool,
}

impl NodeLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires all three signals. Safe to call any number of times.
    pub fn stop(&self) {
        self.data_watch_stop.cancel();
        self.children_watch_stop.cancel();
        self.flush_stop.cancel();
    }

    /// Sets the cleared flag. Returns `true` only for the caller that
    /// actually flipped it.
    pub fn mark_cleared(&self) -> bool {
        self.cleared
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_cleared(&self) -> bool {
        self.cleared.load(Ordering::Acquire)
    }

    pub fn data_watch_stop(&self) -> &CancellationToken {
        &self.data_watch_stop
    }

    pub fn children_watch_stop(&self) -> &CancellationToken {
        &self.children_watch_stop
    }

    pub fn flush_stop(&self) -> &CancellationToken {
        &self.flush_stop
    }

    pub fn watch_stop(
        &self,
        kind: WatchKind,
    ) -> &CancellationToken {
        match kind {
            WatchKind::Data => &self.data_watch_stop,
            WatchKind::Children => &self.children_watch_stop,
        }
    }
}
