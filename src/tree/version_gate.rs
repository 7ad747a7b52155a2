use parking_lot::Mutex;

/// Monotonic version guard for one observed dimension of a node
///
/// The watch-driven path and the flush-driven path may read the same
/// version concurrently; only the first caller to present a strictly newer
/// version wins, the other observes a duplicate and must neither emit an
/// event nor re-expand children.
#[derive(Debug)]
pub struct VersionGate {
    version: Mutex<i32>,
}

impl VersionGate {
    /// Stored before the first observation so that it always counts as a change
    pub const UNSET: i32 = -1;

    pub fn new() -> Self {
        Self {
            version: Mutex::new(Self::UNSET),
        }
    }

    /// Stores `v` and returns `true` if it is strictly newer than the
    /// current version; returns `false` (and keeps the current version)
    /// otherwise.
    pub fn update(
        &self,
        v: i32,
    ) -> bool {
        let mut current = self.version.lock();
        if v > *current {
            *current = v;
            true
        } else {
            false
        }
    }

    pub fn current(&self) -> i32 {
        *self.version.lock()
    }

    pub fn is_unset(&self) -> bool {
        self.current() == Self::UNSET
    }
}

impl Default for VersionGate {
    fn default() -> Self {
        Self::new()
    }
}
