//! One-shot watch re-arming
//!
//! Watches fire once and must be armed again. Every fired watch gets a
//! fresh [`WatchRearm`] whose transitions keep the "stopped", "node gone"
//! and "transient error" branches testable without a live service:
//!
//! ```text
//!   Fired ──begin()──> Rearming{1} ──complete(Ok)──> Armed
//!                         │  ▲
//!    complete(transient)  │  │ begin() (after backoff)
//!                         ▼  │
//!                      Rearming{n}
//!                         │
//!   complete(NoNode)  ────┼──> Stopped(NodeGone)
//!   signal fired      ────┼──> Stopped(Cancelled)
//!   budget used up    ────┴──> Stopped(RetriesExhausted)
//! ```

use std::time::Duration;

use crate::BackoffPolicy;
use crate::CoordinationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchKind {
    Data,
    Children,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The node's stop signal for this watch fired
    Cancelled,
    /// The remote path no longer exists; the node must be cleared
    NodeGone,
    /// A finite retry budget was used up
    RetriesExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Armed,
    Fired,
    Rearming { attempt: u32 },
    Stopped(StopReason),
}

/// What the driver should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RearmStep {
    /// Wait `delay`, then issue the arming read
    Attempt { delay: Duration },
    /// Nothing left to do; inspect [`WatchRearm::state`]
    Done,
}

#[derive(Debug, Clone)]
pub struct WatchRearm {
    kind: WatchKind,
    state: WatchState,
    policy: BackoffPolicy,
}

impl WatchRearm {
    /// A watch that has just fired (or was never armed) and needs arming.
    pub fn fired(
        kind: WatchKind,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            kind,
            state: WatchState::Fired,
            policy,
        }
    }

    pub fn kind(&self) -> WatchKind {
        self.kind
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    /// Advances to the next arming attempt, unless the watch is already
    /// armed or stopped, or `cancelled` says the node is shutting down.
    pub fn begin(
        &mut self,
        cancelled: bool,
    ) -> RearmStep {
        match self.state {
            WatchState::Armed | WatchState::Stopped(_) => RearmStep::Done,
            _ if cancelled => {
                self.state = WatchState::Stopped(StopReason::Cancelled);
                RearmStep::Done
            }
            WatchState::Fired => {
                self.state = WatchState::Rearming { attempt: 1 };
                RearmStep::Attempt { delay: Duration::ZERO }
            }
            WatchState::Rearming { attempt } => {
                self.state = WatchState::Rearming { attempt: attempt + 1 };
                RearmStep::Attempt {
                    delay: self.policy.delay_for(attempt),
                }
            }
        }
    }

    /// Records the outcome of the arming read issued after `begin`.
    pub fn complete(
        &mut self,
        outcome: Result<(), &CoordinationError>,
        cancelled: bool,
    ) {
        let WatchState::Rearming { attempt } = self.state else {
            return;
        };
        self.state = match outcome {
            Ok(()) => WatchState::Armed,
            Err(e) if e.is_no_node() => WatchState::Stopped(StopReason::NodeGone),
            Err(_) if cancelled => WatchState::Stopped(StopReason::Cancelled),
            Err(_) if !self.policy.is_unlimited() && attempt as usize >= self.policy.max_retries => {
                WatchState::Stopped(StopReason::RetriesExhausted)
            }
            Err(_) => WatchState::Rearming { attempt },
        };
    }
}
