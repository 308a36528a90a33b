//! The per-run [`SyncReport`] — the engine's visibility surface.
//!
//! Conflicts are resolved automatically (server-wins) and only reported;
//! the counts here are how an embedding application learns that it
//! happened.

use chrono::{DateTime, Utc};

/// How a sync request ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// One or more cycles ran to completion.
    Completed,
    /// A cycle was already running; this request was coalesced into a
    /// single rerun and did no work itself.
    Coalesced,
}

/// Counters accumulated over one [`run`](crate::SyncOrchestrator::run),
/// including any coalesced rerun cycles.
#[derive(Clone, Debug)]
pub struct SyncReport {
    /// How the request ended.
    pub outcome: SyncOutcome,
    /// When the (first) cycle started; the checkpoint is advanced to this.
    pub started_at: Option<DateTime<Utc>>,
    /// Cycles executed by this run (1 + reruns).
    pub cycles_run: usize,
    /// Commands submitted to the authority.
    pub commands_submitted: usize,
    /// Commands acknowledged and removed from the queue.
    pub commands_acknowledged: usize,
    /// Conflicts resolved server-wins.
    pub conflicts_resolved: usize,
    /// Rows applied from the incremental pull (and bootstrap, if any).
    pub rows_applied: usize,
    /// Entities hard-removed on remote delete confirmation.
    pub rows_removed: usize,
    /// Notifications drained and acknowledged.
    pub notifications_acknowledged: usize,
    /// Whether the unconditional bootstrap fetch ran.
    pub bootstrap_performed: bool,
}

impl SyncReport {
    /// Report for a request coalesced into an already-running cycle.
    pub fn coalesced() -> Self {
        Self {
            outcome: SyncOutcome::Coalesced,
            started_at: None,
            cycles_run: 0,
            commands_submitted: 0,
            commands_acknowledged: 0,
            conflicts_resolved: 0,
            rows_applied: 0,
            rows_removed: 0,
            notifications_acknowledged: 0,
            bootstrap_performed: false,
        }
    }

    /// Empty completed report starting at `started_at`.
    pub fn started(started_at: DateTime<Utc>) -> Self {
        Self {
            outcome: SyncOutcome::Completed,
            started_at: Some(started_at),
            ..Self::coalesced()
        }
    }

    /// Fold one cycle's counters into this report.
    pub fn absorb(&mut self, cycle: &SyncReport) {
        self.outcome = SyncOutcome::Completed;
        if self.started_at.is_none() {
            self.started_at = cycle.started_at;
        }
        self.cycles_run += cycle.cycles_run.max(1);
        self.commands_submitted += cycle.commands_submitted;
        self.commands_acknowledged += cycle.commands_acknowledged;
        self.conflicts_resolved += cycle.conflicts_resolved;
        self.rows_applied += cycle.rows_applied;
        self.rows_removed += cycle.rows_removed;
        self.notifications_acknowledged += cycle.notifications_acknowledged;
        self.bootstrap_performed |= cycle.bootstrap_performed;
    }
}
