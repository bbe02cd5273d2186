//! Bounded pool of launchable units.
//!
//! The pool keeps a FIFO queue of units and never runs more than its
//! concurrency ceiling at once. Every unit ends in exactly one of four
//! outcome buckets: finished, failed, timed out, or signaled. Outcomes reach
//! the pool as [`UnitEvent`]s over a crossbeam channel and are folded in by
//! whoever drives the pool (`wait`, `poll`, or a [`Future`](crate::core::future::Future)).
//!
//! # Example
//!
//! ```rust,ignore
//! use prometheus_task_engine::config::PoolConfig;
//! use prometheus_task_engine::core::worker_pool::Pool;
//!
//! let pool = Pool::new(PoolConfig::default().with_concurrency(4))?;
//! for i in 0..10 {
//!     pool.add(move || Ok(i * 2))?;
//! }
//! let results = pool.wait();
//! assert_eq!(results.len(), 10);
//! ```

mod callable_unit;
mod pool;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{PoolError, TaskFault};

pub use callable_unit::{CallableUnit, UnitHooks};
pub use pool::Pool;

/// Signal number recorded when a unit is stopped on request.
pub const SIGTERM: i32 = 15;

static NEXT_UNIT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a launchable unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(u64);

impl UnitId {
    /// Allocate a fresh id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_UNIT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit-{}", self.0)
    }
}

/// Terminal outcome of one unit run.
#[derive(Debug, Clone)]
pub enum UnitOutcome {
    /// Ran to completion with a serialized result.
    Finished(Value),
    /// The unit's job returned an error or panicked.
    Failed(TaskFault),
    /// The unit exceeded its timeout.
    TimedOut,
    /// The unit was terminated by a signal.
    Signaled(i32),
}

impl UnitOutcome {
    /// Whether this is a successful outcome.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Finished(_))
    }
}

/// Outcome report sent from a unit's monitor to the pool.
#[derive(Debug, Clone)]
pub struct UnitEvent {
    /// Reporting unit.
    pub id: UnitId,
    /// Token of the run that produced this report.
    pub run: u64,
    /// What happened.
    pub outcome: UnitOutcome,
}

/// Sending half handed to a unit when it starts.
///
/// Each start gets its own reporter tagged with a fresh run token, so the pool
/// can tell a late report from an earlier run apart from the current one.
#[derive(Debug, Clone)]
pub struct OutcomeReporter {
    tx: Sender<UnitEvent>,
    run: u64,
}

impl OutcomeReporter {
    pub(crate) const fn new(tx: Sender<UnitEvent>) -> Self {
        Self { tx, run: 0 }
    }

    /// Same channel, tagged with `run`.
    pub(crate) fn for_run(&self, run: u64) -> Self {
        Self {
            tx: self.tx.clone(),
            run,
        }
    }

    /// Run token carried by every report.
    #[must_use]
    pub const fn run(&self) -> u64 {
        self.run
    }

    /// Report the terminal outcome of unit `id`.
    ///
    /// Returns `false` if the pool is gone.
    pub fn report(&self, id: UnitId, outcome: UnitOutcome) -> bool {
        self.tx
            .send(UnitEvent {
                id,
                run: self.run,
                outcome,
            })
            .is_ok()
    }
}

/// A unit of work the pool can start, stop, and restart.
///
/// Implementations own their own monitoring: once started, a unit must report
/// exactly one terminal [`UnitOutcome`] through the reporter, unless it is
/// stopped first. The `trigger_*` methods are the unit's hooks; the pool calls
/// the matching one exactly once when it records the outcome. Once a run is
/// recorded the pool keeps a [`restart`](Self::restart)ed copy for the next
/// run and fires the hook on the finished one after releasing its lock, so
/// hooks may call back into the pool.
pub trait Launchable: Send {
    /// Stable identity, kept across restarts.
    fn id(&self) -> UnitId;

    /// OS process id, when the unit runs in a separate process.
    fn pid(&self) -> Option<u32>;

    /// Begin running.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidUnit`] if already running, or
    /// [`PoolError::Spawn`] if the unit could not be launched.
    fn start(&mut self, reporter: OutcomeReporter) -> Result<(), PoolError>;

    /// A fresh, not yet started copy of this unit with the same identity.
    fn restart(&self) -> Box<dyn Launchable>;

    /// Force-stop the unit. No outcome is reported afterwards.
    fn stop(&mut self);

    /// Whether the unit is currently running.
    fn is_running(&self) -> bool;

    /// Whether the last run finished successfully.
    fn is_successful(&self) -> bool;

    /// Whether the last run has ended, whatever the outcome.
    fn is_terminated(&self) -> bool;

    /// Signal that terminated the unit, if any.
    fn signaled(&self) -> Option<i32>;

    /// Success hook.
    fn trigger_success(&mut self, output: &Value);

    /// Failure hook.
    fn trigger_error(&mut self, fault: &TaskFault);

    /// Timeout hook.
    fn trigger_timeout(&mut self);

    /// Signal hook.
    fn trigger_signal(&mut self, signal: i32);
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Concurrency ceiling.
    pub concurrency: usize,
    /// Units waiting to start.
    pub queued: usize,
    /// Units currently running.
    pub in_progress: usize,
    /// Units in the finished bucket.
    pub finished: usize,
    /// Units in the failed bucket.
    pub failed: usize,
    /// Units in the timed-out bucket.
    pub timed_out: usize,
    /// Units in the signaled bucket.
    pub signaled: usize,
    /// Total adds and retries.
    pub submitted: u64,
}

#[derive(Debug, Clone)]
pub(crate) enum SlotState {
    Pending,
    Settled(UnitOutcome),
    Dropped,
}

/// Latest outcome of one tracked unit, shared with its futures.
#[derive(Debug)]
pub(crate) struct OutcomeSlot {
    state: Mutex<SlotState>,
}

impl OutcomeSlot {
    pub(crate) const fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending),
        }
    }

    pub(crate) fn state(&self) -> SlotState {
        self.state.lock().clone()
    }

    pub(crate) fn settle(&self, outcome: UnitOutcome) {
        *self.state.lock() = SlotState::Settled(outcome);
    }

    pub(crate) fn reset(&self) {
        *self.state.lock() = SlotState::Pending;
    }

    pub(crate) fn drop_unit(&self) {
        let mut state = self.state.lock();
        if matches!(*state, SlotState::Pending) {
            *state = SlotState::Dropped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_ids_are_unique() {
        let a = UnitId::next();
        let b = UnitId::next();
        assert_ne!(a, b);
        assert!(b > a);
        assert_eq!(a.to_string(), format!("unit-{}", a.as_u64()));
    }

    #[test]
    fn test_reporter_after_pool_gone() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let reporter = OutcomeReporter::new(tx);
        assert!(reporter.report(UnitId::next(), UnitOutcome::TimedOut));
        drop(rx);
        assert!(!reporter.report(UnitId::next(), UnitOutcome::TimedOut));
    }

    #[test]
    fn test_reporter_tags_events_with_run() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let reporter = OutcomeReporter::new(tx).for_run(7);
        assert_eq!(reporter.run(), 7);
        reporter.report(UnitId::next(), UnitOutcome::TimedOut);
        assert_eq!(rx.try_recv().unwrap().run, 7);
    }

    #[test]
    fn test_slot_drop_keeps_settled_outcome() {
        let slot = OutcomeSlot::new();
        slot.settle(UnitOutcome::Signaled(SIGTERM));
        slot.drop_unit();
        assert!(matches!(slot.state(), SlotState::Settled(UnitOutcome::Signaled(15))));

        slot.reset();
        slot.drop_unit();
        assert!(matches!(slot.state(), SlotState::Dropped));
    }

    #[test]
    fn test_stats_default() {
        let stats = PoolStats::default();
        assert_eq!(stats.concurrency, 0);
        assert_eq!(stats.submitted, 0);
    }
}
