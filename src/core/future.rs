//! Handles for the eventual result of a pool unit.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::core::task::{Scheduler, Task, TaskCore, TaskState};
use crate::core::worker_pool::{OutcomeSlot, Pool, SlotState, UnitId, UnitOutcome};
use crate::core::{PoolError, TaskFault};

/// Eventual, deserialized result of one pool unit.
///
/// Obtained from [`Pool::spawn`] or [`Pool::future`].
pub struct Future<R> {
    pool: Pool,
    id: UnitId,
    slot: Arc<OutcomeSlot>,
    _result: PhantomData<fn() -> R>,
}

impl<R> fmt::Debug for Future<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("id", &self.id)
            .field("slot", &self.slot.state())
            .finish()
    }
}

impl<R: DeserializeOwned> Future<R> {
    pub(crate) const fn new(pool: Pool, id: UnitId, slot: Arc<OutcomeSlot>) -> Self {
        Self {
            pool,
            id,
            slot,
            _result: PhantomData,
        }
    }

    /// Id of the underlying unit.
    #[must_use]
    pub const fn id(&self) -> UnitId {
        self.id
    }

    /// Drive the pool until the unit settles, then decode its result.
    ///
    /// # Errors
    ///
    /// Returns the pool error matching a non-successful outcome, or
    /// [`PoolError::Decode`] if the result does not deserialize into `R`.
    pub fn value(&self) -> Result<R, PoolError> {
        loop {
            match self.slot.state() {
                SlotState::Settled(outcome) => return self.decode(outcome),
                SlotState::Dropped => return Err(PoolError::UnitDropped(self.id)),
                SlotState::Pending => {
                    self.pool.drive(self.pool.config().poll_interval());
                }
            }
        }
    }

    fn decode(&self, outcome: UnitOutcome) -> Result<R, PoolError> {
        match outcome {
            UnitOutcome::Finished(value) => Ok(serde_json::from_value(value)?),
            UnitOutcome::Failed(fault) => Err(PoolError::UnitFailed { id: self.id, fault }),
            UnitOutcome::TimedOut => Err(PoolError::UnitTimedOut(self.id)),
            UnitOutcome::Signaled(signal) => Err(PoolError::UnitSignaled { id: self.id, signal }),
        }
    }

    /// Whether the unit is no longer queued or running. Never blocks.
    #[must_use]
    pub fn done(&self) -> bool {
        self.pool.poll();
        !self.pool.is_pending(self.id)
    }

    /// Whether the unit ended without success.
    #[must_use]
    pub fn cancelled(&self) -> bool {
        match self.slot.state() {
            SlotState::Settled(outcome) => !outcome.is_success(),
            SlotState::Dropped => true,
            SlotState::Pending => false,
        }
    }

    /// Stop the unit if it is still queued or running.
    ///
    /// Returns `true` if the unit has now ended without success.
    pub fn cancel(&self) -> bool {
        match self.pool.cancel(self.id) {
            Ok(cancelled) => cancelled,
            Err(err) => {
                debug!(unit_id = %self.id, error = %err, "cancel on a unit the pool no longer tracks");
                self.cancelled()
            }
        }
    }
}

/// Adapts a [`Future`] into a [`Task`] so pool units can be joined.
///
/// Each tick folds in pending pool outcomes without blocking.
pub struct FutureTask<R> {
    future: Future<R>,
    core: TaskCore<R>,
}

impl<R: DeserializeOwned> FutureTask<R> {
    /// Wrap `future`.
    #[must_use]
    pub const fn new(future: Future<R>) -> Self {
        Self {
            future,
            core: TaskCore::new(),
        }
    }

    /// The wrapped future.
    #[must_use]
    pub const fn future(&self) -> &Future<R> {
        &self.future
    }
}

impl<R> Task<R> for FutureTask<R>
where
    R: DeserializeOwned + Clone + Send,
{
    fn tick(&mut self, _scheduler: &dyn Scheduler) {
        if self.core.is_complete() {
            return;
        }
        self.future.pool.poll();
        let outcome = match self.future.slot.state() {
            SlotState::Pending => return,
            SlotState::Settled(outcome) => self.future.decode(outcome),
            SlotState::Dropped => Err(PoolError::UnitDropped(self.future.id)),
        };
        match outcome {
            Ok(value) => {
                self.core.succeed(Some(value));
            }
            Err(PoolError::UnitFailed { fault, .. }) => {
                self.core.fault(fault);
            }
            Err(err) => {
                self.core.fault(TaskFault::raised(err));
            }
        }
    }

    fn cancel(&mut self) {
        if self.core.cancel() {
            self.future.cancel();
        }
    }

    fn state(&self) -> TaskState {
        self.core.state()
    }

    fn result(&self) -> Option<R> {
        self.core.result()
    }

    fn error(&self) -> Option<TaskFault> {
        self.core.error()
    }
}
