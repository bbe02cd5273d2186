//! Pool state machine: queue, dispatch, outcome buckets.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{
    CallableUnit, Launchable, OutcomeReporter, OutcomeSlot, PoolStats, UnitEvent, UnitId,
    UnitOutcome, SIGTERM,
};
use crate::config::PoolConfig;
use crate::core::future::Future;
use crate::core::{AppResult, PoolError, TaskFault};

#[derive(Default)]
struct PoolState {
    /// Tracked units. A unit that is not running is always ready to start.
    units: HashMap<UnitId, Box<dyn Launchable>>,
    /// FIFO of queued ids. Entries absent from `queued` are stale and skipped.
    queue: VecDeque<UnitId>,
    queued: HashSet<UnitId>,
    /// Running ids with the token of their current run.
    in_progress: HashMap<UnitId, u64>,
    finished: HashMap<UnitId, Value>,
    failed: HashMap<UnitId, TaskFault>,
    timed_out: HashSet<UnitId>,
    signaled: HashMap<UnitId, i32>,
    results: Vec<Value>,
    order: Vec<UnitId>,
    slots: HashMap<UnitId, Arc<OutcomeSlot>>,
    last_added: Option<UnitId>,
    submitted: u64,
    next_run: u64,
}

/// A recorded run whose hook fires once the pool lock is released.
struct HookCall {
    unit: Box<dyn Launchable>,
    outcome: UnitOutcome,
}

impl HookCall {
    fn fire(mut self) {
        match &self.outcome {
            UnitOutcome::Finished(output) => self.unit.trigger_success(output),
            UnitOutcome::Failed(fault) => self.unit.trigger_error(fault),
            UnitOutcome::TimedOut => self.unit.trigger_timeout(),
            UnitOutcome::Signaled(signal) => self.unit.trigger_signal(*signal),
        }
    }
}

fn fire(hooks: Vec<HookCall>) {
    for call in hooks {
        call.fire();
    }
}

impl PoolState {
    fn is_idle(&self) -> bool {
        self.queued.is_empty() && self.in_progress.is_empty()
    }

    fn forget_outcome(&mut self, id: UnitId) {
        self.finished.remove(&id);
        self.failed.remove(&id);
        self.timed_out.remove(&id);
        self.signaled.remove(&id);
    }

    fn enqueue(&mut self, id: UnitId) {
        self.queue.push_back(id);
        self.queued.insert(id);
        self.submitted += 1;
    }

    /// Start queued units while below the ceiling.
    fn dispatch(
        &mut self,
        concurrency: usize,
        reporter: &OutcomeReporter,
        hooks: &mut Vec<HookCall>,
    ) {
        while self.in_progress.len() < concurrency {
            let Some(id) = self.queue.pop_front() else {
                break;
            };
            if !self.queued.remove(&id) {
                continue;
            }
            self.next_run += 1;
            let run = self.next_run;
            let Some(unit) = self.units.get_mut(&id) else {
                continue;
            };
            match unit.start(reporter.for_run(run)) {
                Ok(()) => {
                    debug!(unit_id = %id, run, in_progress = self.in_progress.len() + 1, "unit dispatched");
                    self.in_progress.insert(id, run);
                }
                Err(err) => {
                    warn!(unit_id = %id, error = %err, "unit failed to start");
                    self.settle(id, UnitOutcome::Failed(TaskFault::raised(err)), hooks);
                }
            }
        }
    }

    /// Record a terminal outcome and queue the unit's matching hook.
    ///
    /// The recorded unit is swapped for a fresh copy, so a retry always starts
    /// a new run.
    fn settle(&mut self, id: UnitId, outcome: UnitOutcome, hooks: &mut Vec<HookCall>) {
        if let Some(slot) = self.slots.get(&id) {
            slot.settle(outcome.clone());
        }
        let Some(unit) = self.units.get_mut(&id) else {
            return;
        };
        let fresh = unit.restart();
        let unit = std::mem::replace(unit, fresh);
        match &outcome {
            UnitOutcome::Finished(output) => {
                self.results.push(output.clone());
                self.finished.insert(id, output.clone());
            }
            UnitOutcome::Failed(fault) => {
                self.failed.insert(id, fault.clone());
            }
            UnitOutcome::TimedOut => {
                self.timed_out.insert(id);
            }
            UnitOutcome::Signaled(signal) => {
                self.signaled.insert(id, *signal);
            }
        }
        hooks.push(HookCall { unit, outcome });
    }

    fn stop_all(&mut self) {
        for id in self.in_progress.keys().chain(self.queued.iter()) {
            if let Some(unit) = self.units.get_mut(id) {
                unit.stop();
            }
        }
    }
}

struct PoolInner {
    config: PoolConfig,
    state: Mutex<PoolState>,
    reporter: OutcomeReporter,
    events: Receiver<UnitEvent>,
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state.in_progress.is_empty() {
            debug!(in_progress = state.in_progress.len(), "pool dropped with running units, stopping them");
        }
        state.stop_all();
    }
}

/// Bounded pool of launchable units.
///
/// Cloning a `Pool` shares it. Outcomes are folded in only while the pool is
/// driven through [`wait`](Self::wait), [`poll`](Self::poll), or a
/// [`Future`]. Unit hooks fire after the pool lock is released, so a hook may
/// call back into the pool, for example to [`retry`](Self::retry) its unit.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Pool {
    /// Create a pool from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if the configuration is invalid.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;
        let (tx, rx): (Sender<UnitEvent>, Receiver<UnitEvent>) = unbounded();
        info!(
            concurrency = config.concurrency,
            default_timeout_ms = config.default_timeout_ms,
            "pool initialized"
        );
        Ok(Self {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(PoolState::default()),
                reporter: OutcomeReporter::new(tx),
                events: rx,
            }),
        })
    }

    /// Pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Enqueue a callable with the configured default timeout.
    ///
    /// # Errors
    ///
    /// See [`add_unit`](Self::add_unit).
    pub fn add<R, F>(&self, job: F) -> Result<UnitId, PoolError>
    where
        R: Serialize,
        F: Fn() -> AppResult<R> + Send + Sync + 'static,
    {
        self.add_with_timeout(job, self.inner.config.default_timeout())
    }

    /// Enqueue a callable with an explicit timeout; zero means none.
    ///
    /// # Errors
    ///
    /// See [`add_unit`](Self::add_unit).
    pub fn add_with_timeout<R, F>(&self, job: F, timeout: Duration) -> Result<UnitId, PoolError>
    where
        R: Serialize,
        F: Fn() -> AppResult<R> + Send + Sync + 'static,
    {
        self.add_unit(Box::new(CallableUnit::new(job).with_timeout(timeout)))
    }

    /// Enqueue a launchable unit and start it if a slot is free.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidUnit`] if the unit is already running or its
    /// id is already tracked by this pool.
    pub fn add_unit(&self, unit: Box<dyn Launchable>) -> Result<UnitId, PoolError> {
        let id = unit.id();
        if unit.is_running() {
            return Err(PoolError::InvalidUnit(format!("{id} is already running")));
        }
        let mut state = self.inner.state.lock();
        if state.units.contains_key(&id) {
            return Err(PoolError::InvalidUnit(format!("{id} is already in the pool")));
        }
        state.units.insert(id, unit);
        state.order.push(id);
        state.slots.insert(id, Arc::new(OutcomeSlot::new()));
        state.last_added = Some(id);
        state.enqueue(id);
        debug!(unit_id = %id, queued = state.queued.len(), "unit added");
        let mut hooks = Vec::new();
        state.dispatch(self.inner.config.concurrency, &self.inner.reporter, &mut hooks);
        drop(state);
        fire(hooks);
        Ok(id)
    }

    /// Enqueue a callable and return a future for its decoded result.
    ///
    /// # Errors
    ///
    /// See [`add_unit`](Self::add_unit).
    pub fn spawn<R, F>(&self, job: F) -> Result<Future<R>, PoolError>
    where
        R: Serialize + DeserializeOwned,
        F: Fn() -> AppResult<R> + Send + Sync + 'static,
    {
        let id = self.add(job)?;
        self.future(id)
    }

    /// Future for an already tracked unit.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UnitNotFound`] if the pool does not track `id`.
    pub fn future<R: DeserializeOwned>(&self, id: UnitId) -> Result<Future<R>, PoolError> {
        let slot = self.slot(id).ok_or(PoolError::UnitNotFound(id))?;
        Ok(Future::new(self.clone(), id, slot))
    }

    /// Re-enqueue a unit for a fresh run; defaults to the most recently added.
    ///
    /// The unit leaves its outcome bucket. Retrying a unit that is already
    /// queued changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UnitNotFound`] if there is nothing to retry, or
    /// [`PoolError::InvalidUnit`] if the unit is still running.
    pub fn retry(&self, unit: Option<UnitId>) -> Result<UnitId, PoolError> {
        let mut state = self.inner.state.lock();
        let id = unit
            .or(state.last_added)
            .ok_or_else(|| PoolError::InvalidUnit("no unit to retry".into()))?;
        if !state.units.contains_key(&id) {
            return Err(PoolError::UnitNotFound(id));
        }
        if state.in_progress.contains_key(&id) {
            return Err(PoolError::InvalidUnit(format!("{id} is still running")));
        }
        if state.queued.contains(&id) {
            return Ok(id);
        }
        state.forget_outcome(id);
        if let Some(slot) = state.slots.get(&id) {
            slot.reset();
        }
        state.enqueue(id);
        debug!(unit_id = %id, "unit retried");
        let mut hooks = Vec::new();
        state.dispatch(self.inner.config.concurrency, &self.inner.reporter, &mut hooks);
        drop(state);
        fire(hooks);
        Ok(id)
    }

    /// Record that `id` finished with `output`.
    ///
    /// Refills the running set first, then records the outcome and fires the
    /// unit's success hook.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UnitNotFound`] if `id` is not in progress.
    pub fn mark_finished(&self, id: UnitId, output: Value) -> Result<(), PoolError> {
        self.complete(id, None, UnitOutcome::Finished(output))
    }

    /// Record that `id` failed with `fault`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UnitNotFound`] if `id` is not in progress.
    pub fn mark_failed(&self, id: UnitId, fault: TaskFault) -> Result<(), PoolError> {
        self.complete(id, None, UnitOutcome::Failed(fault))
    }

    /// Record that `id` timed out.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UnitNotFound`] if `id` is not in progress.
    pub fn mark_timed_out(&self, id: UnitId) -> Result<(), PoolError> {
        self.complete(id, None, UnitOutcome::TimedOut)
    }

    /// Record that `id` was terminated by `signal`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UnitNotFound`] if `id` is not in progress.
    pub fn mark_signaled(&self, id: UnitId, signal: i32) -> Result<(), PoolError> {
        self.complete(id, None, UnitOutcome::Signaled(signal))
    }

    /// Record the outcome of `id`'s current run, or of run `run` only.
    fn complete(
        &self,
        id: UnitId,
        run: Option<u64>,
        outcome: UnitOutcome,
    ) -> Result<(), PoolError> {
        let mut state = self.inner.state.lock();
        match state.in_progress.get(&id) {
            Some(current) if run.is_none_or(|run| run == *current) => {}
            _ => return Err(PoolError::UnitNotFound(id)),
        }
        state.in_progress.remove(&id);
        let mut hooks = Vec::new();
        state.dispatch(self.inner.config.concurrency, &self.inner.reporter, &mut hooks);
        state.settle(id, outcome, &mut hooks);
        drop(state);
        fire(hooks);
        Ok(())
    }

    fn handle(&self, event: UnitEvent) {
        let UnitEvent { id, run, outcome } = event;
        if let Err(err) = self.complete(id, Some(run), outcome) {
            warn!(unit_id = %id, run, error = %err, "ignoring outcome for a run no longer in progress");
        }
    }

    /// Fold in every pending outcome without blocking.
    ///
    /// Returns the number of outcomes handled.
    pub fn poll(&self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.inner.events.try_recv() {
            self.handle(event);
            handled += 1;
        }
        handled
    }

    /// Wait up to `timeout` for one outcome, then fold in any others pending.
    pub(crate) fn drive(&self, timeout: Duration) -> usize {
        match self.inner.events.recv_timeout(timeout) {
            Ok(event) => {
                self.handle(event);
                1 + self.poll()
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Drive the pool until nothing is queued or running.
    ///
    /// Returns every successful result so far in completion order.
    pub fn wait(&self) -> Vec<Value> {
        while !self.is_idle() {
            self.drive(self.inner.config.poll_interval());
        }
        info!(results = self.inner.state.lock().results.len(), "pool drained");
        self.results()
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    ///
    /// Returns `None` if units were still queued or running at the deadline.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Vec<Value>> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_idle() {
                return Some(self.results());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            self.drive(remaining.min(self.inner.config.poll_interval()));
        }
    }

    /// Force-stop every queued and running unit and forget everything.
    ///
    /// The pool stays usable afterwards.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        state.stop_all();
        for slot in state.slots.values() {
            slot.drop_unit();
        }
        let stopped = state.in_progress.len() + state.queued.len();
        *state = PoolState::default();
        info!(stopped, "pool closed");
    }

    /// Stop a queued or running unit, recording it as signaled.
    ///
    /// Returns `true` if the unit has ended without success.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UnitNotFound`] if the pool does not track `id`.
    pub fn cancel(&self, id: UnitId) -> Result<bool, PoolError> {
        let mut state = self.inner.state.lock();
        let running = state.in_progress.remove(&id).is_some();
        let queued = state.queued.remove(&id);
        let Some(unit) = state.units.get_mut(&id) else {
            return Err(PoolError::UnitNotFound(id));
        };
        let mut hooks = Vec::new();
        if running || queued {
            unit.stop();
            debug!(unit_id = %id, running, "unit cancelled");
            state.dispatch(self.inner.config.concurrency, &self.inner.reporter, &mut hooks);
            state.settle(id, UnitOutcome::Signaled(SIGTERM), &mut hooks);
        }
        let ended = !state.finished.contains_key(&id);
        drop(state);
        fire(hooks);
        Ok(ended)
    }

    /// Id of the unit at position `index`, in order of addition.
    #[must_use]
    pub fn unit_at(&self, index: usize) -> Option<UnitId> {
        self.inner.state.lock().order.get(index).copied()
    }

    /// Stop and forget the unit at position `index`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidUnit`] if there is no unit at `index`.
    pub fn remove_at(&self, index: usize) -> Result<UnitId, PoolError> {
        let mut state = self.inner.state.lock();
        if index >= state.order.len() {
            return Err(PoolError::InvalidUnit(format!("no unit at index {index}")));
        }
        let id = state.order.remove(index);
        let was_running = state.in_progress.remove(&id).is_some();
        state.queued.remove(&id);
        if let Some(mut unit) = state.units.remove(&id) {
            unit.stop();
        }
        state.forget_outcome(id);
        if let Some(slot) = state.slots.remove(&id) {
            slot.drop_unit();
        }
        if state.last_added == Some(id) {
            state.last_added = None;
        }
        let mut hooks = Vec::new();
        if was_running {
            state.dispatch(self.inner.config.concurrency, &self.inner.reporter, &mut hooks);
        }
        debug!(unit_id = %id, index, "unit removed");
        drop(state);
        fire(hooks);
        Ok(id)
    }

    /// Number of tracked units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().order.len()
    }

    /// Whether the pool tracks no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether nothing is queued or running.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.inner.state.lock().is_idle()
    }

    /// Whether `id` is queued or running.
    #[must_use]
    pub fn is_pending(&self, id: UnitId) -> bool {
        let state = self.inner.state.lock();
        state.queued.contains(&id) || state.in_progress.contains_key(&id)
    }

    /// Successful results in completion order.
    #[must_use]
    pub fn results(&self) -> Vec<Value> {
        self.inner.state.lock().results.clone()
    }

    /// Ids currently running.
    #[must_use]
    pub fn in_progress(&self) -> Vec<UnitId> {
        sorted(self.inner.state.lock().in_progress.keys().copied())
    }

    /// Ids waiting to start, in queue order.
    #[must_use]
    pub fn queued(&self) -> Vec<UnitId> {
        let state = self.inner.state.lock();
        state
            .queue
            .iter()
            .filter(|id| state.queued.contains(id))
            .copied()
            .collect()
    }

    /// Ids in the finished bucket.
    #[must_use]
    pub fn finished(&self) -> Vec<UnitId> {
        sorted(self.inner.state.lock().finished.keys().copied())
    }

    /// Ids in the failed bucket.
    #[must_use]
    pub fn failed(&self) -> Vec<UnitId> {
        sorted(self.inner.state.lock().failed.keys().copied())
    }

    /// Ids in the timed-out bucket.
    #[must_use]
    pub fn timed_out(&self) -> Vec<UnitId> {
        sorted(self.inner.state.lock().timed_out.iter().copied())
    }

    /// Ids in the signaled bucket.
    #[must_use]
    pub fn signaled(&self) -> Vec<UnitId> {
        sorted(self.inner.state.lock().signaled.keys().copied())
    }

    /// Error recorded for a failed unit.
    #[must_use]
    pub fn failure(&self, id: UnitId) -> Option<TaskFault> {
        self.inner.state.lock().failed.get(&id).cloned()
    }

    /// Snapshot of occupancy and bucket sizes.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            concurrency: self.inner.config.concurrency,
            queued: state.queued.len(),
            in_progress: state.in_progress.len(),
            finished: state.finished.len(),
            failed: state.failed.len(),
            timed_out: state.timed_out.len(),
            signaled: state.signaled.len(),
            submitted: state.submitted,
        }
    }

    pub(crate) fn slot(&self, id: UnitId) -> Option<Arc<OutcomeSlot>> {
        self.inner.state.lock().slots.get(&id).cloned()
    }
}

fn sorted(ids: impl Iterator<Item = UnitId>) -> Vec<UnitId> {
    let mut ids: Vec<UnitId> = ids.collect();
    ids.sort_unstable();
    ids
}
