//! Task lifecycle, the scheduler contract, and task combinators.
//!
//! A task starts `Pending` and moves exactly once to one of the terminal
//! states `Successful`, `Faulted`, or `Cancelled`. Tasks are advanced
//! cooperatively through [`Task::tick`]; decorators and joins build on that to
//! express delays, throttling, repetition, promise bridging, and
//! "any-of"/"some-of" joins.
//!
//! Tasks that must be reachable from more than one place (a decorator and the
//! scheduler it registers with, or a join and its caller) are wrapped in a
//! [`TaskHandle`].

pub mod callable;
pub mod coroutine;
pub mod deferred;
pub mod join;
pub mod promised;
pub mod recurring;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::TaskFault;

pub use callable::CallableTask;
pub use coroutine::CoroutineTask;
pub use deferred::{DelayedTask, ThrottledTask};
pub use join::{AnyTask, SomeTask};
pub use promised::PromiseTask;
pub use recurring::RecurringTask;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Not yet terminal.
    Pending,
    /// Finished with an optional result.
    Successful,
    /// Finished with an error.
    Faulted,
    /// Cancelled before finishing. Not an error.
    Cancelled,
}

impl TaskState {
    /// Whether this state is final.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Registers tasks for later re-ticking.
///
/// Exactly one of `delay` (one-shot re-tick) or `interval` (repeated re-ticks)
/// is meaningful per registration. Timing is entirely the scheduler's concern.
pub trait Scheduler: Send + Sync {
    /// Register `task` for a one-shot re-tick after `delay`, or for repeated
    /// re-ticks every `interval`.
    fn schedule(&self, task: Arc<dyn Schedulable>, delay: Option<Duration>, interval: Option<Duration>);
}

/// Type-erased view of a task that a scheduler can tick.
pub trait Schedulable: Send + Sync {
    /// Advance the task by one step.
    fn tick(&self, scheduler: &dyn Scheduler);
    /// Whether the task reached a terminal state.
    fn is_complete(&self) -> bool;
}

/// A single unit of cooperative work with a monotonic terminal state.
pub trait Task<T>: Send {
    /// Advance one logical step. No-op once terminal.
    fn tick(&mut self, scheduler: &dyn Scheduler);

    /// Request cancellation. No-op once terminal.
    fn cancel(&mut self);

    /// Current lifecycle state.
    fn state(&self) -> TaskState;

    /// Result of a successful task. `None` while pending, for other terminal
    /// states, and for tasks that succeed with a null result.
    fn result(&self) -> Option<T>;

    /// Error of a faulted task.
    fn error(&self) -> Option<TaskFault>;

    /// Whether the task reached any terminal state.
    fn is_complete(&self) -> bool {
        self.state().is_terminal()
    }

    /// Whether the task succeeded.
    fn is_successful(&self) -> bool {
        self.state() == TaskState::Successful
    }

    /// Whether the task faulted.
    fn is_faulted(&self) -> bool {
        self.state() == TaskState::Faulted
    }

    /// Whether the task was cancelled.
    fn is_cancelled(&self) -> bool {
        self.state() == TaskState::Cancelled
    }
}

/// State shared by every task implementation.
///
/// All transitions are one-shot: once terminal, further transitions return
/// `false` and change nothing.
#[derive(Debug, Clone)]
pub struct TaskCore<T> {
    state: TaskState,
    result: Option<T>,
    error: Option<TaskFault>,
}

impl<T> Default for TaskCore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskCore<T> {
    /// A pending core.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: TaskState::Pending,
            result: None,
            error: None,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> TaskState {
        self.state
    }

    /// Whether the core is terminal.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.state.is_terminal()
    }

    /// Transition to `Successful`.
    pub fn succeed(&mut self, result: Option<T>) -> bool {
        if self.is_complete() {
            return false;
        }
        self.state = TaskState::Successful;
        self.result = result;
        true
    }

    /// Transition to `Faulted`.
    pub fn fault(&mut self, error: TaskFault) -> bool {
        if self.is_complete() {
            return false;
        }
        self.state = TaskState::Faulted;
        self.error = Some(error);
        true
    }

    /// Transition to `Cancelled`.
    pub fn cancel(&mut self) -> bool {
        if self.is_complete() {
            return false;
        }
        self.state = TaskState::Cancelled;
        true
    }

    /// Copy a terminal outcome observed on another task.
    pub fn adopt(&mut self, state: TaskState, result: Option<T>, error: Option<TaskFault>) -> bool {
        match state {
            TaskState::Pending => false,
            TaskState::Successful => self.succeed(result),
            TaskState::Faulted => {
                self.fault(error.unwrap_or_else(|| TaskFault::msg("task faulted without an error")))
            }
            TaskState::Cancelled => self.cancel(),
        }
    }

    /// Borrow the error, if faulted.
    #[must_use]
    pub const fn error_ref(&self) -> Option<&TaskFault> {
        self.error.as_ref()
    }
}

impl<T: Clone> TaskCore<T> {
    /// Clone of the result.
    #[must_use]
    pub fn result(&self) -> Option<T> {
        self.result.clone()
    }

    /// Clone of the error.
    #[must_use]
    pub fn error(&self) -> Option<TaskFault> {
        self.error.clone()
    }
}

/// Shared, lockable handle to a task.
///
/// Cloning the handle shares the task. The handle is itself a [`Task`] and a
/// [`Schedulable`], so it can be registered with a scheduler, wrapped by a
/// decorator, or joined.
pub struct TaskHandle<T> {
    inner: Arc<Mutex<dyn Task<T>>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("state", &self.inner.lock().state())
            .finish()
    }
}

impl<T: 'static> TaskHandle<T> {
    /// Wrap a task into a shared handle.
    pub fn new(task: impl Task<T> + 'static) -> Self {
        let inner: Arc<Mutex<dyn Task<T>>> = Arc::new(Mutex::new(task));
        Self { inner }
    }

    /// Advance the task by one step.
    pub fn tick(&self, scheduler: &dyn Scheduler) {
        self.inner.lock().tick(scheduler);
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.inner.lock().cancel();
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.inner.lock().state()
    }

    /// Result of the task.
    #[must_use]
    pub fn result(&self) -> Option<T> {
        self.inner.lock().result()
    }

    /// Error of the task.
    #[must_use]
    pub fn error(&self) -> Option<TaskFault> {
        self.inner.lock().error()
    }

    /// Whether the task is terminal.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state().is_terminal()
    }

    /// Whether both handles point at the same task.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Type-erased view for schedulers.
    #[must_use]
    pub fn schedulable(&self) -> Arc<dyn Schedulable> {
        Arc::new(self.clone())
    }
}

impl<T: 'static> Task<T> for TaskHandle<T> {
    fn tick(&mut self, scheduler: &dyn Scheduler) {
        Self::tick(self, scheduler);
    }

    fn cancel(&mut self) {
        Self::cancel(self);
    }

    fn state(&self) -> TaskState {
        Self::state(self)
    }

    fn result(&self) -> Option<T> {
        Self::result(self)
    }

    fn error(&self) -> Option<TaskFault> {
        Self::error(self)
    }
}

impl<T: 'static> Schedulable for TaskHandle<T> {
    fn tick(&self, scheduler: &dyn Scheduler) {
        Self::tick(self, scheduler);
    }

    fn is_complete(&self) -> bool {
        Self::is_complete(self)
    }
}
