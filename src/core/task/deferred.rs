//! Decorators that hand a wrapped task to the scheduler.
//!
//! [`DelayedTask`] registers its wrapped task for one re-tick after a delay;
//! [`ThrottledTask`] registers it for repeated re-ticks at a fixed cadence.
//! Either way the decorator mirrors the wrapped task's first terminal outcome.

use std::time::Duration;

use tracing::debug;

use crate::core::task::{Scheduler, Task, TaskCore, TaskHandle, TaskState};
use crate::core::TaskFault;

/// How the wrapped task is registered with the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cadence {
    Once(Duration),
    Every(Duration),
}

impl Cadence {
    /// `(delay, interval)` pair handed to the scheduler.
    const fn registration(self) -> (Option<Duration>, Option<Duration>) {
        match self {
            Self::Once(delay) => (Some(delay), None),
            Self::Every(interval) => (None, Some(interval)),
        }
    }
}

struct Deferral<T> {
    wrapped: TaskHandle<T>,
    cadence: Cadence,
    registered: bool,
    core: TaskCore<T>,
}

impl<T: Clone + Send + 'static> Deferral<T> {
    const fn new(wrapped: TaskHandle<T>, cadence: Cadence) -> Self {
        Self {
            wrapped,
            cadence,
            registered: false,
            core: TaskCore::new(),
        }
    }

    fn tick(&mut self, scheduler: &dyn Scheduler) {
        if self.core.is_complete() {
            return;
        }
        if !self.registered {
            self.registered = true;
            let (delay, interval) = self.cadence.registration();
            debug!(?delay, ?interval, "registering wrapped task with scheduler");
            scheduler.schedule(self.wrapped.schedulable(), delay, interval);
        }
        self.mirror();
    }

    fn mirror(&mut self) {
        let state = self.wrapped.state();
        if state.is_terminal() {
            self.core
                .adopt(state, self.wrapped.result(), self.wrapped.error());
        }
    }

    fn cancel(&mut self) {
        if self.core.is_complete() {
            return;
        }
        self.wrapped.cancel();
        self.core.cancel();
    }
}

/// Re-ticks its wrapped task once after a delay.
pub struct DelayedTask<T> {
    inner: Deferral<T>,
}

impl<T: Clone + Send + 'static> DelayedTask<T> {
    /// Wrap `wrapped`, deferring it by `delay`.
    #[must_use]
    pub const fn new(wrapped: TaskHandle<T>, delay: Duration) -> Self {
        Self {
            inner: Deferral::new(wrapped, Cadence::Once(delay)),
        }
    }

    /// The wrapped task.
    #[must_use]
    pub const fn wrapped(&self) -> &TaskHandle<T> {
        &self.inner.wrapped
    }
}

/// Re-ticks its wrapped task at a fixed cadence until it completes.
pub struct ThrottledTask<T> {
    inner: Deferral<T>,
}

impl<T: Clone + Send + 'static> ThrottledTask<T> {
    /// Wrap `wrapped`, ticking it every `interval`.
    #[must_use]
    pub const fn new(wrapped: TaskHandle<T>, interval: Duration) -> Self {
        Self {
            inner: Deferral::new(wrapped, Cadence::Every(interval)),
        }
    }

    /// The wrapped task.
    #[must_use]
    pub const fn wrapped(&self) -> &TaskHandle<T> {
        &self.inner.wrapped
    }
}

impl<T: Clone + Send + 'static> Task<T> for DelayedTask<T> {
    fn tick(&mut self, scheduler: &dyn Scheduler) {
        self.inner.tick(scheduler);
    }

    fn cancel(&mut self) {
        self.inner.cancel();
    }

    fn state(&self) -> TaskState {
        self.inner.core.state()
    }

    fn result(&self) -> Option<T> {
        self.inner.core.result()
    }

    fn error(&self) -> Option<TaskFault> {
        self.inner.core.error()
    }
}

impl<T: Clone + Send + 'static> Task<T> for ThrottledTask<T> {
    fn tick(&mut self, scheduler: &dyn Scheduler) {
        self.inner.tick(scheduler);
    }

    fn cancel(&mut self) {
        self.inner.cancel();
    }

    fn state(&self) -> TaskState {
        self.inner.core.state()
    }

    fn result(&self) -> Option<T> {
        self.inner.core.result()
    }

    fn error(&self) -> Option<TaskFault> {
        self.inner.core.error()
    }
}
