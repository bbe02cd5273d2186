//! Task wrapping a zero-argument callable.

use tracing::debug;

use crate::core::task::{Scheduler, Task, TaskCore, TaskState};
use crate::core::{AppResult, TaskFault};

/// Invokes its callable exactly once, synchronously, on the first tick.
pub struct CallableTask<T, F> {
    job: Option<F>,
    core: TaskCore<T>,
}

impl<T, F> CallableTask<T, F>
where
    F: FnOnce() -> AppResult<T>,
{
    /// Wrap `job`.
    pub const fn new(job: F) -> Self {
        Self {
            job: Some(job),
            core: TaskCore::new(),
        }
    }
}

impl<T, F> Task<T> for CallableTask<T, F>
where
    T: Clone + Send,
    F: FnOnce() -> AppResult<T> + Send,
{
    fn tick(&mut self, _scheduler: &dyn Scheduler) {
        if self.core.is_complete() {
            return;
        }
        let Some(job) = self.job.take() else {
            return;
        };
        match job() {
            Ok(value) => {
                self.core.succeed(Some(value));
            }
            Err(err) => {
                debug!(error = %err, "callable task faulted");
                self.core.fault(TaskFault::from(err));
            }
        }
    }

    fn cancel(&mut self) {
        if self.core.cancel() {
            self.job = None;
        }
    }

    fn state(&self) -> TaskState {
        self.core.state()
    }

    fn result(&self) -> Option<T> {
        self.core.result()
    }

    fn error(&self) -> Option<TaskFault> {
        self.core.error()
    }
}
