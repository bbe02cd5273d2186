//! Task that invokes a callable on every tick, a bounded or unbounded number
//! of times.

use tracing::debug;

use crate::core::task::{Scheduler, Task, TaskCore, TaskState};
use crate::core::{AppResult, TaskFault};

/// Invokes its callable once per tick.
///
/// With `times = Some(n)` the task succeeds (null result) after exactly `n`
/// successful invocations. With `times = None` it only ends through an error
/// or cancellation. The first error faults the task and stops invocations.
pub struct RecurringTask<F> {
    job: F,
    times: Option<u64>,
    invocations: u64,
    core: TaskCore<()>,
}

impl<F> RecurringTask<F>
where
    F: FnMut() -> AppResult<()>,
{
    /// Invoke `job` up to `times` times; `None` means unbounded.
    ///
    /// `Some(0)` is immediately successful and never invokes `job`.
    pub fn new(job: F, times: Option<u64>) -> Self {
        let mut core = TaskCore::new();
        if times == Some(0) {
            core.succeed(None);
        }
        Self {
            job,
            times,
            invocations: 0,
            core,
        }
    }

    /// Invoke `job` on every tick until cancelled or an error occurs.
    pub fn unbounded(job: F) -> Self {
        Self::new(job, None)
    }

    /// Number of successful invocations so far.
    #[must_use]
    pub const fn invocations(&self) -> u64 {
        self.invocations
    }
}

impl<F> Task<()> for RecurringTask<F>
where
    F: FnMut() -> AppResult<()> + Send,
{
    fn tick(&mut self, _scheduler: &dyn Scheduler) {
        if self.core.is_complete() {
            return;
        }
        if let Err(err) = (self.job)() {
            debug!(invocations = self.invocations, error = %err, "recurring task faulted");
            self.core.fault(TaskFault::from(err));
            return;
        }
        self.invocations += 1;
        if self.times == Some(self.invocations) {
            self.core.succeed(None);
        }
    }

    fn cancel(&mut self) {
        self.core.cancel();
    }

    fn state(&self) -> TaskState {
        self.core.state()
    }

    fn result(&self) -> Option<()> {
        None
    }

    fn error(&self) -> Option<TaskFault> {
        self.core.error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::testing::RecordingScheduler;

    #[test]
    fn test_zero_times_never_invokes() {
        let mut calls = 0;
        {
            let task = RecurringTask::new(
                || {
                    calls += 1;
                    Ok(())
                },
                Some(0),
            );
            assert!(task.is_successful());
            assert!(task.result().is_none());
        }
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_runs_exactly_n_times() {
        let scheduler = RecordingScheduler::default();
        let mut task = RecurringTask::new(|| Ok(()), Some(5));

        for _ in 0..4 {
            task.tick(&scheduler);
            assert!(!task.is_complete());
        }
        task.tick(&scheduler);
        assert!(task.is_successful());
        assert!(task.result().is_none());

        task.tick(&scheduler);
        assert_eq!(task.invocations(), 5);
    }

    #[test]
    fn test_error_stops_further_invocations() {
        let scheduler = RecordingScheduler::default();
        let mut calls = 0;
        let mut task = RecurringTask::new(
            move || {
                calls += 1;
                if calls == 3 {
                    anyhow::bail!("third call failed");
                }
                Ok(())
            },
            Some(5),
        );

        for _ in 0..10 {
            task.tick(&scheduler);
        }

        assert!(task.is_faulted());
        assert_eq!(task.invocations(), 2);
        assert_eq!(
            task.error().map(|e| e.to_string()),
            Some("third call failed".to_string())
        );
    }

    #[test]
    fn test_unbounded_until_cancelled() {
        let scheduler = RecordingScheduler::default();
        let mut task = RecurringTask::unbounded(|| Ok(()));
        for _ in 0..100 {
            task.tick(&scheduler);
        }
        assert!(!task.is_complete());
        task.cancel();
        task.tick(&scheduler);
        assert!(task.is_cancelled());
        assert_eq!(task.invocations(), 100);
    }
}
