//! "Some-of" and "any-of" joins over a fixed sequence of child tasks.
//!
//! Each tick first advances every pending child, then folds the children that
//! became terminal into the join in subtask index order. Once the join is
//! satisfied (or can no longer be), outcomes of the remaining children are
//! ignored. A cancelled child counts as a failure with [`TaskFault::Cancelled`].

use tracing::debug;

use crate::core::task::{Scheduler, Task, TaskCore, TaskHandle, TaskState};
use crate::core::{MultipleFailure, TaskFault};

/// Succeeds once `count` children succeeded.
///
/// The result holds the successful children's results in subtask index order.
/// Faults with a [`MultipleFailure`] once `N - count + 1` children failed,
/// carrying the failures collected so far in subtask index order.
pub struct SomeTask<T> {
    children: Vec<TaskHandle<T>>,
    count: usize,
    observed: Vec<bool>,
    successes: Vec<(usize, Option<T>)>,
    failures: Vec<(usize, TaskFault)>,
    core: TaskCore<Vec<Option<T>>>,
}

impl<T: Clone + Send + 'static> SomeTask<T> {
    /// Join `children`, requiring `count` successes.
    ///
    /// `count == 0` is satisfied immediately with an empty result. A `count`
    /// larger than the number of children can never be met and faults
    /// immediately with an empty aggregate.
    #[must_use]
    pub fn new(children: Vec<TaskHandle<T>>, count: usize) -> Self {
        let mut core = TaskCore::new();
        if count == 0 {
            core.succeed(Some(Vec::new()));
        } else if count > children.len() {
            core.fault(TaskFault::from(MultipleFailure::new(Vec::new())));
        }
        Self {
            observed: vec![false; children.len()],
            children,
            count,
            successes: Vec::new(),
            failures: Vec::new(),
            core,
        }
    }

    /// The joined children, in subtask index order.
    #[must_use]
    pub fn children(&self) -> &[TaskHandle<T>] {
        &self.children
    }

    /// Number of successes required.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    fn failure_limit(&self) -> usize {
        (self.children.len() + 1).saturating_sub(self.count)
    }

    fn observe(&mut self, index: usize) {
        let child = &self.children[index];
        match child.state() {
            TaskState::Pending => return,
            TaskState::Successful => self.successes.push((index, child.result())),
            TaskState::Faulted => {
                let fault = child
                    .error()
                    .unwrap_or_else(|| TaskFault::msg("task faulted without an error"));
                self.failures.push((index, fault));
            }
            TaskState::Cancelled => self.failures.push((index, TaskFault::Cancelled)),
        }
        self.observed[index] = true;

        if self.successes.len() >= self.count {
            let mut successes = std::mem::take(&mut self.successes);
            successes.sort_by_key(|(index, _)| *index);
            debug!(count = self.count, "join satisfied");
            self.core
                .succeed(Some(successes.into_iter().map(|(_, value)| value).collect()));
        } else if self.failures.len() >= self.failure_limit() {
            let mut failures = std::mem::take(&mut self.failures);
            failures.sort_by_key(|(index, _)| *index);
            debug!(failed = failures.len(), "join can no longer be satisfied");
            let errors = failures.into_iter().map(|(_, fault)| fault).collect();
            self.core.fault(TaskFault::from(MultipleFailure::new(errors)));
        }
    }
}

impl<T: Clone + Send + 'static> Task<Vec<Option<T>>> for SomeTask<T> {
    fn tick(&mut self, scheduler: &dyn Scheduler) {
        if self.core.is_complete() {
            return;
        }
        for (child, observed) in self.children.iter().zip(&self.observed) {
            if !*observed && !child.is_complete() {
                child.tick(scheduler);
            }
        }
        for index in 0..self.children.len() {
            if self.core.is_complete() {
                break;
            }
            if !self.observed[index] {
                self.observe(index);
            }
        }
    }

    fn cancel(&mut self) {
        if !self.core.cancel() {
            return;
        }
        for child in &self.children {
            if !child.is_complete() {
                child.cancel();
            }
        }
    }

    fn state(&self) -> TaskState {
        self.core.state()
    }

    fn result(&self) -> Option<Vec<Option<T>>> {
        self.core.result()
    }

    fn error(&self) -> Option<TaskFault> {
        self.core.error()
    }
}

/// Succeeds with the first child success.
///
/// Faults only once every child failed, with a [`MultipleFailure`] holding
/// every child's error in subtask index order.
pub struct AnyTask<T> {
    inner: SomeTask<T>,
}

impl<T: Clone + Send + 'static> AnyTask<T> {
    /// Join `children`, requiring a single success.
    #[must_use]
    pub fn new(children: Vec<TaskHandle<T>>) -> Self {
        Self {
            inner: SomeTask::new(children, 1),
        }
    }

    /// The joined children, in subtask index order.
    #[must_use]
    pub fn children(&self) -> &[TaskHandle<T>] {
        self.inner.children()
    }
}

impl<T: Clone + Send + 'static> Task<T> for AnyTask<T> {
    fn tick(&mut self, scheduler: &dyn Scheduler) {
        self.inner.tick(scheduler);
    }

    fn cancel(&mut self) {
        self.inner.cancel();
    }

    fn state(&self) -> TaskState {
        self.inner.state()
    }

    fn result(&self) -> Option<T> {
        self.inner
            .result()
            .and_then(|values| values.into_iter().next().flatten())
    }

    fn error(&self) -> Option<TaskFault> {
        self.inner.error()
    }
}
