//! Task bridging an externally-owned [`Promise`].

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::promise::Promise;
use crate::core::task::{Scheduler, Task, TaskCore, TaskState};
use crate::core::TaskFault;

/// Becomes terminal the instant its promise settles, independent of ticks.
///
/// If the promise is already settled at construction, the task is terminal
/// immediately. `tick` never does anything.
pub struct PromiseTask<T> {
    core: Arc<Mutex<TaskCore<T>>>,
    promise: Promise<T>,
}

impl<T> PromiseTask<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Subscribe to `promise`.
    #[must_use]
    pub fn new(promise: Promise<T>) -> Self {
        let core = Arc::new(Mutex::new(TaskCore::new()));
        let sink = Arc::clone(&core);
        promise.subscribe(move |settlement| {
            let mut core = sink.lock();
            match settlement {
                Ok(value) => core.succeed(Some(value.clone())),
                Err(fault) => core.fault(fault.clone()),
            };
        });
        Self { core, promise }
    }

    /// The bridged promise.
    #[must_use]
    pub const fn promise(&self) -> &Promise<T> {
        &self.promise
    }
}

impl<T> Task<T> for PromiseTask<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn tick(&mut self, _scheduler: &dyn Scheduler) {}

    fn cancel(&mut self) {
        // A later settlement is ignored by the cancelled core.
        self.core.lock().cancel();
    }

    fn state(&self) -> TaskState {
        self.core.lock().state()
    }

    fn result(&self) -> Option<T> {
        self.core.lock().result()
    }

    fn error(&self) -> Option<TaskFault> {
        self.core.lock().error()
    }
}
