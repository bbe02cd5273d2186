//! Tokio-backed scheduler implementation.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Handle, TryCurrentError};
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::core::task::{Schedulable, Scheduler};

/// Smallest period handed to `tokio::time::interval`, which rejects zero.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Scheduler that re-ticks tasks from futures spawned on a tokio runtime.
///
/// One-shot registrations sleep for their delay and tick once. Interval
/// registrations tick every period until their task is complete.
#[derive(Clone, Debug)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Create a scheduler spawning onto `handle`.
    #[must_use]
    pub const fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Create a scheduler on the runtime of the calling context.
    ///
    /// # Errors
    ///
    /// Returns an error when called outside a tokio runtime.
    pub fn current() -> Result<Self, TryCurrentError> {
        Handle::try_current().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, task: Arc<dyn Schedulable>, delay: Option<Duration>, interval: Option<Duration>) {
        let scheduler = self.clone();
        match (delay, interval) {
            (None, Some(period)) => {
                let period = period.max(MIN_INTERVAL);
                debug!(?period, "scheduling interval re-ticks");
                self.handle.spawn(async move {
                    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    while !task.is_complete() {
                        ticker.tick().await;
                        task.tick(&scheduler);
                    }
                });
            }
            (delay, _) => {
                let delay = delay.unwrap_or_default();
                debug!(?delay, "scheduling one-shot re-tick");
                self.handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    if !task.is_complete() {
                        task.tick(&scheduler);
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::{CallableTask, DelayedTask, RecurringTask, Task, TaskHandle, ThrottledTask};

    #[tokio::test]
    async fn test_delayed_task_completes_on_runtime() {
        let scheduler = TokioScheduler::current().unwrap();
        let inner = TaskHandle::new(CallableTask::new(|| Ok(99)));
        let mut task = DelayedTask::new(inner, Duration::from_millis(20));

        task.tick(&scheduler);
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            task.tick(&scheduler);
            if task.is_complete() {
                break;
            }
        }
        assert!(task.is_successful());
        assert_eq!(task.result(), Some(99));
    }

    #[tokio::test]
    async fn test_throttled_task_stops_when_complete() {
        let scheduler = TokioScheduler::current().unwrap();
        let inner = TaskHandle::new(RecurringTask::new(|| Ok(()), Some(4)));
        let mut task = ThrottledTask::new(inner, Duration::from_millis(5));

        task.tick(&scheduler);
        for _ in 0..200 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            task.tick(&scheduler);
            if task.is_complete() {
                break;
            }
        }
        assert!(task.is_successful());
    }

    #[test]
    fn test_current_outside_runtime_fails() {
        assert!(TokioScheduler::current().is_err());
    }
}
