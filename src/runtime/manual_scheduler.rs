//! Deterministic scheduler driven by a virtual clock.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use crate::core::task::{Schedulable, Scheduler};

struct Registration {
    due: Duration,
    seq: u64,
    interval: Option<Duration>,
    task: Arc<dyn Schedulable>,
}

#[derive(Default)]
struct Timeline {
    now: Duration,
    next_seq: u64,
    pending: Vec<Registration>,
    log: Vec<(Option<Duration>, Option<Duration>)>,
}

impl Timeline {
    fn push(&mut self, due: Duration, interval: Option<Duration>, task: Arc<dyn Schedulable>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(Registration {
            due,
            seq,
            interval,
            task,
        });
    }

    /// Remove the earliest registration due at or before `target`.
    fn pop_due(&mut self, target: Duration) -> Option<Registration> {
        let index = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, r)| r.due <= target)
            .min_by_key(|(_, r)| (r.due, r.seq))
            .map(|(index, _)| index)?;
        Some(self.pending.swap_remove(index))
    }
}

/// Scheduler whose time only moves when [`advance`](Self::advance) is called.
///
/// Due registrations fire in due-time order, first-registered first on ties.
/// Interval registrations are re-armed after each tick until their task is
/// complete. Ticks run without the scheduler's lock held, so tasks may
/// register further work while being ticked.
#[derive(Default)]
pub struct ManualScheduler {
    timeline: Mutex<Timeline>,
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let timeline = self.timeline.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &timeline.now)
            .field("pending", &timeline.pending.len())
            .finish()
    }
}

impl ManualScheduler {
    /// A scheduler at virtual time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.timeline.lock().now
    }

    /// Number of registrations waiting to fire.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.timeline.lock().pending.len()
    }

    /// Every `(delay, interval)` pair received, in order.
    #[must_use]
    pub fn registrations(&self) -> Vec<(Option<Duration>, Option<Duration>)> {
        self.timeline.lock().log.clone()
    }

    fn take_due(&self, target: Duration) -> Option<Registration> {
        let mut timeline = self.timeline.lock();
        let next = timeline.pop_due(target)?;
        timeline.now = timeline.now.max(next.due);
        Some(next)
    }

    /// Move virtual time forward by `by`, firing everything that falls due.
    ///
    /// A zero interval re-arms for the next call rather than this one.
    /// Returns the number of ticks delivered.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.timeline.lock().now + by;
        let mut fired = 0;
        let mut deferred = Vec::new();

        loop {
            let Some(registration) = self.take_due(target) else {
                break;
            };

            if !registration.task.is_complete() {
                trace!(due = ?registration.due, "manual scheduler tick");
                registration.task.tick(self);
                fired += 1;
            }

            if let Some(interval) = registration.interval {
                if !registration.task.is_complete() {
                    let due = registration.due + interval;
                    if interval.is_zero() {
                        deferred.push((due, interval, registration.task));
                    } else {
                        self.timeline
                            .lock()
                            .push(due, Some(interval), registration.task);
                    }
                }
            }
        }

        let mut timeline = self.timeline.lock();
        timeline.now = target;
        for (due, interval, task) in deferred {
            timeline.push(due, Some(interval), task);
        }
        fired
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, task: Arc<dyn Schedulable>, delay: Option<Duration>, interval: Option<Duration>) {
        let mut timeline = self.timeline.lock();
        timeline.log.push((delay, interval));
        let first = delay.or(interval).unwrap_or_default();
        let due = timeline.now + first;
        let repeat = if delay.is_some() { None } else { interval };
        timeline.push(due, repeat, task);
    }
}
