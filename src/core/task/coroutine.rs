//! Task whose body is a suspendable computation.

use tracing::debug;

use crate::core::task::{Scheduler, Task, TaskCore, TaskState};
use crate::core::trampoline::{Computation, Driven, Input, Trampoline};
use crate::core::TaskFault;

type Responder<K, V> = Box<dyn FnMut(K, V) -> Result<Option<V>, TaskFault> + Send>;

/// Drives a [`Trampoline`] one outward yield per tick.
///
/// Every outward `(key, value)` yield is answered by the responder, and the
/// answer is fed back in on the next tick. An `Err` answer is injected into the
/// yielding frame. Completion makes the task successful with the computation's
/// final value; an error escaping the top-level computation faults it.
pub struct CoroutineTask<K, V> {
    trampoline: Trampoline<K, V, TaskFault>,
    responder: Responder<K, V>,
    pending: Option<Input<V, TaskFault>>,
    core: TaskCore<V>,
}

impl<K, V> CoroutineTask<K, V> {
    /// Wrap `body`, answering its yields with `responder`.
    pub fn new<C, R>(body: C, responder: R) -> Self
    where
        C: Computation<K, V, TaskFault> + Send + 'static,
        R: FnMut(K, V) -> Result<Option<V>, TaskFault> + Send + 'static,
    {
        Self {
            trampoline: Trampoline::new(body),
            responder: Box::new(responder),
            pending: None,
            core: TaskCore::new(),
        }
    }

    /// Number of suspended parent frames inside the body.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.trampoline.depth()
    }
}

impl<K, V> Task<V> for CoroutineTask<K, V>
where
    K: Send,
    V: Clone + Send,
{
    fn tick(&mut self, _scheduler: &dyn Scheduler) {
        if self.core.is_complete() {
            return;
        }
        let input = self.pending.take().unwrap_or(Input::Next(None));
        match self.trampoline.resume(input) {
            Ok(Driven::Yielded(key, value)) => {
                self.pending = Some(match (self.responder)(key, value) {
                    Ok(answer) => Input::Next(answer),
                    Err(fault) => Input::Throw(fault),
                });
            }
            Ok(Driven::Complete(value)) => {
                self.core.succeed(value);
            }
            Err(fault) => {
                debug!(error = %fault, "coroutine body faulted");
                self.core.fault(fault);
            }
        }
    }

    fn cancel(&mut self) {
        if self.core.cancel() {
            self.pending = None;
        }
    }

    fn state(&self) -> TaskState {
        self.core.state()
    }

    fn result(&self) -> Option<V> {
        self.core.result()
    }

    fn error(&self) -> Option<TaskFault> {
        self.core.error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::testing::RecordingScheduler;
    use crate::core::trampoline::{from_fn, Step};

    /// Yields `("ask", 1)` and `("ask", 2)`, then returns the sum of answers.
    fn asker() -> impl Computation<&'static str, i64, TaskFault> + Send {
        let mut stage = 0;
        let mut total = 0;
        from_fn(move |input: Input<i64, TaskFault>| {
            let answer = match input {
                Input::Next(answer) => answer,
                Input::Throw(fault) => return Err(fault),
            };
            total += answer.unwrap_or(0);
            stage += 1;
            match stage {
                1 => Ok(Step::Yield("ask", 1)),
                2 => Ok(Step::Yield("ask", 2)),
                _ => Ok(Step::Done(Some(total))),
            }
        })
    }

    #[test]
    fn test_one_yield_per_tick() {
        let scheduler = RecordingScheduler::default();
        let mut task = CoroutineTask::new(asker(), |_key, value| Ok(Some(value * 10)));

        task.tick(&scheduler);
        assert!(!task.is_complete());
        task.tick(&scheduler);
        assert!(!task.is_complete());
        task.tick(&scheduler);

        assert!(task.is_successful());
        assert_eq!(task.result(), Some(30));
    }

    #[test]
    fn test_responder_error_faults_unhandled_body() {
        let scheduler = RecordingScheduler::default();
        let mut task = CoroutineTask::new(asker(), |_key, _value| Err(TaskFault::msg("denied")));

        for _ in 0..3 {
            task.tick(&scheduler);
        }

        assert!(task.is_faulted());
        assert_eq!(task.error().map(|e| e.to_string()), Some("denied".to_string()));
    }

    #[test]
    fn test_cancel_stops_driving() {
        let scheduler = RecordingScheduler::default();
        let mut task = CoroutineTask::new(asker(), |_key, value| Ok(Some(value)));
        task.tick(&scheduler);
        task.cancel();
        task.tick(&scheduler);
        assert!(task.is_cancelled());
        assert!(task.result().is_none());
    }
}
