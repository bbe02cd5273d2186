//! In-process launchable unit running a callable on its own thread.
//!
//! Each start spawns a supervisor thread that runs the job on a worker thread
//! and waits for whichever comes first: the job's result, a stop request, or
//! the timeout. The supervisor then reports exactly one outcome. A job that
//! panics is reported as failed. A job that times out or is stopped keeps
//! running detached; its late result is discarded.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{after, bounded, never, select, Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{Launchable, OutcomeReporter, UnitId, UnitOutcome, SIGTERM};
use crate::core::{AppResult, PoolError, TaskFault};

type Job = Arc<dyn Fn() -> AppResult<Value> + Send + Sync>;

/// User hooks fired by the pool once a run of the unit is recorded.
#[derive(Default)]
pub struct UnitHooks {
    then: Option<Box<dyn FnMut(&Value) + Send>>,
    catch: Option<Box<dyn FnMut(&TaskFault) + Send>>,
    on_timeout: Option<Box<dyn FnMut() + Send>>,
    on_signal: Option<Box<dyn FnMut(i32) + Send>>,
}

impl fmt::Debug for UnitHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitHooks")
            .field("then", &self.then.is_some())
            .field("catch", &self.catch.is_some())
            .field("on_timeout", &self.on_timeout.is_some())
            .field("on_signal", &self.on_signal.is_some())
            .finish()
    }
}

/// Run status shared between a unit and its supervisor thread.
#[derive(Debug, Default)]
struct RunStatus {
    running: AtomicBool,
    successful: AtomicBool,
    terminated: AtomicBool,
    signal: AtomicI32,
}

impl RunStatus {
    /// Mark the run as ended. Only the first caller wins.
    fn end(&self, successful: bool, signal: Option<i32>) -> bool {
        if !self.running.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.successful.store(successful, Ordering::Release);
        self.signal.store(signal.unwrap_or(0), Ordering::Release);
        self.terminated.store(true, Ordering::Release);
        true
    }
}

/// A [`Launchable`] wrapping a serializable callable.
pub struct CallableUnit {
    id: UnitId,
    job: Job,
    timeout: Option<Duration>,
    hooks: Arc<Mutex<UnitHooks>>,
    status: Arc<RunStatus>,
    stop_tx: Option<Sender<()>>,
}

impl CallableUnit {
    /// Wrap `job`, whose result is serialized into a [`Value`] on success.
    pub fn new<R, F>(job: F) -> Self
    where
        R: Serialize,
        F: Fn() -> AppResult<R> + Send + Sync + 'static,
    {
        let job: Job = Arc::new(move || {
            let output = job()?;
            Ok(serde_json::to_value(output)?)
        });
        Self {
            id: UnitId::next(),
            job,
            timeout: None,
            hooks: Arc::new(Mutex::new(UnitHooks::default())),
            status: Arc::new(RunStatus::default()),
            stop_tx: None,
        }
    }

    /// Set the run timeout; zero means none.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Run timeout, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Hook fired with the unit's result when it finishes.
    #[must_use]
    pub fn then(self, hook: impl FnMut(&Value) + Send + 'static) -> Self {
        self.hooks.lock().then = Some(Box::new(hook));
        self
    }

    /// Hook fired with the unit's error when it fails.
    #[must_use]
    pub fn catch(self, hook: impl FnMut(&TaskFault) + Send + 'static) -> Self {
        self.hooks.lock().catch = Some(Box::new(hook));
        self
    }

    /// Hook fired when the unit times out.
    #[must_use]
    pub fn on_timeout(self, hook: impl FnMut() + Send + 'static) -> Self {
        self.hooks.lock().on_timeout = Some(Box::new(hook));
        self
    }

    /// Hook fired with the signal number when the unit is signaled.
    #[must_use]
    pub fn on_signal(self, hook: impl FnMut(i32) + Send + 'static) -> Self {
        self.hooks.lock().on_signal = Some(Box::new(hook));
        self
    }
}

impl fmt::Debug for CallableUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallableUnit")
            .field("id", &self.id)
            .field("timeout", &self.timeout)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

fn supervise(
    id: UnitId,
    job: Job,
    timeout: Option<Duration>,
    status: &RunStatus,
    stop_rx: &Receiver<()>,
    reporter: &OutcomeReporter,
) {
    let (result_tx, result_rx) = bounded::<AppResult<Value>>(1);
    let spawned = thread::Builder::new()
        .name(format!("{id}-job"))
        .spawn(move || {
            let _ = result_tx.send(job());
        });
    if let Err(err) = spawned {
        if status.end(false, None) {
            reporter.report(id, UnitOutcome::Failed(TaskFault::raised(err)));
        }
        return;
    }

    let deadline: Receiver<Instant> = timeout.map_or_else(never, after);
    select! {
        recv(result_rx) -> msg => {
            let outcome = match msg {
                Ok(Ok(value)) => UnitOutcome::Finished(value),
                Ok(Err(err)) => UnitOutcome::Failed(TaskFault::from(err)),
                Err(_) => UnitOutcome::Failed(TaskFault::msg(format!("{id} panicked"))),
            };
            if status.end(outcome.is_success(), None) {
                debug!(unit_id = %id, success = outcome.is_success(), "unit finished");
                reporter.report(id, outcome);
            }
        }
        recv(stop_rx) -> _ => {
            debug!(unit_id = %id, "unit supervisor stopped");
        }
        recv(deadline) -> _ => {
            if status.end(false, None) {
                warn!(unit_id = %id, ?timeout, "unit timed out");
                reporter.report(id, UnitOutcome::TimedOut);
            }
        }
    }
}

impl Launchable for CallableUnit {
    fn id(&self) -> UnitId {
        self.id
    }

    /// Always `None`: the unit runs on a thread of this process.
    fn pid(&self) -> Option<u32> {
        None
    }

    fn start(&mut self, reporter: OutcomeReporter) -> Result<(), PoolError> {
        if self.status.running.swap(true, Ordering::AcqRel) {
            return Err(PoolError::InvalidUnit(format!("{} is already running", self.id)));
        }
        self.status.terminated.store(false, Ordering::Release);
        self.status.successful.store(false, Ordering::Release);
        self.status.signal.store(0, Ordering::Release);

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let id = self.id;
        let job = Arc::clone(&self.job);
        let timeout = self.timeout;
        let status = Arc::clone(&self.status);

        let spawned = thread::Builder::new()
            .name(id.to_string())
            .spawn(move || supervise(id, job, timeout, &status, &stop_rx, &reporter));
        if let Err(err) = spawned {
            self.status.running.store(false, Ordering::Release);
            return Err(PoolError::Spawn(err));
        }
        self.stop_tx = Some(stop_tx);
        debug!(unit_id = %id, ?timeout, "unit started");
        Ok(())
    }

    fn restart(&self) -> Box<dyn Launchable> {
        Box::new(Self {
            id: self.id,
            job: Arc::clone(&self.job),
            timeout: self.timeout,
            hooks: Arc::clone(&self.hooks),
            status: Arc::new(RunStatus::default()),
            stop_tx: None,
        })
    }

    fn stop(&mut self) {
        if self.status.end(false, Some(SIGTERM)) {
            debug!(unit_id = %self.id, "unit stopped");
        } else if !self.status.terminated.load(Ordering::Acquire) {
            // Never started.
            self.status.signal.store(SIGTERM, Ordering::Release);
            self.status.terminated.store(true, Ordering::Release);
        }
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.try_send(());
        }
    }

    fn is_running(&self) -> bool {
        self.status.running.load(Ordering::Acquire)
    }

    fn is_successful(&self) -> bool {
        self.status.successful.load(Ordering::Acquire)
    }

    fn is_terminated(&self) -> bool {
        self.status.terminated.load(Ordering::Acquire)
    }

    fn signaled(&self) -> Option<i32> {
        match self.status.signal.load(Ordering::Acquire) {
            0 => None,
            signal => Some(signal),
        }
    }

    fn trigger_success(&mut self, output: &Value) {
        if let Some(hook) = self.hooks.lock().then.as_mut() {
            hook(output);
        }
    }

    fn trigger_error(&mut self, fault: &TaskFault) {
        if let Some(hook) = self.hooks.lock().catch.as_mut() {
            hook(fault);
        }
    }

    fn trigger_timeout(&mut self) {
        if let Some(hook) = self.hooks.lock().on_timeout.as_mut() {
            hook();
        }
    }

    fn trigger_signal(&mut self, signal: i32) {
        if let Some(hook) = self.hooks.lock().on_signal.as_mut() {
            hook(signal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn reporter() -> (OutcomeReporter, Receiver<super::super::UnitEvent>) {
        let (tx, rx) = unbounded();
        (OutcomeReporter::new(tx), rx)
    }

    #[test]
    fn test_reports_finished_value() {
        let (reporter, events) = reporter();
        let mut unit = CallableUnit::new(|| Ok(vec![1, 2, 3]));
        unit.start(reporter).unwrap();

        let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(event.id, unit.id());
        match event.outcome {
            UnitOutcome::Finished(value) => assert_eq!(value, serde_json::json!([1, 2, 3])),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(unit.is_terminated());
        assert!(unit.is_successful());
        assert!(!unit.is_running());
    }

    #[test]
    fn test_reports_error_and_panic_as_failed() {
        let (reporter, events) = reporter();
        let mut failing = CallableUnit::new(|| -> AppResult<i32> { anyhow::bail!("bad input") });
        failing.start(reporter.clone()).unwrap();
        let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(&event.outcome, UnitOutcome::Failed(f) if f.to_string() == "bad input"));

        let mut panicking = CallableUnit::new(|| -> AppResult<i32> { panic!("boom") });
        panicking.start(reporter).unwrap();
        let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(event.outcome, UnitOutcome::Failed(_)));
        assert!(!panicking.is_successful());
    }

    #[test]
    fn test_reports_timeout() {
        let (reporter, events) = reporter();
        let mut unit = CallableUnit::new(|| {
            thread::sleep(Duration::from_millis(500));
            Ok(())
        })
        .with_timeout(Duration::from_millis(20));
        unit.start(reporter).unwrap();

        let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(event.outcome, UnitOutcome::TimedOut));
        assert!(unit.is_terminated());
    }

    #[test]
    fn test_stop_suppresses_outcome() {
        let (reporter, events) = reporter();
        let mut unit = CallableUnit::new(|| {
            thread::sleep(Duration::from_millis(200));
            Ok(1)
        });
        unit.start(reporter).unwrap();
        unit.stop();

        assert!(unit.is_terminated());
        assert_eq!(unit.signaled(), Some(SIGTERM));
        assert!(events.recv_timeout(Duration::from_millis(400)).is_err());
    }

    #[test]
    fn test_double_start_rejected() {
        let (reporter, _events) = reporter();
        let mut unit = CallableUnit::new(|| {
            thread::sleep(Duration::from_millis(100));
            Ok(())
        });
        unit.start(reporter.clone()).unwrap();
        assert!(matches!(unit.start(reporter), Err(PoolError::InvalidUnit(_))));
        unit.stop();
    }

    #[test]
    fn test_restart_keeps_identity_and_hooks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let unit = CallableUnit::new(|| Ok("x")).then(move |value| sink.lock().push(value.clone()));

        let mut fresh = unit.restart();
        assert_eq!(fresh.id(), unit.id());
        assert!(!fresh.is_running());
        fresh.trigger_success(&Value::from("x"));
        assert_eq!(seen.lock().len(), 1);
    }
}
