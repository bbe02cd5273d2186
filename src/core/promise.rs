//! Single-assignment settlement cell with an observer list.
//!
//! A [`Promise`] settles at most once, either resolved with a value or
//! rejected with a [`TaskFault`]. Observers registered before settlement fire
//! exactly once, on the settling thread, after the internal lock is released.
//! Observers registered afterwards fire immediately.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::TaskFault;

type Observer<T> = Box<dyn FnOnce(&Result<T, TaskFault>) + Send>;

struct PromiseState<T> {
    settlement: Option<Arc<Result<T, TaskFault>>>,
    observers: Vec<Observer<T>>,
}

/// Cloneable handle to a settle-once value.
pub struct Promise<T> {
    inner: Arc<Mutex<PromiseState<T>>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        let status = match state.settlement.as_deref() {
            None => "pending",
            Some(Ok(_)) => "resolved",
            Some(Err(_)) => "rejected",
        };
        f.debug_struct("Promise")
            .field("status", &status)
            .field("observers", &state.observers.len())
            .finish()
    }
}

impl<T> Promise<T> {
    /// Create an unsettled promise.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(PromiseState {
                settlement: None,
                observers: Vec::new(),
            })),
        }
    }

    /// Create a promise already resolved with `value`.
    #[must_use]
    pub fn resolved(value: T) -> Self {
        let promise = Self::new();
        promise.inner.lock().settlement = Some(Arc::new(Ok(value)));
        promise
    }

    /// Create a promise already rejected with `fault`.
    #[must_use]
    pub fn rejected(fault: TaskFault) -> Self {
        let promise = Self::new();
        promise.inner.lock().settlement = Some(Arc::new(Err(fault)));
        promise
    }

    /// Resolve with `value`. Returns `false` if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Reject with `fault`. Returns `false` if already settled.
    pub fn reject(&self, fault: TaskFault) -> bool {
        self.settle(Err(fault))
    }

    /// Whether the promise has settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.inner.lock().settlement.is_some()
    }

    /// Register an observer for the settlement.
    ///
    /// Fires immediately (on the calling thread) if already settled.
    pub fn subscribe<F>(&self, observer: F)
    where
        F: FnOnce(&Result<T, TaskFault>) + Send + 'static,
    {
        let mut state = self.inner.lock();
        if let Some(settlement) = state.settlement.clone() {
            // Run outside the lock so the observer may touch this promise.
            drop(state);
            observer(settlement.as_ref());
            return;
        }
        state.observers.push(Box::new(observer));
    }

    /// Register separate resolve and reject callbacks.
    pub fn then<R, J>(&self, on_resolve: R, on_reject: J)
    where
        R: FnOnce(&T) + Send + 'static,
        J: FnOnce(&TaskFault) + Send + 'static,
    {
        self.subscribe(move |settlement| match settlement {
            Ok(value) => on_resolve(value),
            Err(fault) => on_reject(fault),
        });
    }

    fn settle(&self, settlement: Result<T, TaskFault>) -> bool {
        let settlement = Arc::new(settlement);
        let observers = {
            let mut state = self.inner.lock();
            if state.settlement.is_some() {
                return false;
            }
            state.settlement = Some(Arc::clone(&settlement));
            std::mem::take(&mut state.observers)
        };

        for observer in observers {
            observer(settlement.as_ref());
        }
        true
    }
}

impl<T: Clone> Promise<T> {
    /// Clone of the settlement, if settled.
    #[must_use]
    pub fn settlement(&self) -> Option<Result<T, TaskFault>> {
        self.inner.lock().settlement.as_deref().cloned()
    }
}
