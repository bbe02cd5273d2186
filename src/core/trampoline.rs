//! Explicit-stack driver for nested suspendable computations.
//!
//! A [`Computation`] advances one step at a time. Each step either descends
//! into a nested computation, finishes with an optional value, or yields a
//! `(key, value)` pair to whoever drives it. The [`Trampoline`] flattens any
//! amount of nesting into one linear sequence of outward yields while keeping
//! suspended parents on a heap-allocated stack instead of the call stack.
//!
//! ```rust,ignore
//! use prometheus_task_engine::core::trampoline::{from_fn, Input, Step, Trampoline};
//!
//! let mut tramp = Trampoline::new(outer_computation);
//! let answer = tramp.run(|key, value| Ok(Some(value)))?;
//! ```

use std::fmt;

/// Boxed computation as stored on the trampoline stack.
pub type BoxedComputation<K, V, E> = Box<dyn Computation<K, V, E> + Send>;

/// Value handed to a computation when it is advanced.
#[derive(Debug)]
pub enum Input<V, E> {
    /// Resume normally; `None` on the first step or when a child ran out.
    Next(Option<V>),
    /// Resume by injecting an error at the suspension point.
    Throw(E),
}

/// Result of advancing a computation by one step.
pub enum Step<K, V, E> {
    /// Descend into a nested computation; its final value is resumed into the
    /// current one.
    Descend(BoxedComputation<K, V, E>),
    /// The computation finished. `Some` carries a terminal value for the
    /// parent, `None` means it simply ran out.
    Done(Option<V>),
    /// Suspend and hand a plain `(key, value)` pair to the driver. The value is
    /// passed through opaque, never inspected for further nesting.
    Yield(K, V),
}

impl<K: fmt::Debug, V: fmt::Debug, E> fmt::Debug for Step<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Descend(_) => f.write_str("Descend(..)"),
            Self::Done(value) => f.debug_tuple("Done").field(value).finish(),
            Self::Yield(key, value) => f.debug_tuple("Yield").field(key).field(value).finish(),
        }
    }
}

/// A lazily-advanced computation that can suspend and be resumed.
///
/// Returning `Err` means the computation did not handle an error, either one
/// it raised itself or one injected through [`Input::Throw`].
pub trait Computation<K, V, E> {
    /// Advance to the next step.
    ///
    /// # Errors
    ///
    /// Returns the error the computation does not handle.
    fn resume(&mut self, input: Input<V, E>) -> Result<Step<K, V, E>, E>;
}

/// Computation built from a step closure. See [`from_fn`].
pub struct FnComputation<F> {
    step: F,
}

/// Build a computation from a closure called once per step.
pub const fn from_fn<K, V, E, F>(step: F) -> FnComputation<F>
where
    F: FnMut(Input<V, E>) -> Result<Step<K, V, E>, E>,
{
    FnComputation { step }
}

impl<K, V, E, F> Computation<K, V, E> for FnComputation<F>
where
    F: FnMut(Input<V, E>) -> Result<Step<K, V, E>, E>,
{
    fn resume(&mut self, input: Input<V, E>) -> Result<Step<K, V, E>, E> {
        (self.step)(input)
    }
}

impl<K, V, E, C> Computation<K, V, E> for Box<C>
where
    C: Computation<K, V, E> + ?Sized,
{
    fn resume(&mut self, input: Input<V, E>) -> Result<Step<K, V, E>, E> {
        (**self).resume(input)
    }
}

/// What the trampoline hands back to its own driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Driven<K, V> {
    /// A plain value yielded by some frame; resume with an answer or an error.
    Yielded(K, V),
    /// The top-level computation finished.
    Complete(Option<V>),
}

/// Drives one top-level computation and all computations nested inside it.
pub struct Trampoline<K, V, E> {
    current: Option<BoxedComputation<K, V, E>>,
    stack: Vec<BoxedComputation<K, V, E>>,
}

impl<K, V, E> Trampoline<K, V, E> {
    /// Wrap a top-level computation.
    pub fn new(root: impl Computation<K, V, E> + Send + 'static) -> Self {
        Self::from_boxed(Box::new(root))
    }

    /// Wrap an already boxed top-level computation.
    #[must_use]
    pub fn from_boxed(root: BoxedComputation<K, V, E>) -> Self {
        Self {
            current: Some(root),
            stack: Vec::new(),
        }
    }

    /// Number of suspended parent frames.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Whether the whole drive has finished, successfully or not.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.current.is_none()
    }

    /// Start the drive; equivalent to `resume(Input::Next(None))`.
    ///
    /// # Errors
    ///
    /// Returns an error no frame handled.
    pub fn start(&mut self) -> Result<Driven<K, V>, E> {
        self.resume(Input::Next(None))
    }

    /// Forward the driver's answer into the current frame and run until the
    /// next outward yield or the end of the drive.
    ///
    /// Resuming a finished trampoline reports `Complete(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error that escaped the top-level computation. The trampoline
    /// is finished afterwards.
    pub fn resume(&mut self, input: Input<V, E>) -> Result<Driven<K, V>, E> {
        let mut input = input;
        loop {
            let Some(current) = self.current.as_mut() else {
                return Ok(Driven::Complete(None));
            };

            let step = match current.resume(input) {
                Ok(step) => step,
                Err(err) => {
                    // Unhandled here; the parent gets it on the next iteration.
                    match self.stack.pop() {
                        Some(parent) => {
                            self.current = Some(parent);
                            input = Input::Throw(err);
                            continue;
                        }
                        None => {
                            self.current = None;
                            return Err(err);
                        }
                    }
                }
            };

            match step {
                Step::Descend(inner) => {
                    if let Some(parent) = self.current.replace(inner) {
                        self.stack.push(parent);
                    }
                    input = Input::Next(None);
                }
                Step::Done(value) => match self.stack.pop() {
                    Some(parent) => {
                        self.current = Some(parent);
                        input = Input::Next(value);
                    }
                    None => {
                        self.current = None;
                        return Ok(Driven::Complete(value));
                    }
                },
                Step::Yield(key, value) => return Ok(Driven::Yielded(key, value)),
            }
        }
    }

    /// Drive to completion, answering every outward yield with `responder`.
    ///
    /// An `Err` from the responder is injected into the yielding frame.
    ///
    /// # Errors
    ///
    /// Returns an error that escaped the top-level computation.
    pub fn run<F>(&mut self, mut responder: F) -> Result<Option<V>, E>
    where
        F: FnMut(K, V) -> Result<Option<V>, E>,
    {
        let mut driven = self.start()?;
        loop {
            match driven {
                Driven::Complete(value) => return Ok(value),
                Driven::Yielded(key, value) => {
                    let input = match responder(key, value) {
                        Ok(answer) => Input::Next(answer),
                        Err(err) => Input::Throw(err),
                    };
                    driven = self.resume(input)?;
                }
            }
        }
    }
}

impl<K, V, E> Computation<K, V, E> for Trampoline<K, V, E> {
    fn resume(&mut self, input: Input<V, E>) -> Result<Step<K, V, E>, E> {
        match Self::resume(self, input)? {
            Driven::Yielded(key, value) => Ok(Step::Yield(key, value)),
            Driven::Complete(value) => Ok(Step::Done(value)),
        }
    }
}

impl<K, V, E> fmt::Debug for Trampoline<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trampoline")
            .field("depth", &self.stack.len())
            .field("finished", &self.current.is_none())
            .finish()
    }
}
