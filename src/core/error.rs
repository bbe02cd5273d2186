//! Error types for tasks, the worker pool, and channels.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::core::worker_pool::UnitId;

/// Application-facing result using anyhow for higher-level contexts.
///
/// User callables handed to tasks and pool units return this type.
pub type AppResult<T> = Result<T, anyhow::Error>;

/// Error carried by a task that reached the `Faulted` state.
#[derive(Debug, Clone, Error)]
pub enum TaskFault {
    /// Error raised inside a user callable or computation body.
    #[error("{0}")]
    Raised(Arc<anyhow::Error>),
    /// Aggregated failure of a join (`AnyTask`/`SomeTask`).
    #[error(transparent)]
    Multiple(#[from] MultipleFailure),
    /// A join child was cancelled and can no longer succeed.
    #[error("task cancelled")]
    Cancelled,
}

impl TaskFault {
    /// Wrap any error raised by user code.
    pub fn raised(err: impl Into<anyhow::Error>) -> Self {
        Self::Raised(Arc::new(err.into()))
    }

    /// Build a fault from a plain message.
    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self::Raised(Arc::new(anyhow::Error::msg(message)))
    }

    /// The aggregated failure, if this fault came from a join.
    #[must_use]
    pub const fn as_multiple(&self) -> Option<&MultipleFailure> {
        match self {
            Self::Multiple(multiple) => Some(multiple),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for TaskFault {
    fn from(err: anyhow::Error) -> Self {
        Self::Raised(Arc::new(err))
    }
}

/// Ordered per-child errors of a join that can no longer succeed.
#[derive(Debug, Clone, Error)]
#[error("{} tasks failed", .errors.len())]
pub struct MultipleFailure {
    errors: Vec<TaskFault>,
}

impl MultipleFailure {
    /// Create from errors already sorted in subtask index order.
    #[must_use]
    pub const fn new(errors: Vec<TaskFault>) -> Self {
        Self { errors }
    }

    /// Per-subtask errors in subtask index order.
    #[must_use]
    pub fn errors(&self) -> &[TaskFault] {
        &self.errors
    }

    /// Number of failed subtasks.
    #[must_use]
    pub fn count(&self) -> usize {
        self.errors.len()
    }
}

/// Errors produced by the worker pool and futures.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The unit cannot be added (already running, or already tracked).
    #[error("invalid unit: {0}")]
    InvalidUnit(String),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// No unit with this id or position is known to the pool.
    #[error("{0} not found")]
    UnitNotFound(UnitId),
    /// The unit raised or returned an error.
    #[error("{id} failed: {fault}")]
    UnitFailed {
        /// Unit identifier.
        id: UnitId,
        /// Error raised by the unit.
        fault: TaskFault,
    },
    /// The unit exceeded its timeout.
    #[error("{0} timed out")]
    UnitTimedOut(UnitId),
    /// The unit was terminated by a signal.
    #[error("{id} terminated by signal {signal}")]
    UnitSignaled {
        /// Unit identifier.
        id: UnitId,
        /// Signal number.
        signal: i32,
    },
    /// The unit was removed or the pool was closed before it finished.
    #[error("{0} was dropped before completing")]
    UnitDropped(UnitId),
    /// The unit's result could not be decoded into the requested type.
    #[error("failed to decode unit result: {0}")]
    Decode(#[from] serde_json::Error),
    /// The supervisor thread for a unit could not be spawned.
    #[error("failed to spawn unit: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Errors produced by channels and the channel registry.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// A channel with this name is already registered.
    #[error("channel `{0}` already exists")]
    AlreadyExists(String),
    /// No channel with this name is registered.
    #[error("channel `{0}` does not exist")]
    NotFound(String),
    /// The channel is closed.
    #[error("channel is closed")]
    Closed,
    /// The payload cannot be sent over a channel.
    #[error("illegal value: {0}")]
    IllegalValue(String),
    /// Capacity is neither the infinite sentinel nor non-negative.
    #[error("invalid channel capacity {0}")]
    InvalidCapacity(i64),
    /// The attached transport failed to accept the payload.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

impl ChannelError {
    /// Whether this is an existence error (duplicate or missing name).
    #[must_use]
    pub const fn is_existence(&self) -> bool {
        matches!(self, Self::AlreadyExists(_) | Self::NotFound(_))
    }
}
