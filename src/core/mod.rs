//! Core engine: trampoline, tasks, promises, the worker pool, channels, and futures.

pub mod channel;
pub mod error;
pub mod future;
pub mod promise;
pub mod task;
pub mod trampoline;
pub mod worker_pool;

pub use channel::{Capacity, Channel, ChannelRegistry, Payload, Transport, WriterTransport};
pub use error::{AppResult, ChannelError, MultipleFailure, PoolError, TaskFault};
pub use future::{Future, FutureTask};
pub use promise::Promise;
pub use task::{
    AnyTask, CallableTask, CoroutineTask, DelayedTask, PromiseTask, RecurringTask, Schedulable,
    Scheduler, SomeTask, Task, TaskCore, TaskHandle, TaskState, ThrottledTask,
};
pub use trampoline::{Computation, Driven, Input, Step, Trampoline};
pub use worker_pool::{
    CallableUnit, Launchable, OutcomeReporter, Pool, PoolStats, UnitEvent, UnitId, UnitOutcome,
};
