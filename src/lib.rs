//! # Prometheus Task Engine
//!
//! A cooperative task engine: nested suspendable computations driven by a
//! trampoline, a task algebra with combinators, a bounded worker pool for
//! independently runnable units, and channels/futures layered on top of it.
//!
//! ## Core Pieces
//!
//! - **Trampoline**: drives arbitrarily nested computations with an explicit
//!   heap stack, so only plain `(key, value)` yields ever reach the driver
//! - **Tasks**: `Pending` to exactly one of `Successful`, `Faulted`, or
//!   `Cancelled`, advanced by `tick` and composed with delay, throttle,
//!   repetition, promise bridging, and "any-of"/"some-of" joins
//! - **Scheduler**: the contract decorators use to request re-ticks, with a
//!   virtual-clock implementation and a tokio-backed one
//! - **Worker pool**: FIFO dispatch under a concurrency ceiling, outcomes
//!   sorted into finished, failed, timed-out, and signaled buckets
//! - **Channels and futures**: FIFO payload exchange between units, and
//!   decoded access to a unit's result
//!
//! ## Tasks
//!
//! ```rust,ignore
//! use prometheus_task_engine::core::{AnyTask, CallableTask, Task, TaskHandle};
//! use prometheus_task_engine::runtime::ManualScheduler;
//!
//! let scheduler = ManualScheduler::new();
//! let mut any = AnyTask::new(vec![
//!     TaskHandle::new(CallableTask::new(|| anyhow::bail!("mirror down"))),
//!     TaskHandle::new(CallableTask::new(|| Ok("primary"))),
//! ]);
//! any.tick(&scheduler);
//! assert_eq!(any.result(), Some("primary"));
//! ```
//!
//! ## Worker Pool
//!
//! ```rust,ignore
//! use prometheus_task_engine::config::PoolConfig;
//! use prometheus_task_engine::core::Pool;
//!
//! let pool = Pool::new(PoolConfig::from_env()?)?;
//! let squared = pool.spawn(|| Ok(12 * 12))?;
//! pool.add(|| Ok("side job"))?;
//! assert_eq!(squared.value()?, 144);
//! let results = pool.wait();
//! ```
//!
//! For complete scenarios, see the integration tests under `tests/`.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core engine: trampoline, tasks, worker pool, channels, futures.
pub mod core;
/// Configuration models for the worker pool.
pub mod config;
/// Scheduler implementations.
pub mod runtime;
/// Shared utilities.
pub mod util;
