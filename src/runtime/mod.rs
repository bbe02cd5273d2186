//! Scheduler implementations: a virtual-clock scheduler and a tokio-backed one.

pub mod manual_scheduler;
#[cfg(feature = "tokio-runtime")]
pub mod tokio_scheduler;

pub use manual_scheduler::ManualScheduler;
#[cfg(feature = "tokio-runtime")]
pub use tokio_scheduler::TokioScheduler;
