//! Asynchronous execution pipeline.
//!
//! Runs are queued on a [`WorkerPool`] and executed by [`TaskExecutor`];
//! the caller gets a [`JobHandle`] back immediately. A [`PeriodicRegistry`]
//! holds schedule entries which the beat loop submits when due, and
//! [`PoolLifecycle`] hooks run startup work once per pool start.

pub mod callbacks;
pub mod execute;
pub mod lifecycle;
pub mod queue;
pub mod schedule;

pub use callbacks::{ConnectivityCallback, ResultCallback};
pub use execute::{RunOutcome, TaskExecutor};
pub use lifecycle::{NoLifecycle, PoolLifecycle, StartupHooks};
pub use queue::{JobHandle, JobStatus, WorkerPool};
pub use schedule::{spawn_beat, PeriodicEntry, PeriodicRegistry, RUN_TASK_ENTRY};
