//! Concurrent crate
//!
//! The worker-concurrency substrate of the query core: [`Task`]s are
//! submitted to a [`Pool`] under an [`ExecContext`](frost_common::ExecContext)
//! and run asynchronously on a bounded set of workers.

pub mod pool;
pub mod settings;
pub mod task;

pub use pool::{InlinePool, Pool, PoolStats, WorkerPool};
pub use settings::PoolSettings;
pub use task::{Task, TaskOutcome};
