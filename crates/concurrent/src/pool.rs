use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use frost_common::{Error, ExecContext, Result};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::settings::PoolSettings;
use crate::task::{Task, TaskOutcome};

/// Worker-concurrency substrate shared by every stage that references it.
pub trait Pool: Send + Sync {
    fn name(&self) -> &str;

    /// Hands `task` to the pool. Either the task's action eventually runs on
    /// a worker, or its error continuation fires with the reason it did not
    /// (cancelled context, stopped pool).
    fn submit(&self, ctx: &ExecContext, task: Task);
}

/// Snapshot of a [`WorkerPool`]'s counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub workers: usize,
    pub queued: usize,
    pub submitted: u64,
    pub completed: u64,
    pub rejected: u64,
    pub panicked: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    rejected: AtomicU64,
    panicked: AtomicU64,
}

struct Queued {
    ctx: ExecContext,
    task: Task,
}

struct QueueState {
    queue: VecDeque<Queued>,
    stopped: bool,
}

struct Shared {
    name: String,
    capacity: usize,
    admission_poll: Duration,
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
    counters: Counters,
}

impl Shared {
    fn reject(&self, task: Task, err: Error) {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        debug!(pool = %self.name, %err, "task rejected");
        task.reject(err);
    }
}

/// A fixed set of worker threads fed by a bounded FIFO queue.
///
/// Admission is bounded-blocking: while the queue is full, `submit` waits
/// for room, re-checking the submitter's context every
/// `admission_poll_ms` so a cancelled submitter is released with
/// [`Error::Cancelled`].
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: usize,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, settings: &PoolSettings) -> Result<Self> {
        if settings.workers == 0 {
            return Err(Error::Config("pool needs at least one worker".to_string()));
        }
        if settings.queue_capacity == 0 {
            return Err(Error::Config("pool queue capacity must be positive".to_string()));
        }

        let name = name.into();
        let shared = Arc::new(Shared {
            name: name.clone(),
            capacity: settings.queue_capacity,
            admission_poll: Duration::from_millis(settings.admission_poll_ms.max(1)),
            state: Mutex::new(QueueState {
                queue: VecDeque::with_capacity(settings.queue_capacity),
                stopped: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            counters: Counters::default(),
        });

        let pool = WorkerPool {
            shared: shared.clone(),
            workers: settings.workers,
            handles: Mutex::new(Vec::with_capacity(settings.workers)),
        };
        for idx in 0..settings.workers {
            let shared = shared.clone();
            let handle = thread::Builder::new()
                .name(format!("{name}-worker-{idx}"))
                .spawn(move || worker_loop(shared, idx))
                .map_err(|e| Error::Internal(format!("failed to spawn pool worker: {e}")))?;
            pool.handles.lock().push(handle);
        }

        info!(
            pool = %name,
            workers = settings.workers,
            queue_capacity = settings.queue_capacity,
            "worker pool started"
        );
        Ok(pool)
    }

    pub fn stats(&self) -> PoolStats {
        let c = &self.shared.counters;
        PoolStats {
            workers: self.workers,
            queued: self.shared.state.lock().queue.len(),
            submitted: c.submitted.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            panicked: c.panicked.load(Ordering::Relaxed),
        }
    }

    /// Refuses further submissions, lets the workers drain what is already
    /// queued and joins them. Calling it again is a no-op.
    pub fn stop(&self) {
        if !self.shutdown() {
            return;
        }

        let current = thread::current().id();
        for handle in self.handles.lock().drain(..) {
            // A worker dropping the last pool reference cannot join itself.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!(pool = %self.shared.name, "pool worker terminated abnormally");
            }
        }
        info!(pool = %self.shared.name, "worker pool stopped");
    }

    /// Marks the pool stopped and wakes every waiter. Returns false if it
    /// was already stopped.
    fn shutdown(&self) -> bool {
        {
            let mut state = self.shared.state.lock();
            if state.stopped {
                return false;
            }
            state.stopped = true;
        }
        self.shared.not_empty.notify_all();
        self.shared.not_full.notify_all();
        true
    }
}

impl Pool for WorkerPool {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn submit(&self, ctx: &ExecContext, task: Task) {
        let shared = &self.shared;
        shared.counters.submitted.fetch_add(1, Ordering::Relaxed);

        if let Err(err) = ctx.check() {
            shared.reject(task, err);
            return;
        }

        let mut state = shared.state.lock();
        loop {
            if state.stopped {
                drop(state);
                shared.reject(task, Error::Rejected(format!("pool {} stopped", shared.name)));
                return;
            }
            if state.queue.len() < shared.capacity {
                state.queue.push_back(Queued {
                    ctx: ctx.clone(),
                    task,
                });
                drop(state);
                shared.not_empty.notify_one();
                return;
            }

            shared.not_full.wait_for(&mut state, shared.admission_poll);
            if let Err(err) = ctx.check() {
                drop(state);
                shared.reject(task, err);
                return;
            }
        }
    }
}

/// Dropping the pool stops it without joining: workers drain the queue and
/// exit on their own, so the dropping thread never waits on running tasks.
/// Call [`WorkerPool::stop`] first to wait for them.
impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.shutdown() {
            debug!(
                pool = %self.shared.name,
                workers = self.handles.lock().len(),
                "worker pool dropped, detaching workers"
            );
        }
    }
}

fn worker_loop(shared: Arc<Shared>, idx: usize) {
    debug!(pool = %shared.name, worker = idx, "pool worker started");
    loop {
        let queued = {
            let mut state = shared.state.lock();
            loop {
                if let Some(queued) = state.queue.pop_front() {
                    break queued;
                }
                if state.stopped {
                    debug!(pool = %shared.name, worker = idx, "pool worker exiting");
                    return;
                }
                shared.not_empty.wait(&mut state);
            }
        };
        shared.not_full.notify_one();

        // The context may have been cancelled while the task sat in the queue.
        if let Err(err) = queued.ctx.check() {
            shared.reject(queued.task, err);
            continue;
        }

        match queued.task.run() {
            TaskOutcome::Completed => shared.counters.completed.fetch_add(1, Ordering::Relaxed),
            TaskOutcome::Panicked => shared.counters.panicked.fetch_add(1, Ordering::Relaxed),
        };
    }
}

/// Runs every task on the submitting thread. Keeps the pool contract
/// (context check, panic capture) without any concurrency, for
/// deterministic callers and tests.
#[derive(Debug, Clone, Default)]
pub struct InlinePool;

impl Pool for InlinePool {
    fn name(&self) -> &str {
        "inline"
    }

    fn submit(&self, ctx: &ExecContext, task: Task) {
        match ctx.check() {
            Ok(()) => {
                task.run();
            }
            Err(err) => task.reject(err),
        }
    }
}
