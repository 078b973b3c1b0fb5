use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use frost_common::Error;
use tracing::error;

/// How a task left the worker that ran it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Panicked,
}

/// One unit of deferred pool work: an action plus the continuation invoked
/// when the action cannot complete.
///
/// Exactly one of the two runs: the action returns normally, or the error
/// continuation receives the rejection or panic that stopped it.
pub struct Task {
    action: Box<dyn FnOnce() + Send>,
    on_error: Box<dyn FnOnce(Error) + Send>,
}

impl Task {
    pub fn new(
        action: impl FnOnce() + Send + 'static,
        on_error: impl FnOnce(Error) + Send + 'static,
    ) -> Self {
        Self {
            action: Box::new(action),
            on_error: Box::new(on_error),
        }
    }

    /// Runs the action on the current thread. A panic never escapes: it is
    /// converted into [`Error::Panic`] for the error continuation.
    pub fn run(self) -> TaskOutcome {
        let Task { action, on_error } = self;
        match panic::catch_unwind(AssertUnwindSafe(action)) {
            Ok(()) => TaskOutcome::Completed,
            Err(payload) => {
                let err = Error::from_panic(payload);
                error!(%err, "task action panicked");
                fire_error(on_error, err);
                TaskOutcome::Panicked
            }
        }
    }

    /// Drops the action without running it and reports `err`.
    pub fn reject(self, err: Error) {
        fire_error(self.on_error, err);
    }
}

fn fire_error(on_error: Box<dyn FnOnce(Error) + Send>, err: Error) {
    if panic::catch_unwind(AssertUnwindSafe(move || on_error(err))).is_err() {
        error!("task error continuation panicked");
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}
