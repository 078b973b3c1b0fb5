//! Notify-on-completion events exchanged with storage collaborators.
//!
//! A collaborator accepts an event carrying a [`Callback`] and invokes it
//! exactly once, later, with the outcome. `Callback::fire` consumes the
//! callback so it cannot be fired twice.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, error, warn};

use crate::error::{Error, Result};

/// Single-fire completion continuation.
pub struct Callback(Box<dyn FnOnce(Result<()>) + Send>);

impl Callback {
    pub fn new(f: impl FnOnce(Result<()>) + Send + 'static) -> Self {
        Callback(Box::new(f))
    }

    pub fn fire(self, result: Result<()>) {
        (self.0)(result)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback").finish_non_exhaustive()
    }
}

/// Asks the storage engine to flush its in-memory index.
#[derive(Debug)]
pub struct FlushEvent {
    pub callback: Callback,
}

impl FlushEvent {
    pub fn new(f: impl FnOnce(Result<()>) + Send + 'static) -> Self {
        Self {
            callback: Callback::new(f),
        }
    }
}

/// Storage side of a flush.
pub trait Flusher: Send + Sync {
    /// Freezes the mutable state that the following `flush` persists.
    fn prepare_flush(&self) {}

    fn flush(&self) -> Result<()>;
}

/// Runs flushes on a dedicated thread, one event at a time, and reports
/// each outcome through the event's callback.
pub struct FlushNotifier {
    name: String,
    tx: Mutex<Option<UnboundedSender<FlushEvent>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl FlushNotifier {
    pub fn start(name: impl Into<String>, flusher: Arc<dyn Flusher>) -> Result<Self> {
        let name = name.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<FlushEvent>();
        let thread_name = format!("{name}-flush");
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                while let Some(event) = rx.blocking_recv() {
                    let result = panic::catch_unwind(AssertUnwindSafe(|| {
                        flusher.prepare_flush();
                        flusher.flush()
                    }))
                    .unwrap_or_else(|payload| Err(Error::from_panic(payload)));

                    match &result {
                        Ok(()) => debug!(notifier = %thread_name, "flush completed"),
                        Err(err) => warn!(notifier = %thread_name, %err, "flush failed"),
                    }

                    let callback = event.callback;
                    if panic::catch_unwind(AssertUnwindSafe(|| callback.fire(result))).is_err() {
                        error!(notifier = %thread_name, "flush callback panicked");
                    }
                }
            })
            .map_err(|e| Error::Internal(format!("failed to spawn flush thread: {e}")))?;

        Ok(Self {
            name,
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queues a flush. After `close` the callback fires immediately with
    /// a rejection.
    pub fn notify(&self, event: FlushEvent) {
        let rejected = match self.tx.lock().as_ref() {
            Some(tx) => match tx.send(event) {
                Ok(()) => return,
                Err(mpsc::error::SendError(event)) => event,
            },
            None => event,
        };
        rejected
            .callback
            .fire(Err(Error::Rejected(format!("flush notifier {} closed", self.name))));
    }

    /// Stops accepting events, drains the queued ones and joins the thread.
    pub fn close(&self) {
        drop(self.tx.lock().take());
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                error!(notifier = %self.name, "flush thread terminated abnormally");
            }
        }
    }
}

impl Drop for FlushNotifier {
    fn drop(&mut self) {
        self.close();
    }
}
