use serde::Deserialize;

/// Sizing of a [`WorkerPool`](crate::WorkerPool), read from the `pool`
/// table of the service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PoolSettings {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Tasks waiting for a worker beyond this bound block their submitter.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// How often a blocked submitter re-checks its context.
    #[serde(default = "default_admission_poll_ms")]
    pub admission_poll_ms: u64,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_admission_poll_ms() -> u64 {
    10
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            admission_poll_ms: default_admission_poll_ms(),
        }
    }
}

impl PoolSettings {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }
}
