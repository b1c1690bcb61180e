//! Worker pool configuration

use std::time::Duration;

/// Default number of concurrently running normal-priority workers
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Worker pool options
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Workers that may run at normal priority at once
    pub max_workers: usize,

    /// Units that may wait for a worker (0 = unbounded)
    pub queue_capacity: usize,

    /// Idle workers exit after this long without work
    pub idle_timeout: Duration,

    /// Prefix for worker thread names
    pub thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            queue_capacity: 0,
            idle_timeout: Duration::from_secs(5),
            thread_name: "image-decode".to_string(),
        }
    }
}

impl PoolConfig {
    /// Set maximum normal-priority workers (at least one)
    pub fn max_workers(mut self, max: usize) -> Self {
        self.max_workers = max.max(1);
        self
    }

    /// Bound the run queue; scheduling fails once it is full
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the worker thread name prefix
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}
