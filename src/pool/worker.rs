//! Thread-backed decode pool
//!
//! Workers are spawned on demand up to `max_workers` and exit after sitting
//! idle for `idle_timeout`. A worker whose unit lowered its priority stops
//! counting against the limit, so a queued unit can get a fresh worker while
//! pixel decoding continues in the background.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, trace, warn};

use super::{same_unit, DecodePool, DecodeUnit, PoolConfig, Priority, WorkerHandle};
use crate::stats::PoolStats;

#[derive(Default)]
struct PoolState {
    queue: VecDeque<Arc<dyn DecodeUnit>>,
    /// Live worker threads
    workers: usize,
    /// Workers not running a unit (including ones just spawned)
    idle: usize,
    /// Workers running a unit at lowered priority
    low: usize,
    next_id: usize,
    shutdown: bool,
}

#[derive(Default)]
struct PoolCounters {
    scheduled: AtomicU64,
    completed: AtomicU64,
    rejected: AtomicU64,
    panicked: AtomicU64,
}

struct PoolShared {
    config: PoolConfig,
    state: Mutex<PoolState>,
    available: Condvar,
    counters: PoolCounters,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

/// Pool of decode worker threads
pub struct WorkerPool {
    shared: Arc<PoolShared>,
}

impl WorkerPool {
    /// Create a pool with default configuration
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    pub fn with_config(config: PoolConfig) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                config,
                state: Mutex::new(PoolState::default()),
                available: Condvar::new(),
                counters: PoolCounters::default(),
                handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Snapshot of pool counters
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        let counters = &self.shared.counters;
        PoolStats {
            workers: state.workers,
            idle_workers: state.idle,
            low_priority_workers: state.low,
            queued: state.queue.len(),
            scheduled: counters.scheduled.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            rejected: counters.rejected.load(Ordering::Relaxed),
            panicked: counters.panicked.load(Ordering::Relaxed),
        }
    }

    /// Stop all workers; queued units are dropped without running
    ///
    /// Units already running finish first. Safe to call from a worker.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            let dropped = std::mem::take(&mut state.queue);
            self.shared.available.notify_all();
            debug!(dropped = dropped.len(), "Decode pool shutting down");
            drop(state);
            // Units may own the last reference to a source; release them unlocked
            drop(dropped);
        }

        let current = thread::current().id();
        let handles = std::mem::take(&mut *self.shared.handles.lock());
        for handle in handles {
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl DecodePool for WorkerPool {
    fn schedule(&self, unit: Arc<dyn DecodeUnit>) -> bool {
        let shared = &self.shared;
        let mut state = shared.state.lock();

        if state.shutdown {
            warn!(unit = %unit.name(), "Decode pool is shut down, rejecting unit");
            shared.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if state.queue.iter().any(|queued| same_unit(queued, &unit)) {
            return true;
        }
        let capacity = shared.config.queue_capacity;
        if capacity > 0 && state.queue.len() >= capacity {
            warn!(unit = %unit.name(), capacity, "Decode queue full, rejecting unit");
            shared.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        trace!(unit = %unit.name(), queued = state.queue.len() + 1, "Unit scheduled");
        state.queue.push_back(unit);
        shared.counters.scheduled.fetch_add(1, Ordering::Relaxed);
        spawn_if_needed(shared, &mut state);
        shared.available.notify_one();
        true
    }

    fn deschedule(&self, unit: &Arc<dyn DecodeUnit>) -> bool {
        let removed = {
            let mut state = self.shared.state.lock();
            let index = state.queue.iter().position(|queued| same_unit(queued, unit));
            index.and_then(|index| state.queue.remove(index))
        };
        if removed.is_some() {
            trace!(unit = %unit.name(), "Unit descheduled");
        }
        removed.is_some()
    }
}

/// Start a worker if queued units outnumber idle workers and the limit allows
fn spawn_if_needed(shared: &Arc<PoolShared>, state: &mut PoolState) {
    let max = shared.config.max_workers;
    while state.queue.len() > state.idle && state.workers - state.low < max {
        let id = state.next_id;
        state.next_id += 1;

        let name = format!("{}-{}", shared.config.thread_name, id);
        let worker_shared = Arc::clone(shared);
        let spawned = thread::Builder::new()
            .name(name)
            .spawn(move || run_worker(worker_shared, id));

        match spawned {
            Ok(handle) => {
                state.workers += 1;
                state.idle += 1;
                let mut handles = shared.handles.lock();
                handles.retain(|h| !h.is_finished());
                handles.push(handle);
                debug!(worker = id, workers = state.workers, "Spawned decode worker");
            }
            Err(e) => {
                error!(error = %e, "Failed to spawn decode worker");
                break;
            }
        }
    }
}

fn run_worker(shared: Arc<PoolShared>, id: usize) {
    let mut state = shared.state.lock();

    loop {
        if state.shutdown {
            break;
        }

        if let Some(unit) = state.queue.pop_front() {
            state.idle -= 1;
            drop(state);

            let handle = lowering_handle(&shared, id);
            let name = unit.name();
            // `fetch` consumes the unit, so it is released before relocking
            let result = panic::catch_unwind(AssertUnwindSafe(|| unit.fetch(&handle)));

            match result {
                Ok(()) => {
                    shared.counters.completed.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    shared.counters.panicked.fetch_add(1, Ordering::Relaxed);
                    error!(worker = id, unit = %name, "Decode unit panicked");
                }
            }

            state = shared.state.lock();
            if handle.priority() == Priority::Low {
                state.low -= 1;
            }
            state.idle += 1;
            continue;
        }

        let timed_out = shared
            .available
            .wait_for(&mut state, shared.config.idle_timeout)
            .timed_out();
        if timed_out && state.queue.is_empty() && !state.shutdown {
            trace!(worker = id, "Idle decode worker exiting");
            break;
        }
    }

    state.idle -= 1;
    state.workers -= 1;
}

fn lowering_handle(shared: &Arc<PoolShared>, id: usize) -> WorkerHandle {
    let shared = Arc::clone(shared);
    WorkerHandle::with_hook(id, move || {
        let mut state = shared.state.lock();
        state.low += 1;
        if !state.shutdown {
            spawn_if_needed(&shared, &mut state);
        }
    })
}
