//! Background decode scheduling
//!
//! Sources submit themselves to a [`DecodePool`] as [`DecodeUnit`]s. The pool
//! calls [`DecodeUnit::fetch`] on a worker thread; the unit decodes one pass
//! and returns. [`WorkerPool`] is the stock implementation.

pub mod config;
pub mod worker;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::trace;

pub use config::PoolConfig;
pub use worker::WorkerPool;

/// Scheduling priority of the worker running a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    #[default]
    Normal,
    /// Header decoding finished; pixel work yields to other sources
    Low,
}

/// Work item run by a decode pool
pub trait DecodeUnit: Send + Sync {
    /// Run one decode pass on the calling worker
    fn fetch(self: Arc<Self>, worker: &WorkerHandle);

    /// Name for logs
    fn name(&self) -> String;
}

/// Runs decode units on background workers
pub trait DecodePool: Send + Sync {
    /// Queue a unit; returns false if the pool refused it
    ///
    /// Scheduling a unit that is already queued succeeds without queueing
    /// it twice.
    fn schedule(&self, unit: Arc<dyn DecodeUnit>) -> bool;

    /// Remove a queued unit that has not started; returns true if removed
    fn deschedule(&self, unit: &Arc<dyn DecodeUnit>) -> bool;
}

/// Same unit (compares allocations, ignoring vtables)
pub(crate) fn same_unit(a: &Arc<dyn DecodeUnit>, b: &Arc<dyn DecodeUnit>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

type LowerHook = Box<dyn Fn() + Send + Sync>;

/// The worker executing a unit
///
/// Lets the unit lower the worker's priority once the cheap part of its
/// work (header parsing) is done.
pub struct WorkerHandle {
    id: usize,
    lowered: AtomicBool,
    on_lower: Option<LowerHook>,
}

impl WorkerHandle {
    /// Handle not attached to any pool (inline or test execution)
    pub fn detached(id: usize) -> Self {
        Self {
            id,
            lowered: AtomicBool::new(false),
            on_lower: None,
        }
    }

    pub(crate) fn with_hook(id: usize, on_lower: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            id,
            lowered: AtomicBool::new(false),
            on_lower: Some(Box::new(on_lower)),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn priority(&self) -> Priority {
        if self.lowered.load(Ordering::Acquire) {
            Priority::Low
        } else {
            Priority::Normal
        }
    }

    /// Drop to [`Priority::Low`]; later calls do nothing
    pub fn lower_priority(&self) {
        if self.lowered.swap(true, Ordering::AcqRel) {
            return;
        }
        trace!(worker = self.id, "Lowering worker priority");
        if let Some(hook) = &self.on_lower {
            hook();
        }
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("priority", &self.priority())
            .finish()
    }
}
