//! Statistics and metrics for image sources

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::source::SourcePhase;

/// Live counters owned by a source
#[derive(Debug)]
pub struct SourceMetrics {
    created_at: Instant,
    passes_started: AtomicU64,
    passes_completed: AtomicU64,
    passes_failed: AtomicU64,
    passes_aborted: AtomicU64,
    sniff_failures: AtomicU64,
    events_delivered: AtomicU64,
    bytes_read: AtomicU64,
}

impl SourceMetrics {
    pub fn new() -> Self {
        Self {
            created_at: Instant::now(),
            passes_started: AtomicU64::new(0),
            passes_completed: AtomicU64::new(0),
            passes_failed: AtomicU64::new(0),
            passes_aborted: AtomicU64::new(0),
            sniff_failures: AtomicU64::new(0),
            events_delivered: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
        }
    }

    pub fn pass_started(&self) {
        self.passes_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pass_completed(&self) {
        self.passes_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pass_failed(&self) {
        self.passes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pass_aborted(&self) {
        self.passes_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sniff_failed(&self) {
        self.sniff_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivered(&self, events: usize) {
        self.events_delivered.fetch_add(events as u64, Ordering::Relaxed);
    }

    pub fn read(&self, bytes: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Time since the source was created
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Snapshot the counters together with the source's current shape
    pub fn snapshot(&self, phase: SourcePhase, live_consumers: usize, passes_in_flight: usize) -> SourceStats {
        SourceStats {
            phase,
            live_consumers,
            passes_in_flight,
            passes_started: self.passes_started.load(Ordering::Relaxed),
            passes_completed: self.passes_completed.load(Ordering::Relaxed),
            passes_failed: self.passes_failed.load(Ordering::Relaxed),
            passes_aborted: self.passes_aborted.load(Ordering::Relaxed),
            sniff_failures: self.sniff_failures.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            age: self.age(),
        }
    }
}

impl Default for SourceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Source-level statistics
#[derive(Debug, Clone)]
pub struct SourceStats {
    /// Current phase
    pub phase: SourcePhase,
    /// Interested consumers waiting for the next pass
    pub live_consumers: usize,
    /// Passes still delivering
    pub passes_in_flight: usize,
    /// Passes started by a worker
    pub passes_started: u64,
    /// Passes that ended with a final completion
    pub passes_completed: u64,
    /// Passes that ended with an error completion
    pub passes_failed: u64,
    /// Passes abandoned because every consumer left
    pub passes_aborted: u64,
    /// Streams no engine recognized
    pub sniff_failures: u64,
    /// Events handed to consumers (catch-up included)
    pub events_delivered: u64,
    /// Stream bytes consumed across all passes
    pub bytes_read: u64,
    /// Time since the source was created
    pub age: Duration,
}

impl SourceStats {
    /// Passes that have finished one way or another
    pub fn passes_finished(&self) -> u64 {
        self.passes_completed + self.passes_failed + self.passes_aborted
    }

    /// Average stream throughput in bytes per second
    pub fn read_rate(&self) -> u64 {
        let secs = self.age.as_secs();
        if secs > 0 {
            self.bytes_read / secs
        } else {
            0
        }
    }
}

/// Decode pool statistics
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Live worker threads
    pub workers: usize,
    /// Workers waiting for a unit
    pub idle_workers: usize,
    /// Workers running a unit at lowered priority
    pub low_priority_workers: usize,
    /// Units waiting for a worker
    pub queued: usize,
    /// Units accepted
    pub scheduled: u64,
    /// Units that returned normally
    pub completed: u64,
    /// Units refused (queue full or pool shut down)
    pub rejected: u64,
    /// Units that panicked
    pub panicked: u64,
}

impl PoolStats {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_metrics_new() {
        let metrics = SourceMetrics::new();
        let stats = metrics.snapshot(SourcePhase::Idle, 0, 0);

        assert_eq!(stats.phase, SourcePhase::Idle);
        assert_eq!(stats.passes_started, 0);
        assert_eq!(stats.passes_completed, 0);
        assert_eq!(stats.passes_failed, 0);
        assert_eq!(stats.passes_aborted, 0);
        assert_eq!(stats.events_delivered, 0);
        assert_eq!(stats.passes_finished(), 0);
    }

    #[test]
    fn test_source_metrics_counts() {
        let metrics = SourceMetrics::new();
        metrics.pass_started();
        metrics.pass_started();
        metrics.pass_completed();
        metrics.pass_aborted();
        metrics.sniff_failed();
        metrics.delivered(7);
        metrics.read(1024);

        let stats = metrics.snapshot(SourcePhase::Decoding, 2, 1);

        assert_eq!(stats.live_consumers, 2);
        assert_eq!(stats.passes_in_flight, 1);
        assert_eq!(stats.passes_started, 2);
        assert_eq!(stats.passes_finished(), 2);
        assert_eq!(stats.sniff_failures, 1);
        assert_eq!(stats.events_delivered, 7);
        assert_eq!(stats.bytes_read, 1024);
    }

    #[test]
    fn test_read_rate_zero_age() {
        let stats = SourceMetrics::new().snapshot(SourcePhase::Idle, 0, 0);
        assert_eq!(stats.read_rate(), 0);
    }

    #[test]
    fn test_read_rate() {
        let mut stats = SourceMetrics::new().snapshot(SourcePhase::Idle, 0, 0);
        stats.bytes_read = 1_000_000;
        stats.age = Duration::from_secs(10);

        assert_eq!(stats.read_rate(), 100_000);
    }

    #[test]
    fn test_pool_stats_new() {
        let stats = PoolStats::new();
        assert_eq!(stats.workers, 0);
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.rejected, 0);
    }
}
