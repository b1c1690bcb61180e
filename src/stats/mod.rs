//! Statistics for sources and decode pools

pub mod metrics;

pub use metrics::{PoolStats, SourceMetrics, SourceStats};
