//! Image sources
//!
//! An [`ImageSource`] owns one resource's byte stream and its consumers. It
//! queues itself on a decode pool when a consumer asks for data, runs one
//! pass per fetch and reschedules when consumers arrived too late for the
//! pass in flight.

pub mod config;
pub mod image_source;
pub(crate) mod state;

use std::fmt;

pub use config::SourceConfig;
pub use image_source::{ImageSource, SourceBuilder};

/// Name of the resource a source decodes (URL, path or cache key)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey(String);

impl SourceKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for SourceKey {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Lifecycle phase of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePhase {
    /// Nothing queued or decoding
    Idle,
    /// Waiting on the decode pool
    Queued,
    /// At least one pass is still delivering
    Decoding,
}

impl fmt::Display for SourcePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourcePhase::Idle => "idle",
            SourcePhase::Queued => "queued",
            SourcePhase::Decoding => "decoding",
        };
        f.write_str(name)
    }
}
