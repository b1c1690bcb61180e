//! Decode engines
//!
//! An engine turns one pass's byte stream into events. It never talks to
//! consumers directly: every event goes through the pass's [`Broadcaster`],
//! which enforces event ordering and latching.

pub mod broadcast;
pub mod error;
pub mod gif;
pub mod jpeg;
pub mod png;
pub mod raster;
pub mod signature;
pub mod xbm;

use crate::event::ImageEvent;
use crate::stream::ImageStream;

pub use broadcast::Broadcaster;
pub use error::DecodeError;
pub use signature::{EngineFactory, SignatureTable};

/// How an engine run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutcome {
    Completed,
    Failed(String),
    Aborted,
}

impl From<Result<(), DecodeError>> for EngineOutcome {
    fn from(result: Result<(), DecodeError>) -> Self {
        match result {
            Ok(()) => EngineOutcome::Completed,
            Err(DecodeError::Aborted) => EngineOutcome::Aborted,
            Err(e) => EngineOutcome::Failed(e.to_string()),
        }
    }
}

/// A format decoder driving one pass
pub trait DecodeEngine: Send {
    /// Format name for logs
    fn name(&self) -> &'static str;

    /// Decode `stream`, broadcasting through `out`
    ///
    /// Conforming engines announce dimensions and a color model before any
    /// pixels and finish with a final completion on success.
    fn run(&mut self, stream: &mut ImageStream, out: &mut Broadcaster<'_>) -> EngineOutcome;
}

/// Delivery target of a broadcaster
pub(crate) trait PassSink: Send + Sync {
    /// Deliver `event` to the pass's recipients; returns how many received it
    fn deliver(&self, pass: u64, event: &ImageEvent) -> usize;
}

/// Big-endian u16 at `at`
pub(crate) fn be_u16(data: &[u8], at: usize) -> Option<u16> {
    let bytes = data.get(at..at + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Big-endian u32 at `at`
pub(crate) fn be_u32(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
