//! Pixel-delivery events
//!
//! Everything a consumer learns about an image arrives as an [`ImageEvent`].
//! Within one pass the order is fixed: header events (dimensions, properties,
//! color model, hints), then pixel blocks, then a terminal completion.

pub mod pixel;

use std::fmt;

pub use pixel::{ColorModel, Hints, Palette, PixelBlock, Properties, Rect};

/// Why a pass failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No engine matched the leading bytes
    Sniff,
    /// The stream could not be opened or read
    Stream,
    /// The engine rejected the stream mid-decode
    Parse,
    /// The decode pool refused the source
    PoolRejected,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Sniff => "sniff",
            FailureKind::Stream => "stream",
            FailureKind::Parse => "parse",
            FailureKind::PoolRejected => "pool",
        };
        f.write_str(name)
    }
}

/// Error payload of a failed completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeFailure {
    pub kind: FailureKind,
    pub reason: String,
    /// Caching recipients should drop (or reload) the resource
    pub discard: bool,
}

impl DecodeFailure {
    pub fn new(kind: FailureKind, reason: impl Into<String>, discard: bool) -> Self {
        Self {
            kind,
            reason: reason.into(),
            discard,
        }
    }
}

impl fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure: {}", self.kind, self.reason)
    }
}

/// Status carried by a completion event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionStatus {
    /// One frame of a multi-frame image is complete
    FrameDone,
    /// The whole image is complete
    ImageDone,
    /// Decoding failed
    Error(DecodeFailure),
}

impl CompletionStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, CompletionStatus::Error(_))
    }
}

/// A single pixel-delivery event
#[derive(Debug, Clone)]
pub enum ImageEvent {
    Dimensions { width: u32, height: u32 },
    Properties(Properties),
    ColorModel(ColorModel),
    Hints(Hints),
    Pixels(PixelBlock),
    Complete {
        status: CompletionStatus,
        is_final: bool,
    },
}

impl ImageEvent {
    /// Create a completion event
    pub fn complete(status: CompletionStatus, is_final: bool) -> Self {
        ImageEvent::Complete { status, is_final }
    }

    /// Create a final error completion
    pub fn failure(failure: DecodeFailure) -> Self {
        ImageEvent::Complete {
            status: CompletionStatus::Error(failure),
            is_final: true,
        }
    }

    /// Header events precede every pixel block of a pass
    pub fn is_header(&self) -> bool {
        matches!(
            self,
            ImageEvent::Dimensions { .. }
                | ImageEvent::Properties(_)
                | ImageEvent::ColorModel(_)
                | ImageEvent::Hints(_)
        )
    }

    /// A final completion ends the pass for its recipient
    pub fn is_terminal(&self) -> bool {
        matches!(self, ImageEvent::Complete { is_final: true, .. })
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ImageEvent::Dimensions { .. } => "dimensions",
            ImageEvent::Properties(_) => "properties",
            ImageEvent::ColorModel(_) => "color_model",
            ImageEvent::Hints(_) => "hints",
            ImageEvent::Pixels(_) => "pixels",
            ImageEvent::Complete { .. } => "complete",
        }
    }
}
