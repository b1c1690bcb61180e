//! Shared broadcast helper handed to every engine
//!
//! The broadcaster tracks where the pass is in its event sequence and
//! refuses pixel blocks that would reach consumers before the header
//! events describing them.

use tracing::{debug, trace, warn};

use super::{DecodeError, PassSink};
use crate::event::{ColorModel, CompletionStatus, DecodeFailure, Hints, ImageEvent, PixelBlock, Properties};
use crate::pool::WorkerHandle;
use crate::source::SourceConfig;
use crate::stream::AbortSignal;

/// Broadcast primitives for one pass
///
/// Every primitive returns the number of consumers that received the event.
pub struct Broadcaster<'a> {
    sink: &'a dyn PassSink,
    pass: u64,
    worker: &'a WorkerHandle,
    abort: AbortSignal,
    band_rows: u32,
    max_header_probe: usize,
    max_pixels: u64,
    dimensions: Option<(u32, u32)>,
    color_model: Option<ColorModel>,
    header_done: bool,
    pixels_sent: bool,
    finished: bool,
}

impl<'a> Broadcaster<'a> {
    pub(crate) fn new(
        sink: &'a dyn PassSink,
        pass: u64,
        worker: &'a WorkerHandle,
        abort: AbortSignal,
        config: &SourceConfig,
    ) -> Self {
        Self {
            sink,
            pass,
            worker,
            abort,
            band_rows: config.band_rows,
            max_header_probe: config.max_header_probe,
            max_pixels: config.max_pixels,
            dimensions: None,
            color_model: None,
            header_done: false,
            pixels_sent: false,
            finished: false,
        }
    }

    pub fn pass_id(&self) -> u64 {
        self.pass
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    /// A final completion has been broadcast
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Rows per pixel block engines should aim for
    pub fn band_rows(&self) -> u32 {
        self.band_rows
    }

    /// Bytes an engine may buffer while looking for its header
    pub fn max_header_probe(&self) -> usize {
        self.max_header_probe
    }

    /// Largest image area engines may decode
    pub fn max_pixels(&self) -> u64 {
        self.max_pixels
    }

    /// Reject an image area above the source's pixel limit
    pub fn check_area(&self, width: u32, height: u32) -> Result<(), DecodeError> {
        check_area(width, height, self.max_pixels)
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    pub fn color_model(&self) -> Option<&ColorModel> {
        self.color_model.as_ref()
    }

    /// Fail with [`DecodeError::Aborted`] if the pass was aborted
    pub fn check_abort(&self) -> Result<(), DecodeError> {
        if self.is_aborted() {
            Err(DecodeError::Aborted)
        } else {
            Ok(())
        }
    }

    pub fn announce_dimensions(&mut self, width: u32, height: u32) -> usize {
        self.dimensions = Some((width, height));
        self.send(ImageEvent::Dimensions { width, height })
    }

    pub fn announce_properties(&mut self, properties: Properties) -> usize {
        self.send(ImageEvent::Properties(properties))
    }

    pub fn announce_color_model(&mut self, model: ColorModel) -> usize {
        self.color_model = Some(model.clone());
        self.send(ImageEvent::ColorModel(model))
    }

    pub fn announce_hints(&mut self, hints: Hints) -> usize {
        self.send(ImageEvent::Hints(hints))
    }

    /// Headers are complete; lowers the worker's priority
    ///
    /// Not delivered to consumers. Implied by the first pixel block.
    pub fn header_done(&mut self) {
        if self.header_done {
            return;
        }
        self.header_done = true;
        debug!(pass = self.pass, "Headers decoded");
        self.worker.lower_priority();
    }

    /// Deliver a block of samples
    ///
    /// The first block latches the pass: consumers registering afterwards
    /// wait for the next pass.
    pub fn deliver_pixels(&mut self, block: PixelBlock) -> Result<usize, DecodeError> {
        if self.finished {
            return Err(DecodeError::OutOfOrder("pixels after final completion"));
        }
        if self.dimensions.is_none() {
            return Err(DecodeError::OutOfOrder("pixels before dimensions"));
        }
        if self.color_model.is_none() {
            return Err(DecodeError::OutOfOrder("pixels before color model"));
        }
        self.header_done();
        if !self.pixels_sent {
            self.pixels_sent = true;
            trace!(pass = self.pass, "Latching pass snapshot");
        }
        Ok(self.send(ImageEvent::Pixels(block)))
    }

    /// Broadcast a completion; a final one ends the pass for every recipient
    pub fn complete(&mut self, status: CompletionStatus, is_final: bool) -> usize {
        if self.finished {
            warn!(pass = self.pass, "Completion after final completion ignored");
            return 0;
        }
        if is_final {
            self.finished = true;
        }
        self.send(ImageEvent::complete(status, is_final))
    }

    pub(crate) fn fail(&mut self, failure: DecodeFailure) -> usize {
        self.complete(CompletionStatus::Error(failure), true)
    }

    fn send(&self, event: ImageEvent) -> usize {
        if self.is_aborted() {
            return 0;
        }
        let recipients = self.sink.deliver(self.pass, &event);
        trace!(pass = self.pass, event = event.kind(), recipients, "Broadcast");
        recipients
    }
}

/// Fail when `width * height` exceeds `max_pixels`
pub fn check_area(width: u32, height: u32, max_pixels: u64) -> Result<(), DecodeError> {
    match u64::from(width).checked_mul(u64::from(height)) {
        Some(area) if area <= max_pixels => Ok(()),
        _ => Err(DecodeError::format(format!(
            "image of {}x{} exceeds the {} pixel limit",
            width, height, max_pixels
        ))),
    }
}
