//! GIF engine
//!
//! Dimensions come straight from the logical screen descriptor, so they are
//! announced before the image data is read. Frames are decoded by the
//! `image` crate and delivered composited, one completion per frame.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::gif::GifDecoder;
use image::AnimationDecoder;
use tracing::debug;

use super::raster::deliver_bands;
use super::{Broadcaster, DecodeEngine, DecodeError, EngineOutcome};
use crate::event::{ColorModel, CompletionStatus, Hints, Rect};
use crate::stream::ImageStream;

/// Signature plus logical screen width and height
const SCREEN_HEADER_LEN: usize = 10;

#[derive(Debug, Default)]
pub struct GifEngine {
    frames: u32,
}

impl GifEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn decode(&mut self, stream: &mut ImageStream, out: &mut Broadcaster<'_>) -> Result<(), DecodeError> {
        let header = stream.peek(SCREEN_HEADER_LEN)?;
        if header.len() < SCREEN_HEADER_LEN {
            return Err(DecodeError::format("truncated GIF screen descriptor"));
        }
        if !header.starts_with(b"GIF87a") && !header.starts_with(b"GIF89a") {
            return Err(DecodeError::format("unsupported GIF version"));
        }
        let width = u16::from_le_bytes([header[6], header[7]]) as u32;
        let height = u16::from_le_bytes([header[8], header[9]]) as u32;

        out.check_area(width, height)?;
        out.announce_dimensions(width, height);
        out.announce_color_model(ColorModel::Rgba8);
        out.announce_hints(Hints::TOP_DOWN_LEFT_RIGHT | Hints::COMPLETE_SCANLINES | Hints::SINGLE_PASS);
        out.header_done();

        let data = stream.read_remaining()?;
        out.check_abort()?;

        let decoder = GifDecoder::new(Cursor::new(data))?;
        let mut frames = decoder.into_frames().peekable();

        while let Some(frame) = frames.next() {
            let frame = frame?;
            out.check_abort()?;

            let (left, top) = (frame.left(), frame.top());
            let buffer = frame.into_buffer();
            let area = Rect::new(left, top, buffer.width(), buffer.height());
            deliver_bands(out, area, &ColorModel::Rgba8, Bytes::from(buffer.into_raw()))?;
            self.frames += 1;

            let last = frames.peek().is_none();
            let status = if last {
                CompletionStatus::ImageDone
            } else {
                CompletionStatus::FrameDone
            };
            out.complete(status, last);
        }

        if self.frames == 0 {
            return Err(DecodeError::format("GIF contains no image frames"));
        }
        debug!(frames = self.frames, "GIF decoded");
        Ok(())
    }
}

impl DecodeEngine for GifEngine {
    fn name(&self) -> &'static str {
        "gif"
    }

    fn run(&mut self, stream: &mut ImageStream, out: &mut Broadcaster<'_>) -> EngineOutcome {
        self.decode(stream, out).into()
    }
}
