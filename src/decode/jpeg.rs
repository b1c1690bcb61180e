//! JPEG engine
//!
//! Walks the marker segments up to the frame header (SOF) to announce
//! dimensions early; the body is decoded by the `image` crate.

use bytes::Bytes;
use image::ImageFormat;

use super::raster::deliver_bands;
use super::{be_u16, Broadcaster, DecodeEngine, DecodeError, EngineOutcome};
use crate::event::{ColorModel, CompletionStatus, Hints, Properties, Rect};
use crate::stream::ImageStream;

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;

/// Fields of the frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub marker: u8,
    pub precision: u8,
    pub width: u32,
    pub height: u32,
    pub components: u8,
}

impl FrameHeader {
    pub fn is_progressive(&self) -> bool {
        matches!(self.marker, 0xC2 | 0xC6 | 0xCA | 0xCE)
    }

    pub fn process_name(&self) -> &'static str {
        match self.marker {
            0xC0 => "baseline",
            0xC1 | 0xC5 | 0xC9 | 0xCD => "extended",
            0xC3 | 0xC7 | 0xCB | 0xCF => "lossless",
            _ => "progressive",
        }
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .with("process", self.process_name())
            .with("precision", self.precision)
            .with("components", self.components)
    }
}

/// SOF markers, excluding DHT (C4), JPG (C8) and DAC (CC)
fn is_sof(marker: u8) -> bool {
    (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}

/// Outcome of scanning a prefix for the frame header
#[derive(Debug, PartialEq, Eq)]
pub enum Scan {
    Found(FrameHeader),
    /// The prefix ends before the frame header
    NeedMore,
}

/// Find the frame header in the leading bytes of a JPEG stream
pub fn scan_frame_header(data: &[u8]) -> Result<Scan, DecodeError> {
    if data.len() < 2 {
        return Ok(Scan::NeedMore);
    }
    if data[0] != 0xFF || data[1] != SOI {
        return Err(DecodeError::format("missing start of image"));
    }

    let mut pos = 2;
    loop {
        // Fill bytes may precede a marker
        while data.get(pos) == Some(&0xFF) && data.get(pos + 1) == Some(&0xFF) {
            pos += 1;
        }
        let (Some(&prefix), Some(&marker)) = (data.get(pos), data.get(pos + 1)) else {
            return Ok(Scan::NeedMore);
        };
        if prefix != 0xFF {
            return Err(DecodeError::format(format!("expected marker at offset {}", pos)));
        }

        match marker {
            0x01 | 0xD0..=0xD7 => {
                pos += 2;
                continue;
            }
            EOI | SOS => return Err(DecodeError::format("no frame header before scan data")),
            _ => {}
        }

        let Some(length) = be_u16(data, pos + 2) else {
            return Ok(Scan::NeedMore);
        };
        if length < 2 {
            return Err(DecodeError::format("invalid segment length"));
        }

        if is_sof(marker) {
            let body = pos + 4;
            if data.len() < body + 6 {
                return Ok(Scan::NeedMore);
            }
            return Ok(Scan::Found(FrameHeader {
                marker,
                precision: data[body],
                height: be_u16(data, body + 1).unwrap_or(0) as u32,
                width: be_u16(data, body + 3).unwrap_or(0) as u32,
                components: data[body + 5],
            }));
        }

        pos += 2 + length as usize;
    }
}

#[derive(Debug, Default)]
pub struct JpegEngine;

impl JpegEngine {
    pub fn new() -> Self {
        Self
    }

    fn probe(&self, stream: &mut ImageStream, limit: usize) -> Result<FrameHeader, DecodeError> {
        let mut want = 512.min(limit.max(4));
        loop {
            let prefix = stream.peek(want)?;
            let available = prefix.len();
            match scan_frame_header(prefix)? {
                Scan::Found(header) => return Ok(header),
                Scan::NeedMore if available < want => {
                    return Err(DecodeError::format("stream ended before frame header"));
                }
                Scan::NeedMore if want >= limit => {
                    return Err(DecodeError::format("frame header not found within probe limit"));
                }
                Scan::NeedMore => want = (want * 2).min(limit),
            }
        }
    }

    fn decode(&mut self, stream: &mut ImageStream, out: &mut Broadcaster<'_>) -> Result<(), DecodeError> {
        let header = self.probe(stream, out.max_header_probe())?;
        if header.width == 0 || header.height == 0 {
            return Err(DecodeError::format("JPEG frame has zero dimensions"));
        }

        let mut hints = Hints::TOP_DOWN_LEFT_RIGHT | Hints::COMPLETE_SCANLINES | Hints::SINGLE_FRAME;
        if !header.is_progressive() {
            hints |= Hints::SINGLE_PASS;
        }

        out.check_area(header.width, header.height)?;
        out.announce_dimensions(header.width, header.height);
        out.announce_properties(header.properties());
        out.announce_color_model(ColorModel::Rgba8);
        out.announce_hints(hints);
        out.header_done();

        let data = stream.read_remaining()?;
        out.check_abort()?;

        let rgba = image::load_from_memory_with_format(&data, ImageFormat::Jpeg)?.into_rgba8();
        if rgba.dimensions() != (header.width, header.height) {
            return Err(DecodeError::format("decoded size differs from frame header"));
        }

        let area = Rect::new(0, 0, header.width, header.height);
        deliver_bands(out, area, &ColorModel::Rgba8, Bytes::from(rgba.into_raw()))?;
        out.complete(CompletionStatus::ImageDone, true);
        Ok(())
    }
}

impl DecodeEngine for JpegEngine {
    fn name(&self) -> &'static str {
        "jpeg"
    }

    fn run(&mut self, stream: &mut ImageStream, out: &mut Broadcaster<'_>) -> EngineOutcome {
        self.decode(stream, out).into()
    }
}
