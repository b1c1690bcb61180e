//! PNG engine
//!
//! The IHDR chunk always follows the signature, so dimensions and the
//! header fields are announced from the sniff buffer before the body is
//! read. Pixel decoding is done by the `image` crate.

use bytes::Bytes;
use image::ImageFormat;

use super::raster::deliver_bands;
use super::{be_u32, Broadcaster, DecodeEngine, DecodeError, EngineOutcome};
use crate::event::{ColorModel, CompletionStatus, Hints, Properties, Rect};
use crate::stream::ImageStream;

/// Signature, IHDR length and type, and the 13 IHDR data bytes
const IHDR_END: usize = 8 + 8 + 13;

/// Fields of the IHDR chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PngHeader {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_type: u8,
    pub interlaced: bool,
}

impl PngHeader {
    /// Parse from the first bytes of the file
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < IHDR_END {
            return Err(DecodeError::format("truncated PNG header"));
        }
        if &data[12..16] != b"IHDR" {
            return Err(DecodeError::format("PNG does not start with IHDR"));
        }
        let width = be_u32(data, 16).unwrap_or(0);
        let height = be_u32(data, 20).unwrap_or(0);
        if width == 0 || height == 0 {
            return Err(DecodeError::format("PNG has zero dimensions"));
        }
        Ok(Self {
            width,
            height,
            bit_depth: data[24],
            color_type: data[25],
            interlaced: data[28] != 0,
        })
    }

    pub fn color_type_name(&self) -> &'static str {
        match self.color_type {
            0 => "grayscale",
            2 => "truecolor",
            3 => "indexed",
            4 => "grayscale-alpha",
            6 => "truecolor-alpha",
            _ => "unknown",
        }
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .with("bit_depth", self.bit_depth)
            .with("color_type", self.color_type_name())
            .with("interlace", if self.interlaced { "adam7" } else { "none" })
    }
}

#[derive(Debug, Default)]
pub struct PngEngine;

impl PngEngine {
    pub fn new() -> Self {
        Self
    }

    fn decode(&mut self, stream: &mut ImageStream, out: &mut Broadcaster<'_>) -> Result<(), DecodeError> {
        let header = PngHeader::parse(stream.peek(IHDR_END)?)?;

        out.check_area(header.width, header.height)?;
        out.announce_dimensions(header.width, header.height);
        out.announce_properties(header.properties());
        out.announce_color_model(ColorModel::Rgba8);
        out.announce_hints(
            Hints::TOP_DOWN_LEFT_RIGHT | Hints::COMPLETE_SCANLINES | Hints::SINGLE_PASS | Hints::SINGLE_FRAME,
        );
        out.header_done();

        let data = stream.read_remaining()?;
        out.check_abort()?;

        let rgba = image::load_from_memory_with_format(&data, ImageFormat::Png)?.into_rgba8();
        if rgba.dimensions() != (header.width, header.height) {
            return Err(DecodeError::format("decoded size differs from IHDR"));
        }

        let area = Rect::new(0, 0, header.width, header.height);
        deliver_bands(out, area, &ColorModel::Rgba8, Bytes::from(rgba.into_raw()))?;
        out.complete(CompletionStatus::ImageDone, true);
        Ok(())
    }
}

impl DecodeEngine for PngEngine {
    fn name(&self) -> &'static str {
        "png"
    }

    fn run(&mut self, stream: &mut ImageStream, out: &mut Broadcaster<'_>) -> EngineOutcome {
        self.decode(stream, out).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::signature::PNG_SIGNATURE;
    use crate::decode::testing::run_engine;
    use crate::event::ImageEvent;

    /// 1x1 opaque green truecolor PNG
    const GREEN_PIXEL: [u8; 69] = [
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, // signature
        0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, // IHDR
        0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00, 0x00,
        0x90, 0x77, 0x53, 0xDE, // crc
        0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, // IDAT
        0x78, 0xDA, 0x63, 0x60, 0xF8, 0xCF, 0x00, 0x00, 0x02, 0x02, 0x01, 0x00, // zlib stream
        0x45, 0xF4, 0x52, 0xD4, // crc
        0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, // IEND
        0xAE, 0x42, 0x60, 0x82,
    ];

    #[test]
    fn test_parse_header() {
        let header = PngHeader::parse(&GREEN_PIXEL).unwrap();
        assert_eq!(header.width, 1);
        assert_eq!(header.height, 1);
        assert_eq!(header.bit_depth, 8);
        assert_eq!(header.color_type_name(), "truecolor");
        assert!(!header.interlaced);
    }

    #[test]
    fn test_parse_rejects_missing_ihdr() {
        let mut data = PNG_SIGNATURE.to_vec();
        data.extend_from_slice(&[0; 21]);
        assert!(PngHeader::parse(&data).is_err());
        assert!(PngHeader::parse(&PNG_SIGNATURE).is_err());
    }

    #[test]
    fn test_decode_green_pixel() {
        let mut engine = PngEngine::new();
        let (outcome, sink, _) = run_engine(&mut engine, &GREEN_PIXEL, 16);

        assert_eq!(outcome, EngineOutcome::Completed);
        assert_eq!(
            sink.kinds(),
            vec!["dimensions", "properties", "color_model", "hints", "pixels", "complete"]
        );
        let events = sink.events.lock();
        match &events[1] {
            ImageEvent::Properties(props) => assert_eq!(props.get("bit_depth"), Some("8")),
            other => panic!("expected properties, got {:?}", other),
        }
        match &events[4] {
            ImageEvent::Pixels(block) => assert_eq!(&block.samples[..], &[0, 255, 0, 255]),
            other => panic!("expected pixels, got {:?}", other),
        }
    }

    #[test]
    fn test_corrupt_body_fails() {
        let mut data = GREEN_PIXEL[..45].to_vec();
        data.extend_from_slice(&[0xDE, 0xAD]);

        let mut engine = PngEngine::new();
        let (outcome, sink, _) = run_engine(&mut engine, &data, 16);

        assert!(matches!(outcome, EngineOutcome::Failed(_)));
        assert!(!sink.kinds().contains(&"pixels"));
    }
}
