//! XBM engine
//!
//! X11 bitmaps are C source: `#define <name>_width`/`_height` (and the
//! optional hot spot) followed by a `char` array of hex bytes, least
//! significant bit first, each row padded to a whole byte.

use bytes::Bytes;

use super::broadcast::check_area;
use super::raster::deliver_bands;
use super::{Broadcaster, DecodeEngine, DecodeError, EngineOutcome};
use crate::event::{ColorModel, CompletionStatus, Hints, Palette, Properties, Rect};
use crate::stream::ImageStream;

/// Parsed bitmap, one palette index per pixel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub hot_spot: Option<(u32, u32)>,
    /// Row-major indices: 0 background, 1 foreground
    pub pixels: Vec<u8>,
}

/// Palette shared by every XBM image: transparent white, opaque black
pub fn bitmap_palette() -> Palette {
    Palette::new(vec![[255, 255, 255, 0], [0, 0, 0, 255]], Some(0))
}

/// Parse XBM source text, refusing images larger than `max_pixels`
pub fn parse(text: &str, max_pixels: u64) -> Result<Bitmap, DecodeError> {
    let mut width = None;
    let mut height = None;
    let mut x_hot = None;
    let mut y_hot = None;

    for line in text.lines() {
        let mut words = line.split_whitespace();
        if words.next() != Some("#define") {
            continue;
        }
        let (Some(name), Some(value)) = (words.next(), words.next()) else {
            continue;
        };
        let Ok(value) = value.parse::<u32>() else {
            continue;
        };
        if name.ends_with("_width") {
            width = Some(value);
        } else if name.ends_with("_height") {
            height = Some(value);
        } else if name.ends_with("_x_hot") {
            x_hot = Some(value);
        } else if name.ends_with("_y_hot") {
            y_hot = Some(value);
        }
    }

    let (Some(width), Some(height)) = (width, height) else {
        return Err(DecodeError::format("XBM is missing width or height"));
    };
    if width == 0 || height == 0 {
        return Err(DecodeError::format("XBM has zero dimensions"));
    }
    check_area(width, height, max_pixels)?;

    let open = text
        .find('{')
        .ok_or_else(|| DecodeError::format("XBM has no bitmap data"))?;
    let declaration = &text[..open];
    if declaration.contains("short") {
        return Err(DecodeError::format("X10 bitmaps are not supported"));
    }
    let body = &text[open + 1..];
    let body = body.find('}').map_or(body, |close| &body[..close]);

    let row_bytes = width.div_ceil(8) as usize;
    let needed = row_bytes * height as usize;
    // Sized by the data actually present, never by the declared dimensions
    let mut bits = Vec::with_capacity(needed.min(body.len() / 2));
    for token in body.split(|c: char| c == ',' || c.is_whitespace()) {
        if token.is_empty() {
            continue;
        }
        let hex = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .ok_or_else(|| DecodeError::format(format!("unexpected token {:?}", token)))?;
        let byte = u8::from_str_radix(hex, 16)
            .map_err(|_| DecodeError::format(format!("bad hex byte {:?}", token)))?;
        bits.push(byte);
        if bits.len() == needed {
            break;
        }
    }
    if bits.len() < needed {
        return Err(DecodeError::format(format!(
            "premature end of bitmap data ({} of {} bytes)",
            bits.len(),
            needed
        )));
    }

    let mut pixels = Vec::with_capacity(width as usize * height as usize);
    for row in bits.chunks(row_bytes) {
        for x in 0..width as usize {
            pixels.push((row[x / 8] >> (x % 8)) & 1);
        }
    }

    Ok(Bitmap {
        width,
        height,
        hot_spot: x_hot.zip(y_hot),
        pixels,
    })
}

#[derive(Debug, Default)]
pub struct XbmEngine;

impl XbmEngine {
    pub fn new() -> Self {
        Self
    }

    fn decode(&mut self, stream: &mut ImageStream, out: &mut Broadcaster<'_>) -> Result<(), DecodeError> {
        let data = stream.read_remaining()?;
        out.check_abort()?;
        let text = String::from_utf8_lossy(&data);
        let bitmap = parse(&text, out.max_pixels())?;

        let model = ColorModel::Indexed(bitmap_palette());
        out.announce_dimensions(bitmap.width, bitmap.height);
        if let Some((x, y)) = bitmap.hot_spot {
            out.announce_properties(Properties::new().with("x_hot", x).with("y_hot", y));
        }
        out.announce_color_model(model.clone());
        out.announce_hints(
            Hints::TOP_DOWN_LEFT_RIGHT | Hints::COMPLETE_SCANLINES | Hints::SINGLE_PASS | Hints::SINGLE_FRAME,
        );
        out.header_done();

        let area = Rect::new(0, 0, bitmap.width, bitmap.height);
        deliver_bands(out, area, &model, Bytes::from(bitmap.pixels))?;
        out.complete(CompletionStatus::ImageDone, true);
        Ok(())
    }
}

impl DecodeEngine for XbmEngine {
    fn name(&self) -> &'static str {
        "xbm"
    }

    fn run(&mut self, stream: &mut ImageStream, out: &mut Broadcaster<'_>) -> EngineOutcome {
        self.decode(stream, out).into()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::decode::testing::{run_engine, RecordingSink};
    use crate::event::ImageEvent;
    use crate::pool::WorkerHandle;
    use crate::source::config::DEFAULT_MAX_PIXELS;
    use crate::source::SourceConfig;
    use crate::stream::AbortSignal;

    fn parse_default(text: &str) -> Result<Bitmap, DecodeError> {
        parse(text, DEFAULT_MAX_PIXELS)
    }

    pub(crate) const ARROW: &str = "#define arrow_width 10\n\
        #define arrow_height 2\n\
        #define arrow_x_hot 1\n\
        #define arrow_y_hot 0\n\
        static unsigned char arrow_bits[] = {\n   0x01, 0x02, 0xff, 0x03 };\n";

    #[test]
    fn test_parse_bits_lsb_first() {
        let bitmap = parse(ARROW, DEFAULT_MAX_PIXELS).unwrap();

        assert_eq!((bitmap.width, bitmap.height), (10, 2));
        assert_eq!(bitmap.hot_spot, Some((1, 0)));
        assert_eq!(bitmap.pixels[..10], [1, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(bitmap.pixels[10..], [1, 1, 1, 1, 1, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_default("#define a_width 8\nstatic char a_bits[] = { 0x00 };").is_err());
        assert!(parse_default("#define a_width 8\n#define a_height 2\nstatic char a_bits[] = { 0x00 };").is_err());
        assert!(parse_default("#define a_width 8\n#define a_height 1\nstatic short a_bits[] = { 0x0000 };").is_err());
        assert!(parse_default("#define a_width 8\n#define a_height 1\nstatic char a_bits[] = { zz };").is_err());
    }

    #[test]
    fn test_decode_events() {
        let mut engine = XbmEngine::new();
        let (outcome, sink, _) = run_engine(&mut engine, ARROW.as_bytes(), 1);

        assert_eq!(outcome, EngineOutcome::Completed);
        assert_eq!(
            sink.kinds(),
            vec!["dimensions", "properties", "color_model", "hints", "pixels", "pixels", "complete"]
        );
        let events = sink.events.lock();
        match &events[2] {
            ImageEvent::ColorModel(model) => {
                let palette = model.palette().unwrap();
                assert_eq!(palette.transparent(), Some(0));
                assert_eq!(palette.lookup(1), Some([0, 0, 0, 255]));
            }
            other => panic!("expected color model, got {:?}", other),
        }
    }

    #[test]
    fn test_huge_declared_size_is_refused() {
        let text = "#define a_width 4000000000\n\
            #define a_height 4000000000\n\
            static unsigned char a_bits[] = { 0x00 };\n";

        match parse_default(text) {
            Err(DecodeError::Format(reason)) => assert!(reason.contains("pixel limit")),
            other => panic!("expected format error, got {:?}", other),
        }
    }

    #[test]
    fn test_declared_size_beyond_data_is_refused() {
        let text = "#define a_width 60000\n#define a_height 60000\nstatic char a_bits[] = { 0x00 };\n";

        match parse(text, u64::MAX) {
            Err(DecodeError::Format(reason)) => assert!(reason.contains("premature end")),
            other => panic!("expected format error, got {:?}", other),
        }
    }

    #[test]
    fn test_engine_fails_over_limit_without_events() {
        let sink = RecordingSink::default();
        let worker = WorkerHandle::detached(0);
        let config = SourceConfig::default().max_pixels(16);
        let mut out = Broadcaster::new(&sink, 1, &worker, AbortSignal::new(), &config);
        let mut stream = ImageStream::new(Box::new(std::io::Cursor::new(ARROW.as_bytes())), AbortSignal::new());

        let outcome = XbmEngine::new().run(&mut stream, &mut out);

        assert!(matches!(outcome, EngineOutcome::Failed(_)));
        assert!(sink.kinds().is_empty());
    }
}
