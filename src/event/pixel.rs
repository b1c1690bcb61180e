//! Pixel payload types
//!
//! Sample buffers are `bytes::Bytes`, so a block broadcast to many consumers
//! is reference-counted rather than copied.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

use bytes::Bytes;

/// Rectangle in image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Number of pixels covered
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Color lookup table for indexed samples
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    /// RGBA entries
    colors: Arc<[[u8; 4]]>,
    /// Index treated as fully transparent, if any
    transparent: Option<u8>,
}

impl Palette {
    pub fn new(colors: Vec<[u8; 4]>, transparent: Option<u8>) -> Self {
        Self {
            colors: colors.into(),
            transparent,
        }
    }

    pub fn colors(&self) -> &[[u8; 4]] {
        &self.colors
    }

    pub fn transparent(&self) -> Option<u8> {
        self.transparent
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Resolve an index to RGBA, honoring the transparent index
    pub fn lookup(&self, index: u8) -> Option<[u8; 4]> {
        let mut color = *self.colors.get(index as usize)?;
        if self.transparent == Some(index) {
            color[3] = 0;
        }
        Some(color)
    }
}

/// Layout of the samples in a pixel block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorModel {
    /// 4 bytes per pixel, non-premultiplied RGBA
    Rgba8,
    /// 1 byte per pixel luminance
    Gray8,
    /// 1 byte per pixel index into a palette
    Indexed(Palette),
}

impl ColorModel {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            ColorModel::Rgba8 => 4,
            ColorModel::Gray8 | ColorModel::Indexed(_) => 1,
        }
    }

    pub fn palette(&self) -> Option<&Palette> {
        match self {
            ColorModel::Indexed(palette) => Some(palette),
            _ => None,
        }
    }
}

/// Delivery hint flags describing how pixels will arrive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Hints(u8);

impl Hints {
    pub const RANDOM_PIXEL_ORDER: Hints = Hints(0x01);
    pub const TOP_DOWN_LEFT_RIGHT: Hints = Hints(0x02);
    pub const COMPLETE_SCANLINES: Hints = Hints(0x04);
    pub const SINGLE_PASS: Hints = Hints(0x08);
    pub const SINGLE_FRAME: Hints = Hints(0x10);

    pub const fn empty() -> Self {
        Hints(0)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn contains(&self, other: Hints) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Hints {
    type Output = Hints;

    fn bitor(self, rhs: Hints) -> Hints {
        Hints(self.0 | rhs.0)
    }
}

impl BitOrAssign for Hints {
    fn bitor_assign(&mut self, rhs: Hints) {
        self.0 |= rhs.0;
    }
}

/// A rectangle of decoded samples
#[derive(Debug, Clone)]
pub struct PixelBlock {
    /// Area covered by the samples
    pub rect: Rect,
    /// Sample layout (carries the palette for indexed data)
    pub model: ColorModel,
    /// Samples, row-major
    pub samples: Bytes,
    /// Bytes between the starts of consecutive rows
    pub stride: usize,
}

impl PixelBlock {
    /// Create a block with tightly packed rows
    pub fn new(rect: Rect, model: ColorModel, samples: Bytes) -> Self {
        let stride = rect.width as usize * model.bytes_per_pixel();
        Self {
            rect,
            model,
            samples,
            stride,
        }
    }

    /// Create a block whose rows are `stride` bytes apart
    pub fn with_stride(rect: Rect, model: ColorModel, samples: Bytes, stride: usize) -> Self {
        Self {
            rect,
            model,
            samples,
            stride,
        }
    }

    /// Samples of one row within the block (0-based, relative to `rect.y`)
    pub fn row(&self, row: u32) -> Option<&[u8]> {
        if row >= self.rect.height {
            return None;
        }
        let start = row as usize * self.stride;
        let len = self.rect.width as usize * self.model.bytes_per_pixel();
        self.samples.get(start..start + len)
    }
}

/// Property table announced by an engine (comments, header fields, ...)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Properties(Arc<BTreeMap<String, String>>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property, returning the updated table
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        Arc::make_mut(&mut self.0).insert(key.into(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hints() {
        let hints = Hints::TOP_DOWN_LEFT_RIGHT | Hints::COMPLETE_SCANLINES;

        assert!(hints.contains(Hints::TOP_DOWN_LEFT_RIGHT));
        assert!(hints.contains(Hints::COMPLETE_SCANLINES));
        assert!(!hints.contains(Hints::SINGLE_FRAME));
        assert_eq!(hints.bits(), 0x06);
        assert!(Hints::empty().is_empty());

        let mut more = hints;
        more |= Hints::SINGLE_FRAME;
        assert!(more.contains(hints | Hints::SINGLE_FRAME));
    }

    #[test]
    fn test_palette_lookup() {
        let palette = Palette::new(vec![[255, 255, 255, 255], [0, 0, 0, 255]], Some(0));

        assert_eq!(palette.len(), 2);
        assert_eq!(palette.lookup(0), Some([255, 255, 255, 0]));
        assert_eq!(palette.lookup(1), Some([0, 0, 0, 255]));
        assert_eq!(palette.lookup(2), None);
    }

    #[test]
    fn test_pixel_block_rows() {
        let samples = Bytes::from(vec![1u8, 2, 3, 4, 5, 6]);
        let block = PixelBlock::new(Rect::new(0, 4, 3, 2), ColorModel::Gray8, samples);

        assert_eq!(block.stride, 3);
        assert_eq!(block.row(0), Some(&[1u8, 2, 3][..]));
        assert_eq!(block.row(1), Some(&[4u8, 5, 6][..]));
        assert_eq!(block.row(2), None);
    }

    #[test]
    fn test_properties() {
        let props = Properties::new().with("x_hot", 3).with("y_hot", 4);

        assert_eq!(props.len(), 2);
        assert_eq!(props.get("x_hot"), Some("3"));
        assert_eq!(props.get("missing"), None);

        let keys: Vec<&str> = props.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["x_hot", "y_hot"]);
    }

    #[test]
    fn test_color_model() {
        assert_eq!(ColorModel::Rgba8.bytes_per_pixel(), 4);
        assert_eq!(ColorModel::Gray8.bytes_per_pixel(), 1);

        let indexed = ColorModel::Indexed(Palette::new(vec![[0, 0, 0, 255]], None));
        assert_eq!(indexed.bytes_per_pixel(), 1);
        assert!(indexed.palette().is_some());
        assert!(ColorModel::Rgba8.palette().is_none());
    }
}
