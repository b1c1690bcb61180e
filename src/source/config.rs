//! Image source configuration

use crate::stream::DEFAULT_READ_CHUNK;

/// Bytes inspected when picking an engine
pub const DEFAULT_SNIFF_LEN: usize = 16;

/// Rows per pixel block for engines that decode whole rasters
pub const DEFAULT_BAND_ROWS: u32 = 16;

/// Largest prefix an engine may buffer while looking for its header
pub const DEFAULT_MAX_HEADER_PROBE: usize = 64 * 1024;

/// Largest image area, in pixels, an engine will decode
pub const DEFAULT_MAX_PIXELS: u64 = 1 << 28;

/// Per-source decode options
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Leading bytes matched against the signature table
    pub sniff_len: usize,

    /// Rows per delivered pixel band
    pub band_rows: u32,

    /// Read size when pulling from the stream
    pub read_chunk: usize,

    /// Header probe limit (JPEG marker walk)
    pub max_header_probe: usize,

    /// Images declaring a larger area fail before any buffer is sized
    pub max_pixels: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            sniff_len: DEFAULT_SNIFF_LEN,
            band_rows: DEFAULT_BAND_ROWS,
            read_chunk: DEFAULT_READ_CHUNK,
            max_header_probe: DEFAULT_MAX_HEADER_PROBE,
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }
}

impl SourceConfig {
    /// Set the sniff length (at least 8, enough for the PNG signature)
    pub fn sniff_len(mut self, len: usize) -> Self {
        self.sniff_len = len.max(8);
        self
    }

    /// Set rows per band (at least one)
    pub fn band_rows(mut self, rows: u32) -> Self {
        self.band_rows = rows.max(1);
        self
    }

    /// Set the stream read size
    pub fn read_chunk(mut self, size: usize) -> Self {
        self.read_chunk = size.max(1);
        self
    }

    /// Set the header probe limit
    pub fn max_header_probe(mut self, limit: usize) -> Self {
        self.max_header_probe = limit.max(self.sniff_len);
        self
    }

    /// Set the image area limit (at least one pixel)
    pub fn max_pixels(mut self, limit: u64) -> Self {
        self.max_pixels = limit.max(1);
        self
    }
}
