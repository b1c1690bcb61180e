//! Band delivery of fully decoded rasters
//!
//! Splits a row-major sample buffer into horizontal bands of
//! `band_rows` rows. Bands share the buffer's allocation.

use bytes::Bytes;

use super::{Broadcaster, DecodeError};
use crate::event::{ColorModel, PixelBlock, Rect};

/// Deliver `samples` covering `area` in bands, top to bottom
///
/// Rows are tightly packed for `model`. Returns the number of bands sent.
pub fn deliver_bands(
    out: &mut Broadcaster<'_>,
    area: Rect,
    model: &ColorModel,
    samples: Bytes,
) -> Result<usize, DecodeError> {
    let stride = area.width as usize * model.bytes_per_pixel();
    let needed = stride * area.height as usize;
    if samples.len() < needed {
        return Err(DecodeError::format(format!(
            "raster holds {} bytes, {} needed for {}",
            samples.len(),
            needed,
            area
        )));
    }

    let band_rows = out.band_rows().max(1);
    let mut bands = 0;
    let mut row = 0;
    while row < area.height {
        out.check_abort()?;
        let rows = band_rows.min(area.height - row);
        let start = row as usize * stride;
        let end = start + rows as usize * stride;

        let rect = Rect::new(area.x, area.y + row, area.width, rows);
        out.deliver_pixels(PixelBlock::new(rect, model.clone(), samples.slice(start..end)))?;

        bands += 1;
        row += rows;
    }
    Ok(bands)
}
