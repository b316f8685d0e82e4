//! Alpha-mask feathering
//!
//! Derives a soft-edged alpha channel from a hard mask in one pass: every
//! pixel takes the strongest falloff contributed by an "edit me" pixel
//! within `spread`, measured with Chebyshev distance.

use image::RgbaImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::BlendError;

/// Falloff radius used when no other spread is configured
pub const DEFAULT_SPREAD: u32 = 10;

/// How the mask buffer marks editable pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlphaMode {
    /// No mask applied
    #[default]
    None,
    /// Painted mask: non-black red channel is editable
    Mask,
    /// Erased base: alpha below 255 is editable
    Alpha,
}

fn editable_map(mask: &RgbaImage, mode: AlphaMode) -> Vec<bool> {
    mask.pixels()
        .map(|p| match mode {
            AlphaMode::Alpha => p[3] < 255,
            AlphaMode::Mask => 255 - p[0] < 255,
            AlphaMode::None => false,
        })
        .collect()
}

/// Distance from each pixel to the nearest editable pixel in the same row,
/// saturated at `limit`.
fn row_distances(editable: &[bool], width: usize, limit: u32) -> Vec<u32> {
    let mut out = vec![limit; editable.len()];
    out.par_chunks_mut(width)
        .zip(editable.par_chunks(width))
        .for_each(|(dist, row)| {
            let mut last = limit;
            for x in 0..width {
                last = if row[x] { 0 } else { (last + 1).min(limit) };
                dist[x] = last;
            }
            last = limit;
            for x in (0..width).rev() {
                last = if row[x] { 0 } else { (last + 1).min(limit) };
                dist[x] = dist[x].min(last);
            }
        });
    out
}

/// Overwrite the alpha of `pixels` with the feathered mask.
///
/// `AlphaMode::None` leaves the buffer untouched.
pub fn apply_alpha_mask(
    pixels: &mut RgbaImage,
    mask: &RgbaImage,
    mode: AlphaMode,
    spread: u32,
) -> Result<(), BlendError> {
    if pixels.dimensions() != mask.dimensions() {
        return Err(BlendError::SizeMismatch {
            width: pixels.width(),
            height: pixels.height(),
            mask_width: mask.width(),
            mask_height: mask.height(),
        });
    }
    if mode == AlphaMode::None {
        return Ok(());
    }

    let (width, height) = (pixels.width() as usize, pixels.height() as usize);
    if width == 0 || height == 0 {
        return Ok(());
    }
    let editable = editable_map(mask, mode);
    let limit = spread + 1;
    let rows = row_distances(&editable, width, limit);
    let reach = spread as usize;

    let raw: &mut [u8] = pixels;
    raw.par_chunks_mut(width * 4)
        .enumerate()
        .for_each(|(y, out_row)| {
            let y0 = y.saturating_sub(reach);
            let y1 = (y + reach).min(height - 1);
            for x in 0..width {
                let mut nearest = limit;
                for ny in y0..=y1 {
                    let dy = y.abs_diff(ny) as u32;
                    let d = dy.max(rows[ny * width + x]);
                    nearest = nearest.min(d);
                }
                out_row[x * 4 + 3] = falloff(nearest, spread);
            }
        });
    Ok(())
}

/// `ceil((spread - d) / spread * 255)`, zero at or beyond `spread`
#[inline]
fn falloff(distance: u32, spread: u32) -> u8 {
    if distance == 0 {
        return 255;
    }
    if distance >= spread {
        return 0;
    }
    ((spread - distance) * 255).div_ceil(spread) as u8
}
