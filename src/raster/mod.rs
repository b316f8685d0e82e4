//! Raster surfaces
//!
//! Every layer is a plain `image::RgbaImage`. This module holds the small set
//! of buffer helpers the compositor and tools share: blank/checker surfaces,
//! clipped region copies and hex colour parsing.

pub mod codec;
pub mod draw;

pub use codec::{CodecError, EncodeFormat};

use image::{Rgba, RgbaImage};

use crate::core::geometry::Rect;

pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Fully transparent surface
pub fn blank(width: u32, height: u32) -> RgbaImage {
    RgbaImage::new(width, height)
}

/// Solid surface
pub fn filled(width: u32, height: u32, color: Rgba<u8>) -> RgbaImage {
    RgbaImage::from_pixel(width, height, color)
}

/// Background checker pattern in `#808080` / `#AAAAAA` cells.
pub fn checkerboard(width: u32, height: u32, cell: u32) -> RgbaImage {
    let cell = cell.max(1);
    RgbaImage::from_fn(width, height, |x, y| {
        if ((x / cell) + (y / cell)) % 2 == 0 {
            Rgba([0x80, 0x80, 0x80, 0xFF])
        } else {
            Rgba([0xAA, 0xAA, 0xAA, 0xFF])
        }
    })
}

/// Copy `rect` out of `src`. Pixels outside `src` read as transparent.
pub fn crop(src: &RgbaImage, rect: Rect) -> RgbaImage {
    let mut out = blank(rect.width, rect.height);
    let bounds = Rect::from_size(src.width(), src.height());
    if let Some(visible) = rect.intersect(&bounds) {
        for y in visible.y..visible.bottom() {
            for x in visible.x..visible.right() {
                let pixel = *src.get_pixel(x as u32, y as u32);
                out.put_pixel((x - rect.x) as u32, (y - rect.y) as u32, pixel);
            }
        }
    }
    out
}

/// Replace the pixels of `dst` at `(x, y)` with `src`, clipped to `dst`.
///
/// No blending happens; transparent source pixels overwrite.
pub fn put(dst: &mut RgbaImage, src: &RgbaImage, x: i32, y: i32) {
    let target = Rect::new(x, y, src.width(), src.height());
    let Some(visible) = target.intersect(&Rect::from_size(dst.width(), dst.height())) else {
        return;
    };
    for ty in visible.y..visible.bottom() {
        for tx in visible.x..visible.right() {
            let pixel = *src.get_pixel((tx - x) as u32, (ty - y) as u32);
            dst.put_pixel(tx as u32, ty as u32, pixel);
        }
    }
}

/// Reset every pixel to transparent
pub fn clear(surface: &mut RgbaImage) {
    surface.pixels_mut().for_each(|p| *p = TRANSPARENT);
}

/// True when any pixel carries alpha
pub fn has_content(surface: &RgbaImage) -> bool {
    surface.pixels().any(|p| p[3] != 0)
}

/// `#rrggbb` for a pixel, ignoring alpha
pub fn to_hex(pixel: Rgba<u8>) -> String {
    format!("#{:02x}{:02x}{:02x}", pixel[0], pixel[1], pixel[2])
}

/// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`
pub fn parse_hex(color: &str) -> Option<Rgba<u8>> {
    let hex = color.strip_prefix('#').unwrap_or(color);
    if !hex.is_ascii() {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut rgb = [0u8; 3];
            for (i, c) in hex.chars().enumerate() {
                let v = c.to_digit(16)? as u8;
                rgb[i] = v * 17;
            }
            Some(Rgba([rgb[0], rgb[1], rgb[2], 255]))
        }
        6 => Some(Rgba([
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
            255,
        ])),
        8 => Some(Rgba([
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
            channel(&hex[6..8])?,
        ])),
        _ => None,
    }
}
