//! Pixel mutation primitives behind the manual tools.
//!
//! Shapes use hard coverage: a pixel is inside when its centre is.

use image::{Rgba, RgbaImage};

use crate::blend::composite::over;
use crate::core::geometry::Point;

/// Pixel-space bounding box of a disc, clipped to the surface
fn disc_bounds(surface: &RgbaImage, cx: f64, cy: f64, radius: f64) -> Option<(u32, u32, u32, u32)> {
    let x0 = (cx - radius).floor().max(0.0);
    let y0 = (cy - radius).floor().max(0.0);
    let x1 = (cx + radius).ceil().min(surface.width() as f64);
    let y1 = (cy + radius).ceil().min(surface.height() as f64);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
}

/// Source-over a filled circle
pub fn fill_circle(surface: &mut RgbaImage, center: Point, radius: f64, color: Rgba<u8>) {
    let radius = radius.max(0.5);
    let Some((x0, y0, x1, y1)) = disc_bounds(surface, center.x, center.y, radius) else {
        return;
    };
    for y in y0..y1 {
        for x in x0..x1 {
            let dx = x as f64 + 0.5 - center.x;
            let dy = y as f64 + 0.5 - center.y;
            if dx * dx + dy * dy <= radius * radius {
                let dst = surface.get_pixel_mut(x, y);
                *dst = over(*dst, color);
            }
        }
    }
}

/// Squared distance from `p` to the segment `a`-`b`
fn segment_distance_sq(p: Point, a: Point, b: Point) -> f64 {
    let (vx, vy) = (b.x - a.x, b.y - a.y);
    let len_sq = vx * vx + vy * vy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (((p.x - a.x) * vx + (p.y - a.y) * vy) / len_sq).clamp(0.0, 1.0)
    };
    let (qx, qy) = (a.x + t * vx, a.y + t * vy);
    (p.x - qx).powi(2) + (p.y - qy).powi(2)
}

/// Round-capped stroke. Each pixel is painted at most once so translucent
/// colours do not build up along the segment.
pub fn stroke_line(surface: &mut RgbaImage, from: Point, to: Point, width: f64, color: Rgba<u8>) {
    let radius = (width / 2.0).max(0.5);
    let x0 = (from.x.min(to.x) - radius).floor().max(0.0) as u32;
    let y0 = (from.y.min(to.y) - radius).floor().max(0.0) as u32;
    let x1 = ((from.x.max(to.x) + radius).ceil().max(0.0) as u32).min(surface.width());
    let y1 = ((from.y.max(to.y) + radius).ceil().max(0.0) as u32).min(surface.height());
    for y in y0..y1 {
        for x in x0..x1 {
            let p = Point::new(x as f64 + 0.5, y as f64 + 0.5);
            if segment_distance_sq(p, from, to) <= radius * radius {
                let dst = surface.get_pixel_mut(x, y);
                *dst = over(*dst, color);
            }
        }
    }
}

/// Zero the alpha of a disc, restricted to pixels accepted by `allowed`.
pub fn erase_circle<F>(surface: &mut RgbaImage, center: Point, radius: f64, allowed: F)
where
    F: Fn(u32, u32) -> bool,
{
    let Some((x0, y0, x1, y1)) = disc_bounds(surface, center.x, center.y, radius) else {
        return;
    };
    for y in y0..y1 {
        for x in x0..x1 {
            let dx = x as f64 + 0.5 - center.x;
            let dy = y as f64 + 0.5 - center.y;
            if dx * dx + dy * dy < radius * radius && allowed(x, y) {
                surface.get_pixel_mut(x, y)[3] = 0;
            }
        }
    }
}

/// Smudge along a line: at every 1px step the RGB of the brush disc is
/// averaged and each disc pixel moves toward that average by `opacity`.
pub fn smudge_line(surface: &mut RgbaImage, from: Point, to: Point, brush_size: f64, opacity: f32) {
    let length = from.distance(&to);
    if length == 0.0 || brush_size <= 0.0 {
        return;
    }
    let opacity = opacity.clamp(0.0, 1.0);
    let (ux, uy) = ((to.x - from.x) / length, (to.y - from.y) / length);
    let radius = brush_size / 2.0;
    let steps = length.ceil() as u32;

    let mut disc: Vec<(u32, u32)> = Vec::new();
    for i in 0..steps {
        let center = Point::new(from.x + i as f64 * ux, from.y + i as f64 * uy);
        let Some((x0, y0, x1, y1)) = disc_bounds(surface, center.x, center.y, radius) else {
            continue;
        };

        disc.clear();
        let mut totals = [0u64; 3];
        for y in y0..y1 {
            for x in x0..x1 {
                let dx = x as f64 + 0.5 - center.x;
                let dy = y as f64 + 0.5 - center.y;
                if dx * dx + dy * dy <= radius * radius {
                    let p = surface.get_pixel(x, y);
                    for (total, channel) in totals.iter_mut().zip(p.0.iter()) {
                        *total += *channel as u64;
                    }
                    disc.push((x, y));
                }
            }
        }
        if disc.is_empty() {
            continue;
        }

        let count = disc.len() as f32;
        let average = totals.map(|t| t as f32 / count);
        for &(x, y) in &disc {
            let p = surface.get_pixel_mut(x, y);
            for c in 0..3 {
                p[c] = (average[c] * opacity + p[c] as f32 * (1.0 - opacity)).round() as u8;
            }
        }
    }
}
