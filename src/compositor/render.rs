//! Visible-surface compositing
//!
//! Layers are sampled nearest-neighbour under the viewport transform onto
//! the screen-space background; overlay outlines are drawn last in screen
//! space.

use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::blend::composite::{over, over_with_opacity};
use crate::core::geometry::{Point, Rect};
use crate::viewport::Viewport;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const CYAN: Rgba<u8> = Rgba([0, 255, 255, 255]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CursorShape {
    Circle,
    CircleFill,
    Crosshairs,
    ColorPicker,
}

/// Tool cursor glyph, positioned in image space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cursor {
    pub position: Point,
    pub radius: f64,
    pub shape: CursorShape,
    pub color: Rgba<u8>,
}

impl Cursor {
    pub fn new(position: Point, radius: f64, shape: CursorShape) -> Self {
        Self {
            position,
            radius,
            shape,
            color: WHITE,
        }
    }

    pub fn with_color(mut self, color: Rgba<u8>) -> Self {
        self.color = color;
        self
    }
}

pub(super) struct Layers<'a> {
    pub base: &'a RgbaImage,
    pub edit: &'a RgbaImage,
    pub mask: Option<&'a RgbaImage>,
    pub mask_opacity: f32,
}

pub(super) struct Overlay<'a> {
    pub selection: Option<Rect>,
    pub preview: Option<Rect>,
    pub show_selection: bool,
    pub cursor: Option<&'a Cursor>,
}

/// Draw the image layers over `out`, which already holds the background.
pub(super) fn render_layers(out: &mut RgbaImage, layers: &Layers<'_>, viewport: &Viewport) {
    let (width, height) = layers.base.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let view_width = out.width() as usize;
    if view_width == 0 {
        return;
    }
    let raw: &mut [u8] = out;
    raw.par_chunks_mut(view_width * 4)
        .enumerate()
        .for_each(|(sy, row)| {
            for sx in 0..view_width {
                let p = viewport.screen_to_image(Point::new(sx as f64 + 0.5, sy as f64 + 0.5));
                let (ix, iy) = (p.x.floor(), p.y.floor());
                if ix < 0.0 || iy < 0.0 || ix >= width as f64 || iy >= height as f64 {
                    continue;
                }
                let (ix, iy) = (ix as u32, iy as u32);
                let mut pixel = *layers.base.get_pixel(ix, iy);
                pixel = over(pixel, *layers.edit.get_pixel(ix, iy));
                if let Some(mask) = layers.mask {
                    pixel = over_with_opacity(pixel, *mask.get_pixel(ix, iy), layers.mask_opacity);
                }
                let dst = &mut row[sx * 4..sx * 4 + 4];
                let blended = over(Rgba([dst[0], dst[1], dst[2], dst[3]]), pixel);
                dst.copy_from_slice(&blended.0);
            }
        });
}

/// Draw border, selection rectangles and cursor.
pub(super) fn render_overlay(
    out: &mut RgbaImage,
    image_width: u32,
    image_height: u32,
    overlay: &Overlay<'_>,
    viewport: &Viewport,
) {
    if image_width == 0 || image_height == 0 {
        return;
    }
    let line_width = (image_width as f64 / 512.0).max(image_height as f64 / 512.0).max(1.0);
    let thickness = (line_width * viewport.zoom).round().max(1.0);

    stroke_rect(out, viewport, Rect::from_size(image_width, image_height), thickness, WHITE);
    if overlay.show_selection {
        if let Some(selection) = overlay.selection {
            stroke_rect(out, viewport, selection, thickness, WHITE);
        }
        if let Some(preview) = overlay.preview {
            stroke_rect(out, viewport, preview, thickness, CYAN);
        }
    }
    if let Some(cursor) = overlay.cursor {
        draw_cursor(out, viewport, cursor, thickness);
    }
}

fn fill_screen_rect(out: &mut RgbaImage, x0: f64, y0: f64, x1: f64, y1: f64, color: Rgba<u8>) {
    let (w, h) = (out.width() as f64, out.height() as f64);
    let x0 = x0.max(0.0).floor() as u32;
    let y0 = y0.max(0.0).floor() as u32;
    let x1 = x1.min(w).max(0.0).ceil() as u32;
    let y1 = y1.min(h).max(0.0).ceil() as u32;
    for y in y0..y1 {
        for x in x0..x1 {
            let dst = out.get_pixel_mut(x, y);
            *dst = over(*dst, color);
        }
    }
}

fn stroke_rect(out: &mut RgbaImage, viewport: &Viewport, rect: Rect, thickness: f64, color: Rgba<u8>) {
    let a = viewport.image_to_screen(Point::new(rect.x as f64, rect.y as f64));
    let b = viewport.image_to_screen(Point::new(rect.right() as f64, rect.bottom() as f64));
    let half = thickness / 2.0;
    fill_screen_rect(out, a.x - half, a.y - half, b.x + half, a.y + half, color);
    fill_screen_rect(out, a.x - half, b.y - half, b.x + half, b.y + half, color);
    fill_screen_rect(out, a.x - half, a.y + half, a.x + half, b.y - half, color);
    fill_screen_rect(out, b.x - half, a.y + half, b.x + half, b.y - half, color);
}

fn draw_cursor(out: &mut RgbaImage, viewport: &Viewport, cursor: &Cursor, thickness: f64) {
    let center = viewport.image_to_screen(cursor.position);
    let radius = cursor.radius * viewport.zoom;
    match cursor.shape {
        CursorShape::Circle => ring(out, center, radius, thickness, WHITE),
        CursorShape::CircleFill => disc(out, center, radius, cursor.color),
        CursorShape::ColorPicker => {
            ring(out, center, radius, thickness * 3.0, cursor.color);
            ring(out, center, radius + thickness * 2.0, thickness, WHITE);
        }
        CursorShape::Crosshairs => {
            let half = thickness / 2.0;
            fill_screen_rect(out, center.x - radius, center.y - half, center.x + radius, center.y + half, WHITE);
            fill_screen_rect(out, center.x - half, center.y - radius, center.x + half, center.y + radius, WHITE);
        }
    }
}

fn ring(out: &mut RgbaImage, center: Point, radius: f64, thickness: f64, color: Rgba<u8>) {
    let outer = radius + thickness / 2.0;
    let inner = (radius - thickness / 2.0).max(0.0);
    shade_disc(out, center, outer, |d| d >= inner, color);
}

fn disc(out: &mut RgbaImage, center: Point, radius: f64, color: Rgba<u8>) {
    shade_disc(out, center, radius, |_| true, color);
}

fn shade_disc<F: Fn(f64) -> bool>(out: &mut RgbaImage, center: Point, radius: f64, keep: F, color: Rgba<u8>) {
    let (w, h) = (out.width() as f64, out.height() as f64);
    let x0 = (center.x - radius).floor().max(0.0) as u32;
    let y0 = (center.y - radius).floor().max(0.0) as u32;
    let x1 = (center.x + radius).ceil().min(w).max(0.0) as u32;
    let y1 = (center.y + radius).ceil().min(h).max(0.0) as u32;
    for y in y0..y1 {
        for x in x0..x1 {
            let d = Point::new(x as f64 + 0.5, y as f64 + 0.5).distance(&center);
            if d <= radius && keep(d) {
                let dst = out.get_pixel_mut(x, y);
                *dst = over(*dst, color);
            }
        }
    }
}
