//! Edge feathering
//!
//! A regenerated region is faded toward its interior edges so it melts into
//! the untouched pixels around it. Edges that sit on the image boundary have
//! nothing to blend with and stay hard.

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::core::geometry::Rect;

/// Which sides of a buffer receive an alpha ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeatherEdges {
    pub top: bool,
    pub bottom: bool,
    pub left: bool,
    pub right: bool,
}

impl FeatherEdges {
    pub const ALL: Self = Self {
        top: true,
        bottom: true,
        left: true,
        right: true,
    };

    pub const NONE: Self = Self {
        top: false,
        bottom: false,
        left: false,
        right: false,
    };

    /// Edges of `region` that are interior to a `image_width` x `image_height`
    /// image.
    ///
    /// With `upscale` the region was produced at a larger scale than the
    /// original bounds, so the far (right/bottom) edges are left hard.
    pub fn for_region(region: Rect, image_width: u32, image_height: u32, upscale: bool) -> Self {
        Self {
            top: region.y > 0,
            left: region.x > 0,
            bottom: !upscale && region.bottom() < image_height as i32,
            right: !upscale && region.right() < image_width as i32,
        }
    }

    pub fn any(&self) -> bool {
        self.top || self.bottom || self.left || self.right
    }
}

/// `floor(min(w, h) / 8)`
pub fn default_feather_width(width: u32, height: u32) -> u32 {
    width.min(height) / 8
}

/// Ramp factor for a pixel `distance` rows/columns in from an edge.
#[inline]
fn ramp(distance: u32, feather_width: u32) -> f32 {
    distance as f32 / feather_width as f32
}

#[inline]
fn attenuate(alpha: &mut u8, factor: f32) {
    let ramped = (factor * 255.0).round() as u8;
    *alpha = (*alpha).min(ramped);
}

/// Linearly ramp alpha from 0 at each enabled edge to full strength
/// `feather_width` pixels in. Alpha is only ever reduced.
///
/// `feather_width` defaults to [`default_feather_width`].
pub fn feather_edges(image: &mut RgbaImage, edges: FeatherEdges, feather_width: Option<u32>) {
    let (width, height) = image.dimensions();
    let fw = feather_width.unwrap_or_else(|| default_feather_width(width, height));
    if fw == 0 || !edges.any() {
        return;
    }

    let rows = fw.min(height);
    let cols = fw.min(width);

    if edges.top {
        for d in 0..rows {
            let factor = ramp(d, fw);
            for x in 0..width {
                attenuate(&mut image.get_pixel_mut(x, d)[3], factor);
            }
        }
    }
    if edges.bottom {
        for d in 0..rows {
            let factor = ramp(d, fw);
            for x in 0..width {
                attenuate(&mut image.get_pixel_mut(x, height - 1 - d)[3], factor);
            }
        }
    }
    if edges.left {
        for d in 0..cols {
            let factor = ramp(d, fw);
            for y in 0..height {
                attenuate(&mut image.get_pixel_mut(d, y)[3], factor);
            }
        }
    }
    if edges.right {
        for d in 0..cols {
            let factor = ramp(d, fw);
            for y in 0..height {
                attenuate(&mut image.get_pixel_mut(width - 1 - d, y)[3], factor);
            }
        }
    }
}

/// Soft round eraser matching the automatic feather: inside `radius` of
/// `center` alpha drops to `(d / radius * core - (core - 1)) * 255`, which
/// leaves a fully transparent core. Alpha is only ever reduced.
pub fn soften_circle(image: &mut RgbaImage, center: (f64, f64), radius: f64, core: f64) {
    if radius <= 0.0 {
        return;
    }
    let (width, height) = image.dimensions();
    let (cx, cy) = center;
    let x0 = (cx - radius).floor().max(0.0) as u32;
    let y0 = (cy - radius).floor().max(0.0) as u32;
    let x1 = ((cx + radius).ceil().max(0.0) as u32).min(width);
    let y1 = ((cy + radius).ceil().max(0.0) as u32).min(height);

    for y in y0..y1 {
        for x in x0..x1 {
            let d = ((x as f64 - cx).powi(2) + (y as f64 - cy).powi(2)).sqrt();
            if d > radius {
                continue;
            }
            let level = ((d / radius * core - (core - 1.0)) * 255.0).floor().clamp(0.0, 255.0) as u8;
            let alpha = &mut image.get_pixel_mut(x, y)[3];
            *alpha = (*alpha).min(level);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn opaque(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([100, 150, 200, 255]))
    }

    #[test]
    fn test_corner_region_feathers_interior_edges_only() {
        let region = Rect::new(0, 0, 128, 128);
        let edges = FeatherEdges::for_region(region, 512, 512, false);
        assert_eq!(
            edges,
            FeatherEdges {
                top: false,
                left: false,
                bottom: true,
                right: true
            }
        );

        let mut img = opaque(128, 128);
        feather_edges(&mut img, edges, None);

        // top and left untouched away from the far edges
        assert_eq!(img.get_pixel(0, 0)[3], 255);
        assert_eq!(img.get_pixel(60, 0)[3], 255);
        assert_eq!(img.get_pixel(0, 60)[3], 255);

        // 16px ramp on the bottom edge
        assert_eq!(img.get_pixel(60, 127)[3], 0);
        assert_eq!(img.get_pixel(60, 127 - 8)[3], 128);
        assert_eq!(img.get_pixel(60, 127 - 16)[3], 255);
        // and on the right edge
        assert_eq!(img.get_pixel(127, 60)[3], 0);
        assert_eq!(img.get_pixel(127 - 15, 60)[3], 239);
        assert_eq!(img.get_pixel(127 - 16, 60)[3], 255);
    }

    #[test]
    fn test_ramp_is_monotonic_and_never_raises_alpha() {
        let mut img = RgbaImage::from_fn(64, 64, |x, y| Rgba([0, 0, 0, ((x * 7 + y * 3) % 256) as u8]));
        let before = img.clone();
        feather_edges(&mut img, FeatherEdges::ALL, Some(12));

        for (after, orig) in img.pixels().zip(before.pixels()) {
            assert!(after[3] <= orig[3]);
        }

        let mut uniform = opaque(64, 64);
        feather_edges(&mut uniform, FeatherEdges::ALL, Some(12));
        for y in 1..32 {
            assert!(uniform.get_pixel(32, y)[3] >= uniform.get_pixel(32, y - 1)[3]);
            assert!(uniform.get_pixel(y, 32)[3] >= uniform.get_pixel(y - 1, 32)[3]);
        }
        for y in 33..64 {
            assert!(uniform.get_pixel(32, y)[3] <= uniform.get_pixel(32, y - 1)[3]);
        }
    }

    #[test]
    fn test_soften_circle_core_and_rim() {
        let mut img = opaque(200, 200);
        soften_circle(&mut img, (100.0, 100.0), 83.0, 1.3);
        assert_eq!(img.get_pixel(100, 100)[3], 0);
        // core is 0.3 / 1.3 of the radius
        assert_eq!(img.get_pixel(115, 100)[3], 0);
        assert!(img.get_pixel(160, 100)[3] > 100);
        assert!(img.get_pixel(160, 100)[3] < 255);
        assert_eq!(img.get_pixel(190, 100)[3], 255);

        let once = img.clone();
        soften_circle(&mut img, (0.0, 0.0), 10.0, 1.3);
        assert_eq!(img.get_pixel(100, 100), once.get_pixel(100, 100));
    }

    #[test]
    fn test_upscale_keeps_far_edges_hard() {
        let edges = FeatherEdges::for_region(Rect::new(480, 480, 512, 512), 2048, 2048, true);
        assert!(edges.top && edges.left);
        assert!(!edges.bottom && !edges.right);
    }

    #[test]
    fn test_width_larger_than_image() {
        let mut img = opaque(4, 4);
        feather_edges(&mut img, FeatherEdges::ALL, Some(100));
        assert_eq!(img.get_pixel(0, 0)[3], 0);
        assert!(img.get_pixel(2, 2)[3] < 255);
    }

    #[test]
    fn test_zero_width_noop() {
        let mut img = opaque(7, 7);
        feather_edges(&mut img, FeatherEdges::ALL, None);
        assert!(img.pixels().all(|p| p[3] == 255));
    }
}
