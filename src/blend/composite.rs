//! Non-premultiplied source-over compositing

use image::{Rgba, RgbaImage};

use crate::core::geometry::Rect;

/// `src` over `dst`
#[inline]
pub fn over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    over_with_opacity(dst, src, 1.0)
}

/// `src` scaled by `opacity`, over `dst`
#[inline]
pub fn over_with_opacity(dst: Rgba<u8>, src: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    let sa = src[3] as f32 / 255.0 * opacity.clamp(0.0, 1.0);
    if sa <= 0.0 {
        return dst;
    }
    if sa >= 1.0 {
        return src;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    let mut out = [0u8; 4];
    for c in 0..3 {
        let value = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
        out[c] = value.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round() as u8;
    Rgba(out)
}

/// Draw `src` onto `dst` with its top-left at `(x, y)`, clipped.
pub fn composite_over(dst: &mut RgbaImage, src: &RgbaImage, x: i32, y: i32) {
    composite_over_with_opacity(dst, src, x, y, 1.0);
}

pub fn composite_over_with_opacity(dst: &mut RgbaImage, src: &RgbaImage, x: i32, y: i32, opacity: f32) {
    let target = Rect::new(x, y, src.width(), src.height());
    let Some(visible) = target.intersect(&Rect::from_size(dst.width(), dst.height())) else {
        return;
    };
    for ty in visible.y..visible.bottom() {
        for tx in visible.x..visible.right() {
            let s = *src.get_pixel((tx - x) as u32, (ty - y) as u32);
            let d = dst.get_pixel_mut(tx as u32, ty as u32);
            *d = over_with_opacity(*d, s, opacity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opaque_replaces() {
        assert_eq!(over(Rgba([1, 2, 3, 255]), Rgba([9, 8, 7, 255])), Rgba([9, 8, 7, 255]));
    }

    #[test]
    fn test_transparent_keeps_destination() {
        assert_eq!(over(Rgba([1, 2, 3, 200]), Rgba([9, 8, 7, 0])), Rgba([1, 2, 3, 200]));
    }

    #[test]
    fn test_half_over_opaque() {
        let out = over(Rgba([0, 0, 0, 255]), Rgba([255, 255, 255, 128]));
        assert_eq!(out[3], 255);
        assert!((127..=129).contains(&out[0]));
    }

    #[test]
    fn test_opacity_scales_source() {
        let out = over_with_opacity(Rgba([0, 0, 0, 0]), Rgba([255, 0, 0, 255]), 0.3);
        assert_eq!(out[0], 255);
        assert_eq!(out[3], 77);
    }

    #[test]
    fn test_composite_clips_negative_origin() {
        let mut dst = RgbaImage::new(4, 4);
        let src = RgbaImage::from_pixel(3, 3, Rgba([5, 5, 5, 255]));
        composite_over(&mut dst, &src, -2, -2);
        assert_eq!(dst.get_pixel(0, 0)[3], 255);
        assert_eq!(dst.get_pixel(1, 0)[3], 0);
    }
}
