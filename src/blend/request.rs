//! Pool message types and their handler

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use super::{alpha_mask::apply_alpha_mask, feather::feather_edges, AlphaMode, BlendError, FeatherEdges};
use crate::core::geometry::Rect;
use crate::raster::codec;

/// A blending job.
///
/// `pixels` (and `alpha_pixels`) have the selection's dimensions;
/// `width`/`height` are the full image the selection sits in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlendRequest {
    pub id: String,
    pub feather: bool,
    #[serde(default)]
    pub alpha_mode: AlphaMode,
    pub pixels: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha_pixels: Option<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feather_width: Option<u32>,
    pub selection_overlay: Rect,
    #[serde(default)]
    pub upscale: bool,
}

impl BlendRequest {
    /// Request that only feathers `image` against its place in the full image.
    pub fn feather(id: impl Into<String>, image: RgbaImage, selection: Rect, image_width: u32, image_height: u32) -> Self {
        Self {
            id: id.into(),
            feather: true,
            alpha_mode: AlphaMode::None,
            pixels: image.into_raw(),
            alpha_pixels: None,
            width: image_width,
            height: image_height,
            feather_width: None,
            selection_overlay: selection,
            upscale: false,
        }
    }

    pub fn with_feather_width(mut self, feather_width: u32) -> Self {
        self.feather_width = Some(feather_width);
        self
    }

    pub fn with_upscale(mut self, upscale: bool) -> Self {
        self.upscale = upscale;
        self
    }

    pub fn with_mask(mut self, mode: AlphaMode, mask: RgbaImage) -> Self {
        self.alpha_mode = mode;
        self.alpha_pixels = Some(mask.into_raw());
        self
    }

    pub fn without_feather(mut self) -> Self {
        self.feather = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlendResponse {
    pub id: String,
    pub pixels: Vec<u8>,
}

impl BlendResponse {
    /// Rewrap the pixels at the given size.
    pub fn into_image(self, width: u32, height: u32) -> Result<RgbaImage, BlendError> {
        Ok(codec::from_raw(width, height, self.pixels)?)
    }
}

/// Feather first, then apply the alpha mask.
pub fn process_request(request: BlendRequest, spread: u32) -> Result<BlendResponse, BlendError> {
    let BlendRequest {
        id,
        feather,
        alpha_mode,
        pixels,
        alpha_pixels,
        width,
        height,
        feather_width,
        selection_overlay,
        upscale,
    } = request;

    let (sw, sh) = (selection_overlay.width, selection_overlay.height);
    let mut image = codec::from_raw(sw, sh, pixels)?;

    if feather {
        let edges = FeatherEdges::for_region(selection_overlay, width, height, upscale);
        feather_edges(&mut image, edges, feather_width);
    }

    if alpha_mode != AlphaMode::None {
        let raw = alpha_pixels.ok_or(BlendError::MissingMask(alpha_mode))?;
        let mask_len = raw.len();
        let mask = codec::from_raw(sw, sh, raw).map_err(|_| BlendError::SizeMismatch {
            width: sw,
            height: sh,
            mask_width: sw,
            mask_height: (mask_len / (sw.max(1) as usize * 4)) as u32,
        })?;
        apply_alpha_mask(&mut image, &mask, alpha_mode, spread)?;
    }

    Ok(BlendResponse {
        id,
        pixels: image.into_raw(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::blend::alpha_mask::DEFAULT_SPREAD;
    use image::Rgba;

    #[test]
    fn test_wire_shape_is_camel_case() {
        let req = BlendRequest::feather("r1", RgbaImage::new(1, 1), Rect::new(0, 0, 1, 1), 4, 4)
            .with_mask(AlphaMode::Alpha, RgbaImage::new(1, 1));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["alphaMode"], "alpha");
        assert_eq!(json["selectionOverlay"]["width"], 1);
        assert!(json.get("alphaPixels").is_some());
        assert!(json.get("featherWidth").is_none());

        let parsed: BlendRequest = serde_json::from_value(serde_json::json!({
            "id": "x", "feather": false, "pixels": [0, 0, 0, 0],
            "width": 1, "height": 1,
            "selectionOverlay": {"x": 0, "y": 0, "width": 1, "height": 1}
        }))
        .unwrap();
        assert_eq!(parsed.alpha_mode, AlphaMode::None);
        assert!(!parsed.upscale);
    }

    #[test]
    fn test_feathers_against_image_bounds() {
        let tile = RgbaImage::from_pixel(128, 128, Rgba([1, 2, 3, 255]));
        let req = BlendRequest::feather("r", tile, Rect::new(0, 0, 128, 128), 512, 512);
        let resp = process_request(req, DEFAULT_SPREAD).unwrap();
        let out = resp.into_image(128, 128).unwrap();
        assert_eq!(out.get_pixel(64, 0)[3], 255);
        assert_eq!(out.get_pixel(64, 127)[3], 0);
    }

    #[test]
    fn test_missing_mask_fails() {
        let mut req = BlendRequest::feather("r", RgbaImage::new(2, 2), Rect::new(0, 0, 2, 2), 2, 2);
        req.alpha_mode = AlphaMode::Mask;
        assert!(matches!(
            process_request(req, DEFAULT_SPREAD),
            Err(BlendError::MissingMask(AlphaMode::Mask))
        ));
    }

    #[test]
    fn test_mask_of_wrong_size_fails() {
        let req = BlendRequest::feather("r", RgbaImage::new(4, 4), Rect::new(0, 0, 4, 4), 4, 4)
            .with_mask(AlphaMode::Alpha, RgbaImage::new(4, 2));
        assert!(matches!(
            process_request(req, DEFAULT_SPREAD),
            Err(BlendError::SizeMismatch { mask_height: 2, .. })
        ));
    }

    #[test]
    fn test_pixels_of_wrong_size_fail() {
        let mut req = BlendRequest::feather("r", RgbaImage::new(4, 4), Rect::new(0, 0, 4, 4), 4, 4);
        req.pixels.truncate(10);
        assert!(matches!(process_request(req, DEFAULT_SPREAD), Err(BlendError::Buffer(_))));
    }
}
