//! Output sizes the generation backend accepts

use serde::Serialize;

use crate::core::geometry::round_up_to;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AspectRatio {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    const fn new(name: &'static str, width: u32, height: u32) -> Self {
        Self { name, width, height }
    }

    fn ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    /// Multiply both sides by `factor`, rounding up to multiples of 64.
    pub fn scale(&self, factor: f64) -> Self {
        Self {
            name: self.name,
            width: round_up_to((self.width as f64 * factor).ceil() as u32, 64),
            height: round_up_to((self.height as f64 * factor).ceil() as u32, 64),
        }
    }
}

pub const ASPECT_RATIOS: [AspectRatio; 11] = [
    AspectRatio::new("4:1", 1024, 256),
    AspectRatio::new("3:1", 768, 256),
    AspectRatio::new("2:1", 640, 320),
    AspectRatio::new("3:2", 576, 384),
    AspectRatio::new("5:4", 640, 512),
    AspectRatio::new("1:1", 512, 512),
    AspectRatio::new("4:5", 512, 640),
    AspectRatio::new("2:3", 384, 576),
    AspectRatio::new("1:2", 320, 640),
    AspectRatio::new("1:3", 256, 768),
    AspectRatio::new("1:4", 256, 1024),
];

/// Supported size whose ratio is nearest to `width / height`
pub fn closest_aspect_ratio(width: u32, height: u32) -> AspectRatio {
    let target = width as f64 / height.max(1) as f64;
    let mut best = ASPECT_RATIOS[5];
    for candidate in ASPECT_RATIOS {
        if (candidate.ratio() - target).abs() < (best.ratio() - target).abs() {
            best = candidate;
        }
    }
    best
}

/// How many 2x upscales separate `width`x`height` from a supported
/// generation size, looking at most two levels deep.
pub fn upscale_level(width: u32, height: u32) -> Option<u32> {
    (0..3).find(|level| {
        let factor = 1 << level;
        width % factor == 0
            && height % factor == 0
            && ASPECT_RATIOS
                .iter()
                .any(|r| r.width == width / factor && r.height == height / factor)
    })
}
