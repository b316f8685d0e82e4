//! Editor tuning constants
//!
//! Every limit the engine enforces lives here so hosts can override them
//! from a JSON document. Missing fields keep their defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::errors::CoreError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorConfig {
    /// Undo stack depth; the oldest snapshot is dropped beyond this
    pub max_snapshots: usize,
    /// Side of the default square selection placed on a new image
    pub default_selection_size: u32,
    /// Erase barrier kept from selection edges that are interior to the image
    pub erase_inset: u32,
    /// Multiplier applied to the feather width for the post-generation eraser
    pub eraser_feather_modifier: f32,
    /// Grid the selection preview snaps to
    pub selection_snap: u32,
    pub poll_interval_ms: u64,
    /// Hard deadline for a generation job
    pub job_timeout_ms: u64,
    /// Hard deadline for a single augmentation job
    pub augment_timeout_ms: u64,
    pub pool_workers: usize,
    /// Regions above `tile_size`² pixels are tiled
    pub tile_size: u32,
    pub tile_overlap: u32,
    pub max_region_width: u32,
    pub max_region_height: u32,
    /// Hold delay that separates a tap from a pinch
    pub touch_hold_ms: u64,
    pub mask_opacity: f32,
    /// Neighbourhood radius used by alpha-mask feathering
    pub alpha_spread: u32,
    /// Feather width applied to augmented tiles
    pub augment_feather_width: u32,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Checkerboard cell size of the background layer
    pub checker_cell: u32,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_snapshots: 10,
            default_selection_size: 512,
            erase_inset: 10,
            eraser_feather_modifier: 1.3,
            selection_snap: 64,
            poll_interval_ms: 2_000,
            job_timeout_ms: 120_000,
            augment_timeout_ms: 60_000,
            pool_workers: 3,
            tile_size: 512,
            tile_overlap: 32,
            max_region_width: 2048,
            max_region_height: 2048,
            touch_hold_ms: 200,
            mask_opacity: 0.3,
            alpha_spread: 10,
            augment_feather_width: 64,
            min_zoom: 0.1,
            max_zoom: 8.0,
            checker_cell: 20,
        }
    }
}

impl EditorConfig {
    /// Parse a (possibly partial) JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let config: Self = serde_json::from_str(json)?;
        tracing::debug!("Loaded editor config: {:?}", config);
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }

    pub fn augment_timeout(&self) -> Duration {
        Duration::from_millis(self.augment_timeout_ms)
    }

    pub fn touch_hold(&self) -> Duration {
        Duration::from_millis(self.touch_hold_ms)
    }

    /// Whether a region of this size may be sent for generation.
    pub fn region_fits(&self, width: u32, height: u32) -> bool {
        width as u64 * height as u64 <= self.max_region_width as u64 * self.max_region_height as u64
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EditorConfig::from_json(r#"{"maxSnapshots": 3, "pollIntervalMs": 50}"#).unwrap();
        assert_eq!(config.max_snapshots, 3);
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.tile_overlap, 32);
        assert_eq!(config.job_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_region_fits() {
        let config = EditorConfig::default();
        assert!(config.region_fits(2048, 2048));
        assert!(!config.region_fits(2048, 2049));
    }

    #[test]
    fn test_invalid_json() {
        assert!(EditorConfig::from_json("{maxSnapshots: }").is_err());
    }
}
