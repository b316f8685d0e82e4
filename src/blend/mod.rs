//! Pixel blending library
//!
//! Pure functions over RGBA buffers used to merge regenerated regions back
//! into the base image without seams:
//! - edge feathering against the enclosing image
//! - alpha-mask feathering from a hard user mask
//! - tile split/merge for regions above the processing limit
//!
//! Everything here is synchronous; `crate::pool` runs it off the interactive
//! thread.

pub mod alpha_mask;
pub mod composite;
pub mod feather;
pub mod request;
pub mod tiles;

pub use alpha_mask::{apply_alpha_mask, AlphaMode};
pub use composite::{composite_over, composite_over_with_opacity};
pub use feather::{default_feather_width, feather_edges, soften_circle, FeatherEdges};
pub use request::{process_request, BlendRequest, BlendResponse};
pub use tiles::{merge_tiles, split_image, SplitOutcome, TileGrid};

use crate::raster::CodecError;

#[derive(Debug, thiserror::Error)]
pub enum BlendError {
    #[error("Mask is {mask_width}x{mask_height} but pixels are {width}x{height}")]
    SizeMismatch {
        width: u32,
        height: u32,
        mask_width: u32,
        mask_height: u32,
    },

    #[error("Alpha mode {0:?} requires alpha pixels")]
    MissingMask(AlphaMode),

    #[error("Tile size {tile_size} must exceed overlap {overlap}")]
    TileTooSmall { tile_size: u32, overlap: u32 },

    #[error("Tile grid is {actual} tiles, metadata says {expected}")]
    GridShape { expected: usize, actual: usize },

    #[error(transparent)]
    Buffer(#[from] CodecError),
}

impl From<BlendError> for String {
    fn from(e: BlendError) -> Self {
        e.to_string()
    }
}
