//! Tile split/merge for regions above the processing limit
//!
//! Tiles overlap so that, once each tile's interior edges are feathered,
//! painting them in grid order hides the seams.

use image::{imageops, imageops::FilterType, RgbaImage};

use super::{composite::composite_over, BlendError};
use crate::core::geometry::Rect;
use crate::raster;

/// Overlapping square tiles covering an image.
///
/// `tiles[x][y]` is the tile in column `x`, row `y`. Edge tiles may be
/// smaller than `tile_size`.
#[derive(Debug, Clone, PartialEq)]
pub struct TileGrid {
    pub num_tiles_x: u32,
    pub num_tiles_y: u32,
    pub tile_size: u32,
    pub overlap: u32,
    pub image_width: u32,
    pub image_height: u32,
    pub tiles: Vec<Vec<RgbaImage>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SplitOutcome {
    /// Region is within the processing limit
    NotNeeded,
    Split(TileGrid),
}

impl TileGrid {
    /// Distance between consecutive tile origins
    pub fn stride(&self) -> u32 {
        self.tile_size - self.overlap
    }

    /// Image-space rectangle covered by tile `(x, y)`.
    pub fn tile_rect(&self, x: u32, y: u32) -> Rect {
        let stride = self.stride();
        let (ox, oy) = (x * stride, y * stride);
        Rect::new(
            ox as i32,
            oy as i32,
            self.tile_size.min(self.image_width.saturating_sub(ox)),
            self.tile_size.min(self.image_height.saturating_sub(oy)),
        )
    }

    /// Scale the grid metadata after every tile was resized by `factor`.
    pub fn rescale(&mut self, factor: u32) {
        self.tile_size *= factor;
        self.overlap *= factor;
        self.image_width *= factor;
        self.image_height *= factor;
    }

    /// Resize every tile by `factor` and rescale the metadata to match.
    pub fn upscale(&mut self, factor: u32) {
        for column in &mut self.tiles {
            for tile in column.iter_mut() {
                *tile = imageops::resize(
                    tile,
                    tile.width() * factor,
                    tile.height() * factor,
                    FilterType::Lanczos3,
                );
            }
        }
        self.rescale(factor);
    }

    /// Iterate `(x, y, tile)` in paint order
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32, &RgbaImage)> {
        self.tiles.iter().enumerate().flat_map(|(x, column)| {
            column
                .iter()
                .enumerate()
                .map(move |(y, tile)| (x as u32, y as u32, tile))
        })
    }
}

/// Split `image` into overlapping tiles when it has more than
/// `tile_limit`² pixels.
pub fn split_image(image: &RgbaImage, tile_limit: u32, overlap: u32) -> Result<SplitOutcome, BlendError> {
    let (width, height) = image.dimensions();
    if width as u64 * height as u64 <= tile_limit as u64 * tile_limit as u64 {
        return Ok(SplitOutcome::NotNeeded);
    }

    let tile_size = width.min(height).min(tile_limit);
    if tile_size <= overlap {
        return Err(BlendError::TileTooSmall { tile_size, overlap });
    }
    let stride = tile_size - overlap;
    let num_tiles_x = width.div_ceil(stride);
    let num_tiles_y = height.div_ceil(stride);

    let mut grid = TileGrid {
        num_tiles_x,
        num_tiles_y,
        tile_size,
        overlap,
        image_width: width,
        image_height: height,
        tiles: Vec::with_capacity(num_tiles_x as usize),
    };
    for x in 0..num_tiles_x {
        let column = (0..num_tiles_y)
            .map(|y| raster::crop(image, grid.tile_rect(x, y)))
            .collect();
        grid.tiles.push(column);
    }

    tracing::debug!(
        "Split {}x{} into {}x{} tiles of {} (overlap {})",
        width,
        height,
        num_tiles_x,
        num_tiles_y,
        tile_size,
        overlap
    );
    Ok(SplitOutcome::Split(grid))
}

/// Paint every tile at `index * (tile_size - overlap)`, later tiles over
/// earlier ones.
pub fn merge_tiles(grid: &TileGrid) -> Result<RgbaImage, BlendError> {
    let expected = (grid.num_tiles_x * grid.num_tiles_y) as usize;
    let actual: usize = grid.tiles.iter().map(Vec::len).sum();
    if expected != actual || grid.tiles.len() != grid.num_tiles_x as usize {
        return Err(BlendError::GridShape { expected, actual });
    }
    if grid.tile_size <= grid.overlap {
        return Err(BlendError::TileTooSmall {
            tile_size: grid.tile_size,
            overlap: grid.overlap,
        });
    }

    let mut out = RgbaImage::new(grid.image_width, grid.image_height);
    let stride = grid.stride() as i32;
    for (x, y, tile) in grid.iter() {
        composite_over(&mut out, tile, x as i32 * stride, y as i32 * stride);
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255]))
    }

    #[test]
    fn test_small_image_not_split() {
        let img = gradient(512, 512);
        assert_eq!(split_image(&img, 512, 32).unwrap(), SplitOutcome::NotNeeded);
    }

    #[test]
    fn test_split_layout() {
        let img = gradient(1000, 700);
        let SplitOutcome::Split(grid) = split_image(&img, 512, 32).unwrap() else {
            panic!("expected split");
        };
        assert_eq!(grid.tile_size, 512);
        assert_eq!(grid.num_tiles_x, 3);
        assert_eq!(grid.num_tiles_y, 2);
        assert_eq!(grid.tiles[0][0].dimensions(), (512, 512));
        assert_eq!(grid.tiles[2][1].dimensions(), (40, 220));
        assert_eq!(*grid.tiles[1][0].get_pixel(0, 0), *img.get_pixel(480, 0));
    }

    #[test]
    fn test_split_then_merge_reproduces_source() {
        let img = gradient(1100, 600);
        let SplitOutcome::Split(grid) = split_image(&img, 512, 32).unwrap() else {
            panic!("expected split");
        };
        let merged = merge_tiles(&grid).unwrap();
        assert_eq!(merged.dimensions(), img.dimensions());
        assert_eq!(merged, img);
    }

    #[test]
    fn test_narrow_image_uses_short_side() {
        let img = gradient(3000, 300);
        let SplitOutcome::Split(grid) = split_image(&img, 512, 32).unwrap() else {
            panic!("expected split");
        };
        assert_eq!(grid.tile_size, 300);
        assert_eq!(grid.num_tiles_y, 2);
        assert_eq!(merge_tiles(&grid).unwrap(), img);
    }

    #[test]
    fn test_too_narrow_for_overlap() {
        let img = gradient(20_000, 20);
        assert!(matches!(
            split_image(&img, 512, 32),
            Err(BlendError::TileTooSmall { tile_size: 20, .. })
        ));
    }

    #[test]
    fn test_upscaled_merge_size() {
        let img = gradient(1000, 600);
        let SplitOutcome::Split(mut grid) = split_image(&img, 512, 32).unwrap() else {
            panic!("expected split");
        };
        grid.upscale(2);
        assert_eq!(grid.stride(), 1024 - 64);
        let merged = merge_tiles(&grid).unwrap();
        assert_eq!(merged.dimensions(), (2000, 1200));
        assert!(merged.get_pixel(1999, 1199)[3] > 250);
    }

    #[test]
    fn test_merge_rejects_ragged_grid() {
        let img = gradient(1000, 600);
        let SplitOutcome::Split(mut grid) = split_image(&img, 512, 32).unwrap() else {
            panic!("expected split");
        };
        grid.tiles[0].pop();
        assert!(matches!(merge_tiles(&grid), Err(BlendError::GridShape { .. })));
    }
}
