//! Last-writer-wins compositing of grid tiles
//!
//! Overlapping regions are assumed to be identical across neighbouring
//! captures, so tiles are simply copied over each other in row-major order.

use crate::grid::GridSpec;
use crate::store::{TileKey, TileStore};
use crate::{Error, Result};
use image::{imageops, RgbaImage};
use log::info;
use std::path::Path;

/// The stitched output image.
#[derive(Debug, Clone)]
pub struct CompositeImage {
    image: RgbaImage,
}

impl CompositeImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Encode as PNG at `path`.
    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        self.image
            .save_with_format(path.as_ref(), image::ImageFormat::Png)?;
        Ok(())
    }
}

/// Compose every grid cell from `tiles` into one image.
///
/// All tiles are fetched and checked before the output buffer is allocated.
pub fn stitch(grid: &GridSpec, tiles: &dyn TileStore) -> Result<CompositeImage> {
    if grid.cell_count() == 0 {
        return Err(Error::ConfigError(format!(
            "cannot stitch a {} x {} grid",
            grid.columns, grid.rows
        )));
    }
    let mut frames = Vec::with_capacity(grid.cell_count());
    for (row, column) in grid.cells() {
        let frame = tiles
            .get(TileKey::grid(row, column))?
            .ok_or(Error::MissingTile { row, column })?;
        let actual = frame.dimensions();
        let expected = (grid.tile_width, grid.tile_height);
        if actual != expected {
            return Err(Error::TileSizeMismatch { row, column, expected, actual });
        }
        frames.push((row, column, frame));
    }

    let (width, height) = grid.composite_size();
    let mut canvas = RgbaImage::new(width, height);
    for (row, column, frame) in &frames {
        let (x, y) = grid.cell_offset(*row, *column);
        imageops::replace(&mut canvas, frame.image(), x as i64, y as i64);
    }

    info!("stitched {} tile(s) into {}x{}", frames.len(), width, height);
    Ok(CompositeImage { image: canvas })
}
