//! Tile stores: where captured frames are flushed and read back from
//!
//! The pipeline writes every grid tile (and every edge-scan frame, for
//! diagnostics) as soon as it is captured, so a run interrupted between steps
//! leaves everything captured so far on the store.

use crate::capture::ViewportFrame;
use crate::viewport::{Axis, Direction};
use crate::{Error, Result};
use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Address of a stored frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileKey {
    /// A tile of the final grid
    Grid { row: u32, column: u32 },
    /// A diagnostic frame captured while scanning for an edge
    Scan {
        axis: Axis,
        direction: Direction,
        step: u32,
    },
}

impl TileKey {
    pub fn grid(row: u32, column: u32) -> Self {
        TileKey::Grid { row, column }
    }

    /// File stem used by `DirTileStore`.
    pub fn file_stem(&self) -> String {
        match self {
            TileKey::Grid { row, column } => format!("tile_r{}_c{}", row, column),
            TileKey::Scan { axis, direction, step } => {
                format!("scan_{}_{}_{:04}", axis, direction, step)
            }
        }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_stem())
    }
}

/// Save/load captured frames by key.
pub trait TileStore {
    fn put(&mut self, key: TileKey, frame: &ViewportFrame) -> Result<()>;

    /// `Ok(None)` when nothing is stored under `key`.
    fn get(&self, key: TileKey) -> Result<Option<ViewportFrame>>;
}

impl<T: TileStore + ?Sized> TileStore for Box<T> {
    fn put(&mut self, key: TileKey, frame: &ViewportFrame) -> Result<()> {
        (**self).put(key, frame)
    }

    fn get(&self, key: TileKey) -> Result<Option<ViewportFrame>> {
        (**self).get(key)
    }
}

/// Keeps frames in a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryTileStore {
    frames: HashMap<TileKey, ViewportFrame>,
}

impl MemoryTileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn remove(&mut self, key: TileKey) -> Option<ViewportFrame> {
        self.frames.remove(&key)
    }

    /// Grid keys currently stored, sorted row-major.
    pub fn grid_keys(&self) -> Vec<(u32, u32)> {
        let mut keys: Vec<(u32, u32)> = self
            .frames
            .keys()
            .filter_map(|k| match k {
                TileKey::Grid { row, column } => Some((*row, *column)),
                TileKey::Scan { .. } => None,
            })
            .collect();
        keys.sort_unstable();
        keys
    }

    pub fn scan_frame_count(&self) -> usize {
        self.frames
            .keys()
            .filter(|k| matches!(k, TileKey::Scan { .. }))
            .count()
    }
}

impl TileStore for MemoryTileStore {
    fn put(&mut self, key: TileKey, frame: &ViewportFrame) -> Result<()> {
        self.frames.insert(key, frame.clone());
        Ok(())
    }

    fn get(&self, key: TileKey) -> Result<Option<ViewportFrame>> {
        Ok(self.frames.get(&key).cloned())
    }
}

/// Writes each frame as a PNG file under a directory.
#[derive(Debug, Clone)]
pub struct DirTileStore {
    root: PathBuf,
}

impl DirTileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: TileKey) -> PathBuf {
        self.root.join(format!("{}.png", key.file_stem()))
    }
}

impl TileStore for DirTileStore {
    fn put(&mut self, key: TileKey, frame: &ViewportFrame) -> Result<()> {
        let path = self.path_for(key);
        frame
            .image()
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| Error::Store(format!("Failed to write {}: {}", path.display(), e)))?;
        debug!("stored {} at {}", key, path.display());
        Ok(())
    }

    fn get(&self, key: TileKey) -> Result<Option<ViewportFrame>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let decoded = image::open(&path)
            .map_err(|e| Error::Store(format!("Failed to read {}: {}", path.display(), e)))?;
        Ok(Some(ViewportFrame::new(decoded.to_rgba8())))
    }
}
