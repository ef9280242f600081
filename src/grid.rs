//! Tile grid derivation, re-homing and the raster sweep
//!
//! Position is dead-reckoned from step counts only. Re-homing replays the
//! net displacement of the edge scans in reverse and then pushes a few extra
//! steps against the origin corner; drift from imprecise pans is not detected.

use crate::capture::{FrameCapture, ViewportFrame};
use crate::scanner::{EdgeScanResult, ResolvedAxis};
use crate::store::{TileKey, TileStore};
use crate::viewport::{Axis, Direction, PanDelta, ViewportController};
use crate::{CancelToken, Error, MosaicConfig, Result, Viewport};
use log::{debug, info};
use std::time::Duration;

/// Pixels advanced per step for a viewport extent of `extent`.
pub fn effective_step(extent: u32, step_fraction: f64) -> u32 {
    ((extent as f64 * step_fraction).round() as u32).clamp(1, extent.max(1))
}

/// Grid geometry, computed once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSpec {
    pub columns: u32,
    pub rows: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub effective_step_x: u32,
    pub effective_step_y: u32,
    /// Pan sign that advances one column
    pub horizontal_direction: Direction,
    /// Pan sign that advances one row
    pub vertical_direction: Direction,
}

impl GridSpec {
    pub fn cell_count(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    /// `(width, height)` of the stitched output.
    pub fn composite_size(&self) -> (u32, u32) {
        (
            self.columns.saturating_sub(1) * self.effective_step_x + self.tile_width,
            self.rows.saturating_sub(1) * self.effective_step_y + self.tile_height,
        )
    }

    /// Top-left corner of a cell inside the composite.
    pub fn cell_offset(&self, row: u32, column: u32) -> (u32, u32) {
        (column * self.effective_step_x, row * self.effective_step_y)
    }

    /// Cells in capture/draw order: row-major, column ascending.
    pub fn cells(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (0..self.rows).flat_map(move |row| (0..self.columns).map(move |column| (row, column)))
    }

    fn step(&self, axis: Axis) -> u32 {
        match axis {
            Axis::Horizontal => self.effective_step_x,
            Axis::Vertical => self.effective_step_y,
        }
    }

    fn forward(&self, axis: Axis) -> Direction {
        match axis {
            Axis::Horizontal => self.horizontal_direction,
            Axis::Vertical => self.vertical_direction,
        }
    }
}

/// Derive the grid from the two edge scans. Pure; never fails.
pub fn build_grid(
    viewport: Viewport,
    step_fraction: f64,
    horizontal: &EdgeScanResult,
    vertical: &EdgeScanResult,
) -> GridSpec {
    GridSpec {
        columns: horizontal.steps_to_edge + 1,
        rows: vertical.steps_to_edge + 1,
        tile_width: viewport.width,
        tile_height: viewport.height,
        effective_step_x: effective_step(viewport.width, step_fraction),
        effective_step_y: effective_step(viewport.height, step_fraction),
        horizontal_direction: horizontal.direction,
        vertical_direction: vertical.direction,
    }
}

/// One captured grid cell.
#[derive(Debug, Clone)]
pub struct Tile {
    pub row: u32,
    pub column: u32,
    pub frame: ViewportFrame,
}

pub struct GridTraverser {
    capture: FrameCapture,
    settle_delay: Duration,
    overshoot_steps: u32,
    alignment_cycles: u32,
    cancel: CancelToken,
}

impl GridTraverser {
    pub fn from_config(config: &MosaicConfig, cancel: CancelToken) -> Self {
        Self {
            capture: FrameCapture::from_config(config),
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            overshoot_steps: config.rehome_overshoot_steps,
            alignment_cycles: config.alignment_cycles,
            cancel,
        }
    }

    /// Pan back to the origin corner the edge scans started from.
    pub fn rehome(
        &self,
        controller: &mut dyn ViewportController,
        grid: &GridSpec,
        horizontal: &ResolvedAxis,
        vertical: &ResolvedAxis,
    ) -> Result<()> {
        for (axis, resolved) in [(Axis::Horizontal, horizontal), (Axis::Vertical, vertical)] {
            self.cancel.check()?;
            let step = grid.step(axis);
            let back = if resolved.net_steps > 0 { Direction::Negative } else { Direction::Positive };
            let reverse = resolved.net_steps.unsigned_abs();
            debug!("re-homing {}: {} step(s) {}", axis, reverse, back);
            for _ in 0..reverse {
                self.capture.pan(controller, PanDelta::along(axis, back, step))?;
            }

            let forward = grid.forward(axis);
            for _ in 0..self.overshoot_steps {
                self.capture.pan(controller, PanDelta::along(axis, forward.opposite(), step))?;
            }
            for _ in 0..self.alignment_cycles {
                self.capture.pan(controller, PanDelta::along(axis, forward, step))?;
                self.capture.pan(controller, PanDelta::along(axis, forward.opposite(), step))?;
            }
        }
        self.settle();
        Ok(())
    }

    /// Capture one tile per cell in row-major order, flushing each to `store`.
    pub fn sweep(
        &self,
        controller: &mut dyn ViewportController,
        store: &mut dyn TileStore,
        grid: &GridSpec,
    ) -> Result<Vec<Tile>> {
        let mut tiles = Vec::with_capacity(grid.cell_count());
        let right = PanDelta::along(Axis::Horizontal, grid.horizontal_direction, grid.effective_step_x);
        let down = PanDelta::along(Axis::Vertical, grid.vertical_direction, grid.effective_step_y);

        info!("sweeping {} x {} grid", grid.columns, grid.rows);
        for row in 0..grid.rows {
            for column in 0..grid.columns {
                self.settle();
                let frame = self
                    .capture
                    .capture(controller)
                    .map_err(|e| incomplete(row, column, e))?;
                store
                    .put(TileKey::grid(row, column), &frame)
                    .map_err(|e| incomplete(row, column, e))?;
                debug!("tile ({}, {}) {}", row, column, frame.fingerprint());
                tiles.push(Tile { row, column, frame });

                if column + 1 < grid.columns {
                    self.cancel.check()?;
                    self.capture
                        .pan(controller, right)
                        .map_err(|e| incomplete(row, column + 1, e))?;
                }
            }

            if grid.columns > 1 || row + 1 < grid.rows {
                self.cancel.check()?;
            }
            for _ in 1..grid.columns {
                self.capture
                    .pan(controller, right.reversed())
                    .map_err(|e| incomplete(row, 0, e))?;
            }
            if row + 1 < grid.rows {
                self.capture
                    .pan(controller, down)
                    .map_err(|e| incomplete(row + 1, 0, e))?;
            }
        }
        Ok(tiles)
    }

    fn settle(&self) {
        if !self.settle_delay.is_zero() {
            std::thread::sleep(self.settle_delay);
        }
    }
}

fn incomplete(row: u32, column: u32, source: Error) -> Error {
    Error::IncompleteGrid {
        row,
        column,
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Fingerprint;
    use crate::store::MemoryTileStore;
    use crate::viewport::CanvasViewport;
    use image::{Rgba, RgbaImage};
    use std::collections::HashSet;

    fn scan(axis: Axis, steps: u32) -> EdgeScanResult {
        EdgeScanResult {
            axis,
            direction: Direction::Positive,
            steps_to_edge: steps,
            last_fingerprint: Fingerprint::of_image(&RgbaImage::new(1, 1)),
            pans_issued: steps + 3,
        }
    }

    fn quiet_config() -> MosaicConfig {
        MosaicConfig { settle_delay_ms: 0, retry_delay_ms: 0, ..Default::default() }
    }

    #[test]
    fn grid_dimensions_follow_step_counts() {
        let v = Viewport { width: 1280, height: 800 };
        let grid = build_grid(v, 0.75, &scan(Axis::Horizontal, 4), &scan(Axis::Vertical, 2));
        assert_eq!((grid.columns, grid.rows), (5, 3));
        assert_eq!((grid.effective_step_x, grid.effective_step_y), (960, 600));
        assert_eq!(grid.cell_count(), 15);
    }

    #[test]
    fn composite_size_accounts_for_overlap() {
        let v = Viewport { width: 1280, height: 800 };
        let grid = build_grid(v, 0.75, &scan(Axis::Horizontal, 2), &scan(Axis::Vertical, 1));
        assert_eq!(grid.composite_size(), (3200, 1400));
        assert_eq!(grid.cell_offset(1, 2), (1920, 600));
    }

    #[test]
    fn effective_step_never_collapses_to_zero() {
        assert_eq!(effective_step(10, 0.01), 1);
        assert_eq!(effective_step(10, 1.0), 10);
        assert_eq!(effective_step(1280, 0.75), 960);
    }

    #[test]
    fn cells_are_row_major() {
        let v = Viewport { width: 10, height: 10 };
        let grid = build_grid(v, 0.5, &scan(Axis::Horizontal, 1), &scan(Axis::Vertical, 1));
        let order: Vec<_> = grid.cells().collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    }

    #[test]
    fn sweep_captures_each_cell_once_and_returns_to_row_start() {
        let img = RgbaImage::from_fn(70, 50, |x, y| Rgba([x as u8, y as u8, 7, 255]));
        let mut canvas = CanvasViewport::new(img, Viewport { width: 30, height: 20 }).unwrap();
        let grid = build_grid(canvas.viewport(), 0.5, &scan(Axis::Horizontal, 3), &scan(Axis::Vertical, 2));
        let mut store = MemoryTileStore::new();

        let tiles = GridTraverser::from_config(&quiet_config(), CancelToken::new())
            .sweep(&mut canvas, &mut store, &grid)
            .unwrap();

        assert_eq!(tiles.len(), 12);
        let unique: HashSet<_> = tiles.iter().map(|t| (t.row, t.column)).collect();
        assert_eq!(unique.len(), 12);
        assert_eq!(store.grid_keys().len(), 12);
        let order: Vec<_> = tiles.iter().map(|t| (t.row, t.column)).collect();
        assert_eq!(order, grid.cells().collect::<Vec<_>>());
        assert_eq!(tiles[5].frame.image().get_pixel(0, 0), &Rgba([15, 10, 7, 255]));
        assert_eq!(canvas.position(), (0, 20));
    }

    #[test]
    fn sweep_failure_reports_the_cell() {
        let img = RgbaImage::from_pixel(40, 40, Rgba([1, 1, 1, 255]));
        let mut canvas = CanvasViewport::new(img, Viewport { width: 20, height: 20 }).unwrap();
        let grid = build_grid(canvas.viewport(), 0.5, &scan(Axis::Horizontal, 1), &scan(Axis::Vertical, 1));
        canvas.fail_next_captures(10);
        let err = GridTraverser::from_config(&quiet_config(), CancelToken::new())
            .sweep(&mut canvas, &mut MemoryTileStore::new(), &grid)
            .unwrap_err();
        match err {
            Error::IncompleteGrid { row, column, source } => {
                assert_eq!((row, column), (0, 0));
                assert!(matches!(*source, Error::Capture { attempts: 3, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn sweep_pan_failure_names_the_target_cell() {
        let img = RgbaImage::from_pixel(40, 40, Rgba([1, 1, 1, 255]));
        let mut canvas = CanvasViewport::new(img, Viewport { width: 20, height: 20 }).unwrap();
        let grid = build_grid(canvas.viewport(), 0.5, &scan(Axis::Horizontal, 1), &scan(Axis::Vertical, 1));
        canvas.fail_next_pans(10);
        let mut store = MemoryTileStore::new();
        let err = GridTraverser::from_config(&quiet_config(), CancelToken::new())
            .sweep(&mut canvas, &mut store, &grid)
            .unwrap_err();
        match err {
            Error::IncompleteGrid { row, column, source } => {
                assert_eq!((row, column), (0, 1));
                match *source {
                    Error::Capture { attempts, source } => {
                        assert_eq!(attempts, 3);
                        assert!(matches!(*source, Error::Pan(_)));
                    }
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(store.grid_keys(), vec![(0, 0)]);
    }

    struct RejectingStore;

    impl TileStore for RejectingStore {
        fn put(&mut self, _key: TileKey, _frame: &ViewportFrame) -> Result<()> {
            Err(Error::Store("disk full".into()))
        }

        fn get(&self, _key: TileKey) -> Result<Option<ViewportFrame>> {
            Ok(None)
        }
    }

    #[test]
    fn sweep_store_failure_names_the_cell() {
        let img = RgbaImage::from_pixel(40, 40, Rgba([1, 1, 1, 255]));
        let mut canvas = CanvasViewport::new(img, Viewport { width: 20, height: 20 }).unwrap();
        let grid = build_grid(canvas.viewport(), 0.5, &scan(Axis::Horizontal, 1), &scan(Axis::Vertical, 1));
        let err = GridTraverser::from_config(&quiet_config(), CancelToken::new())
            .sweep(&mut canvas, &mut RejectingStore, &grid)
            .unwrap_err();
        match err {
            Error::IncompleteGrid { row, column, source } => {
                assert_eq!((row, column), (0, 0));
                assert!(matches!(*source, Error::Store(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn empty_grid_size_does_not_underflow() {
        let v = Viewport { width: 10, height: 8 };
        let mut grid = build_grid(v, 0.5, &scan(Axis::Horizontal, 2), &scan(Axis::Vertical, 2));
        grid.columns = 0;
        grid.rows = 0;
        assert_eq!(grid.cell_count(), 0);
        assert_eq!(grid.composite_size(), (10, 8));
    }

    #[test]
    fn rehome_reverses_net_displacement() {
        let img = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255]));
        let mut canvas = CanvasViewport::new(img, Viewport { width: 20, height: 20 }).unwrap();
        canvas.pan(PanDelta::new(60, 40)).unwrap();
        let grid = build_grid(canvas.viewport(), 0.5, &scan(Axis::Horizontal, 3), &scan(Axis::Vertical, 2));
        let resolved = |axis, net| ResolvedAxis { result: scan(axis, 0), fallback_used: false, net_steps: net };

        GridTraverser::from_config(&quiet_config(), CancelToken::new())
            .rehome(&mut canvas, &grid, &resolved(Axis::Horizontal, 6), &resolved(Axis::Vertical, 4))
            .unwrap();

        assert_eq!(canvas.position(), (0, 0));
        // 6 + 4 reversals, 2 overshoot and 1 alignment cycle per axis
        assert_eq!(canvas.pan_count(), 1 + 10 + 2 * (2 + 2));
    }
}
