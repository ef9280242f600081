//! RFox Mosaic
//!
//! Reconstructs one large image from content that does not fit in a single
//! viewport. The pipeline pans an opaque rendering surface, detects its edges
//! by watching for frames that stop changing, sweeps the resulting tile grid
//! and stitches the captures together.
//!
//! # Pipeline
//!
//! - **Frame Capture** ([`capture`]): grabs frames with bounded retries
//! - **Edge Scanner** ([`scanner`]): pans until the frame stops changing
//! - **Grid Traverser** ([`grid`]): re-homes and captures one tile per cell
//! - **Stitcher** ([`stitch`]): composites tiles, last writer wins
//!
//! # Example
//!
//! ```no_run
//! use rfmosaic::store::MemoryTileStore;
//! use rfmosaic::viewport::CanvasViewport;
//! use rfmosaic::{Mosaic, MosaicConfig, Viewport};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MosaicConfig {
//!     viewport: Viewport { width: 1280, height: 800 },
//!     step_fraction: 0.75,
//!     ..Default::default()
//! };
//!
//! let source = image::open("large.png")?.to_rgba8();
//! let mut controller = CanvasViewport::new(source, config.viewport)?;
//! let mut store = MemoryTileStore::new();
//!
//! let output = Mosaic::new(config)?.run(&mut controller, &mut store)?;
//! output.composite.save_png("composite.png")?;
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub mod error;
pub use error::{Error, Result};

pub mod capture;
pub mod grid;
pub mod scanner;
pub mod stitch;
pub mod store;
pub mod viewport;

#[cfg(feature = "cdp")]
pub mod cdp;

// Async-friendly facade (worker thread owns the controller)
pub mod async_api;

pub use async_api::MosaicWorker;
pub use capture::{Fingerprint, FrameCapture, ViewportFrame};
pub use grid::{build_grid, GridSpec, GridTraverser, Tile};
pub use scanner::{EdgeScanResult, EdgeScanner, ResolvedAxis, ScanAttempt};
pub use stitch::{stitch, CompositeImage};
pub use store::{DirTileStore, MemoryTileStore, TileKey, TileStore};
pub use viewport::{Axis, Direction, PanDelta, ViewportController};

/// Configuration for a mosaic run
///
/// Defaults follow a 1280x720 viewport stepped by three quarters of its size
/// (25% overlap between neighbouring tiles).
///
/// # Examples
///
/// ```
/// let cfg = rfmosaic::MosaicConfig::default();
/// assert_eq!(cfg.identical_run_threshold, 3);
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MosaicConfig {
    /// Viewport dimensions
    pub viewport: Viewport,
    /// Fraction of the viewport advanced per pan, in (0, 1]
    pub step_fraction: f64,
    /// Wait after each pan before capturing, in milliseconds
    pub settle_delay_ms: u64,
    /// Consecutive identical frames that declare an edge
    pub identical_run_threshold: u32,
    /// Attempts per capture (and per pan) before giving up
    pub capture_retry_count: u32,
    /// Wait between retry attempts, in milliseconds
    pub retry_delay_ms: u64,
    /// Maximum pans per edge scan branch
    pub edge_scan_iteration_cap: u32,
    /// Timeout applied by adapters to every renderer call, in milliseconds
    pub call_timeout_ms: u64,
    /// Extra steps pushed toward the origin corner after re-homing
    pub rehome_overshoot_steps: u32,
    /// Away-and-back pan cycles per axis before the sweep starts
    pub alignment_cycles: u32,
    /// Direction tried first when scanning the horizontal axis
    pub preferred_horizontal: Direction,
    /// Direction tried first when scanning the vertical axis
    pub preferred_vertical: Direction,
}

impl Default for MosaicConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            step_fraction: 0.75,
            settle_delay_ms: 300,
            identical_run_threshold: 3,
            capture_retry_count: 3,
            retry_delay_ms: 250,
            edge_scan_iteration_cap: 2000,
            call_timeout_ms: 30000,
            rehome_overshoot_steps: 2,
            alignment_cycles: 1,
            preferred_horizontal: Direction::Positive,
            preferred_vertical: Direction::Positive,
        }
    }
}

impl MosaicConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(Error::ConfigError("viewport must be non-empty".into()));
        }
        if !(self.step_fraction > 0.0 && self.step_fraction <= 1.0) {
            return Err(Error::ConfigError(format!(
                "step_fraction must be in (0, 1], got {}",
                self.step_fraction
            )));
        }
        if self.identical_run_threshold == 0 {
            return Err(Error::ConfigError("identical_run_threshold must be at least 1".into()));
        }
        if self.capture_retry_count == 0 {
            return Err(Error::ConfigError("capture_retry_count must be at least 1".into()));
        }
        if self.edge_scan_iteration_cap == 0 {
            return Err(Error::ConfigError("edge_scan_iteration_cap must be at least 1".into()));
        }
        Ok(())
    }

    /// Load and validate a JSON configuration file. Missing keys take their
    /// defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: MosaicConfig = serde_json::from_str(&text)
            .map_err(|e| Error::ConfigError(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Size along `axis`.
    pub fn extent(&self, axis: Axis) -> u32 {
        match axis {
            Axis::Horizontal => self.width,
            Axis::Vertical => self.height,
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Shared flag observed between discrete pipeline steps.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Error::Cancelled)` once `cancel` has been called.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Everything a completed run produced.
#[derive(Debug)]
pub struct MosaicOutput {
    pub grid: GridSpec,
    pub horizontal: ResolvedAxis,
    pub vertical: ResolvedAxis,
    pub composite: CompositeImage,
}

/// Runs the scan, re-home, sweep and stitch phases in order.
pub struct Mosaic {
    config: MosaicConfig,
    cancel: CancelToken,
}

impl Mosaic {
    pub fn new(config: MosaicConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancelToken::new(),
        })
    }

    /// Observe `cancel` instead of a private token.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &MosaicConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Scan both axes and derive the grid. Leaves the viewport at the far
    /// corner.
    pub fn discover(
        &self,
        controller: &mut dyn ViewportController,
        store: &mut dyn TileStore,
    ) -> Result<(GridSpec, ResolvedAxis, ResolvedAxis)> {
        let capture = FrameCapture::from_config(&self.config);
        let scanner = EdgeScanner::from_config(&self.config, self.cancel.clone());

        let origin = capture.capture(controller)?;
        log::info!("origin frame {}", origin.fingerprint());

        let horizontal = scanner.scan_with_fallback(
            controller,
            store,
            Axis::Horizontal,
            self.config.preferred_horizontal,
            origin.fingerprint(),
        )?;
        let vertical = scanner.scan_with_fallback(
            controller,
            store,
            Axis::Vertical,
            self.config.preferred_vertical,
            horizontal.result.last_fingerprint,
        )?;

        let grid = build_grid(
            controller.viewport(),
            self.config.step_fraction,
            &horizontal.result,
            &vertical.result,
        );
        log::info!(
            "grid {} x {} ({}x{} tiles, step {}x{})",
            grid.columns,
            grid.rows,
            grid.tile_width,
            grid.tile_height,
            grid.effective_step_x,
            grid.effective_step_y
        );
        Ok((grid, horizontal, vertical))
    }

    /// Run the whole pipeline. Either every cell is captured and stitched or
    /// the run fails without a composite.
    pub fn run(
        &self,
        controller: &mut dyn ViewportController,
        store: &mut dyn TileStore,
    ) -> Result<MosaicOutput> {
        let (grid, horizontal, vertical) = self.discover(controller, store)?;

        let traverser = GridTraverser::from_config(&self.config, self.cancel.clone());
        traverser.rehome(controller, &grid, &horizontal, &vertical)?;
        let tiles = traverser.sweep(controller, store, &grid)?;
        log::info!("captured {} tile(s)", tiles.len());
        drop(tiles);

        let composite = stitch(&grid, store)?;
        Ok(MosaicOutput {
            grid,
            horizontal,
            vertical,
            composite,
        })
    }
}
