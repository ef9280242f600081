//! Error types for the mosaic pipeline

use crate::viewport::{Axis, Direction};
use thiserror::Error;

/// Result type alias for mosaic operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while scanning, sweeping or stitching
#[derive(Error, Debug)]
pub enum Error {
    /// The viewport could not be panned (surface unreachable)
    #[error("Pan failed: {0}")]
    Pan(String),

    /// The renderer returned no image for the current frame
    #[error("Render unavailable: {0}")]
    RenderUnavailable(String),

    /// Frame capture kept failing after all retries
    #[error("Capture failed after {attempts} attempt(s): {source}")]
    Capture {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// The iteration cap was reached before frames stopped changing
    #[error("No edge found scanning {axis} {direction} after {iterations} pans")]
    EdgeNotFound {
        axis: Axis,
        direction: Direction,
        iterations: u32,
    },

    /// Neither direction of an axis reached an edge
    #[error("Axis {0} is unresolvable: no edge in either direction")]
    AxisUnresolved(Axis),

    /// A grid cell could not be captured during the sweep
    #[error("Grid sweep incomplete at row {row}, column {column}: {source}")]
    IncompleteGrid {
        row: u32,
        column: u32,
        #[source]
        source: Box<Error>,
    },

    /// A grid cell has no stored tile
    #[error("Missing tile at row {row}, column {column}")]
    MissingTile { row: u32, column: u32 },

    /// A stored tile does not have the grid's tile dimensions
    #[error("Tile at row {row}, column {column} is {actual:?}, expected {expected:?}")]
    TileSizeMismatch {
        row: u32,
        column: u32,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// The run was cancelled at a step boundary
    #[error("Run cancelled")]
    Cancelled,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Tile store failure
    #[error("Tile store error: {0}")]
    Store(String),

    /// Image encode/decode failure
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CDP-specific error
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    CdpError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the Frame Capture layer may retry after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Pan(_) | Error::RenderUnavailable(_))
    }
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}
