//! Viewport controller surface: relative pans and frame grabs
//!
//! The core never knows where the viewport actually is. Every component
//! reasons in `PanDelta`s and step counts; only a controller implementation
//! (the renderer itself) may hold real position state.

pub mod canvas;

pub use canvas::CanvasViewport;

use crate::{Result, Viewport};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pan axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Horizontal,
    Vertical,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Horizontal => write!(f, "horizontal"),
            Axis::Vertical => write!(f, "vertical"),
        }
    }
}

/// Sign of a pan along an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Positive,
    Negative,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Positive => Direction::Negative,
            Direction::Negative => Direction::Positive,
        }
    }

    pub fn sign(self) -> i32 {
        match self {
            Direction::Positive => 1,
            Direction::Negative => -1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Positive => write!(f, "positive"),
            Direction::Negative => write!(f, "negative"),
        }
    }
}

/// A relative move request in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PanDelta {
    pub dx: i32,
    pub dy: i32,
}

impl PanDelta {
    pub fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }

    /// One step of `magnitude` pixels along `axis` in `direction`.
    pub fn along(axis: Axis, direction: Direction, magnitude: u32) -> Self {
        let signed = direction.sign() * magnitude as i32;
        match axis {
            Axis::Horizontal => Self { dx: signed, dy: 0 },
            Axis::Vertical => Self { dx: 0, dy: signed },
        }
    }

    pub fn reversed(self) -> Self {
        Self { dx: -self.dx, dy: -self.dy }
    }
}

/// The renderer-facing surface the pipeline drives.
///
/// Implementations must bound every call with their own timeout; the core
/// calls them strictly sequentially.
pub trait ViewportController {
    /// Dimensions of a captured frame
    fn viewport(&self) -> Viewport;

    /// Request a relative move. Fails with `Error::Pan` if the surface is
    /// unreachable, in which case no move happened.
    fn pan(&mut self, delta: PanDelta) -> Result<()>;

    /// Grab the currently rendered image. Fails with
    /// `Error::RenderUnavailable` when nothing usable is rendered.
    fn capture_frame(&mut self) -> Result<RgbaImage>;
}

impl<T: ViewportController + ?Sized> ViewportController for Box<T> {
    fn viewport(&self) -> Viewport {
        (**self).viewport()
    }

    fn pan(&mut self, delta: PanDelta) -> Result<()> {
        (**self).pan(delta)
    }

    fn capture_frame(&mut self) -> Result<RgbaImage> {
        (**self).capture_frame()
    }
}
