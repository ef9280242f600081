//! Synthetic viewport over an in-memory image
//!
//! Pans a window across a larger `RgbaImage`, clamping at the image bounds so
//! that panning past an edge renders the same frame again. This is the
//! renderer stand-in used by tests, benches and the `replay` command.

use super::{PanDelta, ViewportController};
use crate::{Error, Result, Viewport};
use image::{imageops, RgbaImage};
use log::debug;

pub struct CanvasViewport {
    source: RgbaImage,
    viewport: Viewport,
    x: u32,
    y: u32,
    pans: u64,
    captures: u64,
    failing_captures: u32,
    failing_pans: u32,
}

impl CanvasViewport {
    /// Create a viewport anchored at the top-left corner of `source`.
    pub fn new(source: RgbaImage, viewport: Viewport) -> Result<Self> {
        if viewport.width == 0 || viewport.height == 0 {
            return Err(Error::ConfigError("viewport must be non-empty".into()));
        }
        if source.width() < viewport.width || source.height() < viewport.height {
            return Err(Error::ConfigError(format!(
                "canvas {}x{} is smaller than viewport {}x{}",
                source.width(),
                source.height(),
                viewport.width,
                viewport.height
            )));
        }
        Ok(Self {
            source,
            viewport,
            x: 0,
            y: 0,
            pans: 0,
            captures: 0,
            failing_captures: 0,
            failing_pans: 0,
        })
    }

    /// Make the next `n` captures fail with `RenderUnavailable`.
    pub fn fail_next_captures(&mut self, n: u32) {
        self.failing_captures = n;
    }

    /// Make the next `n` pans fail with `Pan` without moving the window.
    pub fn fail_next_pans(&mut self, n: u32) {
        self.failing_pans = n;
    }

    /// Renderer-side window offset. Never consulted by the pipeline.
    pub fn position(&self) -> (u32, u32) {
        (self.x, self.y)
    }

    pub fn pan_count(&self) -> u64 {
        self.pans
    }

    pub fn capture_count(&self) -> u64 {
        self.captures
    }

    fn clamp(value: i64, max: u32) -> u32 {
        value.clamp(0, max as i64) as u32
    }
}

impl ViewportController for CanvasViewport {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn pan(&mut self, delta: PanDelta) -> Result<()> {
        if self.failing_pans > 0 {
            self.failing_pans -= 1;
            return Err(Error::Pan("canvas pan suppressed".into()));
        }
        let max_x = self.source.width() - self.viewport.width;
        let max_y = self.source.height() - self.viewport.height;
        self.x = Self::clamp(self.x as i64 + delta.dx as i64, max_x);
        self.y = Self::clamp(self.y as i64 + delta.dy as i64, max_y);
        self.pans += 1;
        debug!("canvas pan {:?} -> ({}, {})", delta, self.x, self.y);
        Ok(())
    }

    fn capture_frame(&mut self) -> Result<RgbaImage> {
        if self.failing_captures > 0 {
            self.failing_captures -= 1;
            return Err(Error::RenderUnavailable("canvas capture suppressed".into()));
        }
        self.captures += 1;
        let window = imageops::crop_imm(
            &self.source,
            self.x,
            self.y,
            self.viewport.width,
            self.viewport.height,
        );
        Ok(window.to_image())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| Rgba([x as u8, y as u8, (x ^ y) as u8, 255]))
    }

    #[test]
    fn pans_clamp_at_canvas_bounds() {
        let mut c = CanvasViewport::new(gradient(100, 60), Viewport { width: 40, height: 30 }).unwrap();
        c.pan(PanDelta::new(50, 0)).unwrap();
        assert_eq!(c.position(), (50, 0));
        c.pan(PanDelta::new(50, 100)).unwrap();
        assert_eq!(c.position(), (60, 30));
        c.pan(PanDelta::new(-500, -1)).unwrap();
        assert_eq!(c.position(), (0, 29));
        assert_eq!(c.pan_count(), 3);
    }

    #[test]
    fn capture_crops_the_current_window() {
        let mut c = CanvasViewport::new(gradient(100, 60), Viewport { width: 40, height: 30 }).unwrap();
        c.pan(PanDelta::new(10, 5)).unwrap();
        let frame = c.capture_frame().unwrap();
        assert_eq!(frame.dimensions(), (40, 30));
        assert_eq!(frame.get_pixel(0, 0), &Rgba([10, 5, 10 ^ 5, 255]));
    }

    #[test]
    fn injected_failures_are_consumed() {
        let mut c = CanvasViewport::new(gradient(50, 50), Viewport { width: 50, height: 50 }).unwrap();
        c.fail_next_captures(1);
        assert!(matches!(c.capture_frame(), Err(Error::RenderUnavailable(_))));
        assert!(c.capture_frame().is_ok());
        assert_eq!(c.capture_count(), 1);

        c.fail_next_pans(1);
        assert!(matches!(c.pan(PanDelta::new(10, 0)), Err(Error::Pan(_))));
        assert_eq!((c.position(), c.pan_count()), ((0, 0), 0));
    }

    #[test]
    fn rejects_canvas_smaller_than_viewport() {
        let res = CanvasViewport::new(gradient(10, 10), Viewport { width: 20, height: 5 });
        assert!(matches!(res, Err(Error::ConfigError(_))));
    }
}
