//! Chrome DevTools Protocol viewport controller

use crate::viewport::{PanDelta, ViewportController};
use crate::{Error, MosaicConfig, Result, Viewport};
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Input::{DispatchMouseEvent, DispatchMouseEventTypeOption, MouseButton};
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions};
use image::{imageops, RgbaImage};
use log::debug;
use std::sync::Arc;
use std::time::Duration;

/// How a pan request is turned into input for the page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanMode {
    /// Press, drag and release the left mouse button (slippy maps, canvases)
    Drag,
    /// `window.scrollBy` (ordinary scrolling documents)
    Scroll,
}

/// Number of intermediate mouse-move events per drag
const DRAG_SEGMENTS: i32 = 8;

/// CDP-backed viewport (uses the `headless_chrome` crate)
///
/// Launches a headless Chrome sized to the configured viewport and drives a
/// single tab. `call_timeout_ms` bounds navigation waits and how long the
/// browser may go without answering a protocol call.
pub struct CdpViewport {
    browser: Browser,
    tab: Arc<Tab>,
    viewport: Viewport,
    mode: PanMode,
}

impl CdpViewport {
    pub fn launch(config: &MosaicConfig, mode: PanMode) -> Result<Self> {
        let viewport = config.viewport;
        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .window_size(Some((viewport.width, viewport.height)))
            .idle_browser_timeout(Duration::from_millis(config.call_timeout_ms))
            .build()
            .map_err(|e| Error::CdpError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::CdpError(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::CdpError(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(Duration::from_millis(config.call_timeout_ms));

        Ok(Self {
            browser,
            tab,
            viewport,
            mode,
        })
    }

    /// Load `url` and wait for navigation to finish.
    pub fn navigate(&self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .map_err(|e| Error::CdpError(format!("Navigation failed: {}", e)))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| Error::CdpError(format!("Wait for navigation failed: {}", e)))?;
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        drop(self.tab);
        drop(self.browser);
        Ok(())
    }

    fn mouse(&self, kind: DispatchMouseEventTypeOption, x: f64, y: f64, pressed: bool) -> Result<()> {
        self.tab
            .call_method(DispatchMouseEvent {
                Type: kind,
                x,
                y,
                modifiers: None,
                timestamp: None,
                button: Some(if pressed { MouseButton::Left } else { MouseButton::None }),
                buttons: Some(if pressed { 1 } else { 0 }),
                click_count: Some(if pressed { 1 } else { 0 }),
                force: None,
                tangential_pressure: None,
                tilt_x: None,
                tilt_y: None,
                twist: None,
                delta_x: None,
                delta_y: None,
                pointer_Type: None,
            })
            .map_err(|e| Error::Pan(format!("Mouse event failed: {}", e)))?;
        Ok(())
    }

    /// Moving the window by `delta` means dragging the content the other way.
    fn drag(&self, delta: PanDelta) -> Result<()> {
        let cx = self.viewport.width as f64 / 2.0;
        let cy = self.viewport.height as f64 / 2.0;
        let (tx, ty) = (cx - delta.dx as f64, cy - delta.dy as f64);

        self.mouse(DispatchMouseEventTypeOption::MouseMoved, cx, cy, false)?;
        self.mouse(DispatchMouseEventTypeOption::MousePressed, cx, cy, true)?;
        for i in 1..=DRAG_SEGMENTS {
            let t = i as f64 / DRAG_SEGMENTS as f64;
            self.mouse(
                DispatchMouseEventTypeOption::MouseMoved,
                cx + (tx - cx) * t,
                cy + (ty - cy) * t,
                true,
            )?;
        }
        self.mouse(DispatchMouseEventTypeOption::MouseReleased, tx, ty, true)
    }

    fn scroll(&self, delta: PanDelta) -> Result<()> {
        self.tab
            .evaluate(&format!("window.scrollBy({}, {})", delta.dx, delta.dy), false)
            .map_err(|e| Error::Pan(format!("Scroll failed: {}", e)))?;
        Ok(())
    }
}

impl ViewportController for CdpViewport {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn pan(&mut self, delta: PanDelta) -> Result<()> {
        debug!("cdp pan {:?} via {:?}", delta, self.mode);
        match self.mode {
            PanMode::Drag => self.drag(delta),
            PanMode::Scroll => self.scroll(delta),
        }
    }

    fn capture_frame(&mut self) -> Result<RgbaImage> {
        // Clip rectangles are in document coordinates and would ignore the
        // scroll offset, so the visible viewport is captured whole.
        let png = self
            .tab
            .capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(|e| Error::RenderUnavailable(format!("Screenshot failed: {}", e)))?;

        let decoded = image::load_from_memory_with_format(&png, image::ImageFormat::Png)
            .map_err(|e| Error::RenderUnavailable(format!("Undecodable screenshot: {}", e)))?;
        fit_to_viewport(decoded.to_rgba8(), self.viewport)
    }
}

/// Trim a screenshot to the configured viewport. Smaller shots are an error.
fn fit_to_viewport(image: RgbaImage, viewport: Viewport) -> Result<RgbaImage> {
    let (width, height) = image.dimensions();
    if width < viewport.width || height < viewport.height {
        return Err(Error::RenderUnavailable(format!(
            "screenshot {}x{} is smaller than viewport {}x{}",
            width, height, viewport.width, viewport.height
        )));
    }
    if (width, height) == (viewport.width, viewport.height) {
        return Ok(image);
    }
    Ok(imageops::crop_imm(&image, 0, 0, viewport.width, viewport.height).to_image())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_screenshots_are_trimmed_to_the_viewport() {
        let viewport = Viewport { width: 4, height: 3 };
        let shot = RgbaImage::from_fn(6, 5, |x, y| image::Rgba([x as u8, y as u8, 0, 255]));
        let fitted = fit_to_viewport(shot, viewport).unwrap();
        assert_eq!(fitted.dimensions(), (4, 3));
        assert_eq!(fitted.get_pixel(3, 2), &image::Rgba([3, 2, 0, 255]));

        let small = RgbaImage::new(3, 3);
        assert!(matches!(fit_to_viewport(small, viewport), Err(Error::RenderUnavailable(_))));
    }

    #[test]
    fn test_cdp_viewport_launch() {
        // This test requires Chrome to be installed, so we skip it in CI
        if std::env::var("CI").is_ok() {
            return;
        }
        let config = MosaicConfig {
            viewport: Viewport { width: 320, height: 240 },
            ..Default::default()
        };
        match CdpViewport::launch(&config, PanMode::Scroll) {
            Ok(mut v) => {
                assert_eq!(v.viewport(), config.viewport);
                let frame = v.capture_frame();
                assert!(frame.is_ok(), "blank tab should still render: {:?}", frame.err());
                v.close().unwrap();
            }
            Err(e) => eprintln!("Skipping CDP launch test because Chrome is not available: {}", e),
        }
    }
}
