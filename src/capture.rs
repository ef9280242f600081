//! Frame capture with bounded retries
//!
//! This is the only layer that calls `ViewportController::capture_frame`.
//! Transient renderer failures are retried a fixed number of times with a
//! fixed delay between attempts, then escalated as `Error::Capture`.

use crate::viewport::{PanDelta, ViewportController};
use crate::{Error, MosaicConfig, Result};
use image::RgbaImage;
use log::{debug, warn};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

/// SHA-256 content hash of a frame, used as a cheap equality proxy.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Hash dimensions and raw pixel bytes of an image.
    pub fn of_image(image: &RgbaImage) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(image.width().to_le_bytes());
        hasher.update(image.height().to_le_bytes());
        hasher.update(image.as_raw());
        Self(hasher.finalize().into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..12])
    }
}

/// One still image captured from the viewport.
#[derive(Clone)]
pub struct ViewportFrame {
    image: RgbaImage,
    fingerprint: Fingerprint,
}

impl ViewportFrame {
    pub fn new(image: RgbaImage) -> Self {
        let fingerprint = Fingerprint::of_image(&image);
        Self { image, fingerprint }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}

impl fmt::Debug for ViewportFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewportFrame")
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

/// Retry policy around the controller's pan and capture primitives.
#[derive(Debug, Clone)]
pub struct FrameCapture {
    attempts: u32,
    retry_delay: Duration,
}

impl FrameCapture {
    pub fn new(attempts: u32, retry_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            retry_delay,
        }
    }

    pub fn from_config(config: &MosaicConfig) -> Self {
        Self::new(config.capture_retry_count, Duration::from_millis(config.retry_delay_ms))
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Capture the current frame, retrying transient failures.
    pub fn capture(&self, controller: &mut dyn ViewportController) -> Result<ViewportFrame> {
        self.with_retries("capture", || {
            let image = controller.capture_frame()?;
            if image.width() == 0 || image.height() == 0 {
                return Err(Error::RenderUnavailable("renderer returned an empty image".into()));
            }
            Ok(ViewportFrame::new(image))
        })
    }

    /// Pan by `delta`, retrying when the surface reports it is unreachable.
    pub fn pan(&self, controller: &mut dyn ViewportController, delta: PanDelta) -> Result<()> {
        self.with_retries("pan", || controller.pan(delta))
    }

    fn with_retries<T>(&self, what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt < self.attempts => {
                    warn!("{} attempt {}/{} failed: {}; retrying", what, attempt, self.attempts, e);
                    attempt += 1;
                    if !self.retry_delay.is_zero() {
                        std::thread::sleep(self.retry_delay);
                    }
                }
                Err(e) if e.is_transient() => {
                    debug!("{} giving up after {} attempt(s)", what, attempt);
                    return Err(Error::Capture {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for FrameCapture {
    fn default() -> Self {
        Self::from_config(&MosaicConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewport::CanvasViewport;
    use crate::Viewport;
    use image::Rgba;

    fn canvas() -> CanvasViewport {
        let img = RgbaImage::from_fn(20, 20, |x, y| Rgba([x as u8, y as u8, 0, 255]));
        CanvasViewport::new(img, Viewport { width: 10, height: 10 }).unwrap()
    }

    #[test]
    fn fingerprint_is_idempotent() {
        let img = RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 4]));
        assert_eq!(Fingerprint::of_image(&img), Fingerprint::of_image(&img.clone()));
    }

    #[test]
    fn one_byte_changes_fingerprint() {
        let a = RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 4]));
        let mut b = a.clone();
        b.get_pixel_mut(7, 7).0[3] = 5;
        assert_ne!(Fingerprint::of_image(&a), Fingerprint::of_image(&b));
    }

    #[test]
    fn fingerprint_covers_dimensions() {
        let wide = RgbaImage::from_pixel(4, 2, Rgba([0, 0, 0, 0]));
        let tall = RgbaImage::from_pixel(2, 4, Rgba([0, 0, 0, 0]));
        assert_ne!(Fingerprint::of_image(&wide), Fingerprint::of_image(&tall));
        assert_eq!(Fingerprint::of_image(&wide).to_hex().len(), 64);
    }

    #[test]
    fn capture_retries_transient_failures() {
        let mut c = canvas();
        c.fail_next_captures(2);
        let fc = FrameCapture::new(3, Duration::ZERO);
        let frame = fc.capture(&mut c).expect("third attempt succeeds");
        assert_eq!(frame.dimensions(), (10, 10));
    }

    #[test]
    fn capture_escalates_after_exhausting_retries() {
        let mut c = canvas();
        c.fail_next_captures(3);
        let fc = FrameCapture::new(3, Duration::ZERO);
        match fc.capture(&mut c) {
            Err(Error::Capture { attempts, source }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, Error::RenderUnavailable(_)));
            }
            other => panic!("expected capture error, got {:?}", other),
        }
    }

    #[test]
    fn pan_retries_until_the_window_moves() {
        let mut c = canvas();
        c.fail_next_pans(2);
        let fc = FrameCapture::new(3, Duration::ZERO);
        fc.pan(&mut c, PanDelta::new(5, 0)).expect("third attempt succeeds");
        assert_eq!(c.position(), (5, 0));
        assert_eq!(c.pan_count(), 1);
    }

    #[test]
    fn pan_escalates_after_exhausting_retries() {
        let mut c = canvas();
        c.fail_next_pans(3);
        let fc = FrameCapture::new(3, Duration::ZERO);
        match fc.pan(&mut c, PanDelta::new(5, 0)) {
            Err(Error::Capture { attempts, source }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, Error::Pan(_)));
            }
            other => panic!("expected capture error, got {:?}", other),
        }
        assert_eq!(c.position(), (0, 0));
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let fc = FrameCapture::new(0, Duration::ZERO);
        assert_eq!(fc.attempts(), 1);
        assert!(fc.capture(&mut canvas()).is_ok());
    }
}
