//! Edge scanning: pan until the rendered frame stops changing
//!
//! An edge is declared once `identical_run_threshold` consecutive captures
//! carry the same fingerprint as the frame before them. The pans inside that
//! identical run did not move the content, so they are not counted in
//! `steps_to_edge`.

use crate::capture::{Fingerprint, FrameCapture};
use crate::grid::effective_step;
use crate::store::{TileKey, TileStore};
use crate::viewport::{Axis, Direction, PanDelta, ViewportController};
use crate::{CancelToken, Error, MosaicConfig, Result};
use log::{debug, info, warn};
use std::time::Duration;

/// Outcome of a successful scan along one axis/direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeScanResult {
    pub axis: Axis,
    pub direction: Direction,
    /// Pans that changed the frame before the edge was declared
    pub steps_to_edge: u32,
    /// Fingerprint of the final, edge-indicating frame
    pub last_fingerprint: Fingerprint,
    /// Every pan issued, including the identical run
    pub pans_issued: u32,
}

/// Result of one scan branch: either an edge or a typed "no edge" signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanAttempt {
    Reached(EdgeScanResult),
    NoEdge {
        axis: Axis,
        direction: Direction,
        pans_issued: u32,
        last_fingerprint: Fingerprint,
    },
}

/// An axis resolved by `scan_with_fallback`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAxis {
    pub result: EdgeScanResult,
    pub fallback_used: bool,
    /// Net dead-reckoned displacement along the axis, in steps, across every
    /// branch that was tried.
    pub net_steps: i64,
}

impl ResolvedAxis {
    pub fn direction(&self) -> Direction {
        self.result.direction
    }
}

pub struct EdgeScanner {
    capture: FrameCapture,
    step_fraction: f64,
    settle_delay: Duration,
    threshold: u32,
    iteration_cap: u32,
    cancel: CancelToken,
}

impl EdgeScanner {
    pub fn from_config(config: &MosaicConfig, cancel: CancelToken) -> Self {
        Self {
            capture: FrameCapture::from_config(config),
            step_fraction: config.step_fraction,
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            threshold: config.identical_run_threshold.max(1),
            iteration_cap: config.edge_scan_iteration_cap,
            cancel,
        }
    }

    /// Pan along `axis` in `direction` until the edge condition holds.
    ///
    /// Fails with `Error::EdgeNotFound` once the iteration cap is reached.
    pub fn scan_axis(
        &self,
        controller: &mut dyn ViewportController,
        store: &mut dyn TileStore,
        axis: Axis,
        direction: Direction,
        initial: Fingerprint,
    ) -> Result<EdgeScanResult> {
        match self.attempt(controller, store, axis, direction, initial)? {
            ScanAttempt::Reached(result) => Ok(result),
            ScanAttempt::NoEdge { pans_issued, .. } => Err(Error::EdgeNotFound {
                axis,
                direction,
                iterations: pans_issued,
            }),
        }
    }

    /// One scan branch. Only the iteration cap maps to `NoEdge`; any other
    /// failure is returned as an error.
    pub fn attempt(
        &self,
        controller: &mut dyn ViewportController,
        store: &mut dyn TileStore,
        axis: Axis,
        direction: Direction,
        initial: Fingerprint,
    ) -> Result<ScanAttempt> {
        let viewport = controller.viewport();
        let step = effective_step(viewport.extent(axis), self.step_fraction);
        let delta = PanDelta::along(axis, direction, step);

        let mut previous = initial;
        let mut identical_run = 0u32;
        let mut pans = 0u32;

        debug!("scanning {} {} with step {}px", axis, direction, step);
        while pans < self.iteration_cap {
            self.cancel.check()?;
            self.capture.pan(controller, delta)?;
            pans += 1;
            if !self.settle_delay.is_zero() {
                std::thread::sleep(self.settle_delay);
            }

            let frame = self.capture.capture(controller)?;
            store.put(TileKey::Scan { axis, direction, step: pans }, &frame)?;

            if frame.fingerprint() == previous {
                identical_run += 1;
            } else {
                identical_run = 0;
                previous = frame.fingerprint();
            }

            if identical_run >= self.threshold {
                let result = EdgeScanResult {
                    axis,
                    direction,
                    steps_to_edge: pans - self.threshold,
                    last_fingerprint: previous,
                    pans_issued: pans,
                };
                info!(
                    "edge reached scanning {} {}: {} step(s), {} pan(s)",
                    axis, direction, result.steps_to_edge, pans
                );
                return Ok(ScanAttempt::Reached(result));
            }
        }

        Ok(ScanAttempt::NoEdge {
            axis,
            direction,
            pans_issued: pans,
            last_fingerprint: previous,
        })
    }

    /// Scan `preferred` first and, if it never settles, the opposite
    /// direction once.
    pub fn scan_with_fallback(
        &self,
        controller: &mut dyn ViewportController,
        store: &mut dyn TileStore,
        axis: Axis,
        preferred: Direction,
        initial: Fingerprint,
    ) -> Result<ResolvedAxis> {
        let (first_pans, fallback_from) =
            match self.attempt(controller, store, axis, preferred, initial)? {
                ScanAttempt::Reached(result) => {
                    let net_steps = preferred.sign() as i64 * result.pans_issued as i64;
                    return Ok(ResolvedAxis { result, fallback_used: false, net_steps });
                }
                ScanAttempt::NoEdge { pans_issued, last_fingerprint, .. } => {
                    (pans_issued, last_fingerprint)
                }
            };

        let fallback = preferred.opposite();
        warn!(
            "no edge scanning {} {} after {} pans; falling back to {}",
            axis, preferred, first_pans, fallback
        );

        match self.attempt(controller, store, axis, fallback, fallback_from)? {
            ScanAttempt::Reached(result) => {
                let net_steps = preferred.sign() as i64 * first_pans as i64
                    + fallback.sign() as i64 * result.pans_issued as i64;
                Ok(ResolvedAxis { result, fallback_used: true, net_steps })
            }
            ScanAttempt::NoEdge { .. } => Err(Error::AxisUnresolved(axis)),
        }
    }
}
