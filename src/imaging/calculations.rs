//! Pure calculation functions for the fitting loop.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::Quality;

/// Quality points removed per pass while quality is above the floor (0.10).
pub const QUALITY_STEP: u32 = 10;

/// Linear dimension decay per pass once quality sits at the floor.
pub const SHRINK_FACTOR: f64 = 0.9;

/// Scale dimensions down to fit inside a bounding box, preserving aspect ratio.
///
/// Images already inside the box are returned unchanged; this never upscales.
/// A single uniform ratio `min(max_w / w, max_h / h)` is applied and each
/// edge is rounded to the nearest pixel (never below 1).
///
/// # Examples
/// ```
/// # use vitrine::imaging::calculations::fit_within;
/// assert_eq!(fit_within((4000, 3000), (1400, 1400)), (1400, 1050));
/// assert_eq!(fit_within((800, 600), (1400, 1400)), (800, 600));
/// ```
pub fn fit_within(source: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (max_w, max_h) = bounds;

    if src_w <= max_w && src_h <= max_h {
        return source;
    }

    let ratio = (max_w as f64 / src_w as f64).min(max_h as f64 / src_h as f64);
    (scale_edge(src_w, ratio), scale_edge(src_h, ratio))
}

/// Shrink both edges by [`SHRINK_FACTOR`].
pub fn shrink(dims: (u32, u32)) -> (u32, u32) {
    (scale_edge(dims.0, SHRINK_FACTOR), scale_edge(dims.1, SHRINK_FACTOR))
}

fn scale_edge(edge: u32, ratio: f64) -> u32 {
    ((edge as f64 * ratio).round() as u32).max(1)
}

/// What the next pass changes after an over-budget encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// Re-encode at the same size with lower quality.
    LowerQuality(Quality),
    /// Quality is at the floor; re-encode smaller.
    Shrink { width: u32, height: u32 },
}

/// Decide the next pass: quality is exhausted before resolution is touched.
pub fn next_step(quality: Quality, min_quality: Quality, dims: (u32, u32)) -> NextStep {
    if quality > min_quality {
        NextStep::LowerQuality(quality.step_down(QUALITY_STEP, min_quality))
    } else {
        let (width, height) = shrink(dims);
        NextStep::Shrink { width, height }
    }
}
