//! Parameter types for image operations.
//!
//! These structs describe *what* to encode, not *how*. They are the interface
//! between the fitting loop in [`operations`](super::operations), which
//! decides the next pass, and the [`backend`](super::backend), which does the
//! pixel work. Keeping them separate lets the loop run against a mock backend.
//!
//! ## Types
//!
//! - [`Quality`]: lossy encoding quality held as an integer percent (1–100).
//!   The fitting loop steps it in whole points so its schedule is exact.
//! - [`EncodeParams`]: target dimensions and quality for one encode pass.

use serde::{Deserialize, Serialize};

/// Quality setting for lossy image encoding (1-100).
///
/// Callers usually think in fractions (`0.85`); [`Quality::from_fraction`]
/// and [`Quality::as_fraction`] convert at the edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    /// Convert a `0.0..=1.0` quality factor, rounding to the nearest percent.
    pub fn from_fraction(fraction: f64) -> Self {
        Self::new((fraction * 100.0).round().max(0.0) as u32)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    pub fn as_fraction(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Lower by `step` points without going below `floor`.
    pub fn step_down(self, step: u32, floor: Quality) -> Self {
        Self::new(self.0.saturating_sub(step).max(floor.0))
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(85)
    }
}

/// Parameters for one encode pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeParams {
    pub width: u32,
    pub height: u32,
    pub quality: Quality,
}
