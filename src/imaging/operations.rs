//! High-level image operations.
//!
//! [`fit_to_budget`] combines the pure calculations with backend execution:
//! it decodes once, applies a single initial downscale, then re-encodes until
//! the output fits the byte budget or the pass limit runs out.
//!
//! ```text
//! pass 1   1400x1050 q85   912 KiB  over
//! pass 2   1400x1050 q75   801 KiB  over
//! pass 3   1400x1050 q65   702 KiB  fits → WithinBudget
//! ```
//!
//! Quality drops in steps of 10 down to `min_quality`; only then do the
//! dimensions decay by 0.90 per pass. The pass limit bounds the loop for
//! inputs that never compress (noise), which end as
//! [`FitStatus::BudgetExhausted`] rather than an error.

use super::backend::{BackendError, ImageBackend};
use super::calculations::{NextStep, fit_within, next_step};
use super::params::{EncodeParams, Quality};
use crate::types::{EncodedAsset, EncodingAttempt, FitStatus};

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Binary budget for an encoded asset: 780 KiB.
///
/// Its base64 form is ~4/3 larger; the textual check in [`crate::textual`]
/// is what finally decides whether the asset can be stored.
pub const TARGET_MAX_BLOB_BYTES: u64 = 780 * 1024;

/// Configuration for the fitting loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FitConfig {
    pub max_width: u32,
    pub max_height: u32,
    pub quality_start: Quality,
    pub min_quality: Quality,
    pub max_bytes: u64,
    pub max_passes: u32,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_width: 1400,
            max_height: 1400,
            quality_start: Quality::new(85),
            min_quality: Quality::new(35),
            max_bytes: TARGET_MAX_BLOB_BYTES,
            max_passes: 8,
        }
    }
}

/// Re-encode `data` until it fits `config.max_bytes` or passes run out.
///
/// At least one pass always runs. A source already within budget at its
/// (possibly downscaled) size returns after that single pass at
/// `quality_start`. Decode and encode failures propagate; running out of
/// passes does not.
pub fn fit_to_budget<B: ImageBackend>(
    backend: &B,
    data: &[u8],
    config: &FitConfig,
) -> Result<EncodedAsset> {
    let bitmap = backend.decode(data)?;
    let source = backend.dimensions(&bitmap);
    let max_passes = config.max_passes.max(1);

    let (mut width, mut height) = fit_within(
        source.as_tuple(),
        (config.max_width, config.max_height),
    );
    let mut quality = config.quality_start;
    let mut attempts = Vec::new();

    loop {
        let pass = attempts.len() as u32 + 1;
        let params = EncodeParams {
            width,
            height,
            quality,
        };
        let encoded = backend.encode(&bitmap, &params)?;
        let byte_size = encoded.len() as u64;
        attempts.push(EncodingAttempt {
            pass,
            width,
            height,
            quality,
            byte_size,
        });
        tracing::debug!(pass, width, height, quality = quality.value(), byte_size, "encode pass");

        let status = if byte_size <= config.max_bytes {
            Some(FitStatus::WithinBudget)
        } else if pass >= max_passes {
            Some(FitStatus::BudgetExhausted)
        } else {
            None
        };

        if let Some(status) = status {
            return Ok(EncodedAsset {
                data: encoded,
                mime_type: backend.output_mime().to_string(),
                width,
                height,
                quality,
                byte_size,
                pass_count: pass,
                status,
                attempts,
            });
        }

        match next_step(quality, config.min_quality, (width, height)) {
            NextStep::LowerQuality(next) => quality = next,
            NextStep::Shrink {
                width: w,
                height: h,
            } => {
                width = w;
                height = h;
            }
        }
    }
}
