//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations the fitting loop
//! needs: decode a payload once, report its dimensions, and encode it at a
//! given size and quality as many times as the loop asks.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend). Tests use the
//! recording mock below.

use super::params::EncodeParams;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode failed: {0}")]
    DecodeFailed(String),
    #[error("Encode failed: {0}")]
    EncodeFailed(String),
}

/// Pixel dimensions of a decoded bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Trait for raster backends.
///
/// `Bitmap` is whatever in-memory form the backend decodes to. The fitting
/// loop decodes once and then calls [`encode`](ImageBackend::encode) against
/// the same bitmap on every pass, so each pass resamples from the source
/// rather than from a previous, already-degraded output.
pub trait ImageBackend: Sync {
    type Bitmap;

    /// MIME type of the payloads [`encode`](ImageBackend::encode) produces.
    fn output_mime(&self) -> &'static str;

    /// Decode an encoded payload into a bitmap.
    fn decode(&self, data: &[u8]) -> Result<Self::Bitmap, BackendError>;

    /// Dimensions of a decoded bitmap.
    fn dimensions(&self, bitmap: &Self::Bitmap) -> Dimensions;

    /// Rasterize the bitmap at the requested size and encode it.
    fn encode(
        &self,
        bitmap: &Self::Bitmap,
        params: &EncodeParams,
    ) -> Result<Vec<u8>, BackendError>;
}
