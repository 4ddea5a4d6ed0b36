//! Raster backend on top of the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::load_from_memory` (format sniffed from bytes) |
//! | Rasterize | `DynamicImage::resize_exact` with the `Triangle` (bilinear) filter |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder::new_with_quality` |
//!
//! Bilinear resampling matches what a browser canvas does when drawing a
//! bitmap at a new size, and keeps an eight-pass fit affordable at 1400px.
//! JPEG has no alpha channel, so every pass flattens to RGB first.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::params::EncodeParams;
use image::imageops::FilterType;
use image::{DynamicImage, ImageEncoder};

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend {
    filter: FilterType,
}

impl RustBackend {
    pub fn new() -> Self {
        Self {
            filter: FilterType::Triangle,
        }
    }

    /// Use a different resampling filter (e.g. `Lanczos3` for sharper output).
    pub fn with_filter(filter: FilterType) -> Self {
        Self { filter }
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode an RGB bitmap as baseline JPEG at the given quality (1–100).
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, BackendError> {
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality)
        .write_image(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| BackendError::EncodeFailed(format!("JPEG encode failed: {e}")))?;
    Ok(buf)
}

impl ImageBackend for RustBackend {
    type Bitmap = DynamicImage;

    fn output_mime(&self) -> &'static str {
        "image/jpeg"
    }

    fn decode(&self, data: &[u8]) -> Result<DynamicImage, BackendError> {
        image::load_from_memory(data)
            .map_err(|e| BackendError::DecodeFailed(format!("Failed to decode image: {e}")))
    }

    fn dimensions(&self, bitmap: &DynamicImage) -> Dimensions {
        Dimensions {
            width: bitmap.width(),
            height: bitmap.height(),
        }
    }

    fn encode(
        &self,
        bitmap: &DynamicImage,
        params: &EncodeParams,
    ) -> Result<Vec<u8>, BackendError> {
        let quality = params.quality.value() as u8;
        if (bitmap.width(), bitmap.height()) == (params.width, params.height) {
            return encode_jpeg(bitmap, quality);
        }
        let resized = bitmap.resize_exact(params.width, params.height, self.filter);
        encode_jpeg(&resized, quality)
    }
}
