//! Format normalization: camera-native containers become plain JPEG.
//!
//! Phones hand over HEIF-family files (`.heic`, `.heif`, `.avif`) that the
//! raster backend cannot decode. [`FormatNormalizer::normalize`] detects them
//! by extension or declared MIME type and converts them to JPEG at quality 95
//! before anything else touches the payload.
//!
//! ## Failure is not fatal
//!
//! Conversion can fail for two reasons: the conversion capability cannot be
//! loaded, or the payload is not something it understands (HEVC-coded HEIC,
//! truncated uploads). Either way the original asset is passed through with
//! the reason attached, and the pipeline carries on. Whether the raster
//! backend can then make sense of it is the fitting stage's problem.
//!
//! ## Lazy capability
//!
//! The converter is loaded the first time a legacy asset shows up, through a
//! [`ConverterSlot`]. A successful load is kept for the life of the process;
//! a failed one keeps nothing, so the next legacy asset tries again. Two
//! threads racing on first use may both load; one handle wins and the other
//! is dropped.

use crate::imaging::BackendError;
use crate::imaging::avif;
use crate::imaging::rust_backend::encode_jpeg;
use crate::types::{NormalizedAsset, SourceAsset};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// Extensions of HEIF-family containers, lowercase.
pub const LEGACY_EXTENSIONS: &[&str] = &["heic", "heif", "hif", "avif"];

/// Declared MIME types of HEIF-family containers, lowercase.
pub const LEGACY_MIME_TYPES: &[&str] = &[
    "image/heic",
    "image/heif",
    "image/x-heic",
    "image/x-heif",
    "image/heic-sequence",
    "image/heif-sequence",
    "image/avif",
];

/// JPEG quality used for converted assets.
pub const CONVERSION_QUALITY: u8 = 95;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("conversion capability unavailable: {0}")]
    Unavailable(String),
    #[error("conversion failed: {0}")]
    Conversion(#[from] BackendError),
}

/// Something that turns a legacy container into a standard raster file.
pub trait LegacyConverter: Send + Sync {
    fn convert(&self, asset: &SourceAsset) -> Result<SourceAsset, NormalizeError>;
}

/// Converts AV1-coded HEIF via `avif-parse` + `rav1d`, re-encoding to JPEG.
pub struct Rav1dConverter;

impl LegacyConverter for Rav1dConverter {
    fn convert(&self, asset: &SourceAsset) -> Result<SourceAsset, NormalizeError> {
        let bitmap = avif::decode_avif(&asset.data)?;
        let jpeg = encode_jpeg(&bitmap, CONVERSION_QUALITY)?;
        Ok(SourceAsset::new(
            jpeg_file_name(&asset.file_name),
            "image/jpeg",
            jpeg,
        ))
    }
}

/// Loads a converter. Called at most once per successful load.
pub type ConverterLoader = fn() -> Result<Arc<dyn LegacyConverter>, NormalizeError>;

/// Lazily loaded, shareable conversion capability.
pub struct ConverterSlot {
    handle: OnceLock<Arc<dyn LegacyConverter>>,
    loader: ConverterLoader,
    loads: AtomicUsize,
}

impl ConverterSlot {
    pub const fn new(loader: ConverterLoader) -> Self {
        Self {
            handle: OnceLock::new(),
            loader,
            loads: AtomicUsize::new(0),
        }
    }

    /// The loaded converter, loading it now if nothing is cached yet.
    pub fn get(&self) -> Result<Arc<dyn LegacyConverter>, NormalizeError> {
        if let Some(handle) = self.handle.get() {
            return Ok(Arc::clone(handle));
        }
        self.loads.fetch_add(1, Ordering::Relaxed);
        let loaded = (self.loader)()?;
        Ok(Arc::clone(self.handle.get_or_init(|| loaded)))
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.get().is_some()
    }

    /// Number of load attempts so far, failed ones included.
    pub fn load_attempts(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }
}

fn load_rav1d() -> Result<Arc<dyn LegacyConverter>, NormalizeError> {
    avif::probe_decoder().map_err(|e| NormalizeError::Unavailable(e.to_string()))?;
    tracing::debug!("AV1 conversion capability loaded");
    Ok(Arc::new(Rav1dConverter))
}

static SHARED_CONVERTER: ConverterSlot = ConverterSlot::new(load_rav1d);

/// The process-wide converter slot.
pub fn shared_converter() -> &'static ConverterSlot {
    &SHARED_CONVERTER
}

/// Whether a file name or declared MIME type names a HEIF-family container.
pub fn is_legacy_format(file_name: &str, mime_type: &str) -> bool {
    let ext_match = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| LEGACY_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    ext_match || LEGACY_MIME_TYPES.contains(&essence.as_str())
}

/// `IMG_0042.HEIC` → `IMG_0042.jpg`. Names without an extension gain one.
pub fn jpeg_file_name(file_name: &str) -> String {
    Path::new(file_name)
        .with_extension("jpg")
        .to_string_lossy()
        .into_owned()
}

/// Detects legacy containers and converts them through a [`ConverterSlot`].
pub struct FormatNormalizer<'a> {
    slot: &'a ConverterSlot,
}

impl<'a> FormatNormalizer<'a> {
    pub fn new(slot: &'a ConverterSlot) -> Self {
        Self { slot }
    }

    /// Normalize one asset. Never fails; see the module docs.
    pub fn normalize(&self, asset: SourceAsset) -> NormalizedAsset {
        if !is_legacy_format(&asset.file_name, &asset.mime_type) {
            return NormalizedAsset::unchanged(asset);
        }

        let converted = self.slot.get().and_then(|converter| converter.convert(&asset));
        match converted {
            Ok(converted) => {
                tracing::debug!(
                    from = %asset.file_name,
                    to = %converted.file_name,
                    "converted legacy format"
                );
                NormalizedAsset {
                    asset: converted,
                    converted_from_legacy_format: true,
                    conversion_error: None,
                }
            }
            Err(e) => {
                tracing::warn!(file = %asset.file_name, error = %e, "legacy conversion failed, using original");
                NormalizedAsset {
                    asset,
                    converted_from_legacy_format: false,
                    conversion_error: Some(e.to_string()),
                }
            }
        }
    }
}

impl Default for FormatNormalizer<'static> {
    fn default() -> Self {
        Self::new(shared_converter())
    }
}
