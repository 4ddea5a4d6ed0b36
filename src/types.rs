//! Per-ingestion data model shared across pipeline stages.
//!
//! Every value here is created fresh for one ingestion and dropped when the
//! orchestrator returns. Nothing is cached between calls.

use crate::imaging::Quality;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The original user-supplied binary.
///
/// Immutable once received. The MIME type is whatever the uploader declared
/// (or what the file extension suggests when read from disk); it is a hint,
/// not a guarantee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAsset {
    pub file_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl SourceAsset {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Read an asset from disk, guessing the MIME type from the extension.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let data = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string();
        Ok(Self::new(file_name, mime_type, data))
    }

    pub fn byte_size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// A [`SourceAsset`] after format normalization.
///
/// When conversion fails the original asset is carried through untouched and
/// `conversion_error` records why; that is never fatal on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedAsset {
    pub asset: SourceAsset,
    pub converted_from_legacy_format: bool,
    pub conversion_error: Option<String>,
}

impl NormalizedAsset {
    pub fn unchanged(asset: SourceAsset) -> Self {
        Self {
            asset,
            converted_from_legacy_format: false,
            conversion_error: None,
        }
    }
}

/// One pass of the fitting loop. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingAttempt {
    /// 1-based pass number.
    pub pass: u32,
    pub width: u32,
    pub height: u32,
    pub quality: Quality,
    pub byte_size: u64,
}

/// How the fitting loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitStatus {
    /// The last pass produced `byte_size <= max_bytes`.
    WithinBudget,
    /// `max_passes` ran out first; the last encoding is returned anyway.
    BudgetExhausted,
}

/// Terminal output of the size-fitting encoder.
///
/// `byte_size <= max_bytes` holds unless `status` is
/// [`FitStatus::BudgetExhausted`], in which case `pass_count == max_passes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAsset {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub quality: Quality,
    pub byte_size: u64,
    pub pass_count: u32,
    pub status: FitStatus,
    pub attempts: Vec<EncodingAttempt>,
}

impl EncodedAsset {
    pub fn within_budget(&self) -> bool {
        self.status == FitStatus::WithinBudget
    }
}

/// Descriptive text derived from the image by the enrichment service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub title: Option<String>,
    pub description: Option<String>,
}

impl EnrichmentResult {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none()
    }
}
