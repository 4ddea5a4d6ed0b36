//! Text-safe form of the encoded payload and the storage field limit.
//!
//! The document store keeps the image in a string field as a data URL
//! (`data:image/jpeg;base64,...`). Base64 inflates the payload by a third,
//! so a payload right at the 780 KiB binary budget still comes out at about
//! 1.06M characters, over the field limit. Anything up to 786_348 bytes fits.
//! This check runs strictly after fitting and never feeds back into it: an
//! over-limit result is a hard rejection for that asset.

use crate::types::EncodedAsset;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Maximum characters the destination text field accepts.
pub const FIRESTORE_FIELD_MAX: usize = 1_048_487;

/// The data URL of an encoded asset together with its length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextualRepresentation {
    pub text: String,
    /// Characters in `text`. Base64 and the prefix are ASCII, so this is also
    /// its byte length.
    pub length: usize,
}

impl TextualRepresentation {
    pub fn data_url(mime_type: &str, data: &[u8]) -> Self {
        let text = format!("data:{mime_type};base64,{}", STANDARD.encode(data));
        let length = text.len();
        Self { text, length }
    }
}

/// Outcome of [`TextualSizeValidator::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextualCheck {
    pub textual: TextualRepresentation,
    pub within_limit: bool,
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextualSizeValidator {
    pub limit: usize,
}

impl Default for TextualSizeValidator {
    fn default() -> Self {
        Self {
            limit: FIRESTORE_FIELD_MAX,
        }
    }
}

impl TextualSizeValidator {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn validate(&self, asset: &EncodedAsset) -> TextualCheck {
        let textual = TextualRepresentation::data_url(&asset.mime_type, &asset.data);
        TextualCheck {
            within_limit: textual.length <= self.limit,
            limit: self.limit,
            textual,
        }
    }
}

/// Plain base64 without the data-URL prefix, as sent to the enrichment service.
pub fn to_raw_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}
