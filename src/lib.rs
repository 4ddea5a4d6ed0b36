//! # Vitrine
//!
//! Image ingestion for a small product catalogue. A photo the seller uploads
//! (phone HEIC, camera JPEG, screenshot PNG) becomes a single document in a
//! key-value store, with the image itself inlined as a data URL and, when a
//! generation service is configured, a suggested title and description.
//!
//! # Architecture: Four-Stage Pipeline
//!
//! ```text
//! 1. Normalize  legacy container (HEIC/HEIF/AVIF) → JPEG, or keep the original
//! 2. Fit        downscale once, then re-encode until ≤ 780 KiB or 8 passes
//! 3. Validate   base64 data URL must fit the store's field limit
//! 4. Enrich     ask the generation service for a title/description (optional)
//! ```
//!
//! Each call owns an [`ingest::IngestionSession`]; stages hand values forward
//! and nothing mutable is shared between concurrent ingestions. The only
//! process-wide state is the lazily loaded legacy converter in
//! [`normalize`].
//!
//! Failures are graded by stage. A failed legacy conversion or a failed
//! enrichment call is logged and absorbed. A decode failure or an asset whose
//! text form exceeds the field limit rejects that asset. Running out of
//! encode passes is not an error at all: the asset is kept and flagged.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`types`] | Per-ingestion values: `SourceAsset`, `NormalizedAsset`, `EncodedAsset` |
//! | [`imaging`] | Decode, resample and JPEG-encode; the size-fitting loop |
//! | [`normalize`] | Legacy format detection and lazily loaded conversion |
//! | [`textual`] | Data-URL form and the field-limit check |
//! | [`enrich`] | Generation service client: transport, retry, response parsing |
//! | [`ingest`] | Stage orchestration and the parallel batch driver |
//! | [`store`] | Document store trait and the JSON-file implementation |
//! | [`config`] | `vitrine.toml` loading, merging and validation |
//! | [`output`] | CLI output formatting |

pub mod config;
pub mod enrich;
pub mod imaging;
pub mod ingest;
pub mod normalize;
pub mod output;
pub mod store;
pub mod textual;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
