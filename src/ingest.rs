//! Ingestion orchestrator.
//!
//! One user-submitted image goes through four stages, strictly in order:
//!
//! ```text
//! SourceAsset
//!   → normalize   legacy container → JPEG (failure: keep original)
//!   → fit         re-encode until ≤ max_bytes or passes run out
//!   → validate    data URL length ≤ field limit (failure: reject asset)
//!   → enrich      title/description from the image (failure: skip)
//!   → IngestReport { StoredRecord, status, attempts, ... }
//! ```
//!
//! State travels in an explicit [`IngestionSession`] owned by the call, so
//! any number of ingestions can run side by side without sharing anything
//! but the read-only [`Ingestor`].
//!
//! ## Abandoning
//!
//! [`IngestOptions::deadline`] (absolute) and [`IngestOptions::timeout`]
//! (counted from the moment [`Ingestor::ingest`] starts that asset) are
//! checked before each stage. Once the earlier of the two has passed the call
//! returns [`IngestError::Abandoned`] naming the stage it did not start. No
//! stage holds a lock, so abandoning leaves nothing behind.
//!
//! In a batch the timeout clock starts per file, so files still queued on the
//! pool are not charged for the time their predecessors took.
//!
//! ## Batches
//!
//! [`ingest_files`] runs many files in parallel on the rayon pool, one
//! session per file, reporting [`IngestEvent`]s over a channel and writing
//! accepted records to a [`DocumentStore`].

use crate::enrich::EnrichmentClient;
use crate::imaging::{BackendError, FitConfig, ImageBackend, fit_to_budget};
use crate::normalize::{FormatNormalizer, LEGACY_EXTENSIONS};
use crate::store::{DocumentStore, StoreError, StoredRecord};
use crate::textual::{TextualCheck, TextualSizeValidator};
use crate::types::{
    EncodedAsset, EncodingAttempt, EnrichmentResult, FitStatus, NormalizedAsset, SourceAsset,
};
use rayon::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};
use thiserror::Error;
use walkdir::WalkDir;

/// Existing titles shorter than this (trimmed) get filled by enrichment.
pub const MIN_TITLE_CHARS: usize = 2;
/// Existing descriptions shorter than this (trimmed) get filled by enrichment.
pub const MIN_DESCRIPTION_CHARS: usize = 5;
pub const MAX_TITLE_CHARS: usize = 60;
pub const MAX_DESCRIPTION_CHARS: usize = 240;

/// Raster extensions picked up when walking a directory.
pub const RASTER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "webp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Normalize,
    Fit,
    Validate,
    Enrich,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Normalize => "normalize",
            Stage::Fit => "fit",
            Stage::Validate => "validate",
            Stage::Enrich => "enrich",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image processing failed for {file}: {source}")]
    Imaging {
        file: String,
        #[source]
        source: BackendError,
    },
    #[error(
        "asset could not be reduced below the storage limit ({length} > {limit} characters)"
    )]
    TextualLimitExceeded { length: usize, limit: usize },
    #[error("ingestion abandoned before the {stage} stage")]
    Abandoned { stage: Stage },
    #[error("could not store record: {0}")]
    Store(#[from] StoreError),
}

/// Text the uploader already provided. Enrichment only fills what is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductHints {
    pub title: Option<String>,
    pub description: Option<String>,
}

impl ProductHints {
    fn needs_title(&self) -> bool {
        char_len(self.title.as_deref()) < MIN_TITLE_CHARS
    }

    fn needs_description(&self) -> bool {
        char_len(self.description.as_deref()) < MIN_DESCRIPTION_CHARS
    }
}

fn char_len(text: Option<&str>) -> usize {
    text.map(|t| t.trim().chars().count()).unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Absolute cut-off shared by every ingestion using these options.
    pub deadline: Option<Instant>,
    /// Per-asset allowance, started when that asset's ingestion begins.
    pub timeout: Option<Duration>,
    pub enrich: bool,
    pub hints: ProductHints,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            deadline: None,
            timeout: None,
            enrich: true,
            hints: ProductHints::default(),
        }
    }
}

impl IngestOptions {
    /// Effective deadline for an ingestion that started at `start`.
    pub fn deadline_from(&self, start: Instant) -> Option<Instant> {
        let relative = self.timeout.and_then(|t| start.checked_add(t));
        match (self.deadline, relative) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

fn checkpoint(deadline: Option<Instant>, stage: Stage) -> Result<(), IngestError> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => {
            tracing::info!(%stage, "deadline passed, abandoning ingestion");
            Err(IngestError::Abandoned { stage })
        }
        _ => Ok(()),
    }
}

/// Per-call state carried from stage to stage.
#[derive(Debug, Clone)]
pub struct IngestionSession {
    pub original_file_name: String,
    pub original_byte_size: u64,
    /// The asset every later stage works from.
    pub working: NormalizedAsset,
    pub enrichment: EnrichmentResult,
    pub completed: Vec<Stage>,
}

impl IngestionSession {
    fn start(original_file_name: String, original_byte_size: u64, working: NormalizedAsset) -> Self {
        Self {
            original_file_name,
            original_byte_size,
            working,
            enrichment: EnrichmentResult::default(),
            completed: vec![Stage::Normalize],
        }
    }

    fn into_report(
        self,
        encoded: EncodedAsset,
        check: TextualCheck,
        hints: &ProductHints,
    ) -> IngestReport {
        let title = self
            .enrichment
            .title
            .clone()
            .or_else(|| non_blank(hints.title.as_deref()));
        let description = self
            .enrichment
            .description
            .clone()
            .or_else(|| non_blank(hints.description.as_deref()));

        let record = StoredRecord {
            binary_encoded_as_text: check.textual.text,
            width: encoded.width,
            height: encoded.height,
            quality: encoded.quality.as_fraction(),
            original_file_name: self.original_file_name,
            original_byte_size: self.original_byte_size,
            converted_from_legacy_format: self.working.converted_from_legacy_format,
            title,
            description,
            byte_size: encoded.byte_size,
            passes: encoded.pass_count,
            within_budget: encoded.within_budget(),
        };

        IngestReport {
            record,
            status: encoded.status,
            attempts: encoded.attempts,
            text_length: check.textual.length,
            conversion_error: self.working.conversion_error,
            enrichment: self.enrichment,
            completed: self.completed,
        }
    }
}

fn non_blank(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Terminal result of one successful ingestion.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub record: StoredRecord,
    pub status: FitStatus,
    pub attempts: Vec<EncodingAttempt>,
    /// Characters in the stored data URL.
    pub text_length: usize,
    /// Why legacy conversion failed, when it did.
    pub conversion_error: Option<String>,
    /// Text derived by enrichment (before merging with hints).
    pub enrichment: EnrichmentResult,
    pub completed: Vec<Stage>,
}

impl IngestReport {
    pub fn within_budget(&self) -> bool {
        self.status == FitStatus::WithinBudget
    }
}

/// Runs the stages for one asset at a time. Shareable across threads.
pub struct Ingestor<'a, B: ImageBackend> {
    backend: &'a B,
    normalizer: FormatNormalizer<'a>,
    enricher: &'a EnrichmentClient,
    fit: FitConfig,
    validator: TextualSizeValidator,
}

impl<'a, B: ImageBackend> Ingestor<'a, B> {
    pub fn new(
        backend: &'a B,
        normalizer: FormatNormalizer<'a>,
        enricher: &'a EnrichmentClient,
    ) -> Self {
        Self {
            backend,
            normalizer,
            enricher,
            fit: FitConfig::default(),
            validator: TextualSizeValidator::default(),
        }
    }

    pub fn with_fit(mut self, fit: FitConfig) -> Self {
        self.fit = fit;
        self
    }

    pub fn with_validator(mut self, validator: TextualSizeValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn fit_config(&self) -> &FitConfig {
        &self.fit
    }

    /// Normalize, fit and validate only. No enrichment, no report.
    pub fn check(
        &self,
        source: SourceAsset,
    ) -> Result<(NormalizedAsset, EncodedAsset, TextualCheck), IngestError> {
        let normalized = self.normalizer.normalize(source);
        let encoded = self.fit_stage(&normalized)?;
        let check = self.validator.validate(&encoded);
        Ok((normalized, encoded, check))
    }

    /// Title and description for an image, derived from its fitted encoding.
    ///
    /// Nothing is validated or stored. An unconfigured client yields an empty
    /// result.
    pub fn describe(&self, source: SourceAsset) -> Result<EnrichmentResult, IngestError> {
        let normalized = self.normalizer.normalize(source);
        let encoded = self.fit_stage(&normalized)?;
        Ok(self.enrich(&encoded, &ProductHints::default()))
    }

    /// Run every stage for one asset.
    pub fn ingest(
        &self,
        source: SourceAsset,
        options: &IngestOptions,
    ) -> Result<IngestReport, IngestError> {
        let deadline = options.deadline_from(Instant::now());
        checkpoint(deadline, Stage::Normalize)?;
        let original_file_name = source.file_name.clone();
        let original_byte_size = source.byte_size();
        let normalized = self.normalizer.normalize(source);
        let mut session = IngestionSession::start(original_file_name, original_byte_size, normalized);

        checkpoint(deadline, Stage::Fit)?;
        let encoded = self.fit_stage(&session.working)?;
        session.completed.push(Stage::Fit);
        if !encoded.within_budget() {
            tracing::warn!(
                file = %session.original_file_name,
                passes = encoded.pass_count,
                byte_size = encoded.byte_size,
                max_bytes = self.fit.max_bytes,
                "byte budget not met"
            );
        }

        checkpoint(deadline, Stage::Validate)?;
        let check = self.validator.validate(&encoded);
        if !check.within_limit {
            return Err(IngestError::TextualLimitExceeded {
                length: check.textual.length,
                limit: check.limit,
            });
        }
        session.completed.push(Stage::Validate);

        if options.enrich {
            checkpoint(deadline, Stage::Enrich)?;
            session.enrichment = self.enrich(&encoded, &options.hints);
            session.completed.push(Stage::Enrich);
        }

        let report = session.into_report(encoded, check, &options.hints);
        tracing::info!(
            file = %report.record.original_file_name,
            width = report.record.width,
            height = report.record.height,
            byte_size = report.record.byte_size,
            passes = report.record.passes,
            "asset accepted"
        );
        Ok(report)
    }

    fn fit_stage(&self, normalized: &NormalizedAsset) -> Result<EncodedAsset, IngestError> {
        fit_to_budget(self.backend, &normalized.asset.data, &self.fit).map_err(|source| {
            IngestError::Imaging {
                file: normalized.asset.file_name.clone(),
                source,
            }
        })
    }

    /// Fill whatever the hints leave missing. Never fails.
    fn enrich(&self, encoded: &EncodedAsset, hints: &ProductHints) -> EnrichmentResult {
        let need_title = hints.needs_title();
        let need_description = hints.needs_description();
        if !(need_title || need_description) || !self.enricher.is_configured() {
            return EnrichmentResult::default();
        }

        let mut result = EnrichmentResult::default();
        let combined = match self.enricher.describe_and_title(&encoded.data, &encoded.mime_type) {
            Ok(combined) => combined,
            Err(e) => {
                tracing::warn!(error = %e, "title/description enrichment failed");
                None
            }
        };

        match combined {
            Some(combined) => {
                if need_title {
                    result.title = non_blank(Some(&truncate_chars(combined.title.trim(), MAX_TITLE_CHARS)));
                }
                if need_description {
                    result.description = non_blank(Some(&truncate_chars(
                        combined.description.trim(),
                        MAX_DESCRIPTION_CHARS,
                    )));
                }
            }
            None if need_description => {
                result.description = self
                    .enricher
                    .describe_image(&encoded.data, &encoded.mime_type)
                    .map(|d| truncate_chars(&d, MAX_DESCRIPTION_CHARS));
            }
            None => {}
        }
        result
    }
}

// ============================================================================
// Batch driver
// ============================================================================

/// Progress of a batch, one event per file transition.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    Accepted {
        index: usize,
        source: String,
        id: Option<String>,
        record: Box<StoredRecord>,
        converted: bool,
        conversion_error: Option<String>,
    },
    Rejected {
        index: usize,
        source: String,
        reason: String,
    },
}

#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: Result<(IngestReport, Option<String>), IngestError>,
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub outcomes: Vec<FileOutcome>,
}

impl BatchSummary {
    pub fn accepted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn rejected(&self) -> usize {
        self.outcomes.len() - self.accepted()
    }

    pub fn over_budget(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(&o.result, Ok((r, _)) if !r.within_budget()))
            .count()
    }
}

/// Expand directories into the image files beneath them, sorted.
///
/// Files named explicitly are kept whatever their extension; files found by
/// walking must have a raster or legacy extension.
pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>, IngestError> {
    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }
        let mut found: Vec<PathBuf> = WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && has_image_extension(e.path()))
            .map(|e| e.into_path())
            .collect();
        found.sort();
        files.extend(found);
    }
    Ok(files)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            RASTER_EXTENSIONS.contains(&e.as_str()) || LEGACY_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// Ingest every file in parallel and store the accepted ones.
///
/// Each file gets its own session. Outcomes come back in input order.
pub fn ingest_files<B: ImageBackend>(
    ingestor: &Ingestor<'_, B>,
    files: &[PathBuf],
    options: &IngestOptions,
    store: Option<&dyn DocumentStore>,
    progress: Option<Sender<IngestEvent>>,
) -> BatchSummary {
    let outcomes = files
        .par_iter()
        .enumerate()
        .map_with(progress, |progress, (index, path)| {
            let result = ingest_one(ingestor, path, options, store);
            if let Some(tx) = progress {
                let source = path.display().to_string();
                let event = match &result {
                    Ok((report, id)) => IngestEvent::Accepted {
                        index,
                        source,
                        id: id.clone(),
                        record: Box::new(report.record.clone()),
                        converted: report.record.converted_from_legacy_format,
                        conversion_error: report.conversion_error.clone(),
                    },
                    Err(e) => IngestEvent::Rejected {
                        index,
                        source,
                        reason: e.to_string(),
                    },
                };
                tx.send(event).ok();
            }
            FileOutcome {
                path: path.clone(),
                result,
            }
        })
        .collect();
    BatchSummary { outcomes }
}

fn ingest_one<B: ImageBackend>(
    ingestor: &Ingestor<'_, B>,
    path: &Path,
    options: &IngestOptions,
    store: Option<&dyn DocumentStore>,
) -> Result<(IngestReport, Option<String>), IngestError> {
    let source = SourceAsset::from_path(path).map_err(|source| IngestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let report = ingestor.ingest(source, options)?;
    let id = store.map(|s| s.put(&report.record)).transpose()?;
    Ok((report, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::retry::tests::RecordingSleeper;
    use crate::enrich::transport::tests::ScriptedTransport;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp, proportional_size};
    use crate::imaging::{EncodeParams, RustBackend};
    use crate::normalize::{ConverterSlot, LegacyConverter, NormalizeError};
    use crate::store::FsStore;
    use crate::test_helpers::{avif_bytes, jpeg_asset, jpeg_bytes};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn no_converter() -> Result<Arc<dyn LegacyConverter>, NormalizeError> {
        Err(NormalizeError::Unavailable("disabled in tests".into()))
    }

    fn small(_: &EncodeParams) -> u64 {
        1_000
    }

    fn over_field_limit(_: &EncodeParams) -> u64 {
        900_000
    }

    fn asset() -> SourceAsset {
        SourceAsset::new("ring.jpg", "image/jpeg", vec![0; 64])
    }

    fn enricher(transport: ScriptedTransport) -> (EnrichmentClient, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        let client = EnrichmentClient::new(Box::new(Arc::clone(&transport)))
            .with_sleeper(Box::new(RecordingSleeper::default()));
        (client, transport)
    }

    fn no_enrich() -> IngestOptions {
        IngestOptions {
            enrich: false,
            ..IngestOptions::default()
        }
    }

    // =========================================================================
    // Single ingestion
    // =========================================================================

    #[test]
    fn accepted_record_carries_storage_contract() {
        let slot = ConverterSlot::new(no_converter);
        let backend = MockBackend::new(4000, 3000, small);
        let client = EnrichmentClient::disabled();
        let ingestor = Ingestor::new(&backend, FormatNormalizer::new(&slot), &client);

        let report = ingestor.ingest(asset(), &IngestOptions::default()).unwrap();

        let r = &report.record;
        assert!(r.binary_encoded_as_text.starts_with("data:image/jpeg;base64,"));
        assert_eq!((r.width, r.height), (1400, 1050));
        assert_eq!(r.quality, 0.85);
        assert_eq!(r.original_file_name, "ring.jpg");
        assert_eq!(r.original_byte_size, 64);
        assert!(!r.converted_from_legacy_format);
        assert_eq!(r.byte_size, 1_000);
        assert_eq!(r.passes, 1);
        assert!(r.within_budget);
        assert_eq!(report.text_length, r.binary_encoded_as_text.len());
        assert_eq!(
            report.completed,
            vec![Stage::Normalize, Stage::Fit, Stage::Validate, Stage::Enrich]
        );
    }

    #[test]
    fn decode_failure_is_imaging_error() {
        let slot = ConverterSlot::new(no_converter);
        let backend = MockBackend::failing_decode();
        let client = EnrichmentClient::disabled();
        let ingestor = Ingestor::new(&backend, FormatNormalizer::new(&slot), &client);

        let err = ingestor.ingest(asset(), &no_enrich()).unwrap_err();
        assert!(matches!(err, IngestError::Imaging { ref file, .. } if file == "ring.jpg"));
    }

    #[test]
    fn textual_overflow_rejects_asset() {
        let slot = ConverterSlot::new(no_converter);
        let backend = MockBackend::new(1000, 1000, over_field_limit);
        let client = EnrichmentClient::disabled();
        let ingestor = Ingestor::new(&backend, FormatNormalizer::new(&slot), &client).with_fit(
            FitConfig {
                max_bytes: 1_000_000,
                ..FitConfig::default()
            },
        );

        let err = ingestor.ingest(asset(), &no_enrich()).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("asset could not be reduced below the storage limit"));
        match err {
            IngestError::TextualLimitExceeded { length, limit } => {
                assert_eq!(limit, 1_048_487);
                assert_eq!(length, 23 + 1_200_000);
            }
            other => panic!("expected TextualLimitExceeded, got {other:?}"),
        }
    }

    #[test]
    fn budget_exhaustion_is_reported_not_raised() {
        let slot = ConverterSlot::new(no_converter);
        let backend = MockBackend::new(1400, 1400, |_| 700_000);
        let client = EnrichmentClient::disabled();
        let ingestor = Ingestor::new(&backend, FormatNormalizer::new(&slot), &client).with_fit(
            FitConfig {
                max_bytes: 500_000,
                ..FitConfig::default()
            },
        );

        let report = ingestor.ingest(asset(), &no_enrich()).unwrap();

        assert_eq!(report.status, FitStatus::BudgetExhausted);
        assert!(!report.within_budget());
        assert!(!report.record.within_budget);
        assert_eq!(report.record.passes, 8);
        assert_eq!(report.attempts.len(), 8);
    }

    #[test]
    fn legacy_conversion_failure_falls_back_and_is_reported() {
        let slot = ConverterSlot::new(no_converter);
        let backend = MockBackend::new(100, 100, small);
        let client = EnrichmentClient::disabled();
        let ingestor = Ingestor::new(&backend, FormatNormalizer::new(&slot), &client);

        let heic = SourceAsset::new("IMG_1.HEIC", "image/heic", vec![1; 32]);
        let report = ingestor.ingest(heic, &no_enrich()).unwrap();

        assert!(!report.record.converted_from_legacy_format);
        assert_eq!(report.record.original_file_name, "IMG_1.HEIC");
        assert!(report.conversion_error.unwrap().contains("disabled in tests"));
        assert_eq!(backend.get_operations()[0], RecordedOp::Decode(32));
    }

    #[test]
    fn real_avif_is_converted_then_fitted() {
        let slot = ConverterSlot::new(|| Ok(Arc::new(crate::normalize::Rav1dConverter)));
        let backend = RustBackend::new();
        let client = EnrichmentClient::disabled();
        let ingestor = Ingestor::new(&backend, FormatNormalizer::new(&slot), &client);

        let avif = SourceAsset::new("pendant.avif", "image/avif", avif_bytes(96, 64));
        let report = ingestor.ingest(avif, &no_enrich()).unwrap();

        assert!(report.record.converted_from_legacy_format);
        assert_eq!(report.record.original_file_name, "pendant.avif");
        assert_eq!((report.record.width, report.record.height), (96, 64));
        assert!(report.within_budget());
    }

    // =========================================================================
    // Deadlines
    // =========================================================================

    #[test]
    fn passed_deadline_abandons_before_first_stage() {
        let slot = ConverterSlot::new(no_converter);
        let backend = MockBackend::new(100, 100, small);
        let client = EnrichmentClient::disabled();
        let ingestor = Ingestor::new(&backend, FormatNormalizer::new(&slot), &client);

        let options = IngestOptions {
            deadline: Some(Instant::now() - Duration::from_millis(1)),
            ..IngestOptions::default()
        };
        let err = ingestor.ingest(asset(), &options).unwrap_err();

        assert!(matches!(
            err,
            IngestError::Abandoned {
                stage: Stage::Normalize
            }
        ));
        assert!(backend.get_operations().is_empty());
    }

    #[test]
    fn effective_deadline_is_the_earlier_bound() {
        let start = Instant::now();
        let options = IngestOptions {
            deadline: Some(start + Duration::from_secs(10)),
            timeout: Some(Duration::from_secs(2)),
            ..IngestOptions::default()
        };
        assert_eq!(options.deadline_from(start), Some(start + Duration::from_secs(2)));

        let options = IngestOptions {
            timeout: None,
            ..options
        };
        assert_eq!(options.deadline_from(start), Some(start + Duration::from_secs(10)));
        assert_eq!(IngestOptions::default().deadline_from(start), None);
    }

    #[test]
    fn zero_timeout_abandons_before_first_stage() {
        let slot = ConverterSlot::new(no_converter);
        let backend = MockBackend::new(100, 100, small);
        let client = EnrichmentClient::disabled();
        let ingestor = Ingestor::new(&backend, FormatNormalizer::new(&slot), &client);

        let options = IngestOptions {
            timeout: Some(Duration::ZERO),
            ..no_enrich()
        };
        let err = ingestor.ingest(asset(), &options).unwrap_err();
        assert!(matches!(
            err,
            IngestError::Abandoned {
                stage: Stage::Normalize
            }
        ));
    }

    #[test]
    fn distant_deadline_completes() {
        let slot = ConverterSlot::new(no_converter);
        let backend = MockBackend::new(100, 100, small);
        let client = EnrichmentClient::disabled();
        let ingestor = Ingestor::new(&backend, FormatNormalizer::new(&slot), &client);

        let options = IngestOptions {
            deadline: Some(Instant::now() + Duration::from_secs(3600)),
            ..no_enrich()
        };
        assert!(ingestor.ingest(asset(), &options).is_ok());
    }

    // =========================================================================
    // Enrichment
    // =========================================================================

    #[test]
    fn combined_enrichment_fills_and_truncates() {
        let slot = ConverterSlot::new(no_converter);
        let backend = MockBackend::new(100, 100, small);
        let long_desc = "x".repeat(300);
        let reply = format!(
            "{{\"title\":\"{}\",\"description\":\"{long_desc}\"}}",
            "T".repeat(80)
        );
        let (client, transport) = enricher(ScriptedTransport::new().then_text(&reply));
        let ingestor = Ingestor::new(&backend, FormatNormalizer::new(&slot), &client);

        let report = ingestor.ingest(asset(), &IngestOptions::default()).unwrap();

        assert_eq!(report.record.title.as_deref().map(str::len), Some(60));
        assert_eq!(report.record.description.as_deref().map(str::len), Some(240));
        assert_eq!(transport.recorded().len(), 1);
        assert!(transport.recorded()[0].image_data.is_some());
    }

    #[test]
    fn existing_text_kept_and_enrichment_skipped() {
        let slot = ConverterSlot::new(no_converter);
        let backend = MockBackend::new(100, 100, small);
        let (client, transport) = enricher(ScriptedTransport::new().then_text("unused"));
        let ingestor = Ingestor::new(&backend, FormatNormalizer::new(&slot), &client);

        let options = IngestOptions {
            hints: ProductHints {
                title: Some("Tide Pool".into()),
                description: Some("Shells strung by hand.".into()),
            },
            ..IngestOptions::default()
        };
        let report = ingestor.ingest(asset(), &options).unwrap();

        assert!(transport.recorded().is_empty());
        assert_eq!(report.record.title.as_deref(), Some("Tide Pool"));
        assert_eq!(report.record.description.as_deref(), Some("Shells strung by hand."));
        assert!(report.enrichment.is_empty());
    }

    #[test]
    fn only_missing_field_is_filled() {
        let slot = ConverterSlot::new(no_converter);
        let backend = MockBackend::new(100, 100, small);
        let (client, _) = enricher(
            ScriptedTransport::new()
                .then_text(r#"{"title":"Sea Whisper","description":"Generated."}"#),
        );
        let ingestor = Ingestor::new(&backend, FormatNormalizer::new(&slot), &client);

        let options = IngestOptions {
            hints: ProductHints {
                title: Some("My Title".into()),
                description: Some("abc".into()),
            },
            ..IngestOptions::default()
        };
        let report = ingestor.ingest(asset(), &options).unwrap();

        assert_eq!(report.record.title.as_deref(), Some("My Title"));
        assert_eq!(report.record.description.as_deref(), Some("Generated."));
        assert_eq!(report.enrichment.title, None);
    }

    #[test]
    fn unparseable_combined_reply_falls_back_to_description() {
        let slot = ConverterSlot::new(no_converter);
        let backend = MockBackend::new(100, 100, small);
        let (client, transport) = enricher(
            ScriptedTransport::new()
                .then_text("no json here")
                .then_text("A quiet shell necklace."),
        );
        let ingestor = Ingestor::new(&backend, FormatNormalizer::new(&slot), &client);

        let report = ingestor.ingest(asset(), &IngestOptions::default()).unwrap();

        assert_eq!(transport.recorded().len(), 2);
        assert_eq!(report.record.title, None);
        assert_eq!(
            report.record.description.as_deref(),
            Some("A quiet shell necklace.")
        );
    }

    #[test]
    fn enrichment_outage_never_blocks_ingestion() {
        let slot = ConverterSlot::new(no_converter);
        let backend = MockBackend::new(100, 100, small);
        let (client, transport) = enricher(ScriptedTransport::new().then_status(500).then_status(500));
        let ingestor = Ingestor::new(&backend, FormatNormalizer::new(&slot), &client);

        let report = ingestor.ingest(asset(), &IngestOptions::default()).unwrap();

        assert!(report.enrichment.is_empty());
        assert!(report.record.title.is_none());
        // combined attempt + description fallback, no retries
        assert_eq!(transport.recorded().len(), 2);
    }

    #[test]
    fn describe_fills_both_fields_without_validating() {
        let slot = ConverterSlot::new(no_converter);
        let backend = MockBackend::new(100, 100, over_field_limit);
        let (client, _) = enricher(
            ScriptedTransport::new().then_text(r#"{"title":"Tide","description":"Sea glass."}"#),
        );
        let ingestor = Ingestor::new(&backend, FormatNormalizer::new(&slot), &client);

        let result = ingestor.describe(asset()).unwrap();
        assert_eq!(result.title.as_deref(), Some("Tide"));
        assert_eq!(result.description.as_deref(), Some("Sea glass."));
    }

    #[test]
    fn enrichment_disabled_by_option() {
        let slot = ConverterSlot::new(no_converter);
        let backend = MockBackend::new(100, 100, small);
        let (client, transport) = enricher(ScriptedTransport::new().then_text("unused"));
        let ingestor = Ingestor::new(&backend, FormatNormalizer::new(&slot), &client);

        let report = ingestor.ingest(asset(), &no_enrich()).unwrap();

        assert!(transport.recorded().is_empty());
        assert!(!report.completed.contains(&Stage::Enrich));
    }

    // =========================================================================
    // Batch driver
    // =========================================================================

    #[test]
    fn collect_inputs_walks_directories_and_filters() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("rings");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(tmp.path().join("b.JPG"), b"x").unwrap();
        std::fs::write(nested.join("a.heic"), b"x").unwrap();
        std::fs::write(nested.join("notes.txt"), b"x").unwrap();
        let explicit = tmp.path().join("notes.txt");
        std::fs::write(&explicit, b"x").unwrap();

        let files = collect_inputs(&[tmp.path().to_path_buf(), explicit.clone()]).unwrap();

        let names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(tmp.path()).unwrap().display().to_string())
            .collect();
        assert_eq!(names, vec!["b.JPG", "rings/a.heic", "notes.txt"]);
    }

    #[test]
    fn batch_ingests_in_parallel_and_stores_accepted() {
        let tmp = TempDir::new().unwrap();
        let good_a = tmp.path().join("a.jpg");
        let good_b = tmp.path().join("b.png");
        let missing = tmp.path().join("missing.jpg");
        std::fs::write(&good_a, jpeg_bytes(50, 40, 90)).unwrap();
        std::fs::write(&good_b, jpeg_asset("b.png", 30, 30).data).unwrap();

        let slot = ConverterSlot::new(no_converter);
        let backend = MockBackend::new(200, 100, proportional_size);
        let client = EnrichmentClient::disabled();
        let ingestor = Ingestor::new(&backend, FormatNormalizer::new(&slot), &client);
        let store = FsStore::open(tmp.path().join("store")).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();

        let summary = ingest_files(
            &ingestor,
            &[good_a.clone(), missing.clone(), good_b.clone()],
            &no_enrich(),
            Some(&store),
            Some(tx),
        );
        let events: Vec<IngestEvent> = rx.iter().collect();

        assert_eq!(summary.accepted(), 2);
        assert_eq!(summary.rejected(), 1);
        assert_eq!(summary.over_budget(), 0);
        assert_eq!(summary.outcomes[0].path, good_a);
        assert_eq!(summary.outcomes[1].path, missing);
        assert!(matches!(
            summary.outcomes[1].result,
            Err(IngestError::Read { .. })
        ));
        assert_eq!(events.len(), 3);

        let (report, id) = summary.outcomes[0].result.as_ref().unwrap();
        let id = id.as_ref().unwrap();
        assert_eq!(store.get(id).unwrap().as_ref(), Some(&report.record));
    }

    /// Mock backend whose every encode takes a fixed wall-clock time.
    struct SlowBackend {
        inner: MockBackend,
        encode_time: Duration,
    }

    impl ImageBackend for SlowBackend {
        type Bitmap = <MockBackend as ImageBackend>::Bitmap;

        fn output_mime(&self) -> &'static str {
            self.inner.output_mime()
        }

        fn decode(&self, data: &[u8]) -> Result<Self::Bitmap, BackendError> {
            self.inner.decode(data)
        }

        fn dimensions(&self, bitmap: &Self::Bitmap) -> crate::imaging::Dimensions {
            self.inner.dimensions(bitmap)
        }

        fn encode(&self, bitmap: &Self::Bitmap, params: &EncodeParams) -> Result<Vec<u8>, BackendError> {
            std::thread::sleep(self.encode_time);
            self.inner.encode(bitmap, params)
        }
    }

    #[test]
    fn batch_timeout_starts_per_file() {
        let tmp = TempDir::new().unwrap();
        let files: Vec<PathBuf> = ["a.jpg", "b.jpg"]
            .iter()
            .map(|name| {
                let path = tmp.path().join(name);
                std::fs::write(&path, b"bytes").unwrap();
                path
            })
            .collect();

        let slot = ConverterSlot::new(no_converter);
        let backend = SlowBackend {
            inner: MockBackend::new(10, 10, small),
            encode_time: Duration::from_millis(150),
        };
        let client = EnrichmentClient::disabled();
        let ingestor = Ingestor::new(&backend, FormatNormalizer::new(&slot), &client);
        let options = IngestOptions {
            timeout: Some(Duration::from_millis(100)),
            ..no_enrich()
        };

        let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
        let summary = pool.install(|| ingest_files(&ingestor, &files, &options, None, None));

        // Both files ran their fit stage before running out of time; the
        // second was not charged for the first one's encode.
        for outcome in &summary.outcomes {
            assert!(
                matches!(
                    outcome.result,
                    Err(IngestError::Abandoned {
                        stage: Stage::Validate
                    })
                ),
                "{:?}",
                outcome.path
            );
        }
        assert_eq!(backend.inner.get_operations().len(), 4);
    }

    #[test]
    fn batch_without_store_has_no_ids() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg");
        std::fs::write(&path, b"bytes").unwrap();

        let slot = ConverterSlot::new(no_converter);
        let backend = MockBackend::new(10, 10, small);
        let client = EnrichmentClient::disabled();
        let ingestor = Ingestor::new(&backend, FormatNormalizer::new(&slot), &client);

        let summary = ingest_files(&ingestor, &[path], &no_enrich(), None, None);
        let (_, id) = summary.outcomes[0].result.as_ref().unwrap();
        assert!(id.is_none());
    }
}
