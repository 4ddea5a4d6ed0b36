//! CLI output formatting.
//!
//! Each asset leads with its positional index and title (or file name when it
//! has none); details follow as indented context lines.
//!
//! # Output Format
//!
//! ## Ingest
//!
//! ```text
//! 001 Sea Whisper
//!     Source: photos/IMG_0042.heic (converted)
//!     Encoded: 1400x1050 q0.65, 702 KiB in 3 passes
//!     Description: Shells gathered at low tide...
//!     Stored: 3f8a09c1e2b4
//! 002 (ring.jpg)
//!     Source: photos/ring.jpg
//!     Encoded: 1400x933 q0.35, 801 KiB in 8 passes (over budget)
//! 003 (broken.jpg) rejected
//!     Reason: image processing failed for broken.jpg: ...
//!
//! Ingested 3 files: 2 accepted, 1 rejected, 1 over budget
//! ```
//!
//! ## Check
//!
//! ```text
//! 001 (ring.jpg)
//!     pass 1: 1400x1050 q0.85, 912 KiB
//!     pass 2: 1400x1050 q0.75, 801 KiB
//!     pass 3: 1400x1050 q0.65, 702 KiB
//!     Text: 957,464 of 1,048,487 chars, fits
//! ```
//!
//! # Architecture
//!
//! Every display has a `format_*` function returning `Vec<String>` and a
//! `print_*` wrapper that writes to stdout. Format functions do no I/O.

use crate::ingest::{BatchSummary, IngestEvent};
use crate::textual::TextualCheck;
use crate::types::{EncodedAsset, EncodingAttempt, FitStatus, NormalizedAsset};
use std::path::Path;

/// Longest description shown before truncating.
const DESCRIPTION_PREVIEW_CHARS: usize = 60;
/// Leading id characters shown for stored records.
const ID_PREVIEW_CHARS: usize = 12;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Titled assets show the title, untitled ones their file name in parens.
fn asset_line(index: usize, title: Option<&str>, file_name: &str) -> String {
    match title {
        Some(t) if !t.is_empty() => format!("{} {}", format_index(index), t),
        _ => format!("{} ({})", format_index(index), file_name),
    }
}

fn file_name_of(source: &str) -> String {
    Path::new(source)
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.to_string())
}

/// Whole KiB, rounded to nearest.
fn format_kib(bytes: u64) -> String {
    format!("{} KiB", (bytes + 512) / 1024)
}

/// Group digits by thousands: `1048487` → `1,048,487`.
fn format_count(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Truncate text to `max` characters, appending `...` if truncated.
fn truncate_desc(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let head: String = text.chars().take(max).collect();
        format!("{}...", head)
    }
}

fn plural(n: impl Into<u64>, one: &str, many: &str) -> String {
    let n = n.into();
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

fn encoded_line(width: u32, height: u32, quality: f64, byte_size: u64, passes: u32, within_budget: bool) -> String {
    let mut line = format!(
        "Encoded: {}x{} q{:.2}, {} in {}",
        width,
        height,
        quality,
        format_kib(byte_size),
        plural(passes, "pass", "passes"),
    );
    if !within_budget {
        line.push_str(" (over budget)");
    }
    line
}

// ============================================================================
// Ingest
// ============================================================================

/// Format a single ingest progress event as display lines.
///
/// `index` in the event is 0-based; display positions are 1-based.
pub fn format_ingest_event(event: &IngestEvent) -> Vec<String> {
    match event {
        IngestEvent::Accepted {
            index,
            source,
            id,
            record,
            converted,
            conversion_error,
        } => {
            let mut lines = vec![asset_line(
                index + 1,
                record.title.as_deref(),
                &file_name_of(source),
            )];
            if *converted {
                lines.push(format!("    Source: {} (converted)", source));
            } else {
                lines.push(format!("    Source: {}", source));
            }
            if let Some(err) = conversion_error {
                lines.push(format!("    Conversion failed: {}", err));
            }
            lines.push(format!(
                "    {}",
                encoded_line(
                    record.width,
                    record.height,
                    record.quality,
                    record.byte_size,
                    record.passes,
                    record.within_budget,
                )
            ));
            if let Some(desc) = &record.description {
                lines.push(format!(
                    "    Description: {}",
                    truncate_desc(desc, DESCRIPTION_PREVIEW_CHARS)
                ));
            }
            if let Some(id) = id {
                let short: String = id.chars().take(ID_PREVIEW_CHARS).collect();
                lines.push(format!("    Stored: {}", short));
            }
            lines
        }
        IngestEvent::Rejected {
            index,
            source,
            reason,
        } => vec![
            format!("{} rejected", asset_line(index + 1, None, &file_name_of(source))),
            format!("    Reason: {}", reason),
        ],
    }
}

/// One-line batch summary.
pub fn format_summary(summary: &BatchSummary) -> String {
    let total = summary.outcomes.len() as u64;
    let mut line = format!(
        "Ingested {}: {} accepted, {} rejected",
        plural(total, "file", "files"),
        summary.accepted(),
        summary.rejected()
    );
    let over = summary.over_budget();
    if over > 0 {
        line.push_str(&format!(", {} over budget", over));
    }
    line
}

pub fn print_summary(summary: &BatchSummary) {
    println!();
    println!("{}", format_summary(summary));
}

// ============================================================================
// Check
// ============================================================================

fn attempt_line(attempt: &EncodingAttempt) -> String {
    format!(
        "    pass {}: {}x{} q{:.2}, {}",
        attempt.pass,
        attempt.width,
        attempt.height,
        attempt.quality.as_fraction(),
        format_kib(attempt.byte_size)
    )
}

/// Fit and validation details for one asset, without storing anything.
pub fn format_check(
    index: usize,
    normalized: &NormalizedAsset,
    encoded: &EncodedAsset,
    check: &TextualCheck,
) -> Vec<String> {
    let mut lines = vec![asset_line(index, None, &normalized.asset.file_name)];
    if normalized.converted_from_legacy_format {
        lines.push("    Converted from legacy format".to_string());
    }
    if let Some(err) = &normalized.conversion_error {
        lines.push(format!("    Conversion failed: {}", err));
    }
    lines.extend(encoded.attempts.iter().map(attempt_line));
    if encoded.status == FitStatus::BudgetExhausted {
        lines.push("    Budget exhausted".to_string());
    }
    let verdict = if check.within_limit { "fits" } else { "too large" };
    lines.push(format!(
        "    Text: {} of {} chars, {}",
        format_count(check.textual.length),
        format_count(check.limit),
        verdict
    ));
    lines
}

pub fn print_check(
    index: usize,
    normalized: &NormalizedAsset,
    encoded: &EncodedAsset,
    check: &TextualCheck,
) {
    for line in format_check(index, normalized, encoded, check) {
        println!("{}", line);
    }
}

// ============================================================================
// Describe
// ============================================================================

/// Derived title/description for a single image.
pub fn format_description(title: Option<&str>, description: Option<&str>) -> Vec<String> {
    if title.is_none() && description.is_none() {
        return vec!["No description available".to_string()];
    }
    let mut lines = Vec::new();
    if let Some(t) = title {
        lines.push(format!("Title: {}", t));
    }
    if let Some(d) = description {
        lines.push(format!("Description: {}", d));
    }
    lines
}

pub fn print_description(title: Option<&str>, description: Option<&str>) {
    for line in format_description(title, description) {
        println!("{}", line);
    }
}
