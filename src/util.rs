/// Utility helpers shared by the archiver and the CLI tools.
///
/// This module contains:
/// - Timestamp helpers (ledger timestamps, file-safe names)
/// - Byte unit conversions
/// - Path segment sanitising
///
/// IMPORTANT:
/// - No channel-specific logic should live here.
/// - Everything here must stay deterministic given its inputs.
///

use chrono::{DateTime, SecondsFormat, Utc};

/// Formats an instant as ISO-8601 UTC with millisecond precision.
///
/// Example: `2024-05-01T12:30:45.123Z`
///
/// This is the timestamp stored in ledger records and log lines.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Formats an instant as a filesystem-safe file stem.
///
/// Same as [`iso_timestamp`] with every `:` replaced by `-`, so that
/// `2024-05-01T12:30:45.123Z` becomes `2024-05-01T12-30-45.123Z`.
///
/// CONTRACT:
/// - Lexicographic order of stems equals chronological order.
pub fn file_stem_timestamp(at: DateTime<Utc>) -> String {
    iso_timestamp(at).replace(':', "-")
}

/// Returns the `YYYY-MM-DD` date used for daily log files.
pub fn log_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

const KIB: f64 = 1024.0;

/// Converts a byte count into KB / MB / GB / TB (1024 base).
///
/// Only `bytes` is authoritative anywhere in the pipeline; these are
/// derived for presentation and for the ledger's convenience fields.
pub fn byte_units(bytes: u64) -> (f64, f64, f64, f64) {
    let b = bytes as f64;
    (
        b / KIB,
        b / KIB.powi(2),
        b / KIB.powi(3),
        b / KIB.powi(4),
    )
}

/// Human-readable size with two decimals, e.g. `1.50 MB`.
///
/// Accepts signed values so growth deltas can be rendered too.
pub fn format_size(bytes: f64) -> String {
    let abs = bytes.abs();
    if abs < KIB {
        format!("{:.2} B", bytes)
    } else if abs < KIB.powi(2) {
        format!("{:.2} KB", bytes / KIB)
    } else if abs < KIB.powi(3) {
        format!("{:.2} MB", bytes / KIB.powi(2))
    } else if abs < KIB.powi(4) {
        format!("{:.2} GB", bytes / KIB.powi(3))
    } else {
        format!("{:.2} TB", bytes / KIB.powi(4))
    }
}

/// Makes a venue-provided identifier safe to use as one path segment.
///
/// Spot coins such as `PURR/USDC` would otherwise nest directories, and a
/// hostile `..` would escape the data root.
///
/// Examples:
/// - "BTC"        -> "BTC"
/// - "PURR/USDC"  -> "PURR_USDC"
/// - ".."         -> "_"
pub fn sanitize_segment(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return "_".to_string();
    }
    trimmed
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            other => other,
        })
        .collect()
}
