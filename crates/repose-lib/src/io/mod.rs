//! Readers for recorded RR data.

pub mod csv;
pub mod text;

use crate::signal::RRSeries;
use anyhow::{Context, Result};
use std::path::Path;

/// Load a recording, choosing the reader from the extension or, failing that,
/// from a `timestamp_ms` header on the first non-comment line.
pub fn load_rr_series(path: &Path) -> Result<RRSeries> {
    if path
        .extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
    {
        return csv::read_rr_csv(path);
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_rr_input(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Parse text already in memory (e.g. stdin) with the same format detection.
pub fn parse_rr_input(text: &str) -> Result<RRSeries> {
    if looks_like_csv(text) {
        csv::parse_rr_csv(text.as_bytes())
    } else {
        text::parse_rr_series(text)
    }
}

fn looks_like_csv(text: &str) -> bool {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .is_some_and(|l| l.starts_with("timestamp_ms"))
}
