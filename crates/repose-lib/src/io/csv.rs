use crate::signal::{RRPoint, RRSeries};
use anyhow::{Context, Result};
use csv::ReaderBuilder;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RRRecord {
    timestamp_ms: i64,
    rr_ms: u32,
    #[serde(default)]
    hr_bpm: Option<u16>,
}

/// Parse `timestamp_ms,rr_ms[,hr_bpm]` records with a header row.
pub fn parse_rr_csv<R: Read>(reader: R) -> Result<RRSeries> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .flexible(true)
        .from_reader(reader);
    let mut points = Vec::new();
    for (idx, result) in reader.deserialize::<RRRecord>().enumerate() {
        let record = result.with_context(|| format!("reading record {}", idx + 1))?;
        if let Some(prev) = points.last().map(|p: &RRPoint| p.timestamp_ms) {
            if record.timestamp_ms < prev {
                anyhow::bail!(
                    "record {} goes back in time: {} < {}",
                    idx + 1,
                    record.timestamp_ms,
                    prev
                );
            }
        }
        points.push(RRPoint {
            timestamp_ms: record.timestamp_ms,
            rr_ms: record.rr_ms,
            hr_bpm: record.hr_bpm,
        });
    }
    if points.is_empty() {
        anyhow::bail!("no RR records found");
    }
    Ok(RRSeries::new(points))
}

pub fn read_rr_csv(path: &Path) -> Result<RRSeries> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    parse_rr_csv(file).with_context(|| format!("parsing {}", path.display()))
}
