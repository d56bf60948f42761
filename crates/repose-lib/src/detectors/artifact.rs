use crate::{config::ArtifactConfig, signal::RRSeries};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    None,
    /// Interval outside the physiological range.
    Technical,
    Ectopic,
    /// Interval too long, usually an undetected beat.
    Missed,
    /// Interval far too short, usually a double detection.
    Extra,
}

/// Per-beat classification, index-aligned with the series it describes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArtifactFlag {
    pub is_artifact: bool,
    pub kind: ArtifactKind,
    pub confidence: f64,
    pub corrected: bool,
}

impl ArtifactFlag {
    pub const fn clean() -> Self {
        Self {
            is_artifact: false,
            kind: ArtifactKind::None,
            confidence: 0.0,
            corrected: false,
        }
    }

    pub fn artifact(kind: ArtifactKind, confidence: f64) -> Self {
        Self {
            is_artifact: true,
            kind,
            confidence: confidence.clamp(0.0, 1.0),
            corrected: false,
        }
    }

    /// Marks a repaired beat; the original kind and confidence stay for audit.
    pub fn into_corrected(self) -> Self {
        Self {
            is_artifact: false,
            corrected: true,
            ..self
        }
    }
}

impl Default for ArtifactFlag {
    fn default() -> Self {
        Self::clean()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub total: usize,
    pub artifacts: usize,
    pub technical: usize,
    pub ectopic: usize,
    pub missed: usize,
    pub extra: usize,
    pub corrected: usize,
    pub rate: f64,
}

impl ArtifactSummary {
    pub fn from_flags(flags: &[ArtifactFlag]) -> Self {
        let mut summary = ArtifactSummary {
            total: flags.len(),
            ..Default::default()
        };
        for flag in flags {
            if flag.corrected {
                summary.corrected += 1;
            }
            if !flag.is_artifact {
                continue;
            }
            summary.artifacts += 1;
            match flag.kind {
                ArtifactKind::Technical => summary.technical += 1,
                ArtifactKind::Ectopic => summary.ectopic += 1,
                ArtifactKind::Missed => summary.missed += 1,
                ArtifactKind::Extra => summary.extra += 1,
                ArtifactKind::None => {}
            }
        }
        summary.rate = if summary.total > 0 {
            summary.artifacts as f64 / summary.total as f64
        } else {
            0.0
        };
        summary
    }
}

/// Classify every beat of a recording. Always a full pass.
pub fn detect_artifacts(series: &RRSeries, cfg: &ArtifactConfig) -> Vec<ArtifactFlag> {
    detect_artifacts_in(&series.values(), cfg)
}

/// Classify raw interval values (ms) against a centered rolling median.
pub fn detect_artifacts_in(values: &[f64], cfg: &ArtifactConfig) -> Vec<ArtifactFlag> {
    let medians = rolling_median(values, cfg.median_window);
    values
        .iter()
        .zip(medians.iter())
        .map(|(&value, &median)| classify_beat(value, median, cfg))
        .collect()
}

fn classify_beat(value: f64, median: f64, cfg: &ArtifactConfig) -> ArtifactFlag {
    if !(cfg.min_rr_ms..=cfg.max_rr_ms).contains(&value) {
        return ArtifactFlag::artifact(ArtifactKind::Technical, 1.0);
    }
    if median <= 0.0 {
        return ArtifactFlag::clean();
    }
    let ratio = (value - median).abs() / median;
    if value < median * (1.0 - cfg.extra_threshold) {
        if value < median * 0.5 {
            return ArtifactFlag::artifact(
                ArtifactKind::Extra,
                (ratio / cfg.extra_threshold).min(1.0),
            );
        }
        if ratio > cfg.ectopic_threshold {
            return ArtifactFlag::artifact(
                ArtifactKind::Ectopic,
                (ratio / cfg.ectopic_threshold).min(1.0),
            );
        }
        return ArtifactFlag::clean();
    }
    if value > median * (1.0 + cfg.missed_threshold) {
        return ArtifactFlag::artifact(
            ArtifactKind::Missed,
            (ratio / cfg.missed_threshold).min(1.0),
        );
    }
    if ratio > cfg.ectopic_threshold {
        return ArtifactFlag::artifact(
            ArtifactKind::Ectopic,
            (ratio / cfg.ectopic_threshold).min(1.0),
        );
    }
    ArtifactFlag::clean()
}

/// Centered rolling median; windows shrink at the edges.
pub fn rolling_median(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let back = window / 2;
    let fwd = window - back;
    let mut scratch = Vec::with_capacity(window);
    (0..values.len())
        .map(|idx| {
            let start = idx.saturating_sub(back);
            let end = values.len().min(idx + fwd);
            scratch.clear();
            scratch.extend_from_slice(&values[start..end]);
            median_in_place(&mut scratch).unwrap_or(values[idx])
        })
        .collect()
}

/// Median of a scratch buffer; reorders it.
pub(crate) fn median_in_place(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}
