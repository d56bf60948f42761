use crate::{
    config::{DfaConfig, SelectorConfig},
    detectors::artifact::{median_in_place, ArtifactFlag},
    metrics::{dfa, mean_sd, rmssd},
    signal::{RRPoint, RRSeries},
};
use serde::{Deserialize, Serialize};

/// One scanned window; lives only for the duration of a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateWindow {
    pub start_index: usize,
    /// Exclusive.
    pub end_index: usize,
    pub start_ms: i64,
    pub end_ms: i64,
    pub clean_beat_count: usize,
    pub artifact_rate: f64,
    pub mean_hr: f64,
    pub hr_cv: f64,
    pub rmssd: f64,
    pub sdnn: f64,
    /// Window centre within the sleep period, 0 at sleep onset and 1 at wake.
    pub relative_position: f64,
    pub dfa_alpha1: Option<f64>,
    pub lf_hf: Option<f64>,
}

impl CandidateWindow {
    pub fn len(&self) -> usize {
        self.end_index - self.start_index
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration_minutes(&self) -> f64 {
        (self.end_ms - self.start_ms) as f64 / 60_000.0
    }
}

/// Shared inputs for evaluating windows of one recording.
pub struct WindowEvaluator<'a> {
    pub series: &'a RRSeries,
    pub flags: &'a [ArtifactFlag],
    pub selector: &'a SelectorConfig,
    pub dfa: &'a DfaConfig,
    /// Sleep period used for relative positions, in ms.
    pub period: (i64, i64),
}

impl WindowEvaluator<'_> {
    /// Beats of `[start, end)` that survive both the detector and the local ectopic filter.
    pub fn clean_points(&self, start: usize, end: usize) -> Vec<RRPoint> {
        let points = &self.series.points[start..end];
        let flags = &self.flags[start..end];
        let values: Vec<f64> = points.iter().map(RRPoint::value).collect();
        let keep = local_ectopic_mask(
            &values,
            flags,
            self.selector.ectopic_neighborhood,
            self.selector.ectopic_threshold,
        );
        points
            .iter()
            .zip(keep)
            .filter_map(|(p, keep)| keep.then_some(*p))
            .collect()
    }

    pub fn evaluate(&self, start: usize, end: usize) -> CandidateWindow {
        let clean = self.clean_points(start, end);
        let values: Vec<f64> = clean.iter().map(RRPoint::value).collect();
        let total = end - start;
        let (mean_hr, hr_cv) = heart_rate_variation(&values);
        let sdnn = mean_sd(&values).map(|(_, sd)| sd).unwrap_or(0.0);
        let dfa_alpha1 = if values.len() >= self.selector.dfa_min_beats {
            dfa::alpha1(&values, self.dfa).found().map(|e| e.alpha)
        } else {
            None
        };
        let start_ms = self.series.points[start].timestamp_ms;
        let end_ms = self.series.points[end - 1].timestamp_ms;

        CandidateWindow {
            start_index: start,
            end_index: end,
            start_ms,
            end_ms,
            clean_beat_count: values.len(),
            artifact_rate: if total > 0 {
                1.0 - values.len() as f64 / total as f64
            } else {
                0.0
            },
            mean_hr,
            hr_cv,
            rmssd: rmssd(&values),
            sdnn,
            relative_position: relative_position(start_ms, end_ms, self.period),
            dfa_alpha1,
            lf_hf: None,
        }
    }
}

/// Keep-mask for a window: detector artifacts and beats deviating from the
/// median of their neighbours (self excluded) are dropped.
pub fn local_ectopic_mask(
    values: &[f64],
    flags: &[ArtifactFlag],
    neighborhood: usize,
    threshold: f64,
) -> Vec<bool> {
    let half = (neighborhood / 2).max(1);
    let mut scratch = Vec::with_capacity(neighborhood);
    (0..values.len())
        .map(|i| {
            if flags[i].is_artifact {
                return false;
            }
            let lo = i.saturating_sub(half);
            let hi = values.len().min(i + half + 1);
            scratch.clear();
            scratch.extend(
                (lo..hi)
                    .filter(|&j| j != i && !flags[j].is_artifact)
                    .map(|j| values[j]),
            );
            match median_in_place(&mut scratch) {
                Some(median) if median > 0.0 => (values[i] - median).abs() / median <= threshold,
                _ => true,
            }
        })
        .collect()
}

/// Mean instantaneous HR and its coefficient of variation.
fn heart_rate_variation(values: &[f64]) -> (f64, f64) {
    let rates: Vec<f64> = values
        .iter()
        .filter(|v| **v > 0.0)
        .map(|v| 60_000.0 / v)
        .collect();
    match mean_sd(&rates) {
        Some((mean, sd)) if mean > 0.0 => (mean, sd / mean),
        _ => (rates.first().copied().unwrap_or(0.0), 0.0),
    }
}

fn relative_position(start_ms: i64, end_ms: i64, period: (i64, i64)) -> f64 {
    let span = period.1 - period.0;
    if span <= 0 {
        return 0.0;
    }
    let centre = (start_ms + end_ms) as f64 / 2.0;
    ((centre - period.0 as f64) / span as f64).clamp(0.0, 1.0)
}

/// Candidates whose RMSSD is at least `ratio` times both neighbours.
///
/// The first and last candidates have one neighbour and are never marked.
pub fn isolated_spikes(rmssd: &[f64], ratio: f64) -> Vec<bool> {
    let mut spikes = vec![false; rmssd.len()];
    for i in 1..rmssd.len().saturating_sub(1) {
        let value = rmssd[i];
        spikes[i] = value > 0.0 && value >= ratio * rmssd[i - 1] && value >= ratio * rmssd[i + 1];
    }
    spikes
}
