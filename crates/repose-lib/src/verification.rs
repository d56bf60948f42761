//! Up-front quality gate for a whole recording.
//!
//! Runs before any window search. Fatal findings become rejection reasons
//! with one error message each; elevated but tolerable values only warn.

use crate::{
    config::{ArtifactConfig, VerificationConfig},
    detectors::artifact::{detect_artifacts, ArtifactFlag, ArtifactSummary},
    error::{AnalysisError, Result},
    signal::RRSeries,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    TooShort,
    TooFewPoints,
    ExcessiveArtifacts,
    ExcessiveEctopy,
    ExcessiveDrift,
    SignalLoss,
    OutOfBounds,
    CorruptedData,
    UnknownDevice,
}

impl RejectionReason {
    pub fn explanation(&self) -> &'static str {
        match self {
            RejectionReason::TooShort => "the recording is too short to analyse",
            RejectionReason::TooFewPoints => "the recording holds too few beats",
            RejectionReason::ExcessiveArtifacts => "too many beats are artifacts",
            RejectionReason::ExcessiveEctopy => "too many beats are ectopic",
            RejectionReason::ExcessiveDrift => "the heart rate drifts strongly across the recording",
            RejectionReason::SignalLoss => "the sensor lost contact for too long",
            RejectionReason::OutOfBounds => "too many intervals lie outside the physiological range",
            RejectionReason::CorruptedData => "timestamps run backwards or intervals are zero",
            RejectionReason::UnknownDevice => "the sensor is not a supported chest strap",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.explanation())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationMetrics {
    pub duration_ms: i64,
    pub points: usize,
    pub artifact_rate: f64,
    pub ectopic_rate: f64,
    pub out_of_bounds_rate: f64,
    pub drift: f64,
    pub signal_loss: f64,
    pub longest_gap_ms: i64,
    pub mean_rr: f64,
    pub mean_hr: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub passed: bool,
    pub rejection_reasons: BTreeSet<RejectionReason>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub metrics: VerificationMetrics,
}

#[derive(Default)]
struct Findings {
    reasons: BTreeSet<RejectionReason>,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl Findings {
    fn reject(&mut self, reason: RejectionReason, detail: String) {
        if self.reasons.insert(reason) {
            self.errors.push(format!("{reason}: {detail}"));
        }
    }

    fn warn(&mut self, message: String) {
        self.warnings.push(message);
    }
}

pub fn verify_recording(
    series: &RRSeries,
    device: Option<&str>,
    cfg: &VerificationConfig,
    artifact_cfg: &ArtifactConfig,
) -> VerificationResult {
    let summary = ArtifactSummary::from_flags(&detect_artifacts(series, artifact_cfg));
    verify_with_summary(series, &summary, device, cfg)
}

/// Verify against artifact flags the caller already holds, one per beat.
pub fn verify_flagged(
    series: &RRSeries,
    flags: &[ArtifactFlag],
    device: Option<&str>,
    cfg: &VerificationConfig,
) -> Result<VerificationResult> {
    if flags.len() != series.len() {
        return Err(AnalysisError::MisalignedFlags {
            values: series.len(),
            flags: flags.len(),
        });
    }
    let summary = ArtifactSummary::from_flags(flags);
    Ok(verify_with_summary(series, &summary, device, cfg))
}

fn verify_with_summary(
    series: &RRSeries,
    summary: &ArtifactSummary,
    device: Option<&str>,
    cfg: &VerificationConfig,
) -> VerificationResult {
    let mut findings = Findings::default();
    let points = &series.points;
    let n = points.len();
    let values = series.values();
    let mean_rr = if n > 0 {
        values.iter().sum::<f64>() / n as f64
    } else {
        0.0
    };

    let mut metrics = VerificationMetrics {
        duration_ms: series.duration_ms(),
        points: n,
        artifact_rate: summary.rate,
        ectopic_rate: rate(summary.ectopic, n),
        mean_rr,
        mean_hr: if mean_rr > 0.0 { 60_000.0 / mean_rr } else { 0.0 },
        ..Default::default()
    };

    if metrics.duration_ms < cfg.min_duration_ms {
        findings.reject(
            RejectionReason::TooShort,
            format!(
                "{:.0} s recorded, {:.0} s required",
                metrics.duration_ms as f64 / 1000.0,
                cfg.min_duration_ms as f64 / 1000.0
            ),
        );
    }
    if n < cfg.min_points {
        findings.reject(
            RejectionReason::TooFewPoints,
            format!("{n} beats, {} required", cfg.min_points),
        );
    }

    check_rate(
        &mut findings,
        RejectionReason::ExcessiveArtifacts,
        "artifact rate",
        metrics.artifact_rate,
        cfg.max_artifact_rate,
        cfg.warn_artifact_rate,
    );
    check_rate(
        &mut findings,
        RejectionReason::ExcessiveEctopy,
        "ectopic rate",
        metrics.ectopic_rate,
        cfg.max_ectopic_rate,
        cfg.warn_ectopic_rate,
    );

    metrics.drift = drift(&values);
    check_rate(
        &mut findings,
        RejectionReason::ExcessiveDrift,
        "drift",
        metrics.drift,
        cfg.max_drift,
        cfg.warn_drift,
    );

    let (lost_ms, longest_gap_ms) = gaps(series, cfg.gap_threshold_ms);
    metrics.longest_gap_ms = longest_gap_ms;
    metrics.signal_loss = if metrics.duration_ms > 0 {
        lost_ms as f64 / metrics.duration_ms as f64
    } else {
        0.0
    };
    if metrics.signal_loss > cfg.max_signal_loss || longest_gap_ms > cfg.max_single_gap_ms {
        findings.reject(
            RejectionReason::SignalLoss,
            format!(
                "{:.1}% of the recording lost, longest gap {:.0} s",
                metrics.signal_loss * 100.0,
                longest_gap_ms as f64 / 1000.0
            ),
        );
    } else if lost_ms > 0 {
        findings.warn(format!(
            "signal gaps cover {:.1}% of the recording",
            metrics.signal_loss * 100.0
        ));
    }

    let out_of_bounds = values
        .iter()
        .filter(|v| !(artifact_cfg.min_rr_ms..=artifact_cfg.max_rr_ms).contains(*v))
        .count();
    metrics.out_of_bounds_rate = rate(out_of_bounds, n);
    if metrics.out_of_bounds_rate > cfg.max_out_of_bounds_rate {
        findings.reject(
            RejectionReason::OutOfBounds,
            format!("{:.1}% of intervals", metrics.out_of_bounds_rate * 100.0),
        );
    } else if out_of_bounds > 0 {
        findings.warn(format!("{out_of_bounds} intervals outside the physiological range"));
    }

    let backwards = points
        .windows(2)
        .filter(|w| w[1].timestamp_ms < w[0].timestamp_ms)
        .count();
    let zero = points.iter().filter(|p| p.rr_ms == 0).count();
    if backwards > 0 || zero > 0 {
        findings.reject(
            RejectionReason::CorruptedData,
            format!("{backwards} backwards timestamps, {zero} zero intervals"),
        );
    }

    match device {
        None => findings.warn("sensor device not reported".to_string()),
        Some(name) if !is_known_device(name, &cfg.known_devices) => {
            findings.reject(RejectionReason::UnknownDevice, format!("\"{name}\""));
        }
        Some(_) => {}
    }

    VerificationResult {
        passed: findings.reasons.is_empty(),
        rejection_reasons: findings.reasons,
        errors: findings.errors,
        warnings: findings.warnings,
        metrics,
    }
}

fn check_rate(
    findings: &mut Findings,
    reason: RejectionReason,
    label: &str,
    value: f64,
    reject_above: f64,
    warn_above: f64,
) {
    if value > reject_above {
        findings.reject(
            reason,
            format!("{label} {:.1}% exceeds {:.1}%", value * 100.0, reject_above * 100.0),
        );
    } else if value > warn_above {
        findings.warn(format!("{label} elevated at {:.1}%", value * 100.0));
    }
}

fn rate(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

/// Relative change between the first and last quarter means.
fn drift(values: &[f64]) -> f64 {
    let quarter = values.len() / 4;
    if quarter == 0 {
        return 0.0;
    }
    let mean = |slice: &[f64]| slice.iter().sum::<f64>() / slice.len() as f64;
    let overall = mean(values);
    if overall <= 0.0 {
        return 0.0;
    }
    (mean(&values[values.len() - quarter..]) - mean(&values[..quarter])).abs() / overall
}

/// Total and longest time between beats not covered by the later beat's own interval.
fn gaps(series: &RRSeries, threshold_ms: i64) -> (i64, i64) {
    let mut lost = 0;
    let mut longest = 0;
    for pair in series.points.windows(2) {
        let unexplained = pair[1].timestamp_ms - pair[0].timestamp_ms - pair[1].rr_ms as i64;
        if unexplained > threshold_ms {
            lost += unexplained;
            longest = longest.max(unexplained);
        }
    }
    (lost, longest)
}

fn is_known_device(name: &str, known: &[String]) -> bool {
    if known.is_empty() {
        return true;
    }
    let name = name.to_lowercase();
    known
        .iter()
        .any(|fragment| name.contains(&fragment.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{detectors::ArtifactKind, signal::RRPoint};

    fn night(beats: usize) -> RRSeries {
        let intervals: Vec<u32> = (0..beats).map(|i| if i % 2 == 0 { 980 } else { 1020 }).collect();
        RRSeries::from_intervals(&intervals)
    }

    fn verify(series: &RRSeries, device: Option<&str>) -> VerificationResult {
        verify_recording(
            series,
            device,
            &VerificationConfig::default(),
            &ArtifactConfig::default(),
        )
    }

    #[test]
    fn clean_recording_passes() {
        let result = verify(&night(600), Some("Polar H10 8C4A2B"));
        assert!(result.passed, "{:?}", result.errors);
        assert!(result.rejection_reasons.is_empty());
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
        assert_eq!(result.metrics.points, 600);
        assert!((result.metrics.mean_rr - 1000.0).abs() < 1e-9);
        assert!((result.metrics.mean_hr - 60.0).abs() < 1e-9);
        assert_eq!(result.metrics.longest_gap_ms, 0);
    }

    #[test]
    fn short_recording_is_rejected_twice() {
        let result = verify(&night(100), Some("polar h10"));
        assert!(!result.passed);
        assert_eq!(
            result.rejection_reasons,
            BTreeSet::from([RejectionReason::TooShort, RejectionReason::TooFewPoints])
        );
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn empty_recording_has_no_nan_metrics() {
        let result = verify(&RRSeries::default(), Some("polar h10"));
        assert!(!result.passed);
        assert_eq!(result.metrics.mean_hr, 0.0);
        assert_eq!(result.metrics.artifact_rate, 0.0);
        assert_eq!(result.metrics.drift, 0.0);
    }

    #[test]
    fn drifting_heart_rate_is_rejected() {
        let intervals: Vec<u32> = (0..400).map(|i| if i < 200 { 700 } else { 1300 }).collect();
        let result = verify(&RRSeries::from_intervals(&intervals), Some("tickr x"));
        assert!(result.rejection_reasons.contains(&RejectionReason::ExcessiveDrift));
        assert!((result.metrics.drift - 0.6).abs() < 1e-9);
    }

    #[test]
    fn long_gap_is_signal_loss() {
        let mut series = night(600);
        for point in series.points.iter_mut().skip(300) {
            point.timestamp_ms += 70_000;
        }
        let result = verify(&series, Some("Polar H10"));
        assert!(result.rejection_reasons.contains(&RejectionReason::SignalLoss));
        assert_eq!(result.metrics.longest_gap_ms, 70_000);
    }

    #[test]
    fn short_gap_only_warns() {
        let mut series = night(600);
        for point in series.points.iter_mut().skip(300) {
            point.timestamp_ms += 5_000;
        }
        let result = verify(&series, Some("Polar H10"));
        assert!(result.passed);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn out_of_range_intervals() {
        let mut intervals: Vec<u32> = vec![1000; 600];
        for i in (0..600).step_by(10) {
            intervals[i] = 2500;
        }
        let result = verify(&RRSeries::from_intervals(&intervals), Some("Polar H10"));
        assert!(result.rejection_reasons.contains(&RejectionReason::OutOfBounds));
        assert!(!result.rejection_reasons.contains(&RejectionReason::ExcessiveArtifacts));
        assert!((result.metrics.out_of_bounds_rate - 0.1).abs() < 1e-9);
    }

    #[test]
    fn corrupted_timestamps_and_zero_intervals() {
        let mut points = night(600).points;
        points[100].timestamp_ms = 0;
        points[200] = RRPoint::new(points[200].timestamp_ms, 0);
        let result = verify(&RRSeries::new(points), Some("Polar H10"));
        assert!(result.rejection_reasons.contains(&RejectionReason::CorruptedData));
    }

    #[test]
    fn device_policy() {
        let unknown = verify(&night(600), Some("Wrist Optical 3000"));
        assert_eq!(
            unknown.rejection_reasons,
            BTreeSet::from([RejectionReason::UnknownDevice])
        );
        let unreported = verify(&night(600), None);
        assert!(unreported.passed);
        assert_eq!(unreported.warnings, vec!["sensor device not reported".to_string()]);
    }

    #[test]
    fn supplied_flags_drive_the_artifact_rate() {
        let series = night(600);
        let mut flags = vec![ArtifactFlag::clean(); 600];
        for flag in flags.iter_mut().step_by(2) {
            *flag = ArtifactFlag::artifact(ArtifactKind::Technical, 1.0);
        }
        let cfg = VerificationConfig::default();
        let result = verify_flagged(&series, &flags, Some("Polar H10"), &cfg).unwrap();
        assert!((result.metrics.artifact_rate - 0.5).abs() < 1e-9);
        assert!(result.rejection_reasons.contains(&RejectionReason::ExcessiveArtifacts));

        let clean = vec![ArtifactFlag::clean(); 600];
        let result = verify_flagged(&series, &clean, Some("Polar H10"), &cfg).unwrap();
        assert_eq!(result, verify(&series, Some("Polar H10")));
    }

    #[test]
    fn misaligned_flags_are_refused() {
        let err = verify_flagged(
            &night(600),
            &[ArtifactFlag::clean(); 10],
            None,
            &VerificationConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::MisalignedFlags {
                values: 600,
                flags: 10
            }
        ));
    }

    #[test]
    fn every_reason_explains_itself() {
        let json = serde_json::to_string(&RejectionReason::ExcessiveEctopy).unwrap();
        assert_eq!(json, "\"excessive_ectopy\"");
        assert!(!RejectionReason::UnknownDevice.to_string().is_empty());
    }
}
