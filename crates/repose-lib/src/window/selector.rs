//! Recovery-window search over an overnight recording.
//!
//! The scan slides fixed-size windows across a band of the sleep period,
//! drops windows with too few clean beats or an isolated RMSSD spike, then
//! ranks what is left. Running out of candidates is an ordinary outcome.

use super::{
    candidate::{isolated_spikes, CandidateWindow, WindowEvaluator},
    classifier::{classify_window, WindowClassification},
};
use crate::{
    config::AnalysisConfig,
    detectors::artifact::ArtifactFlag,
    error::{AnalysisError, Result},
    events::{AnalysisEvent, EventSink},
    metrics::{frequency_domain, PlanCache},
    outcome::{Insufficient, Outcome},
    signal::RRSeries,
};
use serde::{Deserialize, Serialize};

/// Sleep onset and wake times reported by an external health-data source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepAnchors {
    pub sleep_start_ms: Option<i64>,
    pub wake_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum SelectionMethod {
    /// Highest RMSSD among organized windows.
    #[default]
    Recovery,
    PeakRmssd,
    PeakSdnn,
    /// Highest total variance (SDNN²).
    PowerProxy,
    /// RMSSD discounted by heart-rate instability.
    Stable,
    /// Fixed-size window around a timestamp, ignoring the band.
    Manual { timestamp_ms: i64 },
}

impl SelectionMethod {
    pub fn reason(&self) -> SelectionReason {
        match self {
            SelectionMethod::Recovery => SelectionReason::HighestOrganizedRmssd,
            SelectionMethod::PeakRmssd => SelectionReason::PeakRmssd,
            SelectionMethod::PeakSdnn => SelectionReason::PeakSdnn,
            SelectionMethod::PowerProxy => SelectionReason::PowerProxy,
            SelectionMethod::Stable => SelectionReason::StabilityWeighted,
            SelectionMethod::Manual { .. } => SelectionReason::Manual,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    HighestOrganizedRmssd,
    PeakRmssd,
    PeakSdnn,
    PowerProxy,
    StabilityWeighted,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryWindow {
    #[serde(flatten)]
    pub window: CandidateWindow,
    pub is_consolidated: bool,
    pub classification: WindowClassification,
    pub selection_reason: SelectionReason,
}

/// Best-case parasympathetic capacity of the night, with no organization requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakCapacity {
    pub peak_rmssd: f64,
    pub peak_sdnn: f64,
    pub window_duration_minutes: f64,
    pub window_relative_position: f64,
    pub window_mean_hr: f64,
    pub start_index: usize,
    pub end_index: usize,
}

/// Resolved scan geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Sizing {
    window: usize,
    step: usize,
    min_clean: usize,
}

pub struct WindowSelector<'a> {
    config: &'a AnalysisConfig,
    cache: &'a PlanCache,
    sink: &'a dyn EventSink,
}

impl<'a> WindowSelector<'a> {
    pub fn new(config: &'a AnalysisConfig, cache: &'a PlanCache, sink: &'a dyn EventSink) -> Self {
        Self {
            config,
            cache,
            sink,
        }
    }

    pub fn select(
        &self,
        series: &RRSeries,
        flags: &[ArtifactFlag],
        anchors: &SleepAnchors,
        method: SelectionMethod,
    ) -> Result<Outcome<RecoveryWindow>> {
        check_alignment(series, flags)?;
        let Some(period) = sleep_period(series, anchors) else {
            return Ok(Outcome::too_few(1, 0));
        };
        let evaluator = self.evaluator(series, flags, period);

        if let SelectionMethod::Manual { timestamp_ms } = method {
            return self.select_manual(&evaluator, timestamp_ms);
        }

        let (start, end) = match self.resolve_band(series, period) {
            Outcome::Found(band) => band,
            Outcome::Insufficient(reason) => return Ok(Outcome::Insufficient(reason)),
        };
        let candidates = match self.scan(&evaluator, start, end) {
            Outcome::Found(candidates) => candidates,
            Outcome::Insufficient(reason) => return Ok(Outcome::Insufficient(reason)),
        };

        let selector = &self.config.selector;
        let classifier = &self.config.classifier;
        let best = match method {
            SelectionMethod::Recovery => {
                let organized = candidates.iter().filter(|c| {
                    classify_window(c.clean_beat_count, c.dfa_alpha1, None, c.hr_cv, classifier)
                        .is_organized()
                });
                let best = best_by(organized, |c| c.rmssd);
                if best.is_none() {
                    self.sink.record(AnalysisEvent::NoOrganizedWindow {
                        candidates: candidates.len(),
                    });
                    return Ok(Outcome::Insufficient(Insufficient::NoOrganizedWindow));
                }
                best
            }
            SelectionMethod::PeakRmssd => best_by(candidates.iter(), |c| c.rmssd),
            SelectionMethod::PeakSdnn => best_by(candidates.iter(), |c| c.sdnn),
            SelectionMethod::PowerProxy => best_by(candidates.iter(), |c| c.sdnn * c.sdnn),
            SelectionMethod::Stable => {
                let weight = selector.stability_weight;
                let threshold = classifier.hr_cv_threshold;
                best_by(candidates.iter(), |c| {
                    let instability = if threshold > 0.0 {
                        (c.hr_cv / threshold).min(1.0)
                    } else {
                        1.0
                    };
                    c.rmssd * (1.0 - weight * instability)
                })
            }
            SelectionMethod::Manual { .. } => None,
        };
        let Some(winner) = best else {
            return Ok(Outcome::Insufficient(Insufficient::NoCandidates));
        };

        self.finish(&evaluator, winner.clone(), method.reason(), true)
            .map(Outcome::Found)
    }

    /// Highest-RMSSD window over the whole recording.
    pub fn peak_capacity(
        &self,
        series: &RRSeries,
        flags: &[ArtifactFlag],
        anchors: &SleepAnchors,
    ) -> Result<Outcome<PeakCapacity>> {
        check_alignment(series, flags)?;
        let Some(period) = sleep_period(series, anchors) else {
            return Ok(Outcome::too_few(1, 0));
        };
        let evaluator = self.evaluator(series, flags, period);
        let candidates = match self.scan(&evaluator, 0, series.len()) {
            Outcome::Found(candidates) => candidates,
            Outcome::Insufficient(reason) => return Ok(Outcome::Insufficient(reason)),
        };
        let Some(peak) = best_by(candidates.iter(), |c| c.rmssd) else {
            return Ok(Outcome::Insufficient(Insufficient::NoCandidates));
        };
        self.sink.record(AnalysisEvent::PeakCapacityFound {
            start_index: peak.start_index,
            rmssd: peak.rmssd,
        });
        Ok(Outcome::Found(PeakCapacity {
            peak_rmssd: peak.rmssd,
            peak_sdnn: peak.sdnn,
            window_duration_minutes: peak.duration_minutes(),
            window_relative_position: peak.relative_position,
            window_mean_hr: peak.mean_hr,
            start_index: peak.start_index,
            end_index: peak.end_index,
        }))
    }

    fn evaluator<'s>(
        &'s self,
        series: &'s RRSeries,
        flags: &'s [ArtifactFlag],
        period: (i64, i64),
    ) -> WindowEvaluator<'s> {
        WindowEvaluator {
            series,
            flags,
            selector: &self.config.selector,
            dfa: &self.config.nonlinear.dfa,
            period,
        }
    }

    /// Index range `[start, end)` of beats inside the search band.
    fn resolve_band(&self, series: &RRSeries, period: (i64, i64)) -> Outcome<(usize, usize)> {
        let cfg = &self.config.selector;
        let span = (period.1 - period.0) as f64;
        let band_start_ms = period.0 + (span * cfg.band_start).round() as i64;
        let band_end_ms = period.0 + (span * cfg.band_end).round() as i64;
        let points = &series.points;
        let start = points.partition_point(|p| p.timestamp_ms < band_start_ms);
        let end = points.partition_point(|p| p.timestamp_ms <= band_end_ms);
        if start >= end {
            return Outcome::Insufficient(Insufficient::EmptyBand);
        }
        self.sink.record(AnalysisEvent::BandResolved {
            start_index: start,
            end_index: end,
            start_ms: points[start].timestamp_ms,
            end_ms: points[end - 1].timestamp_ms,
        });
        Outcome::Found((start, end))
    }

    fn sizing(&self, available: usize) -> Outcome<Sizing> {
        let cfg = &self.config.selector;
        if available < cfg.min_window_beats {
            return Outcome::Insufficient(Insufficient::EmptyBand);
        }
        // Half the band, kept within [floor, target].
        let window = (available / 2)
            .min(cfg.target_window_beats)
            .max(cfg.min_window_beats);
        Outcome::Found(Sizing {
            window,
            step: (window / cfg.step_divisor).max(1),
            min_clean: self.min_clean_beats(window),
        })
    }

    fn min_clean_beats(&self, window: usize) -> usize {
        let cfg = &self.config.selector;
        let scaled = (window as f64 * 0.75).floor() as usize;
        scaled.min(cfg.min_clean_beats).max(cfg.adaptive_clean_floor)
    }

    /// Evaluate sliding windows over `[start, end)` and apply the quality and spike filters.
    fn scan(
        &self,
        evaluator: &WindowEvaluator<'_>,
        start: usize,
        end: usize,
    ) -> Outcome<Vec<CandidateWindow>> {
        let cfg = &self.config.selector;
        let sizing = match self.sizing(end - start) {
            Outcome::Found(sizing) => sizing,
            Outcome::Insufficient(reason) => return Outcome::Insufficient(reason),
        };
        self.sink.record(AnalysisEvent::WindowSized {
            window_beats: sizing.window,
            step: sizing.step,
            min_clean_beats: sizing.min_clean,
        });

        let mut passed = Vec::new();
        let mut pos = start;
        while pos + sizing.window <= end {
            let candidate = evaluator.evaluate(pos, pos + sizing.window);
            if candidate.clean_beat_count >= sizing.min_clean
                && candidate.artifact_rate <= cfg.max_artifact_rate
            {
                passed.push(candidate);
            } else {
                self.sink.record(AnalysisEvent::CandidateRejected {
                    start_index: candidate.start_index,
                    clean_beats: candidate.clean_beat_count,
                    artifact_rate: candidate.artifact_rate,
                });
            }
            pos += sizing.step;
        }

        let rmssd: Vec<f64> = passed.iter().map(|c| c.rmssd).collect();
        let spikes = isolated_spikes(&rmssd, cfg.spike_ratio);
        let survivors: Vec<CandidateWindow> = passed
            .into_iter()
            .zip(spikes)
            .filter_map(|(candidate, spike)| {
                if spike {
                    self.sink.record(AnalysisEvent::SpikeRejected {
                        start_index: candidate.start_index,
                        rmssd: candidate.rmssd,
                    });
                    None
                } else {
                    Some(candidate)
                }
            })
            .collect();
        if survivors.is_empty() {
            Outcome::Insufficient(Insufficient::NoCandidates)
        } else {
            Outcome::Found(survivors)
        }
    }

    fn select_manual(
        &self,
        evaluator: &WindowEvaluator<'_>,
        timestamp_ms: i64,
    ) -> Result<Outcome<RecoveryWindow>> {
        let series = evaluator.series;
        let (Some(first), Some(last)) = (series.start_ms(), series.end_ms()) else {
            return Ok(Outcome::too_few(1, 0));
        };
        if timestamp_ms < first || timestamp_ms > last {
            return Ok(Outcome::Insufficient(Insufficient::OutOfRange));
        }
        let cfg = &self.config.selector;
        if series.len() < cfg.min_window_beats {
            return Ok(Outcome::too_few(cfg.min_window_beats, series.len()));
        }
        let size = cfg.target_window_beats.min(series.len());
        let centre = series.nearest_index(timestamp_ms).unwrap_or(0);
        let start = centre.saturating_sub(size / 2).min(series.len() - size);
        let candidate = evaluator.evaluate(start, start + size);
        let min_clean = self.min_clean_beats(size);
        let too_few = candidate.clean_beat_count < min_clean;
        if too_few || candidate.artifact_rate > cfg.max_artifact_rate {
            self.sink.record(AnalysisEvent::CandidateRejected {
                start_index: candidate.start_index,
                clean_beats: candidate.clean_beat_count,
                artifact_rate: candidate.artifact_rate,
            });
            return Ok(if too_few {
                Outcome::too_few(min_clean, candidate.clean_beat_count)
            } else {
                Outcome::Insufficient(Insufficient::NoCandidates)
            });
        }
        // A lone window has no neighbours to run the spike filter against.
        self.finish(evaluator, candidate, SelectionReason::Manual, false)
            .map(Outcome::Found)
    }

    /// Compute LF/HF for the winner, classify it and report the selection.
    ///
    /// Only a window that went through the spike filter can be consolidated.
    fn finish(
        &self,
        evaluator: &WindowEvaluator<'_>,
        mut window: CandidateWindow,
        reason: SelectionReason,
        spike_checked: bool,
    ) -> Result<RecoveryWindow> {
        let clean = evaluator.clean_points(window.start_index, window.end_index);
        window.lf_hf = frequency_domain(&clean, &self.config.frequency, self.cache)?
            .found()
            .and_then(|fd| fd.lf_hf);
        let classifier = &self.config.classifier;
        let classification = classify_window(
            window.clean_beat_count,
            window.dfa_alpha1,
            window.lf_hf,
            window.hr_cv,
            classifier,
        );
        let is_consolidated = spike_checked
            && classification.is_organized()
            && window.hr_cv < classifier.hr_cv_threshold;
        self.sink.record(AnalysisEvent::WindowSelected {
            start_index: window.start_index,
            end_index: window.end_index,
            rmssd: window.rmssd,
            reason: format!("{reason:?}"),
        });
        Ok(RecoveryWindow {
            window,
            is_consolidated,
            classification,
            selection_reason: reason,
        })
    }
}

/// Sleep onset and wake, falling back to the recording bounds.
fn sleep_period(series: &RRSeries, anchors: &SleepAnchors) -> Option<(i64, i64)> {
    let first = series.start_ms()?;
    let last = series.end_ms()?;
    let start = anchors.sleep_start_ms.unwrap_or(first);
    let end = anchors.wake_ms.unwrap_or(last);
    Some(if end > start { (start, end) } else { (first, last) })
}

fn check_alignment(series: &RRSeries, flags: &[ArtifactFlag]) -> Result<()> {
    if series.len() == flags.len() {
        Ok(())
    } else {
        Err(AnalysisError::MisalignedFlags {
            values: series.len(),
            flags: flags.len(),
        })
    }
}

/// Highest-scoring candidate; ties keep the earliest.
fn best_by<'c>(
    candidates: impl Iterator<Item = &'c CandidateWindow>,
    score: impl Fn(&CandidateWindow) -> f64,
) -> Option<&'c CandidateWindow> {
    let mut best: Option<(&CandidateWindow, f64)> = None;
    for candidate in candidates {
        let value = score(candidate);
        if best.map_or(true, |(_, top)| value > top) {
            best = Some((candidate, value));
        }
    }
    best.map(|(candidate, _)| candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        detectors::detect_artifacts,
        events::{MemorySink, NullSink},
    };

    /// Alternating beats around 1000 ms; the swing is the RMSSD halved.
    fn alternating(beats: usize, swing: impl Fn(usize) -> u32) -> RRSeries {
        let intervals: Vec<u32> = (0..beats)
            .map(|i| if i % 2 == 0 { 1000 + swing(i) } else { 1000 - swing(i) })
            .collect();
        RRSeries::from_intervals(&intervals)
    }

    /// Large swing in the first fifth of the night, moderate afterwards.
    fn early_arousal_night() -> RRSeries {
        alternating(3000, |i| if i < 600 { 60 } else { 30 })
    }

    fn hr_only_config() -> AnalysisConfig {
        let mut config = AnalysisConfig::default();
        config.selector.dfa_min_beats = 10_000;
        config
    }

    #[test]
    fn recovery_window_stays_inside_band() {
        let config = hr_only_config();
        let cache = PlanCache::default();
        let sink = MemorySink::new();
        let series = early_arousal_night();
        let flags = detect_artifacts(&series, &config.artifact);
        let selector = WindowSelector::new(&config, &cache, &sink);

        let window = selector
            .select(&series, &flags, &SleepAnchors::default(), SelectionMethod::Recovery)
            .unwrap()
            .found()
            .unwrap();

        let period = (series.start_ms().unwrap(), series.end_ms().unwrap());
        let span = (period.1 - period.0) as f64;
        assert!(window.window.start_ms as f64 >= period.0 as f64 + 0.3 * span - 1.0);
        assert!(window.window.end_ms as f64 <= period.0 as f64 + 0.7 * span + 1.0);
        assert!((window.window.rmssd - 60.0).abs() < 1e-9);
        assert_eq!(window.window.len(), 400);
        assert_eq!(window.classification, WindowClassification::OrganizedRecovery);
        assert_eq!(window.selection_reason, SelectionReason::HighestOrganizedRmssd);
        assert!(window.is_consolidated);
        assert!((0.3..=0.7).contains(&window.window.relative_position));

        let events = sink.events();
        assert!(events
            .iter()
            .any(|e| matches!(e, AnalysisEvent::BandResolved { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, AnalysisEvent::WindowSelected { .. })));
    }

    #[test]
    fn ties_keep_the_earliest_window() {
        let config = hr_only_config();
        let cache = PlanCache::default();
        let sink = MemorySink::new();
        let series = early_arousal_night();
        let flags = detect_artifacts(&series, &config.artifact);
        let selector = WindowSelector::new(&config, &cache, &sink);
        let band_start = sink_band_start(&selector, &series, &flags, &sink);
        let window = selector
            .select(&series, &flags, &SleepAnchors::default(), SelectionMethod::PeakRmssd)
            .unwrap()
            .found()
            .unwrap();
        assert_eq!(window.window.start_index, band_start);
        assert_eq!(window.selection_reason, SelectionReason::PeakRmssd);
    }

    fn sink_band_start(
        selector: &WindowSelector<'_>,
        series: &RRSeries,
        flags: &[ArtifactFlag],
        sink: &MemorySink,
    ) -> usize {
        selector
            .select(series, flags, &SleepAnchors::default(), SelectionMethod::Recovery)
            .unwrap();
        sink.events()
            .iter()
            .find_map(|e| match e {
                AnalysisEvent::BandResolved { start_index, .. } => Some(*start_index),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn peak_capacity_exists_without_recovery() {
        let config = AnalysisConfig::default();
        let cache = PlanCache::default();
        let sink = MemorySink::new();
        let series = early_arousal_night();
        let flags = detect_artifacts(&series, &config.artifact);
        let selector = WindowSelector::new(&config, &cache, &sink);
        let anchors = SleepAnchors::default();

        let recovery = selector
            .select(&series, &flags, &anchors, SelectionMethod::Recovery)
            .unwrap();
        assert_eq!(recovery.reason(), Some(Insufficient::NoOrganizedWindow));

        let peak = selector
            .peak_capacity(&series, &flags, &anchors)
            .unwrap()
            .found()
            .unwrap();
        assert!((peak.peak_rmssd - 120.0).abs() < 1e-9);
        assert_eq!(peak.start_index, 0);
        assert!(peak.window_relative_position < 0.2);
        assert!(peak.window_duration_minutes > 6.0);
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, AnalysisEvent::NoOrganizedWindow { .. })));
    }

    #[test]
    fn anchors_move_the_band() {
        let config = hr_only_config();
        let cache = PlanCache::default();
        let sink = MemorySink::new();
        let series = early_arousal_night();
        let flags = detect_artifacts(&series, &config.artifact);
        let selector = WindowSelector::new(&config, &cache, &sink);
        let anchors = SleepAnchors {
            sleep_start_ms: Some(0),
            wake_ms: Some(900_000),
        };
        let window = selector
            .select(&series, &flags, &anchors, SelectionMethod::Recovery)
            .unwrap()
            .found()
            .unwrap();
        assert!(window.window.start_ms >= 270_000);
        assert!(window.window.end_ms <= 630_000);
        assert!(window.window.len() < 400);
        assert!(window.window.len() >= config.selector.min_window_beats);
    }

    #[test]
    fn short_recording_has_empty_band() {
        let config = AnalysisConfig::default();
        let cache = PlanCache::default();
        let sink = MemorySink::new();
        let series = alternating(100, |_| 20);
        let flags = detect_artifacts(&series, &config.artifact);
        let selector = WindowSelector::new(&config, &cache, &sink);
        let anchors = SleepAnchors::default();
        let outcome = selector
            .select(&series, &flags, &anchors, SelectionMethod::Recovery)
            .unwrap();
        assert_eq!(outcome.reason(), Some(Insufficient::EmptyBand));
        let peak = selector.peak_capacity(&series, &flags, &anchors).unwrap();
        assert_eq!(peak.reason(), Some(Insufficient::EmptyBand));
    }

    #[test]
    fn noisy_windows_yield_no_candidates() {
        let config = AnalysisConfig::default();
        let cache = PlanCache::default();
        let sink = MemorySink::new();
        let series = alternating(1000, |_| 20);
        let flags = vec![ArtifactFlag::artifact(crate::detectors::ArtifactKind::Technical, 1.0); 1000];
        let selector = WindowSelector::new(&config, &cache, &sink);
        let outcome = selector
            .peak_capacity(&series, &flags, &SleepAnchors::default())
            .unwrap();
        assert_eq!(outcome.reason(), Some(Insufficient::NoCandidates));
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, AnalysisEvent::CandidateRejected { .. })));
    }

    #[test]
    fn manual_selection_centres_on_timestamp() {
        let config = hr_only_config();
        let cache = PlanCache::default();
        let sink = MemorySink::new();
        let series = early_arousal_night();
        let flags = detect_artifacts(&series, &config.artifact);
        let selector = WindowSelector::new(&config, &cache, &sink);
        let anchors = SleepAnchors::default();

        let target = series.points[1500].timestamp_ms;
        let window = selector
            .select(&series, &flags, &anchors, SelectionMethod::Manual { timestamp_ms: target })
            .unwrap()
            .found()
            .unwrap();
        assert_eq!(window.window.start_index, 1300);
        assert_eq!(window.window.end_index, 1700);
        assert_eq!(window.selection_reason, SelectionReason::Manual);
        assert!(!window.is_consolidated);

        let near_end = series.points[2990].timestamp_ms;
        let shifted = selector
            .select(&series, &flags, &anchors, SelectionMethod::Manual { timestamp_ms: near_end })
            .unwrap()
            .found()
            .unwrap();
        assert_eq!(shifted.window.end_index, 3000);

        let outside = selector
            .select(&series, &flags, &anchors, SelectionMethod::Manual { timestamp_ms: -5 })
            .unwrap();
        assert_eq!(outside.reason(), Some(Insufficient::OutOfRange));
    }

    #[test]
    fn manual_window_over_artifact_limit_is_rejected() {
        let config = hr_only_config();
        let cache = PlanCache::default();
        let sink = MemorySink::new();
        let mut intervals: Vec<u32> = early_arousal_night().points.iter().map(|p| p.rr_ms).collect();
        for rr in intervals[1300..1700].iter_mut().step_by(4) {
            *rr = 2500;
        }
        let series = RRSeries::from_intervals(&intervals);
        let flags = detect_artifacts(&series, &config.artifact);
        let selector = WindowSelector::new(&config, &cache, &sink);

        let target = series.points[1500].timestamp_ms;
        let outcome = selector
            .select(
                &series,
                &flags,
                &SleepAnchors::default(),
                SelectionMethod::Manual { timestamp_ms: target },
            )
            .unwrap();
        assert_eq!(outcome.reason(), Some(Insufficient::NoCandidates));
        assert!(sink.events().iter().any(|e| matches!(
            e,
            AnalysisEvent::CandidateRejected { start_index: 1300, artifact_rate, .. }
                if (*artifact_rate - 0.25).abs() < 1e-9
        )));
        assert!(!sink
            .events()
            .iter()
            .any(|e| matches!(e, AnalysisEvent::WindowSelected { .. })));
    }

    #[test]
    fn window_shrinks_with_the_band() {
        let config = AnalysisConfig::default();
        let cache = PlanCache::default();
        let selector = WindowSelector::new(&config, &cache, &NullSink);
        let window = |available| selector.sizing(available).found().map(|s| s.window);
        assert_eq!(window(2000), Some(400));
        assert_eq!(window(800), Some(400));
        assert_eq!(window(799), Some(399));
        assert_eq!(window(400), Some(200));
        assert_eq!(window(399), Some(199));
        assert_eq!(window(150), Some(120));
        assert_eq!(window(119), None);
    }

    /// Disjoint 100-beat candidates over the whole recording.
    fn block_config() -> AnalysisConfig {
        let mut config = hr_only_config();
        config.selector.band_start = 0.0;
        config.selector.band_end = 1.0;
        config.selector.target_window_beats = 100;
        config.selector.min_window_beats = 50;
        config.selector.step_divisor = 1;
        config
    }

    fn concat_blocks(blocks: &[fn(usize) -> f64]) -> RRSeries {
        let intervals: Vec<u32> = blocks
            .iter()
            .flat_map(|block| (0..100).map(move |i| block(i).round() as u32))
            .collect();
        RRSeries::from_intervals(&intervals)
    }

    fn swing(i: usize, amplitude: f64) -> f64 {
        if i % 2 == 0 {
            amplitude
        } else {
            -amplitude
        }
    }

    fn wave(i: usize, amplitude: f64) -> f64 {
        amplitude * (2.0 * std::f64::consts::PI * i as f64 / 50.0).sin()
    }

    #[test]
    fn alternate_rankings_pick_their_own_windows() {
        let config = block_config();
        let cache = PlanCache::default();
        let sink = MemorySink::new();
        let shapes: [fn(usize) -> f64; 4] = [
            // slow drift: widest spread, little beat-to-beat change
            |i| 1000.0 + wave(i, 140.0),
            // steady vagal swing
            |i| 1000.0 + swing(i, 50.0),
            // largest swing on top of an unstable rate
            |i| 1000.0 + swing(i, 60.0) + wave(i, 80.0),
            |i| 1000.0 + swing(i, 40.0),
        ];
        let series = concat_blocks(&shapes);
        let flags = detect_artifacts(&series, &config.artifact);
        assert!(flags.iter().all(|f| !f.is_artifact));
        let selector = WindowSelector::new(&config, &cache, &sink);
        let pick = |method| {
            selector
                .select(&series, &flags, &SleepAnchors::default(), method)
                .unwrap()
                .found()
                .unwrap()
        };

        let rmssd = pick(SelectionMethod::PeakRmssd);
        assert_eq!(rmssd.window.start_index, 200);
        assert_eq!(rmssd.selection_reason, SelectionReason::PeakRmssd);

        let sdnn = pick(SelectionMethod::PeakSdnn);
        assert_eq!(sdnn.window.start_index, 0);
        assert_eq!(sdnn.selection_reason, SelectionReason::PeakSdnn);

        let power = pick(SelectionMethod::PowerProxy);
        assert_eq!(power.window.start_index, 0);
        assert_eq!(power.selection_reason, SelectionReason::PowerProxy);

        let stable = pick(SelectionMethod::Stable);
        assert_eq!(stable.window.start_index, 100);
        assert_eq!(stable.selection_reason, SelectionReason::StabilityWeighted);
    }

    #[test]
    fn spike_between_rejected_windows_is_dropped() {
        let config = block_config();
        let cache = PlanCache::default();
        let sink = MemorySink::new();
        // every third beat out of range rejects the block on artifact rate
        let noisy: fn(usize) -> f64 = |i| if i % 3 == 0 { 2500.0 } else { 1000.0 };
        let shapes: [fn(usize) -> f64; 5] = [
            |i| 1000.0 + swing(i, 25.0),
            noisy,
            |i| 1000.0 + swing(i, 60.0),
            noisy,
            |i| 1000.0 + swing(i, 25.0),
        ];
        let series = concat_blocks(&shapes);
        let flags = detect_artifacts(&series, &config.artifact);
        let selector = WindowSelector::new(&config, &cache, &sink);

        let window = selector
            .select(&series, &flags, &SleepAnchors::default(), SelectionMethod::PeakRmssd)
            .unwrap()
            .found()
            .unwrap();
        assert_eq!(window.window.start_index, 0);
        assert!((window.window.rmssd - 50.0).abs() < 1e-9);

        let events = sink.events();
        let rejected: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                AnalysisEvent::CandidateRejected { start_index, .. } => Some(*start_index),
                _ => None,
            })
            .collect();
        assert_eq!(rejected, vec![100, 300]);
        assert!(events.iter().any(|e| matches!(
            e,
            AnalysisEvent::SpikeRejected { start_index: 200, rmssd }
                if (*rmssd - 120.0).abs() < 1e-9
        )));
    }

    #[test]
    fn misaligned_flags_are_an_error() {
        let config = AnalysisConfig::default();
        let cache = PlanCache::default();
        let sink = MemorySink::new();
        let series = alternating(500, |_| 20);
        let selector = WindowSelector::new(&config, &cache, &sink);
        let err = selector
            .select(&series, &[], &SleepAnchors::default(), SelectionMethod::Recovery)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::MisalignedFlags { .. }));
    }
}
