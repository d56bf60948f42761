//! Session-level driver tying the stages together.
//!
//! The detector flags every beat once, verification gates the recording, the
//! selector picks a recovery window and a peak-capacity window, and the full
//! metric set is computed once more over the recovery window.

use crate::{
    config::AnalysisConfig,
    detectors::{
        artifact::{self, ArtifactFlag, ArtifactSummary},
        correction::{correct_artifacts, CorrectionMethod},
    },
    error::Result,
    events::{AnalysisEvent, EventSink, LogSink},
    metrics::{
        ans::{readiness_score, stress_index, AnsIndices, Readiness, ReadinessContext, ReadinessInputs},
        frequency::{frequency_domain, FrequencyDomain, PlanCache},
        nonlinear::{nonlinear, Nonlinear},
        time::{time_domain, TimeDomain},
    },
    outcome::{Insufficient, Outcome},
    signal::{RRPoint, RRSeries},
    verification::{verify_flagged, verify_recording, VerificationResult},
    window::selector::{
        PeakCapacity, RecoveryWindow, SelectionMethod, SleepAnchors, WindowSelector,
    },
};
use serde::{Deserialize, Serialize};

/// Everything the engine needs about one recording session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionInput {
    pub series: RRSeries,
    pub anchors: SleepAnchors,
    pub device: Option<String>,
    pub readiness: ReadinessContext,
    pub method: SelectionMethod,
}

impl SessionInput {
    pub fn new(series: RRSeries) -> Self {
        Self {
            series,
            ..Default::default()
        }
    }
}

/// Full metric set over one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowMetrics {
    pub correction: CorrectionMethod,
    pub time: TimeDomain,
    pub frequency: Outcome<FrequencyDomain>,
    pub nonlinear: Outcome<Nonlinear>,
    pub ans: AnsIndices,
    pub readiness: Readiness,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAnalysis {
    pub verification: VerificationResult,
    pub artifacts: ArtifactSummary,
    pub flags: Vec<ArtifactFlag>,
    pub recovery: Outcome<RecoveryWindow>,
    pub peak_capacity: Outcome<PeakCapacity>,
    pub metrics: Outcome<WindowMetrics>,
}

/// Analysis context: configuration, transform plans and the diagnostics sink.
pub struct Analyzer {
    config: AnalysisConfig,
    cache: PlanCache,
    sink: Box<dyn EventSink>,
}

impl Analyzer {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        let cache = PlanCache::new(config.frequency.plan_cache_capacity);
        Ok(Self {
            config,
            cache,
            sink: Box::new(LogSink),
        })
    }

    pub fn with_sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn plan_cache(&self) -> &PlanCache {
        &self.cache
    }

    pub fn verify(&self, series: &RRSeries, device: Option<&str>) -> VerificationResult {
        let result = verify_recording(
            series,
            device,
            &self.config.verification,
            &self.config.artifact,
        );
        self.report_verification(&result);
        result
    }

    /// Verification reusing flags from [`Analyzer::detect_artifacts`].
    pub fn verify_flagged(
        &self,
        series: &RRSeries,
        flags: &[ArtifactFlag],
        device: Option<&str>,
    ) -> Result<VerificationResult> {
        let result = verify_flagged(series, flags, device, &self.config.verification)?;
        self.report_verification(&result);
        Ok(result)
    }

    fn report_verification(&self, result: &VerificationResult) {
        self.sink.record(AnalysisEvent::VerificationCompleted {
            passed: result.passed,
            reasons: result
                .rejection_reasons
                .iter()
                .map(|r| format!("{r:?}"))
                .collect(),
            warnings: result.warnings.len(),
        });
    }

    pub fn detect_artifacts(&self, series: &RRSeries) -> Vec<ArtifactFlag> {
        let flags = artifact::detect_artifacts(series, &self.config.artifact);
        let summary = ArtifactSummary::from_flags(&flags);
        self.sink.record(AnalysisEvent::ArtifactsDetected {
            total: summary.total,
            artifacts: summary.artifacts,
            rate: summary.rate,
        });
        flags
    }

    pub fn selector(&self) -> WindowSelector<'_> {
        WindowSelector::new(&self.config, &self.cache, self.sink.as_ref())
    }

    pub fn analyze(&self, input: &SessionInput) -> Result<SessionAnalysis> {
        let series = &input.series;
        let flags = self.detect_artifacts(series);
        let verification = self.verify_flagged(series, &flags, input.device.as_deref())?;
        let artifacts = ArtifactSummary::from_flags(&flags);

        if !verification.passed {
            let rejected = Insufficient::VerificationFailed;
            return Ok(SessionAnalysis {
                verification,
                artifacts,
                flags,
                recovery: Outcome::Insufficient(rejected),
                peak_capacity: Outcome::Insufficient(rejected),
                metrics: Outcome::Insufficient(rejected),
            });
        }

        let selector = self.selector();
        let recovery = selector.select(series, &flags, &input.anchors, input.method)?;
        let peak_capacity = selector.peak_capacity(series, &flags, &input.anchors)?;
        let metrics = match recovery.as_ref() {
            Outcome::Found(window) => self.window_metrics(
                series,
                &flags,
                window.window.start_index,
                window.window.end_index,
                &input.readiness,
            )?,
            Outcome::Insufficient(reason) => Outcome::Insufficient(reason),
        };

        Ok(SessionAnalysis {
            verification,
            artifacts,
            flags,
            recovery,
            peak_capacity,
            metrics,
        })
    }

    /// Beats of `[start, end)` after the configured correction, still flagged ones dropped.
    ///
    /// Timestamps follow the source beats, so deletion keeps the time axis intact.
    pub fn corrected_points(
        &self,
        series: &RRSeries,
        flags: &[ArtifactFlag],
        start: usize,
        end: usize,
    ) -> Result<Outcome<Vec<RRPoint>>> {
        if start >= end || end > series.len() || end > flags.len() {
            return Ok(Outcome::Insufficient(Insufficient::OutOfRange));
        }
        let points = &series.points[start..end];
        let values: Vec<f64> = points.iter().map(RRPoint::value).collect();
        let corrected = correct_artifacts(
            &values,
            &flags[start..end],
            self.config.correction.method,
            &self.config.correction,
        )?;
        let clean = corrected
            .values
            .iter()
            .zip(&corrected.flags)
            .zip(&corrected.source_index)
            .filter(|((_, flag), _)| !flag.is_artifact)
            .map(|((value, _), &source)| RRPoint {
                rr_ms: value.round().max(0.0) as u32,
                ..points[source]
            })
            .collect();
        Ok(Outcome::Found(clean))
    }

    pub fn window_metrics(
        &self,
        series: &RRSeries,
        flags: &[ArtifactFlag],
        start: usize,
        end: usize,
        context: &ReadinessContext,
    ) -> Result<Outcome<WindowMetrics>> {
        let clean = match self.corrected_points(series, flags, start, end)? {
            Outcome::Found(clean) => clean,
            Outcome::Insufficient(reason) => return Ok(Outcome::Insufficient(reason)),
        };
        let time = match time_domain(&clean, &self.config.time) {
            Outcome::Found(time) => time,
            Outcome::Insufficient(reason) => return Ok(Outcome::Insufficient(reason)),
        };
        let values: Vec<f64> = clean.iter().map(RRPoint::value).collect();
        let frequency = frequency_domain(&clean, &self.config.frequency, &self.cache)?;
        let nonlinear = nonlinear(&values, &self.config.nonlinear);
        let si = stress_index(&values, self.config.ans.stress_bin_ms);
        let ans = AnsIndices::compute(&time, nonlinear.as_ref().found(), si, &self.config.ans);
        let alpha1 = nonlinear
            .as_ref()
            .found()
            .and_then(|nl| nl.dfa)
            .map(|dfa| dfa.alpha1.alpha);
        let readiness = readiness_score(
            &ReadinessInputs {
                rmssd: time.rmssd,
                alpha1,
                ans: Some(&ans),
                context,
            },
            &self.config.readiness,
            &self.config.classifier,
            &self.config.ans,
        );

        Ok(Outcome::Found(WindowMetrics {
            correction: self.config.correction.method,
            time,
            frequency,
            nonlinear,
            ans,
            readiness,
        }))
    }

    /// Drop every cached transform plan.
    pub fn release_plans(&self) -> usize {
        let plans = self.cache.clear();
        self.sink.record(AnalysisEvent::PlansReleased { plans });
        plans
    }
}
