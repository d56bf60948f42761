use repose_lib::{
    detectors::ArtifactKind, window::WindowClassification, AnalysisConfig, AnalysisEvent,
    Analyzer, EventSink, Insufficient, MemorySink, RRSeries, ReadinessContext, SelectionMethod,
    SessionInput,
};
use std::sync::Arc;

struct Shared(Arc<MemorySink>);

impl EventSink for Shared {
    fn record(&self, event: AnalysisEvent) {
        self.0.record(event);
    }
}

/// 50 minutes of alternating beats; wide swing in the first fifth.
fn night() -> RRSeries {
    RRSeries::from_intervals(&night_intervals())
}

fn night_intervals() -> Vec<u32> {
    (0..3000)
        .map(|i| {
            let swing = if i < 600 { 60 } else { 30 };
            if i % 2 == 0 {
                1000 + swing
            } else {
                1000 - swing
            }
        })
        .collect()
}

fn analyzer(config: AnalysisConfig) -> (Analyzer, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let analyzer = Analyzer::new(config)
        .expect("valid config")
        .with_sink(Box::new(Shared(Arc::clone(&sink))));
    (analyzer, sink)
}

/// DFA is skipped on candidates so classification rests on HR stability.
fn hr_only() -> AnalysisConfig {
    let mut config = AnalysisConfig::default();
    config.selector.dfa_min_beats = 10_000;
    config
}

#[test]
fn full_session_produces_every_output() {
    let (analyzer, sink) = analyzer(hr_only());
    let mut input = SessionInput::new(night());
    input.device = Some("Polar H10 8C4A2B".into());
    input.readiness = ReadinessContext {
        baseline_rmssd: Some(60.0),
        ..Default::default()
    };

    let out = analyzer.analyze(&input).expect("analysis runs");
    assert!(out.verification.passed, "{:?}", out.verification.errors);
    assert_eq!(out.flags.len(), 3000);
    assert_eq!(out.artifacts.artifacts, 0);

    let recovery = out.recovery.found().expect("recovery window");
    assert_eq!(recovery.classification, WindowClassification::OrganizedRecovery);
    assert!(recovery.window.start_index >= 890);
    assert!(recovery.window.end_index <= 2110);

    let peak = out.peak_capacity.found().expect("peak capacity");
    assert!((peak.peak_rmssd - 120.0).abs() < 1e-9);

    let metrics = out.metrics.found().expect("window metrics");
    assert_eq!(metrics.time.n, recovery.window.len());
    assert!((metrics.time.rmssd - 60.0).abs() < 1e-9);
    assert!(metrics.frequency.is_found());
    assert!(metrics.nonlinear.is_found());
    assert!(metrics.readiness.ratio_component.abs() < 1e-9);
    assert!((1.0..=10.0).contains(&metrics.readiness.score));

    let events = sink.events();
    assert!(events
        .iter()
        .any(|e| matches!(e, AnalysisEvent::VerificationCompleted { passed: true, .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, AnalysisEvent::WindowSelected { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, AnalysisEvent::PeakCapacityFound { .. })));
}

#[test]
fn disorganized_night_still_reports_peak_capacity() {
    let (analyzer, _) = analyzer(AnalysisConfig::default());
    let out = analyzer
        .analyze(&SessionInput::new(night()))
        .expect("analysis runs");
    assert!(out.verification.passed);
    assert_eq!(out.recovery.reason(), Some(Insufficient::NoOrganizedWindow));
    assert_eq!(out.metrics.reason(), Some(Insufficient::NoOrganizedWindow));
    assert!(out.peak_capacity.is_found());
}

#[test]
fn peak_rmssd_method_skips_classification_gate() {
    let (analyzer, _) = analyzer(AnalysisConfig::default());
    let mut input = SessionInput::new(night());
    input.method = SelectionMethod::PeakRmssd;
    let out = analyzer.analyze(&input).expect("analysis runs");
    let window = out.recovery.found().expect("peak window");
    assert!((window.window.rmssd - 60.0).abs() < 1e-9);
}

#[test]
fn isolated_missed_beats_are_flagged_but_do_not_reject() {
    let mut intervals = night_intervals();
    for i in [1200, 1500, 1800] {
        intervals[i] = 1900;
    }
    let series = RRSeries::from_intervals(&intervals);
    let (analyzer, _) = analyzer(hr_only());
    let out = analyzer
        .analyze(&SessionInput::new(series))
        .expect("analysis runs");
    assert!(out.verification.passed);
    assert_eq!(out.artifacts.artifacts, 3);
    for i in [1200, 1500, 1800] {
        assert!(out.flags[i].is_artifact);
        assert_eq!(out.flags[i].kind, ArtifactKind::Missed);
    }
    assert!(out.recovery.is_found());
}

#[test]
fn session_input_reads_from_json() {
    let json = r#"{
        "series": {"points": [{"timestamp_ms": 1000, "rr_ms": 1000}]},
        "device": "tickr x",
        "method": {"method": "manual", "timestamp_ms": 1000}
    }"#;
    let input: SessionInput = serde_json::from_str(json).expect("valid input");
    assert_eq!(input.series.len(), 1);
    assert_eq!(input.method, SelectionMethod::Manual { timestamp_ms: 1000 });
    assert_eq!(input.anchors.wake_ms, None);
}

#[test]
fn analysis_serializes_to_json() {
    let (analyzer, _) = analyzer(hr_only());
    let out = analyzer
        .analyze(&SessionInput::new(night()))
        .expect("analysis runs");
    let value = serde_json::to_value(&out).expect("serializable");
    assert_eq!(value["recovery"]["status"], "found");
    assert_eq!(value["metrics"]["status"], "found");
}
