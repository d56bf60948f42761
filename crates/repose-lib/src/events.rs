//! Diagnostic events emitted by the analysis stages.
//!
//! Numeric code never talks to a logger directly. It hands typed events to an
//! [`EventSink`]; [`LogSink`] forwards them to the `log` facade.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AnalysisEvent {
    VerificationCompleted {
        passed: bool,
        reasons: Vec<String>,
        warnings: usize,
    },
    ArtifactsDetected {
        total: usize,
        artifacts: usize,
        rate: f64,
    },
    BandResolved {
        start_index: usize,
        end_index: usize,
        start_ms: i64,
        end_ms: i64,
    },
    WindowSized {
        window_beats: usize,
        step: usize,
        min_clean_beats: usize,
    },
    CandidateRejected {
        start_index: usize,
        clean_beats: usize,
        artifact_rate: f64,
    },
    SpikeRejected {
        start_index: usize,
        rmssd: f64,
    },
    WindowSelected {
        start_index: usize,
        end_index: usize,
        rmssd: f64,
        reason: String,
    },
    NoOrganizedWindow {
        candidates: usize,
    },
    PeakCapacityFound {
        start_index: usize,
        rmssd: f64,
    },
    PlansReleased {
        plans: usize,
    },
}

impl AnalysisEvent {
    pub fn level(&self) -> log::Level {
        match self {
            AnalysisEvent::CandidateRejected { .. } | AnalysisEvent::SpikeRejected { .. } => {
                log::Level::Trace
            }
            AnalysisEvent::BandResolved { .. }
            | AnalysisEvent::WindowSized { .. }
            | AnalysisEvent::PlansReleased { .. } => log::Level::Debug,
            AnalysisEvent::VerificationCompleted { passed: false, .. } => log::Level::Warn,
            _ => log::Level::Info,
        }
    }
}

/// Receiver for analysis diagnostics.
pub trait EventSink: Send + Sync {
    fn record(&self, event: AnalysisEvent);
}

/// Forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn record(&self, event: AnalysisEvent) {
        let level = event.level();
        if log::log_enabled!(level) {
            match serde_json::to_string(&event) {
                Ok(line) => log::log!(level, "{}", line),
                Err(_) => log::log!(level, "{:?}", event),
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: AnalysisEvent) {}
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<AnalysisEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AnalysisEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: AnalysisEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
