//! Overnight RR-interval analysis: artifact handling, HRV metrics and
//! recovery-window selection.

pub mod analysis;
pub mod config;
pub mod detectors;
pub mod error;
pub mod events;
pub mod io;
pub mod metrics;
pub mod outcome;
pub mod signal;
pub mod verification;
pub mod window;

pub use analysis::{Analyzer, SessionAnalysis, SessionInput, WindowMetrics};
pub use config::AnalysisConfig;
pub use detectors::{ArtifactFlag, ArtifactKind, ArtifactSummary, CorrectionMethod};
pub use error::{AnalysisError, Result};
pub use events::{AnalysisEvent, EventSink, LogSink, MemorySink, NullSink};
pub use metrics::{PlanCache, ReadinessContext};
pub use outcome::{Insufficient, Outcome};
pub use signal::{RRPoint, RRSeries};
pub use verification::{RejectionReason, VerificationResult};
pub use window::{PeakCapacity, RecoveryWindow, SelectionMethod, SleepAnchors};
