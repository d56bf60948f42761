use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a stage produced no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Insufficient {
    /// Fewer usable beats than the computation needs.
    TooFewBeats { required: usize, available: usize },
    /// The analysed span is too short in time or in resampled samples.
    ShortSpan { required_ms: i64, available_ms: i64 },
    /// The search band holds too few beats for even the smallest window.
    EmptyBand,
    /// Every candidate failed the clean-beat, artifact or spike checks.
    NoCandidates,
    /// Candidates exist but none shows organized recovery.
    NoOrganizedWindow,
    /// The recording was rejected by verification.
    VerificationFailed,
    /// A requested window falls outside the recording.
    OutOfRange,
}

impl fmt::Display for Insufficient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Insufficient::TooFewBeats {
                required,
                available,
            } => write!(f, "needs {required} beats, {available} available"),
            Insufficient::ShortSpan {
                required_ms,
                available_ms,
            } => write!(f, "needs {required_ms} ms of data, {available_ms} ms available"),
            Insufficient::EmptyBand => write!(f, "search band too small for a window"),
            Insufficient::NoCandidates => write!(f, "no candidate window passed the filters"),
            Insufficient::NoOrganizedWindow => write!(f, "no consolidated recovery"),
            Insufficient::VerificationFailed => write!(f, "recording failed verification"),
            Insufficient::OutOfRange => write!(f, "window outside the recording"),
        }
    }
}

/// Result of a stage that may legitimately have nothing to report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Outcome<T> {
    Found(T),
    Insufficient(Insufficient),
}

impl<T> Outcome<T> {
    pub fn too_few(required: usize, available: usize) -> Self {
        Outcome::Insufficient(Insufficient::TooFewBeats {
            required,
            available,
        })
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Outcome::Found(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            Outcome::Found(value) => Some(value),
            Outcome::Insufficient(_) => None,
        }
    }

    pub fn as_ref(&self) -> Outcome<&T> {
        match self {
            Outcome::Found(value) => Outcome::Found(value),
            Outcome::Insufficient(reason) => Outcome::Insufficient(*reason),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Found(value) => Outcome::Found(f(value)),
            Outcome::Insufficient(reason) => Outcome::Insufficient(reason),
        }
    }

    pub fn and_then<U>(self, f: impl FnOnce(T) -> Outcome<U>) -> Outcome<U> {
        match self {
            Outcome::Found(value) => f(value),
            Outcome::Insufficient(reason) => Outcome::Insufficient(reason),
        }
    }

    pub fn reason(&self) -> Option<Insufficient> {
        match self {
            Outcome::Found(_) => None,
            Outcome::Insufficient(reason) => Some(*reason),
        }
    }
}

impl<T> From<Outcome<T>> for Option<T> {
    fn from(outcome: Outcome<T>) -> Self {
        outcome.found()
    }
}
