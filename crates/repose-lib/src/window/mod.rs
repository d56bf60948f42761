pub mod candidate;
pub mod classifier;
pub mod selector;

pub use candidate::{isolated_spikes, CandidateWindow};
pub use classifier::{classify_window, WindowClassification};
pub use selector::{
    PeakCapacity, RecoveryWindow, SelectionMethod, SelectionReason, SleepAnchors, WindowSelector,
};
