pub mod artifact;
pub mod correction;

pub use artifact::{
    detect_artifacts, detect_artifacts_in, rolling_median, ArtifactFlag, ArtifactKind,
    ArtifactSummary,
};
pub use correction::{correct_artifacts, CorrectedSeries, CorrectionMethod, NaturalCubicSpline};
