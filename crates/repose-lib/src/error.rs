use thiserror::Error;

/// Faults that stop an analysis call outright.
///
/// Running out of data is not one of them: stages report that through
/// [`crate::outcome::Outcome::Insufficient`].
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid configuration: {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("artifact flags ({flags}) are not aligned with {values} RR values")]
    MisalignedFlags { values: usize, flags: usize },

    #[error("spectral transform failed: {0}")]
    Fft(#[from] realfft::FftError),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
