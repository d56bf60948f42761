//! Tunable parameters for every analysis stage.
//!
//! All thresholds live here so that the numeric code never hardcodes them.
//! Each section deserializes with `#[serde(default)]`, so a TOML file only
//! has to name the values it overrides.

use crate::detectors::correction::CorrectionMethod;
use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub artifact: ArtifactConfig,
    pub correction: CorrectionConfig,
    pub time: TimeDomainConfig,
    pub frequency: FrequencyConfig,
    pub nonlinear: NonlinearConfig,
    pub ans: AnsConfig,
    pub readiness: ReadinessConfig,
    pub classifier: ClassifierConfig,
    pub selector: SelectorConfig,
    pub verification: VerificationConfig,
}

/// Artifact detection against a centered rolling median.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Rolling median window (beats).
    pub median_window: usize,
    /// Intervals below this are technical artifacts (ms).
    pub min_rr_ms: f64,
    /// Intervals above this are technical artifacts (ms).
    pub max_rr_ms: f64,
    /// Relative deviation from the local median that marks an ectopic beat.
    pub ectopic_threshold: f64,
    /// Relative excess over the local median that marks a missed beat.
    pub missed_threshold: f64,
    /// Relative shortfall below the local median that opens the extra/ectopic branch.
    pub extra_threshold: f64,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            median_window: 50,
            min_rr_ms: 200.0,
            max_rr_ms: 2000.0,
            ectopic_threshold: 0.20,
            missed_threshold: 0.30,
            extra_threshold: 0.30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    /// Correction applied before the final metric pass.
    pub method: CorrectionMethod,
    /// Neighbourhood for median replacement (beats).
    pub median_window: usize,
    /// Lower clamp for spline-corrected values (ms).
    pub spline_min_ms: f64,
    /// Upper clamp for spline-corrected values (ms).
    pub spline_max_ms: f64,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            method: CorrectionMethod::None,
            median_window: 11,
            spline_min_ms: 300.0,
            spline_max_ms: 2000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeDomainConfig {
    /// Rolling heart-rate window length (ms); windows overlap by half.
    pub hr_window_ms: i64,
    /// Beats needed for a rolling heart-rate window to count.
    pub hr_min_beats: usize,
    pub hr_min_bpm: f64,
    pub hr_max_bpm: f64,
    /// Histogram bin for the triangular index (1/128 s).
    pub histogram_bin_ms: f64,
    pub triangular_min_beats: usize,
}

impl Default for TimeDomainConfig {
    fn default() -> Self {
        Self {
            hr_window_ms: 10_000,
            hr_min_beats: 5,
            hr_min_bpm: 30.0,
            hr_max_bpm: 200.0,
            histogram_bin_ms: 7.8125,
            triangular_min_beats: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencyConfig {
    /// Uniform resampling rate for the tachogram (Hz).
    pub resample_hz: f64,
    /// Welch segment length in samples; segments overlap by half.
    pub segment_len: usize,
    pub min_clean_beats: usize,
    pub min_samples: usize,
    /// VLF is only reported for spans at least this long (ms).
    pub vlf_min_span_ms: i64,
    pub vlf_band: [f64; 2],
    pub lf_band: [f64; 2],
    pub hf_band: [f64; 2],
    /// Upper bound on cached transform plans.
    pub plan_cache_capacity: usize,
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self {
            resample_hz: 4.0,
            segment_len: 256,
            min_clean_beats: 120,
            min_samples: 64,
            vlf_min_span_ms: 600_000,
            vlf_band: [0.003, 0.04],
            lf_band: [0.04, 0.15],
            hf_band: [0.15, 0.4],
            plan_cache_capacity: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NonlinearConfig {
    /// Embedding dimension for sample/approximate entropy.
    pub entropy_m: usize,
    /// Tolerance as a fraction of the series standard deviation.
    pub entropy_r: f64,
    pub dfa: DfaConfig,
}

impl Default for NonlinearConfig {
    fn default() -> Self {
        Self {
            entropy_m: 2,
            entropy_r: 0.2,
            dfa: DfaConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DfaConfig {
    pub alpha1_min_box: usize,
    pub alpha1_max_box: usize,
    pub alpha2_min_box: usize,
    pub alpha2_max_box: usize,
    pub alpha2_min_beats: usize,
    /// Box sizes that must yield a fluctuation before α2 is reported.
    pub alpha2_min_box_sizes: usize,
}

impl Default for DfaConfig {
    fn default() -> Self {
        Self {
            alpha1_min_box: 4,
            alpha1_max_box: 16,
            alpha2_min_box: 16,
            alpha2_max_box: 64,
            alpha2_min_beats: 256,
            alpha2_min_box_sizes: 3,
        }
    }
}

/// Mean and standard deviation of a normative reference population.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Norm {
    pub mean: f64,
    pub sd: f64,
}

impl Norm {
    pub const fn new(mean: f64, sd: f64) -> Self {
        Self { mean, sd }
    }

    pub fn z(&self, value: f64) -> f64 {
        if self.sd == 0.0 {
            0.0
        } else {
            (value - self.mean) / self.sd
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnsConfig {
    /// Histogram bin for the Baevsky stress index (ms).
    pub stress_bin_ms: f64,
    pub mean_rr: Norm,
    pub rmssd: Norm,
    pub sd1: Norm,
    pub mean_hr: Norm,
    pub stress_index: Norm,
    pub sd2: Norm,
}

impl Default for AnsConfig {
    fn default() -> Self {
        Self {
            stress_bin_ms: 50.0,
            mean_rr: Norm::new(926.9, 142.1),
            rmssd: Norm::new(42.0, 15.0),
            sd1: Norm::new(29.7, 10.6),
            mean_hr: Norm::new(66.0, 9.4),
            stress_index: Norm::new(150.0, 100.0),
            sd2: Norm::new(70.0, 25.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub base_score: f64,
    /// Score points per unit of (RMSSD ratio - 1).
    pub ratio_weight: f64,
    pub ratio_limit: f64,
    /// VO2max at which the fitness factor is 1.
    pub reference_vo2max: f64,
    pub fitness_factor_range: [f64; 2],
    pub balance_weight: f64,
    pub balance_limit: f64,
    /// α1 above this counts as overly rigid.
    pub alpha1_high: f64,
    pub alpha1_organized_adjustment: f64,
    pub alpha1_low_adjustment: f64,
    pub alpha1_high_adjustment: f64,
    /// Acute:chronic load ratios and the score adjustment each triggers.
    pub load_spike_ratio: f64,
    pub load_spike_adjustment: f64,
    pub load_elevated_ratio: f64,
    pub load_elevated_adjustment: f64,
    pub load_detraining_ratio: f64,
    pub load_detraining_adjustment: f64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            base_score: 5.0,
            ratio_weight: 5.0,
            ratio_limit: 3.0,
            reference_vo2max: 45.0,
            fitness_factor_range: [0.8, 1.2],
            balance_weight: 0.5,
            balance_limit: 1.5,
            alpha1_high: 1.2,
            alpha1_organized_adjustment: 1.0,
            alpha1_low_adjustment: -1.0,
            alpha1_high_adjustment: -0.5,
            load_spike_ratio: 1.5,
            load_spike_adjustment: -1.5,
            load_elevated_ratio: 1.3,
            load_elevated_adjustment: -0.75,
            load_detraining_ratio: 0.8,
            load_detraining_adjustment: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub min_clean_beats: usize,
    /// HR coefficient of variation below which heart rate counts as stable.
    pub hr_cv_threshold: f64,
    /// Inclusive α1 range of organized recovery.
    pub organized_alpha1: [f64; 2],
    /// Lower bound of the flexible band; its upper bound is the organized minimum.
    pub flexible_alpha1_min: f64,
    pub max_lf_hf: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_clean_beats: 60,
            hr_cv_threshold: 0.08,
            organized_alpha1: [0.75, 1.0],
            flexible_alpha1_min: 0.60,
            max_lf_hf: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Start of the search band as a fraction of actual sleep.
    pub band_start: f64,
    /// End of the search band as a fraction of actual sleep.
    pub band_end: f64,
    pub target_window_beats: usize,
    /// Smallest window the adaptive sizing may shrink to.
    pub min_window_beats: usize,
    /// Slide step is window size divided by this.
    pub step_divisor: usize,
    pub min_clean_beats: usize,
    /// Floor for the adaptive clean-beat minimum on shrunken windows.
    pub adaptive_clean_floor: usize,
    pub max_artifact_rate: f64,
    /// Deviation from the neighbourhood median that excludes a beat from a candidate.
    pub ectopic_threshold: f64,
    /// Neighbours (excluding the beat itself) used for the ectopic median.
    pub ectopic_neighborhood: usize,
    /// Candidate RMSSD ratio over both neighbours that marks an isolated spike.
    pub spike_ratio: f64,
    /// Clean beats needed before DFA α1 is computed for a candidate.
    pub dfa_min_beats: usize,
    /// Weight of HR instability in the stability-weighted ranking.
    pub stability_weight: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            band_start: 0.30,
            band_end: 0.70,
            target_window_beats: 400,
            min_window_beats: 120,
            step_divisor: 10,
            min_clean_beats: 300,
            adaptive_clean_floor: 50,
            max_artifact_rate: 0.20,
            ectopic_threshold: 0.20,
            ectopic_neighborhood: 10,
            spike_ratio: 1.5,
            dfa_min_beats: 64,
            stability_weight: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub min_duration_ms: i64,
    pub min_points: usize,
    pub max_artifact_rate: f64,
    pub warn_artifact_rate: f64,
    pub max_ectopic_rate: f64,
    pub warn_ectopic_rate: f64,
    pub max_drift: f64,
    pub warn_drift: f64,
    /// Inter-beat time beyond the beat's own interval that counts as a gap (ms).
    pub gap_threshold_ms: i64,
    pub max_signal_loss: f64,
    pub max_single_gap_ms: i64,
    pub max_out_of_bounds_rate: f64,
    /// Case-insensitive fragments of accepted device names; empty accepts all.
    pub known_devices: Vec<String>,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            min_duration_ms: 180_000,
            min_points: 120,
            max_artifact_rate: 0.20,
            warn_artifact_rate: 0.05,
            max_ectopic_rate: 0.10,
            warn_ectopic_rate: 0.02,
            max_drift: 0.40,
            warn_drift: 0.20,
            gap_threshold_ms: 3_000,
            max_signal_loss: 0.10,
            max_single_gap_ms: 60_000,
            max_out_of_bounds_rate: 0.05,
            known_devices: vec![
                "polar h10".into(),
                "polar h9".into(),
                "polar h7".into(),
                "hrm-pro".into(),
                "hrm-dual".into(),
                "tickr".into(),
                "movesense".into(),
            ],
        }
    }
}

impl AnalysisConfig {
    /// Parse a (partial) TOML document on top of the defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: AnalysisConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject parameter combinations the stages cannot work with.
    pub fn validate(&self) -> Result<()> {
        let a = &self.artifact;
        check(a.median_window >= 1, "artifact.median_window", "must be at least 1")?;
        check(
            a.min_rr_ms > 0.0 && a.min_rr_ms < a.max_rr_ms,
            "artifact.min_rr_ms",
            "must be positive and below max_rr_ms",
        )?;
        for (field, value) in [
            ("artifact.ectopic_threshold", a.ectopic_threshold),
            ("artifact.missed_threshold", a.missed_threshold),
            ("artifact.extra_threshold", a.extra_threshold),
            ("selector.ectopic_threshold", self.selector.ectopic_threshold),
        ] {
            check(value > 0.0 && value < 1.0, field, "must lie in (0, 1)")?;
        }

        let c = &self.correction;
        check(c.median_window >= 1, "correction.median_window", "must be at least 1")?;
        check(
            c.spline_min_ms < c.spline_max_ms,
            "correction.spline_min_ms",
            "must be below spline_max_ms",
        )?;

        let f = &self.frequency;
        check(f.resample_hz > 0.0, "frequency.resample_hz", "must be positive")?;
        check(f.segment_len >= 8, "frequency.segment_len", "must be at least 8")?;
        check(
            f.plan_cache_capacity >= 1,
            "frequency.plan_cache_capacity",
            "must be at least 1",
        )?;
        for (field, band) in [
            ("frequency.vlf_band", f.vlf_band),
            ("frequency.lf_band", f.lf_band),
            ("frequency.hf_band", f.hf_band),
        ] {
            check(
                band[0] >= 0.0 && band[0] < band[1],
                field,
                "needs 0 <= low < high",
            )?;
        }

        let d = &self.nonlinear.dfa;
        check(
            d.alpha1_min_box >= 4 && d.alpha1_min_box < d.alpha1_max_box,
            "nonlinear.dfa.alpha1_min_box",
            "needs 4 <= min < max",
        )?;
        check(
            d.alpha2_min_box >= 4 && d.alpha2_min_box < d.alpha2_max_box,
            "nonlinear.dfa.alpha2_min_box",
            "needs 4 <= min < max",
        )?;
        check(self.nonlinear.entropy_m >= 1, "nonlinear.entropy_m", "must be at least 1")?;
        check(self.nonlinear.entropy_r > 0.0, "nonlinear.entropy_r", "must be positive")?;

        check(self.ans.stress_bin_ms > 0.0, "ans.stress_bin_ms", "must be positive")?;

        let k = &self.classifier;
        check(
            k.flexible_alpha1_min <= k.organized_alpha1[0]
                && k.organized_alpha1[0] <= k.organized_alpha1[1],
            "classifier.organized_alpha1",
            "needs flexible_min <= organized_low <= organized_high",
        )?;

        let s = &self.selector;
        check(
            (0.0..=1.0).contains(&s.band_start)
                && (0.0..=1.0).contains(&s.band_end)
                && s.band_start < s.band_end,
            "selector.band_start",
            "needs 0 <= start < end <= 1",
        )?;
        check(
            s.min_window_beats >= 2 && s.min_window_beats <= s.target_window_beats,
            "selector.min_window_beats",
            "needs 2 <= min_window_beats <= target_window_beats",
        )?;
        check(s.step_divisor >= 1, "selector.step_divisor", "must be at least 1")?;
        check(s.spike_ratio > 1.0, "selector.spike_ratio", "must exceed 1")?;
        check(
            (0.0..=1.0).contains(&s.max_artifact_rate),
            "selector.max_artifact_rate",
            "must lie in [0, 1]",
        )?;
        check(
            s.ectopic_neighborhood >= 2,
            "selector.ectopic_neighborhood",
            "must be at least 2",
        )?;
        Ok(())
    }
}

fn check(ok: bool, field: &'static str, reason: &str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(AnalysisError::InvalidConfig {
            field,
            reason: reason.to_string(),
        })
    }
}
