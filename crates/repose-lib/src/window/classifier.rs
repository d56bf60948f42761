use crate::config::ClassifierConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowClassification {
    OrganizedRecovery,
    FlexibleUnconsolidated,
    HighVariability,
    Insufficient,
}

impl WindowClassification {
    pub fn is_organized(self) -> bool {
        self == WindowClassification::OrganizedRecovery
    }
}

/// Label a window from its clean-beat count, DFA α1, LF/HF and HR variability.
pub fn classify_window(
    clean_beats: usize,
    alpha1: Option<f64>,
    lf_hf: Option<f64>,
    hr_cv: f64,
    cfg: &ClassifierConfig,
) -> WindowClassification {
    if clean_beats < cfg.min_clean_beats {
        return WindowClassification::Insufficient;
    }
    let stable_hr = hr_cv < cfg.hr_cv_threshold;
    let Some(alpha1) = alpha1 else {
        return if stable_hr {
            WindowClassification::OrganizedRecovery
        } else {
            WindowClassification::HighVariability
        };
    };
    let [organized_low, organized_high] = cfg.organized_alpha1;
    if (organized_low..=organized_high).contains(&alpha1) {
        let vagal = lf_hf.is_some_and(|ratio| ratio <= cfg.max_lf_hf);
        if vagal || stable_hr {
            WindowClassification::OrganizedRecovery
        } else {
            WindowClassification::FlexibleUnconsolidated
        }
    } else if (cfg.flexible_alpha1_min..organized_low).contains(&alpha1) {
        WindowClassification::FlexibleUnconsolidated
    } else {
        WindowClassification::HighVariability
    }
}
