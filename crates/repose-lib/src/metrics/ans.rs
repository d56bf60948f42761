//! Autonomic balance indices and the readiness score.

use super::{nonlinear::Nonlinear, time::TimeDomain};
use crate::config::{AnsConfig, ClassifierConfig, ReadinessConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Baevsky stress index `AMo / (2 · Mo · MxDMn)`.
///
/// AMo is the modal bin share in percent; Mo (bin centre) and MxDMn (range)
/// are in seconds. `None` when the range is zero.
pub fn stress_index(values: &[f64], bin_ms: f64) -> Option<f64> {
    if values.is_empty() || bin_ms <= 0.0 {
        return None;
    }
    let mut bins: HashMap<i64, usize> = HashMap::new();
    for v in values {
        *bins.entry((v / bin_ms).floor() as i64).or_default() += 1;
    }
    let (mode_bin, mode_count) = bins
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))?;
    let amo = mode_count as f64 / values.len() as f64 * 100.0;
    let mo = (mode_bin as f64 + 0.5) * bin_ms / 1000.0;
    let max = values.iter().copied().fold(f64::MIN, f64::max);
    let min = values.iter().copied().fold(f64::MAX, f64::min);
    let mxdmn = (max - min) / 1000.0;
    if mxdmn <= 0.0 || mo <= 0.0 {
        return None;
    }
    Some(amo / (2.0 * mo * mxdmn))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnsIndices {
    pub pns_index: f64,
    pub sns_index: f64,
    pub stress_index: Option<f64>,
}

impl AnsIndices {
    /// Mean z-scores against the normative references; absent inputs are skipped.
    pub fn compute(
        time: &TimeDomain,
        nonlinear: Option<&Nonlinear>,
        stress_index: Option<f64>,
        cfg: &AnsConfig,
    ) -> Self {
        let mut pns = vec![cfg.mean_rr.z(time.mean_rr), cfg.rmssd.z(time.rmssd)];
        let mut sns = vec![cfg.mean_hr.z(time.mean_hr)];
        if let Some(nl) = nonlinear {
            pns.push(cfg.sd1.z(nl.sd1));
            // A narrow SD2 points at sympathetic drive.
            sns.push(-cfg.sd2.z(nl.sd2));
        }
        if let Some(si) = stress_index {
            sns.push(cfg.stress_index.z(si));
        }
        Self {
            pns_index: mean(&pns),
            sns_index: mean(&sns),
            stress_index,
        }
    }

    pub fn balance(&self) -> f64 {
        self.pns_index - self.sns_index
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Externally supplied context for the readiness score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadinessContext {
    pub baseline_rmssd: Option<f64>,
    pub vo2max: Option<f64>,
    pub acute_chronic_ratio: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Readiness {
    /// Clamped to [1, 10].
    pub score: f64,
    pub ratio_component: f64,
    pub alpha1_component: f64,
    pub balance_component: f64,
    pub load_component: f64,
}

pub struct ReadinessInputs<'a> {
    pub rmssd: f64,
    pub alpha1: Option<f64>,
    pub ans: Option<&'a AnsIndices>,
    pub context: &'a ReadinessContext,
}

pub fn readiness_score(
    inputs: &ReadinessInputs<'_>,
    cfg: &ReadinessConfig,
    classifier: &ClassifierConfig,
    ans: &AnsConfig,
) -> Readiness {
    let baseline = inputs
        .context
        .baseline_rmssd
        .filter(|b| *b > 0.0)
        .unwrap_or(ans.rmssd.mean);
    let fitness = inputs
        .context
        .vo2max
        .filter(|v| *v > 0.0 && cfg.reference_vo2max > 0.0)
        .map(|v| (v / cfg.reference_vo2max).clamp(cfg.fitness_factor_range[0], cfg.fitness_factor_range[1]))
        .unwrap_or(1.0);
    let ratio = if baseline > 0.0 {
        inputs.rmssd / baseline / fitness
    } else {
        1.0
    };
    let ratio_component = ((ratio - 1.0) * cfg.ratio_weight).clamp(-cfg.ratio_limit, cfg.ratio_limit);

    let alpha1_component = match inputs.alpha1 {
        Some(a) if a < classifier.flexible_alpha1_min => cfg.alpha1_low_adjustment,
        Some(a) if a > cfg.alpha1_high => cfg.alpha1_high_adjustment,
        Some(a) if (classifier.organized_alpha1[0]..=classifier.organized_alpha1[1]).contains(&a) => {
            cfg.alpha1_organized_adjustment
        }
        _ => 0.0,
    };

    let balance_component = inputs
        .ans
        .map(|a| (a.balance() * cfg.balance_weight).clamp(-cfg.balance_limit, cfg.balance_limit))
        .unwrap_or(0.0);

    let load_component = match inputs.context.acute_chronic_ratio {
        Some(r) if r > cfg.load_spike_ratio => cfg.load_spike_adjustment,
        Some(r) if r > cfg.load_elevated_ratio => cfg.load_elevated_adjustment,
        Some(r) if r < cfg.load_detraining_ratio => cfg.load_detraining_adjustment,
        _ => 0.0,
    };

    let score = cfg.base_score + ratio_component + alpha1_component + balance_component + load_component;
    Readiness {
        score: if score.is_finite() { score.clamp(1.0, 10.0) } else { cfg.base_score },
        ratio_component,
        alpha1_component,
        balance_component,
        load_component,
    }
}
