//! Detrended fluctuation analysis over non-overlapping boxes.

use crate::{config::DfaConfig, outcome::Outcome};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalingExponent {
    pub alpha: f64,
    pub r_squared: f64,
    /// Box sizes that contributed to the fit.
    pub box_sizes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dfa {
    /// Short-term exponent.
    pub alpha1: ScalingExponent,
    /// Long-term exponent, only for long enough series.
    pub alpha2: Option<ScalingExponent>,
}

pub fn dfa(values: &[f64], cfg: &DfaConfig) -> Outcome<Dfa> {
    let required = 2 * cfg.alpha1_max_box;
    if values.len() < required {
        return Outcome::too_few(required, values.len());
    }
    let profile = integrate(values);
    let alpha1 = scaling_exponent(&profile, cfg.alpha1_min_box, cfg.alpha1_max_box);
    let alpha2 = if values.len() >= cfg.alpha2_min_beats {
        let exponent = scaling_exponent(&profile, cfg.alpha2_min_box, cfg.alpha2_max_box);
        (exponent.box_sizes >= cfg.alpha2_min_box_sizes).then_some(exponent)
    } else {
        None
    };
    Outcome::Found(Dfa { alpha1, alpha2 })
}

/// Short-term exponent only; what the window scan needs per candidate.
pub fn alpha1(values: &[f64], cfg: &DfaConfig) -> Outcome<ScalingExponent> {
    dfa(values, cfg).map(|d| d.alpha1)
}

/// Cumulative sum of the mean-centred series.
fn integrate(values: &[f64]) -> Vec<f64> {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values
        .iter()
        .scan(0.0, |acc, v| {
            *acc += v - mean;
            Some(*acc)
        })
        .collect()
}

fn scaling_exponent(profile: &[f64], min_box: usize, max_box: usize) -> ScalingExponent {
    let samples: Vec<(f64, f64)> = (min_box..=max_box)
        .filter_map(|size| fluctuation(profile, size).map(|f| (size as f64, f)))
        .filter(|(_, f)| f.is_finite() && *f > 0.0)
        .collect();
    let (alpha, r_squared) = log_log_fit(&samples);
    ScalingExponent {
        alpha,
        r_squared,
        box_sizes: samples.len(),
    }
}

/// RMS of the per-box detrended residuals; `None` when not even one box fits.
fn fluctuation(profile: &[f64], size: usize) -> Option<f64> {
    let boxes = profile.len() / size;
    if size < 2 || boxes == 0 {
        return None;
    }
    let total: f64 = profile
        .chunks_exact(size)
        .map(|segment| {
            let (slope, intercept) = linear_fit(segment);
            segment
                .iter()
                .enumerate()
                .map(|(i, &y)| (y - (slope * i as f64 + intercept)).powi(2))
                .sum::<f64>()
                / size as f64
        })
        .sum();
    Some((total / boxes as f64).sqrt())
}

fn linear_fit(segment: &[f64]) -> (f64, f64) {
    let n = segment.len();
    if n < 2 {
        return (0.0, segment.first().copied().unwrap_or(0.0));
    }
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xx = 0.0;
    let mut sum_xy = 0.0;
    for (i, &y) in segment.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xx += x * x;
        sum_xy += x * y;
    }
    let n_f = n as f64;
    let denom = n_f * sum_xx - sum_x * sum_x;
    if denom.abs() < f64::EPSILON {
        return (0.0, sum_y / n_f);
    }
    let slope = (n_f * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / n_f;
    (slope, intercept)
}

/// Slope and R² of ln(F) against ln(n); neutral `(0, 0)` when degenerate.
fn log_log_fit(points: &[(f64, f64)]) -> (f64, f64) {
    if points.len() < 2 {
        return (0.0, 0.0);
    }
    let xs: Vec<f64> = points.iter().map(|(n, _)| n.ln()).collect();
    let ys: Vec<f64> = points.iter().map(|(_, f)| f.ln()).collect();
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let sxx: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
    let syy: f64 = ys.iter().map(|y| (y - mean_y).powi(2)).sum();
    let sxy: f64 = xs
        .iter()
        .zip(&ys)
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum();
    if sxx < f64::EPSILON {
        return (0.0, 0.0);
    }
    let slope = sxy / sxx;
    let r_squared = if syy < f64::EPSILON {
        0.0
    } else {
        (sxy * sxy / (sxx * syy)).clamp(0.0, 1.0)
    };
    (slope, r_squared)
}
