//! Repair of flagged beats.
//!
//! Correction is independent of detection: it takes values plus flags and
//! returns new values plus new flags, never touching its inputs.

use super::artifact::{median_in_place, ArtifactFlag};
use crate::{
    config::CorrectionConfig,
    error::{AnalysisError, Result},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionMethod {
    #[default]
    None,
    Deletion,
    LinearInterpolation,
    CubicSpline,
    Median,
}

/// Output of a correction pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectedSeries {
    pub values: Vec<f64>,
    pub flags: Vec<ArtifactFlag>,
    /// Input index of every output position; only deletion makes this non-identity.
    pub source_index: Vec<usize>,
}

pub fn correct_artifacts(
    values: &[f64],
    flags: &[ArtifactFlag],
    method: CorrectionMethod,
    cfg: &CorrectionConfig,
) -> Result<CorrectedSeries> {
    if values.len() != flags.len() {
        return Err(AnalysisError::MisalignedFlags {
            values: values.len(),
            flags: flags.len(),
        });
    }
    let corrected = match method {
        CorrectionMethod::None => identity(values, flags),
        CorrectionMethod::Deletion => delete_artifacts(values, flags),
        CorrectionMethod::LinearInterpolation => interpolate_linear(values, flags),
        CorrectionMethod::CubicSpline => interpolate_spline(values, flags, cfg),
        CorrectionMethod::Median => replace_with_median(values, flags, cfg.median_window),
    };
    Ok(corrected)
}

fn identity(values: &[f64], flags: &[ArtifactFlag]) -> CorrectedSeries {
    CorrectedSeries {
        values: values.to_vec(),
        flags: flags.to_vec(),
        source_index: (0..values.len()).collect(),
    }
}

fn delete_artifacts(values: &[f64], flags: &[ArtifactFlag]) -> CorrectedSeries {
    let source_index: Vec<usize> = flags
        .iter()
        .enumerate()
        .filter(|(_, flag)| !flag.is_artifact)
        .map(|(idx, _)| idx)
        .collect();
    CorrectedSeries {
        values: source_index.iter().map(|&idx| values[idx]).collect(),
        flags: vec![ArtifactFlag::clean(); source_index.len()],
        source_index,
    }
}

/// Contiguous artifact runs as inclusive `(first, last)` index pairs.
fn artifact_runs(flags: &[ArtifactFlag]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut idx = 0;
    while idx < flags.len() {
        if flags[idx].is_artifact {
            let first = idx;
            while idx + 1 < flags.len() && flags[idx + 1].is_artifact {
                idx += 1;
            }
            runs.push((first, idx));
        }
        idx += 1;
    }
    runs
}

fn interpolate_linear(values: &[f64], flags: &[ArtifactFlag]) -> CorrectedSeries {
    let mut out = identity(values, flags);
    for (first, last) in artifact_runs(flags) {
        let before = first.checked_sub(1);
        let after = (last + 1 < values.len()).then_some(last + 1);
        for idx in first..=last {
            let replacement = match (before, after) {
                (Some(b), Some(a)) => {
                    let frac = (idx - b) as f64 / (a - b) as f64;
                    values[b] + (values[a] - values[b]) * frac
                }
                (Some(b), None) => values[b],
                (None, Some(a)) => values[a],
                (None, None) => continue,
            };
            out.values[idx] = replacement;
            out.flags[idx] = flags[idx].into_corrected();
        }
    }
    out
}

fn interpolate_spline(
    values: &[f64],
    flags: &[ArtifactFlag],
    cfg: &CorrectionConfig,
) -> CorrectedSeries {
    let (xs, ys): (Vec<f64>, Vec<f64>) = flags
        .iter()
        .enumerate()
        .filter(|(_, flag)| !flag.is_artifact)
        .map(|(idx, _)| (idx as f64, values[idx]))
        .unzip();
    let spline = match NaturalCubicSpline::fit(&xs, &ys) {
        Some(spline) if xs.len() >= 4 => spline,
        _ => return interpolate_linear(values, flags),
    };
    let mut out = identity(values, flags);
    for (idx, flag) in flags.iter().enumerate() {
        if flag.is_artifact {
            let estimate = spline.eval(idx as f64);
            out.values[idx] = estimate.clamp(cfg.spline_min_ms, cfg.spline_max_ms);
            out.flags[idx] = flag.into_corrected();
        }
    }
    out
}

fn replace_with_median(values: &[f64], flags: &[ArtifactFlag], window: usize) -> CorrectedSeries {
    let mut out = identity(values, flags);
    let half = window / 2;
    let mut scratch = Vec::with_capacity(window + 1);
    for (idx, flag) in flags.iter().enumerate() {
        if !flag.is_artifact {
            continue;
        }
        let start = idx.saturating_sub(half);
        let end = values.len().min(idx + half + 1);
        scratch.clear();
        scratch.extend(
            (start..end)
                .filter(|&j| !flags[j].is_artifact)
                .map(|j| values[j]),
        );
        if let Some(median) = median_in_place(&mut scratch) {
            out.values[idx] = median;
            out.flags[idx] = flag.into_corrected();
        }
    }
    out
}

/// Natural cubic spline through strictly increasing knots.
#[derive(Debug, Clone)]
pub struct NaturalCubicSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Second derivative at each knot; zero at both ends.
    m: Vec<f64>,
}

impl NaturalCubicSpline {
    pub fn fit(xs: &[f64], ys: &[f64]) -> Option<Self> {
        let n = xs.len();
        if n < 2 || ys.len() != n {
            return None;
        }
        let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
        if h.iter().any(|&step| step <= 0.0) {
            return None;
        }
        let mut m = vec![0.0; n];
        if n > 2 {
            let interior = n - 2;
            let mut sub = vec![0.0; interior];
            let mut diag = vec![0.0; interior];
            let mut sup = vec![0.0; interior];
            let mut rhs = vec![0.0; interior];
            for k in 0..interior {
                let i = k + 1;
                sub[k] = h[i - 1];
                diag[k] = 2.0 * (h[i - 1] + h[i]);
                sup[k] = h[i];
                rhs[k] = 6.0 * ((ys[i + 1] - ys[i]) / h[i] - (ys[i] - ys[i - 1]) / h[i - 1]);
            }
            let solved = solve_tridiagonal(&sub, &diag, &sup, &rhs)?;
            m[1..n - 1].copy_from_slice(&solved);
        }
        Some(Self {
            xs: xs.to_vec(),
            ys: ys.to_vec(),
            m,
        })
    }

    /// Evaluate inside the knot range; outside it the nearest knot value is returned.
    pub fn eval(&self, x: f64) -> f64 {
        let last = self.xs.len() - 1;
        if x <= self.xs[0] {
            return self.ys[0];
        }
        if x >= self.xs[last] {
            return self.ys[last];
        }
        let k = self.xs.partition_point(|&knot| knot <= x).saturating_sub(1).min(last - 1);
        let (x0, x1) = (self.xs[k], self.xs[k + 1]);
        let (y0, y1) = (self.ys[k], self.ys[k + 1]);
        let (m0, m1) = (self.m[k], self.m[k + 1]);
        let h = x1 - x0;
        let a = (x1 - x) / h;
        let b = (x - x0) / h;
        a * y0 + b * y1 + ((a.powi(3) - a) * m0 + (b.powi(3) - b) * m1) * h * h / 6.0
    }
}

/// Thomas algorithm for a tridiagonal system; `sub[0]` and `sup[n-1]` are ignored.
pub fn solve_tridiagonal(sub: &[f64], diag: &[f64], sup: &[f64], rhs: &[f64]) -> Option<Vec<f64>> {
    let n = diag.len();
    if n == 0 || sub.len() != n || sup.len() != n || rhs.len() != n {
        return None;
    }
    let mut c_prime = vec![0.0; n];
    let mut d_prime = vec![0.0; n];
    if diag[0].abs() < f64::EPSILON {
        return None;
    }
    c_prime[0] = sup[0] / diag[0];
    d_prime[0] = rhs[0] / diag[0];
    for i in 1..n {
        let denom = diag[i] - sub[i] * c_prime[i - 1];
        if denom.abs() < f64::EPSILON {
            return None;
        }
        c_prime[i] = sup[i] / denom;
        d_prime[i] = (rhs[i] - sub[i] * d_prime[i - 1]) / denom;
    }
    let mut x = vec![0.0; n];
    x[n - 1] = d_prime[n - 1];
    for i in (0..n - 1).rev() {
        x[i] = d_prime[i] - c_prime[i] * x[i + 1];
    }
    Some(x)
}
