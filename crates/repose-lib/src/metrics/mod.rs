pub mod ans;
pub mod dfa;
pub mod frequency;
pub mod nonlinear;
pub mod time;

pub use ans::{
    readiness_score, stress_index, AnsIndices, Readiness, ReadinessContext, ReadinessInputs,
};
pub use dfa::{dfa, Dfa, ScalingExponent};
pub use frequency::{frequency_domain, FrequencyDomain, PlanCache};
pub use nonlinear::{nonlinear, poincare, Nonlinear};
pub use time::{time_domain, HrSource, TimeDomain};

/// Mean and sample standard deviation; `None` for fewer than two values.
pub(crate) fn mean_sd(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some((mean, var.sqrt()))
}

/// RMSSD of consecutive values; 0 for fewer than two values.
pub(crate) fn rmssd(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sum: f64 = values.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
    (sum / (values.len() - 1) as f64).sqrt()
}

#[cfg(test)]
pub(crate) fn assert_close(actual: f64, expected: f64, rel_tol: f64) {
    let tol = expected.abs().max(1.0) * rel_tol;
    let diff = (actual - expected).abs();
    assert!(
        diff <= tol,
        "expected {expected}, got {actual} (diff {diff} > tol {tol})"
    );
}
