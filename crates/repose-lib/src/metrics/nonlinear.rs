use super::{
    dfa::{dfa, Dfa},
    mean_sd,
};
use crate::{config::NonlinearConfig, outcome::Outcome};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nonlinear {
    pub sd1: f64,
    pub sd2: f64,
    pub sd1_sd2: Option<f64>,
    /// Absent when no template pair matches.
    pub sample_entropy: Option<f64>,
    pub approximate_entropy: f64,
    pub dfa: Option<Dfa>,
}

/// Poincaré descriptors, entropies and DFA over clean interval values.
pub fn nonlinear(values: &[f64], cfg: &NonlinearConfig) -> Outcome<Nonlinear> {
    let m = cfg.entropy_m;
    let required = (m + 2).max(3);
    if values.len() < required {
        return Outcome::too_few(required, values.len());
    }
    let (sd1, sd2) = poincare(values);
    let sdnn = mean_sd(values).map(|(_, sd)| sd).unwrap_or(0.0);
    let r = cfg.entropy_r * sdnn;
    Outcome::Found(Nonlinear {
        sd1,
        sd2,
        sd1_sd2: (sd2 > 0.0).then(|| sd1 / sd2),
        sample_entropy: sample_entropy(values, m, r),
        approximate_entropy: approximate_entropy(values, m, r),
        dfa: dfa(values, &cfg.dfa).found(),
    })
}

/// SD1 from successive differences, SD2 from SDNN and SD1.
pub fn poincare(values: &[f64]) -> (f64, f64) {
    let diffs: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let sd1 = mean_sd(&diffs)
        .map(|(_, sd)| (sd * sd / 2.0).sqrt())
        .unwrap_or(0.0);
    let sdnn = mean_sd(values).map(|(_, sd)| sd).unwrap_or(0.0);
    let sd2 = (2.0 * sdnn * sdnn - sd1 * sd1).max(0.0).sqrt();
    (sd1, sd2)
}

fn sample_entropy(data: &[f64], m: usize, r: f64) -> Option<f64> {
    if data.len() < m + 2 {
        return None;
    }
    let templates = data.len() - m;
    let mut count_m = 0u64;
    let mut count_m1 = 0u64;
    for i in 0..templates {
        for j in (i + 1)..templates {
            if max_diff(data, i, j, m) <= r {
                count_m += 1;
                if max_diff(data, i, j, m + 1) <= r {
                    count_m1 += 1;
                }
            }
        }
    }
    if count_m == 0 || count_m1 == 0 {
        None
    } else {
        Some(-(count_m1 as f64 / count_m as f64).ln())
    }
}

fn approximate_entropy(data: &[f64], m: usize, r: f64) -> f64 {
    phi(data, m, r) - phi(data, m + 1, r)
}

fn phi(data: &[f64], m: usize, r: f64) -> f64 {
    let templates = data.len() + 1 - m;
    let total: f64 = (0..templates)
        .map(|i| {
            let matches = (0..templates)
                .filter(|&j| max_diff(data, i, j, m) <= r)
                .count();
            (matches as f64 / templates as f64).ln()
        })
        .sum();
    total / templates as f64
}

fn max_diff(data: &[f64], i: usize, j: usize, length: usize) -> f64 {
    data[i..i + length]
        .iter()
        .zip(data[j..j + length].iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::assert_close;
    use crate::outcome::Insufficient;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn poincare_closed_form() {
        let (sd1, sd2) = poincare(&[800.0, 820.0, 810.0, 830.0, 800.0]);
        assert_close(sd1, 300f64.sqrt(), 1e-12);
        assert_close(sd2, 40f64.sqrt(), 1e-12);
    }

    #[test]
    fn constant_series_is_all_zero() {
        let out = nonlinear(&[950.0; 100], &NonlinearConfig::default())
            .found()
            .unwrap();
        assert_eq!(out.sd1, 0.0);
        assert_eq!(out.sd2, 0.0);
        assert_eq!(out.sd1_sd2, None);
        assert_eq!(out.sample_entropy, Some(0.0));
        assert_eq!(out.approximate_entropy, 0.0);
        let dfa = out.dfa.unwrap();
        assert_eq!(dfa.alpha1.alpha, 0.0);
    }

    #[test]
    fn periodic_series_is_fully_regular() {
        let values: Vec<f64> = (0..100).map(|i| if i % 2 == 0 { 800.0 } else { 900.0 }).collect();
        let out = nonlinear(&values, &NonlinearConfig::default()).found().unwrap();
        assert_eq!(out.sample_entropy, Some(0.0));
        assert!(out.sd1 > 70.0);
        assert!(out.sd2.is_finite());
    }

    #[test]
    fn white_noise_is_irregular() {
        let mut rng = StdRng::seed_from_u64(3);
        let values: Vec<f64> = (0..1000).map(|_| 900.0 + rng.gen_range(-50.0..50.0)).collect();
        let out = nonlinear(&values, &NonlinearConfig::default()).found().unwrap();
        let sampen = out.sample_entropy.unwrap();
        assert!((1.8..2.6).contains(&sampen), "sampen = {sampen}");
        assert!(out.approximate_entropy > 0.8);
    }

    #[test]
    fn sample_entropy_absent_without_matches() {
        assert_eq!(sample_entropy(&[0.0, 10.0, 20.0, 30.0, 40.0], 2, 1.0), None);
    }

    #[test]
    fn too_short_is_insufficient() {
        assert_eq!(
            nonlinear(&[800.0, 810.0, 820.0], &NonlinearConfig::default()).reason(),
            Some(Insufficient::TooFewBeats {
                required: 4,
                available: 3
            })
        );
    }
}
