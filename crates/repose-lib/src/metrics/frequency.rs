//! Spectral HRV via Welch's method over a uniformly resampled tachogram.

use crate::{
    config::FrequencyConfig,
    error::Result,
    outcome::{Insufficient, Outcome},
    signal::RRPoint,
};
use realfft::{RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    f64::consts::PI,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

type Plan = Arc<dyn RealToComplex<f64>>;

/// Bounded pool of forward transform plans keyed by length.
///
/// Owned by the analysis context; [`PlanCache::clear`] releases every plan.
pub struct PlanCache {
    capacity: usize,
    plans: Mutex<HashMap<usize, Plan>>,
}

impl PlanCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            plans: Mutex::new(HashMap::new()),
        }
    }

    /// Plans only hold immutable twiddle tables, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, HashMap<usize, Plan>> {
        self.plans
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn plan(&self, len: usize) -> Plan {
        let mut plans = self.lock();
        if let Some(plan) = plans.get(&len) {
            return Arc::clone(plan);
        }
        if plans.len() >= self.capacity {
            if let Some(&evict) = plans.keys().next() {
                plans.remove(&evict);
            }
        }
        let plan = RealFftPlanner::<f64>::new().plan_fft_forward(len);
        plans.insert(len, Arc::clone(&plan));
        plan
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached plan, returning how many were held.
    pub fn clear(&self) -> usize {
        let mut plans = self.lock();
        let released = plans.len();
        plans.clear();
        released
    }
}

impl Default for PlanCache {
    fn default() -> Self {
        Self::new(FrequencyConfig::default().plan_cache_capacity)
    }
}

impl fmt::Debug for PlanCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanCache")
            .field("capacity", &self.capacity)
            .field("cached", &self.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyDomain {
    /// Only reported for spans long enough to resolve it.
    pub vlf: Option<f64>,
    pub lf: f64,
    pub hf: f64,
    pub lf_hf: Option<f64>,
    pub total_power: f64,
    pub lf_nu: f64,
    pub hf_nu: f64,
    pub hf_peak_hz: Option<f64>,
    pub segments: usize,
    /// One-sided spectrum as `[frequency_hz, power_ms2_per_hz]`.
    pub points: Vec<[f64; 2]>,
}

pub fn frequency_domain(
    clean: &[RRPoint],
    cfg: &FrequencyConfig,
    cache: &PlanCache,
) -> Result<Outcome<FrequencyDomain>> {
    if clean.len() < cfg.min_clean_beats.max(2) {
        return Ok(Outcome::too_few(cfg.min_clean_beats.max(2), clean.len()));
    }
    let span_ms = match (clean.first(), clean.last()) {
        (Some(first), Some(last)) => last.timestamp_ms - first.timestamp_ms,
        _ => 0,
    };
    let mut signal = resample(clean, cfg.resample_hz);
    if signal.len() < cfg.min_samples {
        return Ok(Outcome::Insufficient(Insufficient::ShortSpan {
            required_ms: (cfg.min_samples as f64 / cfg.resample_hz * 1000.0).ceil() as i64,
            available_ms: span_ms,
        }));
    }
    let mean = signal.iter().sum::<f64>() / signal.len() as f64;
    signal.iter_mut().for_each(|x| *x -= mean);

    let (freqs, powers, segments) = welch_psd(&signal, cfg.resample_hz, cfg.segment_len, cache)?;
    let df = cfg.resample_hz / cfg.segment_len as f64;
    let band = |range: [f64; 2]| integrate_band(&freqs, &powers, range, df);

    let lf = band(cfg.lf_band);
    let hf = band(cfg.hf_band);
    let vlf = (span_ms >= cfg.vlf_min_span_ms).then(|| band(cfg.vlf_band));
    let total_power = powers.iter().sum::<f64>() * df;
    let (lf_nu, hf_nu) = if lf + hf > 0.0 {
        (lf / (lf + hf) * 100.0, hf / (lf + hf) * 100.0)
    } else {
        (0.0, 0.0)
    };
    let hf_peak_hz = freqs
        .iter()
        .zip(&powers)
        .filter(|(f, p)| **f >= cfg.hf_band[0] && **f < cfg.hf_band[1] && **p > 0.0)
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(f, _)| *f);

    Ok(Outcome::Found(FrequencyDomain {
        vlf,
        lf,
        hf,
        lf_hf: (hf > 0.0).then(|| lf / hf),
        total_power,
        lf_nu,
        hf_nu,
        hf_peak_hz,
        segments,
        points: freqs
            .into_iter()
            .zip(powers)
            .map(|(f, p)| [f, p])
            .collect(),
    }))
}

/// Linear interpolation of (time, interval) pairs onto a uniform grid starting at the first beat.
fn resample(clean: &[RRPoint], fs: f64) -> Vec<f64> {
    let Some(first) = clean.first() else {
        return Vec::new();
    };
    if clean.len() < 2 {
        return vec![first.value()];
    }
    let times: Vec<f64> = clean
        .iter()
        .map(|p| (p.timestamp_ms - first.timestamp_ms) as f64 / 1000.0)
        .collect();
    let span = times[times.len() - 1];
    if span <= 0.0 {
        return vec![first.value()];
    }
    let n = (span * fs).floor() as usize + 1;
    let mut j = 0;
    (0..n)
        .map(|i| {
            let t = i as f64 / fs;
            while j + 2 < times.len() && times[j + 1] <= t {
                j += 1;
            }
            let (t0, t1) = (times[j], times[j + 1]);
            let (v0, v1) = (clean[j].value(), clean[j + 1].value());
            let dt = t1 - t0;
            if dt <= 0.0 {
                v1
            } else {
                v0 + (v1 - v0) * ((t - t0) / dt).clamp(0.0, 1.0)
            }
        })
        .collect()
}

fn welch_psd(
    signal: &[f64],
    fs: f64,
    nfft: usize,
    cache: &PlanCache,
) -> Result<(Vec<f64>, Vec<f64>, usize)> {
    let plan = cache.plan(nfft);
    let window_len = signal.len().min(nfft);
    let window = hann(window_len);
    let window_energy: f64 = window.iter().map(|w| w * w).sum();
    let step = (window_len / 2).max(1);

    let mut frame = plan.make_input_vec();
    let mut spectrum = plan.make_output_vec();
    let mut powers = vec![0.0; spectrum.len()];
    let mut segments = 0;
    let mut pos = 0;
    while pos + window_len <= signal.len() {
        frame.iter_mut().for_each(|x| *x = 0.0);
        for (dst, (x, w)) in frame
            .iter_mut()
            .zip(signal[pos..pos + window_len].iter().zip(&window))
        {
            *dst = x * w;
        }
        plan.process(&mut frame, &mut spectrum)?;
        for (acc, val) in powers.iter_mut().zip(&spectrum) {
            *acc += val.norm_sqr();
        }
        segments += 1;
        pos += step;
    }

    let scale = if window_energy > 0.0 && segments > 0 {
        1.0 / (fs * window_energy * segments as f64)
    } else {
        0.0
    };
    let nyquist = (nfft % 2 == 0).then_some(nfft / 2);
    for (k, p) in powers.iter_mut().enumerate() {
        let one_sided = if k == 0 || Some(k) == nyquist { 1.0 } else { 2.0 };
        *p *= scale * one_sided;
    }
    let freqs = (0..powers.len())
        .map(|k| k as f64 * fs / nfft as f64)
        .collect();
    Ok((freqs, powers, segments))
}

fn integrate_band(freqs: &[f64], powers: &[f64], band: [f64; 2], df: f64) -> f64 {
    freqs
        .iter()
        .zip(powers)
        .filter(|(f, _)| **f >= band[0] && **f < band[1])
        .map(|(_, p)| *p)
        .sum::<f64>()
        * df
}

fn hann(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / (size as f64)).cos()))
        .collect()
}
